// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use indexmap::IndexMap;

use reflexdb_index::{CollectionIndex, IndexId};
use reflexdb_type::{Key, Value};

use crate::{
	change::{ChangeMessage, ChangeType},
	status::CollectionStatus,
	sync::SyncedWrite,
	transaction::{Deferred, Mutation, TransactionId},
};

/// Everything behind the collection's state lock. The `visible` map is the
/// synced map with the optimistic overlay applied in transaction-creation
/// order; it is maintained incrementally, key by touched key.
pub(crate) struct CollectionState {
	pub status: CollectionStatus,
	pub synced: IndexMap<Key, Value>,
	pub visible: IndexMap<Key, Value>,
	pub overlay: IndexMap<TransactionId, IndexMap<Key, Mutation>>,
	pub change_log: Vec<ChangeMessage>,
	pub pending_batch: Option<Vec<SyncedWrite>>,
	pub indexes: IndexMap<IndexId, CollectionIndex>,
	pub next_index_id: u64,
	pub ready_waiters: Vec<Deferred<Vec<Value>>>,
	pub seen_first_commit: bool,
	pub last_error: Option<String>,
}

impl CollectionState {
	pub fn new() -> Self {
		Self {
			status: CollectionStatus::Idle,
			synced: IndexMap::new(),
			visible: IndexMap::new(),
			overlay: IndexMap::new(),
			change_log: Vec::new(),
			pending_batch: None,
			indexes: IndexMap::new(),
			next_index_id: 0,
			ready_waiters: Vec::new(),
			seen_first_commit: false,
			last_error: None,
		}
	}

	/// Fresh state for a restarted sync; indexes keep their definitions but
	/// drop their contents.
	pub fn reset(&mut self) {
		self.status = CollectionStatus::Idle;
		self.synced.clear();
		self.visible.clear();
		self.overlay.clear();
		self.change_log.clear();
		self.pending_batch = None;
		self.seen_first_commit = false;
		self.last_error = None;
		for index in self.indexes.values_mut() {
			index.clear();
		}
	}

	/// The value key `k` resolves to with the overlay applied: the synced
	/// base folded through each unterminated transaction's mutation of the
	/// key, in transaction-creation order. `None` means not visible.
	pub fn visible_value(&self, key: &Key) -> Option<Value> {
		let mut value = self.synced.get(key).cloned();
		for mutations in self.overlay.values() {
			if let Some(mutation) = mutations.get(key) {
				value = mutation.visible_value().cloned();
			}
		}
		value
	}

	/// Recomputes the visible entry for each touched key and returns the
	/// change messages describing what moved. At most one message per key.
	pub fn recompute_visible(&mut self, keys: &[Key]) -> Vec<ChangeMessage> {
		let mut changes = Vec::new();
		for key in keys {
			let next = self.visible_value(key);
			let current = self.visible.get(key);
			match (current, next) {
				(None, Some(value)) => changes.push(ChangeMessage::insert(key.clone(), value)),
				(Some(old), Some(new)) => {
					if *old != new {
						changes.push(ChangeMessage::update(key.clone(), new, old.clone()));
					}
				}
				(Some(old), None) => changes.push(ChangeMessage::delete(key.clone(), old.clone())),
				(None, None) => {}
			}
		}
		changes
	}

	/// Applies already-computed visible changes to the visible map, every
	/// index, and the change log, in batch order.
	pub fn apply_changes(&mut self, changes: &[ChangeMessage]) {
		for change in changes {
			match change.change_type {
				ChangeType::Insert => {
					self.visible.insert(change.key.clone(), change.value.clone());
					for index in self.indexes.values_mut() {
						index.add(&change.key, &change.value);
					}
				}
				ChangeType::Update => {
					self.visible.insert(change.key.clone(), change.value.clone());
					for index in self.indexes.values_mut() {
						index.update(&change.key, &change.value);
					}
				}
				ChangeType::Delete => {
					self.visible.shift_remove(&change.key);
					for index in self.indexes.values_mut() {
						index.remove(&change.key);
					}
				}
			}
		}
		self.change_log.extend(changes.iter().cloned());
	}

	/// The current visible state replayed as inserts, for initial-state
	/// subscriptions and live-query seeding.
	pub fn state_as_changes(&self) -> Vec<ChangeMessage> {
		self.visible
			.iter()
			.map(|(key, value)| ChangeMessage::insert(key.clone(), value.clone()))
			.collect()
	}
}
