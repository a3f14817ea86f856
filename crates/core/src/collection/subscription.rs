// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::{
	collections::VecDeque,
	sync::{
		Arc,
		atomic::{AtomicBool, AtomicU64, Ordering},
	},
};

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::{change::ChangeMessage, collection::Collection};

/// Per-batch change callback; receives arrays of changes, keys unique
/// within each array.
pub type ChangeCallback = Box<dyn FnMut(&[ChangeMessage]) + Send>;

#[derive(Clone, Copy, Debug, Default)]
pub struct SubscribeOptions {
	/// Replay the current visible state as inserts before live changes.
	pub include_initial_state: bool,
}

enum Notification {
	Broadcast(Vec<ChangeMessage>),
	Direct(u64, Vec<ChangeMessage>),
}

/// Subscriber set plus the deferred-notification queue that keeps delivery
/// out of the collection's lock scope: batches queue while state settles
/// and drain afterwards, so a callback can re-enter the collection freely.
pub(crate) struct Subscribers {
	next_id: AtomicU64,
	entries: Mutex<IndexMap<u64, Arc<Mutex<ChangeCallback>>>>,
	queue: Mutex<VecDeque<Notification>>,
	draining: AtomicBool,
}

impl Subscribers {
	pub fn new() -> Self {
		Self {
			next_id: AtomicU64::new(0),
			entries: Mutex::new(IndexMap::new()),
			queue: Mutex::new(VecDeque::new()),
			draining: AtomicBool::new(false),
		}
	}

	pub fn subscribe(&self, callback: ChangeCallback) -> u64 {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		self.entries.lock().insert(id, Arc::new(Mutex::new(callback)));
		id
	}

	pub fn unsubscribe(&self, id: u64) {
		self.entries.lock().shift_remove(&id);
	}

	pub fn clear(&self) {
		self.entries.lock().clear();
		self.queue.lock().clear();
	}

	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}

	pub fn notify(&self, changes: Vec<ChangeMessage>) {
		if changes.is_empty() {
			return;
		}
		self.queue.lock().push_back(Notification::Broadcast(changes));
		self.drain();
	}

	pub fn notify_direct(&self, id: u64, changes: Vec<ChangeMessage>) {
		if changes.is_empty() {
			return;
		}
		self.queue.lock().push_back(Notification::Direct(id, changes));
		self.drain();
	}

	/// Delivers queued batches. Re-entrant calls return immediately; the
	/// draining frame picks up whatever they queued.
	pub fn drain(&self) {
		if self.draining.swap(true, Ordering::AcqRel) {
			return;
		}
		loop {
			let next = self.queue.lock().pop_front();
			let Some(notification) = next else { break };
			match notification {
				Notification::Broadcast(changes) => {
					let targets: Vec<(u64, Arc<Mutex<ChangeCallback>>)> =
						self.entries.lock().iter().map(|(id, cb)| (*id, cb.clone())).collect();
					for (id, callback) in targets {
						// An unsubscribe that raced the queue wins: no
						// further callbacks after the handle is dropped.
						if self.entries.lock().contains_key(&id) {
							let mut callback = callback.lock();
							(*callback)(&changes);
						}
					}
				}
				Notification::Direct(id, changes) => {
					let target = self.entries.lock().get(&id).cloned();
					if let Some(callback) = target {
						let mut callback = callback.lock();
						(*callback)(&changes);
					}
				}
			}
		}
		self.draining.store(false, Ordering::Release);
	}
}

/// Unsubscribe handle returned by `subscribe_changes`; after `unsubscribe`
/// no further callback is delivered.
pub struct SubscriptionHandle {
	id: u64,
	collection: Collection,
}

impl SubscriptionHandle {
	pub(crate) fn new(id: u64, collection: Collection) -> Self {
		Self { id, collection }
	}

	pub fn unsubscribe(self) {
		self.collection.unsubscribe(self.id);
	}
}
