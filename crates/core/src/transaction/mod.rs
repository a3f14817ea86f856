// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::fmt::{self, Display, Formatter};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use reflexdb_type::{Key, Value};

use crate::collection::CollectionId;

pub use deferred::Deferred;
pub use manager::{
	AwaitSyncContext, AwaitSyncFn, MutationFn, PersistContext, TransactionHandle, TransactionInfo,
	TransactionOptions, Transactions, release_transaction_manager, settle_transactions,
	transaction_manager,
};

mod deferred;
pub(crate) mod manager;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(Uuid);

impl TransactionId {
	pub(crate) fn generate() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Display for TransactionId {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		Display::fmt(&self.0, f)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
	Pending,
	Queued,
	Persisting,
	PersistedAwaitingSync,
	Completed,
	Failed,
}

impl TransactionState {
	pub fn is_terminal(&self) -> bool {
		matches!(self, TransactionState::Completed | TransactionState::Failed)
	}
}

/// Conflict regime: `Parallel` transactions interleave freely, `Ordered`
/// transactions serialize behind any active transaction they overlap with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
	#[default]
	Parallel,
	Ordered,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationType {
	Insert,
	Update,
	Delete,
}

/// One optimistic mutation. `original` is the synced base at first touch and
/// survives same-key merges; `changes` is the recomputed field diff between
/// `original` and `modified`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
	#[serde(rename = "type")]
	pub mutation_type: MutationType,
	pub key: Key,
	pub collection_id: CollectionId,
	pub original: Option<Value>,
	pub modified: Option<Value>,
	pub changes: Option<Value>,
}

impl Mutation {
	pub fn insert(collection_id: CollectionId, key: Key, value: Value) -> Self {
		let changes = diff(None, Some(&value));
		Self {
			mutation_type: MutationType::Insert,
			key,
			collection_id,
			original: None,
			modified: Some(value),
			changes,
		}
	}

	pub fn update(collection_id: CollectionId, key: Key, original: Option<Value>, value: Value) -> Self {
		let changes = diff(original.as_ref(), Some(&value));
		Self {
			mutation_type: MutationType::Update,
			key,
			collection_id,
			original,
			modified: Some(value),
			changes,
		}
	}

	pub fn delete(collection_id: CollectionId, key: Key, original: Option<Value>) -> Self {
		Self {
			mutation_type: MutationType::Delete,
			key,
			collection_id,
			original,
			modified: None,
			changes: None,
		}
	}

	/// The value this mutation leaves visible; `None` means deleted.
	pub fn visible_value(&self) -> Option<&Value> {
		self.modified.as_ref()
	}
}

/// Merges a later mutation of the same key into an earlier one, last-wins
/// on the value while `original` keeps the synced base. `None` means the
/// pair cancels out (insert then delete) and optimistic tracking for the
/// key clears entirely.
pub(crate) fn merge_mutations(existing: &Mutation, incoming: Mutation) -> Option<Mutation> {
	use MutationType::*;

	let merged_type = match (existing.mutation_type, incoming.mutation_type) {
		(Insert, Delete) => return None,
		(Insert, _) => Insert,
		(Update, Delete) | (Delete, Delete) => Delete,
		(Delete, Insert) | (Delete, Update) => Update,
		(Update, _) => Update,
	};

	let original = existing.original.clone();
	let modified = incoming.modified.clone();
	let changes = match merged_type {
		Delete => None,
		_ => diff(original.as_ref(), modified.as_ref()),
	};
	Some(Mutation {
		mutation_type: merged_type,
		key: incoming.key,
		collection_id: incoming.collection_id,
		original,
		modified,
		changes,
	})
}

/// Field-level difference between the synced base and the modified value:
/// the record of fields in `modified` that differ from `original` (removed
/// fields show as `Undefined`). Non-record values diff as the whole value.
pub(crate) fn diff(original: Option<&Value>, modified: Option<&Value>) -> Option<Value> {
	let modified = modified?;
	let Some(original) = original else {
		return Some(modified.clone());
	};
	match (original.as_record(), modified.as_record()) {
		(Some(before), Some(after)) => {
			let mut changed: IndexMap<String, Value> = IndexMap::new();
			for (field, value) in after {
				if before.get(field) != Some(value) {
					changed.insert(field.clone(), value.clone());
				}
			}
			for field in before.keys() {
				if !after.contains_key(field) {
					changed.insert(field.clone(), Value::Undefined);
				}
			}
			Some(Value::Record(changed))
		}
		_ => {
			if original == modified {
				Some(Value::record([] as [(String, Value); 0]))
			} else {
				Some(modified.clone())
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use reflexdb_type::record;

	use super::*;

	fn cid() -> CollectionId {
		CollectionId::from("users")
	}

	#[test]
	fn test_insert_then_update_merges_to_insert() {
		let insert = Mutation::insert(cid(), Key::from(1), record! { "a" => 1 });
		let update = Mutation::update(cid(), Key::from(1), None, record! { "a" => 2, "b" => 3 });
		let merged = merge_mutations(&insert, update).unwrap();
		assert_eq!(merged.mutation_type, MutationType::Insert);
		assert_eq!(merged.modified, Some(record! { "a" => 2, "b" => 3 }));
		assert_eq!(merged.original, None);
	}

	#[test]
	fn test_insert_then_delete_cancels() {
		let insert = Mutation::insert(cid(), Key::from(1), record! { "a" => 1 });
		let delete = Mutation::delete(cid(), Key::from(1), None);
		assert!(merge_mutations(&insert, delete).is_none());
	}

	#[test]
	fn test_update_then_delete_keeps_original() {
		let base = record! { "a" => 1 };
		let update = Mutation::update(cid(), Key::from(1), Some(base.clone()), record! { "a" => 2 });
		let delete = Mutation::delete(cid(), Key::from(1), Some(base.clone()));
		let merged = merge_mutations(&update, delete).unwrap();
		assert_eq!(merged.mutation_type, MutationType::Delete);
		assert_eq!(merged.original, Some(base));
		assert_eq!(merged.modified, None);
	}

	#[test]
	fn test_delete_then_insert_becomes_update() {
		let base = record! { "a" => 1 };
		let delete = Mutation::delete(cid(), Key::from(1), Some(base.clone()));
		let insert = Mutation::insert(cid(), Key::from(1), record! { "a" => 9 });
		let merged = merge_mutations(&delete, insert).unwrap();
		assert_eq!(merged.mutation_type, MutationType::Update);
		assert_eq!(merged.original, Some(base));
		assert_eq!(merged.changes, Some(record! { "a" => 9 }));
	}

	#[test]
	fn test_diff_tracks_removed_fields() {
		let before = record! { "a" => 1, "b" => 2 };
		let after = record! { "a" => 1 };
		let changed = diff(Some(&before), Some(&after)).unwrap();
		assert_eq!(changed, Value::record([("b", Value::Undefined)]));
	}
}
