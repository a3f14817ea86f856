// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use reflexdb_type::{Key, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
	Insert,
	Update,
	Delete,
}

/// The wire form subscribers receive: `{type, key, value, previousValue?}`.
/// `value` carries the deleted row on deletes so downstream dataflow can
/// retract it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeMessage {
	#[serde(rename = "type")]
	pub change_type: ChangeType,
	pub key: Key,
	pub value: Value,
	#[serde(rename = "previousValue", skip_serializing_if = "Option::is_none")]
	pub previous_value: Option<Value>,
}

impl ChangeMessage {
	pub fn insert(key: Key, value: Value) -> Self {
		Self { change_type: ChangeType::Insert, key, value, previous_value: None }
	}

	pub fn update(key: Key, value: Value, previous: Value) -> Self {
		Self { change_type: ChangeType::Update, key, value, previous_value: Some(previous) }
	}

	pub fn delete(key: Key, value: Value) -> Self {
		Self { change_type: ChangeType::Delete, key, value, previous_value: None }
	}
}

/// Folds successive operations on the same key so a batch never carries a
/// key twice: `insert+update -> insert`, `insert+delete -> nothing`,
/// `update+delete -> delete`, `delete+insert -> update` (prior value
/// tracked). Batch order of first appearance is preserved.
pub fn fold_changes(changes: Vec<ChangeMessage>) -> Vec<ChangeMessage> {
	use ChangeType::*;

	let mut folded: IndexMap<Key, ChangeMessage> = IndexMap::new();
	for change in changes {
		let Some(existing_type) = folded.get(&change.key).map(|c| c.change_type) else {
			folded.insert(change.key.clone(), change);
			continue;
		};
		if (existing_type, change.change_type) == (Insert, Delete) {
			folded.shift_remove(&change.key);
			continue;
		}
		let Some(existing) = folded.get_mut(&change.key) else { continue };
		match (existing_type, change.change_type) {
			(Insert, Update) | (Update, Update) => {
				existing.value = change.value;
			}
			(Update, Delete) => {
				let previous = existing.previous_value.take();
				*existing = ChangeMessage {
					change_type: Delete,
					key: change.key.clone(),
					value: previous.unwrap_or(change.value),
					previous_value: None,
				};
			}
			(Delete, Insert) => {
				*existing = ChangeMessage {
					change_type: Update,
					key: change.key.clone(),
					value: change.value,
					previous_value: Some(existing.value.clone()),
				};
			}
			// Remaining combinations cannot arise from a well-formed
			// batch; last write wins.
			_ => {
				*existing = change;
			}
		}
	}
	folded.into_values().collect()
}

#[cfg(test)]
mod tests {
	use reflexdb_type::record;

	use super::*;

	#[test]
	fn test_insert_then_update_folds_to_insert() {
		let folded = fold_changes(vec![
			ChangeMessage::insert(Key::from(1), record! { "v" => 1 }),
			ChangeMessage::update(Key::from(1), record! { "v" => 2 }, record! { "v" => 1 }),
		]);
		assert_eq!(folded, vec![ChangeMessage::insert(Key::from(1), record! { "v" => 2 })]);
	}

	#[test]
	fn test_insert_then_delete_vanishes() {
		let folded = fold_changes(vec![
			ChangeMessage::insert(Key::from(1), record! { "v" => 1 }),
			ChangeMessage::delete(Key::from(1), record! { "v" => 1 }),
		]);
		assert!(folded.is_empty());
	}

	#[test]
	fn test_update_then_delete_folds_to_delete_of_prior() {
		let folded = fold_changes(vec![
			ChangeMessage::update(Key::from(1), record! { "v" => 2 }, record! { "v" => 1 }),
			ChangeMessage::delete(Key::from(1), record! { "v" => 2 }),
		]);
		assert_eq!(folded, vec![ChangeMessage::delete(Key::from(1), record! { "v" => 1 })]);
	}

	#[test]
	fn test_delete_then_insert_folds_to_update() {
		let folded = fold_changes(vec![
			ChangeMessage::delete(Key::from(1), record! { "v" => 1 }),
			ChangeMessage::insert(Key::from(1), record! { "v" => 9 }),
		]);
		assert_eq!(
			folded,
			vec![ChangeMessage::update(Key::from(1), record! { "v" => 9 }, record! { "v" => 1 })]
		);
	}

	#[test]
	fn test_keys_are_unique_and_ordered() {
		let folded = fold_changes(vec![
			ChangeMessage::insert(Key::from(2), record! { "v" => 2 }),
			ChangeMessage::insert(Key::from(1), record! { "v" => 1 }),
			ChangeMessage::update(Key::from(2), record! { "v" => 3 }, record! { "v" => 2 }),
		]);
		let keys: Vec<&Key> = folded.iter().map(|c| &c.key).collect();
		assert_eq!(keys, vec![&Key::from(2), &Key::from(1)]);
	}
}
