// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use serde::{Deserialize, Serialize};

use reflexdb_type::Value;

/// Index storage kinds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
	/// Equality and IN only, O(1) point lookups.
	Hash,
	/// Sorted array of (value, keys) runs; binary-searched.
	Sorted,
	/// Comparator-ordered tree.
	#[default]
	BTree,
}

/// Operators an index can be asked to answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexOp {
	Eq,
	Gt,
	Gte,
	Lt,
	Lte,
	In,
}

/// An open/closed interval over indexed values under the default comparator.
///
/// `from: Some(Value::Undefined)` is a real position (the minimal element),
/// not the absence of a bound; `None` means unbounded. A range with
/// `from == to == Some(Undefined)` and both ends inclusive selects exactly
/// the keys whose indexed value is undefined.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
	pub from: Option<Value>,
	pub to: Option<Value>,
	pub from_inclusive: bool,
	pub to_inclusive: bool,
}

impl ValueRange {
	pub fn all() -> Self {
		Self { from: None, to: None, from_inclusive: true, to_inclusive: true }
	}

	pub fn at(value: Value) -> Self {
		Self { from: Some(value.clone()), to: Some(value), from_inclusive: true, to_inclusive: true }
	}

	/// Does `value` fall inside the range under the default comparator?
	pub fn contains(&self, value: &Value) -> bool {
		use std::cmp::Ordering;

		if let Some(from) = &self.from {
			match reflexdb_type::compare(value, from) {
				Ordering::Less => return false,
				Ordering::Equal if !self.from_inclusive => return false,
				_ => {}
			}
		}
		if let Some(to) = &self.to {
			match reflexdb_type::compare(value, to) {
				Ordering::Greater => return false,
				Ordering::Equal if !self.to_inclusive => return false,
				_ => {}
			}
		}
		true
	}
}
