// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::collections::BTreeSet;

use reflexdb_type::{Key, Value};

use crate::ops::{IndexOp, ValueRange};

pub mod btree;
pub mod hash;
pub mod sorted;

/// Key filter applied during ordered scans.
pub type KeyFilter<'a> = &'a dyn Fn(&Key) -> bool;

/// The pluggable structure behind a [`crate::CollectionIndex`]: a multimap
/// from indexed value to record keys.
///
/// `lookup` and `range` are superset-safe: when a kind cannot answer an
/// operator exactly it returns every indexed key and the caller re-filters.
pub trait IndexStorage: Send + Sync {
	fn supported_ops(&self) -> &'static [IndexOp];

	fn insert(&mut self, value: Value, key: Key);

	fn remove(&mut self, value: &Value, key: &Key);

	fn clear(&mut self);

	/// Number of indexed (value, key) pairs.
	fn len(&self) -> usize;

	fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn lookup(&self, op: IndexOp, operand: &Value) -> BTreeSet<Key>;

	fn range(&self, range: &ValueRange) -> BTreeSet<Key>;

	/// First `n` keys in ascending indexed order whose value sorts strictly
	/// after `from`. `from = None` scans from the very start, which is a
	/// different intent than `from = Some(Undefined)` (the explicit minimal
	/// position).
	fn take(&self, n: usize, from: Option<&Value>, filter: Option<KeyFilter>) -> Vec<Key>;

	/// Mirror of [`IndexStorage::take`]: descending order, values strictly
	/// before `from`, `None` scans from the very end.
	fn take_reversed(&self, n: usize, from: Option<&Value>, filter: Option<KeyFilter>) -> Vec<Key>;
}
