// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::{
	collections::{BTreeSet, HashMap},
	fmt::{self, Display, Formatter},
	panic::{AssertUnwindSafe, catch_unwind},
};

use serde::{Deserialize, Serialize};
use tracing::warn;

use reflexdb_expr::{Expr, RowEvaluator, compile};
use reflexdb_type::{Key, Value};

use crate::{
	ops::{IndexKind, IndexOp, ValueRange},
	storage::{IndexStorage, KeyFilter, btree::BTreeStorage, hash::HashStorage, sorted::SortedStorage},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexId(pub u64);

impl Display for IndexId {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "index_{}", self.0)
	}
}

/// A secondary index over a value expression, owned by a collection and
/// maintained synchronously in the collection's commit order.
///
/// The `values` map records the indexed value actually stored per key, so
/// removal stays consistent even when the expression would evaluate
/// differently today. A row whose expression evaluation panics is logged and
/// skipped; the index stays sound for every other row.
pub struct CollectionIndex {
	id: IndexId,
	expression: Expr,
	evaluator: RowEvaluator,
	kind: IndexKind,
	storage: Box<dyn IndexStorage>,
	values: HashMap<Key, Value>,
	timestamp: u64,
}

impl CollectionIndex {
	pub fn new(id: IndexId, expression: Expr, kind: IndexKind) -> reflexdb_expr::Result<Self> {
		let evaluator = compile(&expression)?;
		let storage: Box<dyn IndexStorage> = match kind {
			IndexKind::Hash => Box::new(HashStorage::new()),
			IndexKind::Sorted => Box::new(SortedStorage::new()),
			IndexKind::BTree => Box::new(BTreeStorage::new()),
		};
		Ok(Self { id, expression, evaluator, kind, storage, values: HashMap::new(), timestamp: 0 })
	}

	pub fn id(&self) -> IndexId {
		self.id
	}

	pub fn kind(&self) -> IndexKind {
		self.kind
	}

	pub fn expression(&self) -> &Expr {
		&self.expression
	}

	pub fn supported_ops(&self) -> &'static [IndexOp] {
		self.storage.supported_ops()
	}

	pub fn supports(&self, op: IndexOp) -> bool {
		self.storage.supported_ops().contains(&op)
	}

	/// Monotonic: bumps on every applied operation, synced or optimistic.
	pub fn timestamp(&self) -> u64 {
		self.timestamp
	}

	pub fn indexed_keys(&self) -> BTreeSet<Key> {
		self.values.keys().cloned().collect()
	}

	pub fn add(&mut self, key: &Key, row: &Value) {
		self.timestamp += 1;
		let Some(value) = self.evaluate(key, row) else { return };
		self.storage.insert(value.clone(), key.clone());
		self.values.insert(key.clone(), value);
	}

	pub fn remove(&mut self, key: &Key) {
		self.timestamp += 1;
		if let Some(value) = self.values.remove(key) {
			self.storage.remove(&value, key);
		}
	}

	pub fn update(&mut self, key: &Key, new_row: &Value) {
		self.timestamp += 1;
		let next = self.evaluate(key, new_row);
		let previous = self.values.get(key).cloned();
		match (previous, next) {
			(Some(old), Some(new)) => {
				if old != new {
					self.storage.remove(&old, key);
					self.storage.insert(new.clone(), key.clone());
					self.values.insert(key.clone(), new);
				}
			}
			(Some(old), None) => {
				self.storage.remove(&old, key);
				self.values.remove(key);
			}
			(None, Some(new)) => {
				self.storage.insert(new.clone(), key.clone());
				self.values.insert(key.clone(), new);
			}
			(None, None) => {}
		}
	}

	pub fn build<'a>(&mut self, rows: impl IntoIterator<Item = (&'a Key, &'a Value)>) {
		self.clear();
		for (key, row) in rows {
			self.add(key, row);
		}
	}

	pub fn clear(&mut self) {
		self.storage.clear();
		self.values.clear();
		self.timestamp += 1;
	}

	/// Candidate keys for `op` against `operand`; superset-safe.
	pub fn lookup(&self, op: IndexOp, operand: &Value) -> BTreeSet<Key> {
		self.storage.lookup(op, operand)
	}

	/// Exactly the keys whose indexed value lies in the interval.
	pub fn range(&self, range: &ValueRange) -> BTreeSet<Key> {
		self.storage.range(range)
	}

	pub fn take(&self, n: usize, from: Option<&Value>, filter: Option<KeyFilter>) -> Vec<Key> {
		self.storage.take(n, from, filter)
	}

	pub fn take_reversed(&self, n: usize, from: Option<&Value>, filter: Option<KeyFilter>) -> Vec<Key> {
		self.storage.take_reversed(n, from, filter)
	}

	fn evaluate(&self, key: &Key, row: &Value) -> Option<Value> {
		let evaluator = &self.evaluator;
		match catch_unwind(AssertUnwindSafe(|| evaluator(row))) {
			Ok(value) => Some(value),
			Err(_) => {
				// Per-row evaluation failure is a diagnostic, not an index
				// failure; the row is skipped and the collection stays
				// operational.
				warn!(index = %self.id, %key, "index expression evaluation failed, row skipped");
				None
			}
		}
	}
}
