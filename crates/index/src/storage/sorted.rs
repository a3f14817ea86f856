// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::collections::BTreeSet;

use reflexdb_type::{Key, Value, compare};

use crate::{
	ops::{IndexOp, ValueRange},
	storage::{IndexStorage, KeyFilter},
};

/// Sorted-array index storage: a vector of comparator-distinct (value, keys)
/// runs kept in ascending order. Cheap to scan, binary-searched on lookup;
/// the ordered structure of choice for small and mid-sized collections.
#[derive(Default)]
pub struct SortedStorage {
	runs: Vec<(Value, BTreeSet<Key>)>,
	pairs: usize,
}

impl SortedStorage {
	pub fn new() -> Self {
		Self::default()
	}

	fn position(&self, value: &Value) -> Result<usize, usize> {
		self.runs.binary_search_by(|(run, _)| compare(run, value))
	}

	/// Index of the first run at or after the bound.
	fn lower_edge(&self, value: &Value, inclusive: bool) -> usize {
		match self.position(value) {
			Ok(at) if inclusive => at,
			Ok(at) => at + 1,
			Err(at) => at,
		}
	}

	/// Index one past the last run at or before the bound.
	fn upper_edge(&self, value: &Value, inclusive: bool) -> usize {
		match self.position(value) {
			Ok(at) if inclusive => at + 1,
			Ok(at) => at,
			Err(at) => at,
		}
	}
}

impl IndexStorage for SortedStorage {
	fn supported_ops(&self) -> &'static [IndexOp] {
		&[IndexOp::Eq, IndexOp::Gt, IndexOp::Gte, IndexOp::Lt, IndexOp::Lte, IndexOp::In]
	}

	fn insert(&mut self, value: Value, key: Key) {
		match self.position(&value) {
			Ok(at) => {
				if self.runs[at].1.insert(key) {
					self.pairs += 1;
				}
			}
			Err(at) => {
				self.runs.insert(at, (value, BTreeSet::from([key])));
				self.pairs += 1;
			}
		}
	}

	fn remove(&mut self, value: &Value, key: &Key) {
		if let Ok(at) = self.position(value) {
			if self.runs[at].1.remove(key) {
				self.pairs -= 1;
			}
			if self.runs[at].1.is_empty() {
				self.runs.remove(at);
			}
		}
	}

	fn clear(&mut self) {
		self.runs.clear();
		self.pairs = 0;
	}

	fn len(&self) -> usize {
		self.pairs
	}

	fn lookup(&self, op: IndexOp, operand: &Value) -> BTreeSet<Key> {
		match op {
			IndexOp::Eq => match self.position(operand) {
				Ok(at) => self.runs[at].1.clone(),
				Err(_) => BTreeSet::new(),
			},
			IndexOp::In => match operand {
				Value::List(items) => items
					.iter()
					.flat_map(|item| self.lookup(IndexOp::Eq, item))
					.collect(),
				_ => BTreeSet::new(),
			},
			IndexOp::Gt => self.collect_runs(self.lower_edge(operand, false), self.runs.len()),
			IndexOp::Gte => self.collect_runs(self.lower_edge(operand, true), self.runs.len()),
			IndexOp::Lt => self.collect_runs(0, self.upper_edge(operand, false)),
			IndexOp::Lte => self.collect_runs(0, self.upper_edge(operand, true)),
		}
	}

	fn range(&self, range: &ValueRange) -> BTreeSet<Key> {
		let start = range
			.from
			.as_ref()
			.map(|v| self.lower_edge(v, range.from_inclusive))
			.unwrap_or(0);
		let end = range
			.to
			.as_ref()
			.map(|v| self.upper_edge(v, range.to_inclusive))
			.unwrap_or(self.runs.len());
		if start >= end {
			return BTreeSet::new();
		}
		self.collect_runs(start, end)
	}

	fn take(&self, n: usize, from: Option<&Value>, filter: Option<KeyFilter>) -> Vec<Key> {
		let start = from.map(|v| self.lower_edge(v, false)).unwrap_or(0);
		let mut out = Vec::with_capacity(n.min(self.pairs));
		for (_, keys) in &self.runs[start.min(self.runs.len())..] {
			for key in keys {
				if filter.map(|f| f(key)).unwrap_or(true) {
					out.push(key.clone());
					if out.len() == n {
						return out;
					}
				}
			}
		}
		out
	}

	fn take_reversed(&self, n: usize, from: Option<&Value>, filter: Option<KeyFilter>) -> Vec<Key> {
		let end = from.map(|v| self.upper_edge(v, false)).unwrap_or(self.runs.len());
		let mut out = Vec::with_capacity(n.min(self.pairs));
		for (_, keys) in self.runs[..end.min(self.runs.len())].iter().rev() {
			for key in keys.iter().rev() {
				if filter.map(|f| f(key)).unwrap_or(true) {
					out.push(key.clone());
					if out.len() == n {
						return out;
					}
				}
			}
		}
		out
	}
}

impl SortedStorage {
	fn collect_runs(&self, start: usize, end: usize) -> BTreeSet<Key> {
		self.runs[start.min(self.runs.len())..end.min(self.runs.len())]
			.iter()
			.flat_map(|(_, keys)| keys.iter().cloned())
			.collect()
	}
}
