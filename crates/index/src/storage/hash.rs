// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::collections::{BTreeSet, HashMap};

use reflexdb_type::{Key, Value, compare};

use crate::{
	ops::{IndexOp, ValueRange},
	storage::{IndexStorage, KeyFilter},
};

/// Hash index storage: O(1) equality and IN. Ordered operators fall back to
/// the superset answer (every indexed key) and the calling operator
/// re-filters; ordered `take` sorts on demand.
#[derive(Default)]
pub struct HashStorage {
	buckets: HashMap<Value, BTreeSet<Key>>,
	pairs: usize,
}

impl HashStorage {
	pub fn new() -> Self {
		Self::default()
	}

	fn all_keys(&self) -> BTreeSet<Key> {
		self.buckets.values().flat_map(|keys| keys.iter().cloned()).collect()
	}

	fn sorted_pairs(&self) -> Vec<(&Value, &Key)> {
		let mut pairs: Vec<(&Value, &Key)> = self
			.buckets
			.iter()
			.flat_map(|(value, keys)| keys.iter().map(move |key| (value, key)))
			.collect();
		pairs.sort_by(|a, b| compare(a.0, b.0).then_with(|| a.1.cmp(b.1)));
		pairs
	}
}

/// Buckets by a normalized value so comparator-equal numerics (`Int(3)`,
/// `Float(3.0)`, `Date(3)`) land in the same bucket, matching what the
/// ordered kinds return for equality.
fn normal(value: &Value) -> Value {
	match value {
		Value::Int(i) => Value::BigInt(*i as i128),
		Value::Date(ms) => Value::BigInt(*ms as i128),
		Value::Float(f) => {
			let v = f.value();
			if v.fract() == 0.0 && v.abs() < i128::MAX as f64 {
				Value::BigInt(v as i128)
			} else {
				value.clone()
			}
		}
		_ => value.clone(),
	}
}

impl IndexStorage for HashStorage {
	fn supported_ops(&self) -> &'static [IndexOp] {
		&[IndexOp::Eq, IndexOp::In]
	}

	fn insert(&mut self, value: Value, key: Key) {
		if self.buckets.entry(normal(&value)).or_default().insert(key) {
			self.pairs += 1;
		}
	}

	fn remove(&mut self, value: &Value, key: &Key) {
		let probe = normal(value);
		if let Some(bucket) = self.buckets.get_mut(&probe) {
			if bucket.remove(key) {
				self.pairs -= 1;
			}
			if bucket.is_empty() {
				self.buckets.remove(&probe);
			}
		}
	}

	fn clear(&mut self) {
		self.buckets.clear();
		self.pairs = 0;
	}

	fn len(&self) -> usize {
		self.pairs
	}

	fn lookup(&self, op: IndexOp, operand: &Value) -> BTreeSet<Key> {
		match op {
			IndexOp::Eq => self.buckets.get(&normal(operand)).cloned().unwrap_or_default(),
			IndexOp::In => match operand {
				Value::List(items) => items
					.iter()
					.flat_map(|item| self.lookup(IndexOp::Eq, item))
					.collect(),
				_ => BTreeSet::new(),
			},
			// Not answerable from a hash structure; superset-safe fallback.
			IndexOp::Gt | IndexOp::Gte | IndexOp::Lt | IndexOp::Lte => self.all_keys(),
		}
	}

	fn range(&self, range: &ValueRange) -> BTreeSet<Key> {
		// Exact despite the unordered structure: one pass, comparator check.
		self.buckets
			.iter()
			.filter(|(value, _)| range.contains(value))
			.flat_map(|(_, keys)| keys.iter().cloned())
			.collect()
	}

	fn take(&self, n: usize, from: Option<&Value>, filter: Option<KeyFilter>) -> Vec<Key> {
		let mut out = Vec::with_capacity(n);
		for (value, key) in self.sorted_pairs() {
			if let Some(bound) = from {
				if compare(value, bound) != std::cmp::Ordering::Greater {
					continue;
				}
			}
			if filter.map(|f| f(key)).unwrap_or(true) {
				out.push(key.clone());
				if out.len() == n {
					break;
				}
			}
		}
		out
	}

	fn take_reversed(&self, n: usize, from: Option<&Value>, filter: Option<KeyFilter>) -> Vec<Key> {
		let mut out = Vec::with_capacity(n);
		for (value, key) in self.sorted_pairs().into_iter().rev() {
			if let Some(bound) = from {
				if compare(value, bound) != std::cmp::Ordering::Less {
					continue;
				}
			}
			if filter.map(|f| f(key)).unwrap_or(true) {
				out.push(key.clone());
				if out.len() == n {
					break;
				}
			}
		}
		out
	}
}
