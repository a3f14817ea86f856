// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::{
	cmp::Ordering,
	collections::{BTreeMap, BTreeSet},
	ops::Bound,
};

use reflexdb_type::{Key, Value, compare};

use crate::{
	ops::{IndexOp, ValueRange},
	storage::{IndexStorage, KeyFilter},
};

/// Comparator-ordered wrapper. Values that compare equal under the default
/// comparator (`Int(3)`, `Float(3.0)`) share one bucket, so range scans are
/// exact with respect to the comparator.
#[derive(Clone, Debug)]
struct OrdValue(Value);

impl PartialEq for OrdValue {
	fn eq(&self, other: &Self) -> bool {
		compare(&self.0, &other.0) == Ordering::Equal
	}
}

impl Eq for OrdValue {}

impl PartialOrd for OrdValue {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for OrdValue {
	fn cmp(&self, other: &Self) -> Ordering {
		compare(&self.0, &other.0)
	}
}

/// Ordered index storage on a B-tree; supports every operator.
#[derive(Default)]
pub struct BTreeStorage {
	buckets: BTreeMap<OrdValue, BTreeSet<Key>>,
	pairs: usize,
}

impl BTreeStorage {
	pub fn new() -> Self {
		Self::default()
	}

	fn bounds(&self, range: &ValueRange) -> (Bound<OrdValue>, Bound<OrdValue>) {
		let lower = match &range.from {
			None => Bound::Unbounded,
			Some(v) if range.from_inclusive => Bound::Included(OrdValue(v.clone())),
			Some(v) => Bound::Excluded(OrdValue(v.clone())),
		};
		let upper = match &range.to {
			None => Bound::Unbounded,
			Some(v) if range.to_inclusive => Bound::Included(OrdValue(v.clone())),
			Some(v) => Bound::Excluded(OrdValue(v.clone())),
		};
		(lower, upper)
	}
}

impl IndexStorage for BTreeStorage {
	fn supported_ops(&self) -> &'static [IndexOp] {
		&[IndexOp::Eq, IndexOp::Gt, IndexOp::Gte, IndexOp::Lt, IndexOp::Lte, IndexOp::In]
	}

	fn insert(&mut self, value: Value, key: Key) {
		if self.buckets.entry(OrdValue(value)).or_default().insert(key) {
			self.pairs += 1;
		}
	}

	fn remove(&mut self, value: &Value, key: &Key) {
		let probe = OrdValue(value.clone());
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
			IndexOp::Eq => self
				.buckets
				.get(&OrdValue(operand.clone()))
				.cloned()
				.unwrap_or_default(),
			IndexOp::In => match operand {
				Value::List(items) => items
					.iter()
					.flat_map(|item| self.lookup(IndexOp::Eq, item))
					.collect(),
				_ => BTreeSet::new(),
			},
			IndexOp::Gt => self.range(&ValueRange {
				from: Some(operand.clone()),
				to: None,
				from_inclusive: false,
				to_inclusive: true,
			}),
			IndexOp::Gte => self.range(&ValueRange {
				from: Some(operand.clone()),
				to: None,
				from_inclusive: true,
				to_inclusive: true,
			}),
			IndexOp::Lt => self.range(&ValueRange {
				from: None,
				to: Some(operand.clone()),
				from_inclusive: true,
				to_inclusive: false,
			}),
			IndexOp::Lte => self.range(&ValueRange {
				from: None,
				to: Some(operand.clone()),
				from_inclusive: true,
				to_inclusive: true,
			}),
		}
	}

	fn range(&self, range: &ValueRange) -> BTreeSet<Key> {
		self.buckets
			.range(self.bounds(range))
			.flat_map(|(_, keys)| keys.iter().cloned())
			.collect()
	}

	fn take(&self, n: usize, from: Option<&Value>, filter: Option<KeyFilter>) -> Vec<Key> {
		let mut out = Vec::with_capacity(n.min(self.pairs));
		let buckets: Box<dyn Iterator<Item = (&OrdValue, &BTreeSet<Key>)>> = match from {
			None => Box::new(self.buckets.iter()),
			Some(v) => Box::new(
				self.buckets.range((Bound::Excluded(OrdValue(v.clone())), Bound::Unbounded)),
			),
		};
		for (_, keys) in buckets {
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
		let mut out = Vec::with_capacity(n.min(self.pairs));
		let buckets: Box<dyn Iterator<Item = (&OrdValue, &BTreeSet<Key>)>> = match from {
			None => Box::new(self.buckets.iter().rev()),
			Some(v) => Box::new(
				self.buckets
					.range((Bound::Unbounded, Bound::Excluded(OrdValue(v.clone()))))
					.rev(),
			),
		};
		for (_, keys) in buckets {
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
