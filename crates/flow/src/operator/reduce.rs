// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::{collections::HashMap, sync::Arc};

use reflexdb_type::Value;

use crate::{
	multiset::{Delta, MultiSet},
	operator::{Operator, join::accumulate},
};

/// Folds the accumulated multiset of a group into one output row.
pub type FoldFn = Arc<dyn Fn(&Value, &[(Value, isize)]) -> Value + Send + Sync>;

/// Per-key fold. On every incoming delta the operator re-runs the fold over
/// the group's accumulated rows and emits a retraction of the old result
/// followed by an insertion of the new one, so downstream state never sees
/// two live rows for one group.
pub struct Reduce {
	fold: FoldFn,
	groups: HashMap<Value, Vec<(Value, isize)>>,
	emitted: HashMap<Value, Value>,
}

impl Reduce {
	pub fn new(fold: FoldFn) -> Self {
		Self { fold, groups: HashMap::new(), emitted: HashMap::new() }
	}
}

impl Operator for Reduce {
	fn name(&self) -> &'static str {
		"reduce"
	}

	fn apply(&mut self, inputs: Vec<MultiSet>) -> MultiSet {
		let mut touched: Vec<Value> = Vec::new();

		for batch in inputs {
			for delta in batch.iter() {
				if !touched.contains(&delta.key) {
					touched.push(delta.key.clone());
				}
				let rows = self.groups.entry(delta.key.clone()).or_default();
				accumulate(rows, delta.value.clone(), delta.diff);
				if rows.is_empty() {
					self.groups.remove(&delta.key);
				}
			}
		}

		let mut out = MultiSet::new();
		for key in touched {
			let next = self
				.groups
				.get(&key)
				.filter(|rows| rows.iter().any(|(_, m)| *m > 0))
				.map(|rows| (self.fold)(&key, rows));
			let previous = self.emitted.get(&key).cloned();

			if previous == next {
				continue;
			}
			if let Some(old) = previous {
				out.push(Delta::remove(key.clone(), old));
			}
			match next {
				Some(new) => {
					out.push(Delta::insert(key.clone(), new.clone()));
					self.emitted.insert(key, new);
				}
				None => {
					self.emitted.remove(&key);
				}
			}
		}
		out
	}
}
