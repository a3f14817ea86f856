// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use reflexdb_type::Value;

use crate::{
	fractional::FracIndex,
	multiset::{Delta, MultiSet},
	operator::Operator,
};

pub type CompareFn = Arc<dyn Fn(&Value, &Value) -> Ordering + Send + Sync>;

/// Ordered window over the accumulated rows: sort by the query comparator,
/// break ties with a per-key fractional index assigned at arrival, take
/// `offset..offset+limit`, and emit the difference against the previously
/// emitted window.
///
/// A key leaving the visible window is an output delete, never a silent
/// drop; boundary keys re-emit whenever a change in the relevant range moves
/// them across the edge.
pub struct TopK {
	comparator: CompareFn,
	limit: Option<usize>,
	offset: usize,
	rows: HashMap<Value, Value>,
	positions: HashMap<Value, FracIndex>,
	last_position: Option<FracIndex>,
	window: HashMap<Value, Value>,
}

impl TopK {
	pub fn new(comparator: CompareFn, limit: Option<usize>, offset: usize) -> Self {
		Self {
			comparator,
			limit,
			offset,
			rows: HashMap::new(),
			positions: HashMap::new(),
			last_position: None,
			window: HashMap::new(),
		}
	}

	fn next_position(&mut self) -> FracIndex {
		let next = FracIndex::between(self.last_position.as_ref(), None);
		self.last_position = Some(next.clone());
		next
	}

	/// The window slice in display order.
	fn visible(&self) -> Vec<(Value, Value)> {
		let mut ordered: Vec<(&Value, &Value)> = self.rows.iter().collect();
		ordered.sort_by(|a, b| {
			(self.comparator)(a.1, b.1).then_with(|| self.positions[a.0].cmp(&self.positions[b.0]))
		});

		let start = self.offset.min(ordered.len());
		let end = match self.limit {
			Some(limit) => (start + limit).min(ordered.len()),
			None => ordered.len(),
		};
		ordered[start..end]
			.iter()
			.map(|(k, v)| ((*k).clone(), (*v).clone()))
			.collect()
	}
}

impl Operator for TopK {
	fn name(&self) -> &'static str {
		"topK"
	}

	fn apply(&mut self, inputs: Vec<MultiSet>) -> MultiSet {
		let mut changed = false;
		for batch in inputs {
			for delta in batch.consolidate().into_entries() {
				changed = true;
				if delta.diff > 0 {
					if !self.positions.contains_key(&delta.key) {
						let position = self.next_position();
						self.positions.insert(delta.key.clone(), position);
					}
					self.rows.insert(delta.key, delta.value);
				} else if self.rows.get(&delta.key) == Some(&delta.value) {
					self.rows.remove(&delta.key);
					self.positions.remove(&delta.key);
				}
			}
		}
		if !changed {
			return MultiSet::new();
		}

		let ordered = self.visible();
		let next: HashMap<Value, Value> = ordered.iter().cloned().collect();
		let mut retracts = Vec::new();
		let mut asserts = Vec::new();

		for (key, old) in &self.window {
			match next.get(key) {
				Some(new) if new == old => {}
				_ => retracts.push(Delta::remove(key.clone(), old.clone())),
			}
		}
		// Assertions follow window order so downstream insertion order is
		// deterministic for tied sort values.
		for (key, new) in &ordered {
			match self.window.get(key) {
				Some(old) if old == new => {}
				_ => asserts.push(Delta::insert(key.clone(), new.clone())),
			}
		}
		self.window = next;

		let mut out = MultiSet::new();
		for delta in retracts.into_iter().chain(asserts) {
			out.push(delta);
		}
		out
	}
}
