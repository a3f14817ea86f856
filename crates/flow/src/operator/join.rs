// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::collections::HashMap;

use reflexdb_type::Value;

use crate::{
	multiset::{Delta, MultiSet},
	operator::Operator,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinKind {
	Inner,
	Left,
	Right,
	Full,
}

/// Keyed equi-join. Both sides accumulate per-join-key row multisets; on any
/// delta the operator recomputes the desired pairs for the touched keys and
/// emits the difference against what it previously emitted.
///
/// Outer kinds pad the unmatched side with `Undefined`; the pad rows retract
/// automatically when a match arrives because they drop out of the desired
/// set for that key.
pub struct Join {
	kind: JoinKind,
	left: HashMap<Value, Vec<(Value, isize)>>,
	right: HashMap<Value, Vec<(Value, isize)>>,
	emitted: HashMap<Value, Vec<(Value, isize)>>,
}

impl Join {
	pub fn new(kind: JoinKind) -> Self {
		Self { kind, left: HashMap::new(), right: HashMap::new(), emitted: HashMap::new() }
	}

	/// Output payload shape: `[left_row, right_row]` with `Undefined` pads.
	pub fn pair(left: &Value, right: &Value) -> Value {
		Value::List(vec![left.clone(), right.clone()])
	}

	fn desired(&self, key: &Value) -> Vec<(Value, isize)> {
		let empty = Vec::new();
		let left = self.left.get(key).unwrap_or(&empty);
		let right = self.right.get(key).unwrap_or(&empty);
		let mut out: Vec<(Value, isize)> = Vec::new();

		if !left.is_empty() && !right.is_empty() {
			for (lv, lm) in left {
				for (rv, rm) in right {
					accumulate(&mut out, Self::pair(lv, rv), lm * rm);
				}
			}
		}
		if right.is_empty()
			&& !left.is_empty()
			&& matches!(self.kind, JoinKind::Left | JoinKind::Full)
		{
			for (lv, lm) in left {
				accumulate(&mut out, Self::pair(lv, &Value::Undefined), *lm);
			}
		}
		if left.is_empty()
			&& !right.is_empty()
			&& matches!(self.kind, JoinKind::Right | JoinKind::Full)
		{
			for (rv, rm) in right {
				accumulate(&mut out, Self::pair(&Value::Undefined, rv), *rm);
			}
		}
		out
	}
}

impl Operator for Join {
	fn name(&self) -> &'static str {
		"join"
	}

	fn apply(&mut self, inputs: Vec<MultiSet>) -> MultiSet {
		// First-touch order keeps emission deterministic batch to batch.
		let mut touched: Vec<Value> = Vec::new();

		for (side, batch) in inputs.into_iter().enumerate() {
			for delta in batch.iter() {
				if !touched.contains(&delta.key) {
					touched.push(delta.key.clone());
				}
				let state = if side == 0 { &mut self.left } else { &mut self.right };
				let rows = state.entry(delta.key.clone()).or_default();
				accumulate(rows, delta.value.clone(), delta.diff);
				if rows.is_empty() {
					state.remove(&delta.key);
				}
			}
		}

		let mut out = MultiSet::new();
		for key in touched {
			let desired = self.desired(&key);
			let previous = self.emitted.remove(&key).unwrap_or_default();
			for delta in difference(&key, &previous, &desired) {
				out.push(delta);
			}
			if !desired.is_empty() {
				self.emitted.insert(key, desired);
			}
		}
		out
	}
}

/// Adds `diff` copies of `value` to a consolidated multiset, dropping the
/// entry when its net multiplicity reaches zero.
pub(crate) fn accumulate(rows: &mut Vec<(Value, isize)>, value: Value, diff: isize) {
	if diff == 0 {
		return;
	}
	if let Some(at) = rows.iter().position(|(v, _)| *v == value) {
		rows[at].1 += diff;
		if rows[at].1 == 0 {
			rows.remove(at);
		}
	} else {
		rows.push((value, diff));
	}
}

/// Deltas turning `previous` into `desired`, retractions first.
pub(crate) fn difference(
	key: &Value,
	previous: &[(Value, isize)],
	desired: &[(Value, isize)],
) -> Vec<Delta> {
	let mut retracts = Vec::new();
	let mut asserts = Vec::new();
	for (value, want) in desired {
		let had = previous.iter().find(|(v, _)| v == value).map(|(_, m)| *m).unwrap_or(0);
		let diff = want - had;
		if diff > 0 {
			asserts.push(Delta { key: key.clone(), value: value.clone(), diff });
		} else if diff < 0 {
			retracts.push(Delta { key: key.clone(), value: value.clone(), diff });
		}
	}
	for (value, had) in previous {
		if !desired.iter().any(|(v, _)| v == value) {
			retracts.push(Delta { key: key.clone(), value: value.clone(), diff: -had });
		}
	}
	retracts.extend(asserts);
	retracts
}
