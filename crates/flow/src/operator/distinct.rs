// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::collections::HashMap;

use reflexdb_type::Value;

use crate::{
	multiset::{Delta, MultiSet},
	operator::Operator,
};

/// Per-key count collapse: however large the input multiplicity swing, the
/// output for a `(key, value)` moves between absent and present, emitting at
/// most ±1.
pub struct Distinct {
	counts: HashMap<(Value, Value), isize>,
}

impl Distinct {
	pub fn new() -> Self {
		Self { counts: HashMap::new() }
	}
}

impl Default for Distinct {
	fn default() -> Self {
		Self::new()
	}
}

impl Operator for Distinct {
	fn name(&self) -> &'static str {
		"distinct"
	}

	fn apply(&mut self, inputs: Vec<MultiSet>) -> MultiSet {
		let mut out = MultiSet::new();
		for batch in inputs {
			for delta in batch.iter() {
				let slot = (delta.key.clone(), delta.value.clone());
				let count = self.counts.entry(slot.clone()).or_insert(0);
				let before = (*count > 0) as isize;
				*count += delta.diff;
				let after = (*count > 0) as isize;
				if *count == 0 {
					self.counts.remove(&slot);
				}
				match after - before {
					1 => out.push(Delta::insert(slot.0, slot.1)),
					-1 => out.push(Delta::remove(slot.0, slot.1)),
					_ => {}
				}
			}
		}
		out.consolidate()
	}
}
