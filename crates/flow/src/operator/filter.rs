// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::sync::Arc;

use reflexdb_type::Value;

use crate::{multiset::MultiSet, operator::Operator};

pub type PredicateFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Keeps deltas whose payload satisfies the predicate; stateless, so
/// retractions filter identically to the assertions they cancel.
pub struct Filter {
	predicate: PredicateFn,
}

impl Filter {
	pub fn new(predicate: PredicateFn) -> Self {
		Self { predicate }
	}
}

impl Operator for Filter {
	fn name(&self) -> &'static str {
		"filter"
	}

	fn apply(&mut self, inputs: Vec<MultiSet>) -> MultiSet {
		let mut out = MultiSet::new();
		for batch in inputs {
			for delta in batch.iter() {
				if (self.predicate)(&delta.value) {
					out.push(delta.clone());
				}
			}
		}
		out
	}
}
