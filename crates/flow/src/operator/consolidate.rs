// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use crate::{multiset::MultiSet, operator::Operator};

/// Compresses the tick's batches so no `(key, value)` appears twice and a
/// key's retraction precedes its assertion. Collections sit behind one of
/// these so subscriber batches stay free of duplicate keys.
pub struct Consolidate;

impl Consolidate {
	pub fn new() -> Self {
		Self
	}
}

impl Default for Consolidate {
	fn default() -> Self {
		Self::new()
	}
}

impl Operator for Consolidate {
	fn name(&self) -> &'static str {
		"consolidate"
	}

	fn apply(&mut self, inputs: Vec<MultiSet>) -> MultiSet {
		let mut merged = MultiSet::new();
		for batch in inputs {
			merged.extend(batch);
		}
		merged.consolidate()
	}
}
