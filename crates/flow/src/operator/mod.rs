// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use crate::multiset::MultiSet;

pub mod consolidate;
pub mod distinct;
pub mod filter;
pub mod input;
pub mod join;
pub mod map;
pub mod reduce;
pub mod top_k;

/// A dataflow operator. `apply` receives one batch per in-edge (aligned with
/// the node's input order) and produces this round's output batch.
///
/// Operators are synchronous and single-threaded; stateful implementations
/// fold the incoming deltas into their accumulated state and emit the
/// difference against what they previously emitted.
pub trait Operator: Send {
	fn name(&self) -> &'static str;

	fn apply(&mut self, inputs: Vec<MultiSet>) -> MultiSet;

	/// Work still queued inside the operator (input backlogs); reported in
	/// the iteration-limit diagnostic.
	fn pending(&self) -> usize {
		0
	}

	/// Input nodes answer with themselves so the graph can queue batches on
	/// them; every other operator is not a push target.
	fn as_input_mut(&mut self) -> Option<&mut input::Input> {
		None
	}
}
