// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use indexmap::IndexMap;
use tracing::warn;

/// Records how many rounds each operator state consumed inside a bounded
/// run, and formats the limit diagnostic with per-operator pending-work
/// counts so a stuck graph can be read from the log.
#[derive(Debug)]
pub struct IterationTracker {
	limit: usize,
	iterations: usize,
	spans: IndexMap<String, u64>,
}

impl IterationTracker {
	pub fn new(limit: usize) -> Self {
		Self { limit, iterations: 0, spans: IndexMap::new() }
	}

	/// Counts one round; returns false (without counting) once the limit is
	/// exhausted.
	pub fn advance(&mut self) -> bool {
		if self.iterations >= self.limit {
			return false;
		}
		self.iterations += 1;
		true
	}

	pub fn iterations(&self) -> usize {
		self.iterations
	}

	/// Attributes work done in the current round to an operator state.
	pub fn track(&mut self, state: &str) {
		*self.spans.entry(state.to_string()).or_insert(0) += 1;
	}

	/// Non-fatal: the run returns early with best-effort results.
	pub fn warn_exceeded(&self, pending: &[(String, usize)]) {
		let spans = self
			.spans
			.iter()
			.map(|(state, count)| format!("{state}={count}"))
			.collect::<Vec<_>>()
			.join(", ");
		let backlog = pending
			.iter()
			.filter(|(_, n)| *n > 0)
			.map(|(name, n)| format!("{name}:{n}"))
			.collect::<Vec<_>>()
			.join(", ");
		warn!(
			limit = self.limit,
			iterations = self.iterations,
			%spans,
			%backlog,
			"dataflow iteration limit exceeded, returning early with progress preserved"
		);
	}
}
