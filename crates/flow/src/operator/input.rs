// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::collections::VecDeque;

use crate::{multiset::MultiSet, operator::Operator};

/// Graph entry point: batches pushed by a source queue here and drain one
/// per round, so the run loop's iteration accounting sees every batch.
pub struct Input {
	queue: VecDeque<MultiSet>,
}

impl Input {
	pub fn new() -> Self {
		Self { queue: VecDeque::new() }
	}

	pub fn enqueue(&mut self, batch: MultiSet) {
		if !batch.is_empty() {
			self.queue.push_back(batch);
		}
	}
}

impl Default for Input {
	fn default() -> Self {
		Self::new()
	}
}

impl Operator for Input {
	fn name(&self) -> &'static str {
		"input"
	}

	fn apply(&mut self, _inputs: Vec<MultiSet>) -> MultiSet {
		self.queue.pop_front().unwrap_or_default()
	}

	fn pending(&self) -> usize {
		self.queue.len()
	}

	fn as_input_mut(&mut self) -> Option<&mut Input> {
		Some(self)
	}
}
