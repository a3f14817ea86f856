// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::collections::HashMap;

use crate::{
	iteration::IterationTracker,
	multiset::MultiSet,
	operator::{Operator, input::Input},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Clone, Copy, Debug)]
pub struct FlowOptions {
	/// Upper bound on rounds per [`FlowGraph::run`] call. Exceeding it logs
	/// a diagnostic and returns early with progress preserved.
	pub iteration_limit: usize,
}

impl Default for FlowOptions {
	fn default() -> Self {
		Self { iteration_limit: 1_000 }
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunOutcome {
	pub iterations: usize,
	/// False when the iteration limit cut the run short; queued input is
	/// kept for the next run.
	pub completed: bool,
}

struct Node {
	operator: Box<dyn Operator>,
	inputs: Vec<NodeId>,
	current: MultiSet,
}

/// A finite DAG of operators. Nodes are appended with their inputs already
/// present, so vector order is a topological order and one pass per round
/// moves every queued batch through the whole graph.
pub struct FlowGraph {
	options: FlowOptions,
	nodes: Vec<Node>,
	outputs: HashMap<NodeId, Vec<MultiSet>>,
}

impl FlowGraph {
	pub fn new(options: FlowOptions) -> Self {
		Self { options, nodes: Vec::new(), outputs: HashMap::new() }
	}

	pub fn input(&mut self) -> NodeId {
		self.push_node(Box::new(Input::new()), Vec::new())
	}

	pub fn add(&mut self, operator: Box<dyn Operator>, inputs: &[NodeId]) -> NodeId {
		debug_assert!(inputs.iter().all(|id| id.0 < self.nodes.len()), "inputs must precede the node");
		self.push_node(operator, inputs.to_vec())
	}

	/// Marks a node as a graph output; its per-round batches accumulate
	/// until [`FlowGraph::take_output`] drains them.
	pub fn mark_output(&mut self, node: NodeId) {
		self.outputs.entry(node).or_default();
	}

	/// Queues a batch on an input node. No propagation happens until
	/// [`FlowGraph::run`].
	pub fn push(&mut self, input: NodeId, batch: MultiSet) {
		let node = &mut self.nodes[input.0];
		match node.operator.as_input_mut() {
			Some(queue) => queue.enqueue(batch),
			None => debug_assert!(false, "push target is not an input node"),
		}
	}

	pub fn take_output(&mut self, node: NodeId) -> Vec<MultiSet> {
		self.outputs.get_mut(&node).map(std::mem::take).unwrap_or_default()
	}

	/// Any batches queued on input nodes?
	pub fn has_pending(&self) -> bool {
		self.nodes.iter().any(|node| node.operator.pending() > 0)
	}

	/// Propagates queued batches, one round per queued input batch, bounded
	/// by the configured iteration limit.
	pub fn run(&mut self) -> RunOutcome {
		let mut tracker = IterationTracker::new(self.options.iteration_limit);

		while self.has_pending() {
			if !tracker.advance() {
				tracker.warn_exceeded(&self.pending_work());
				return RunOutcome { iterations: tracker.iterations(), completed: false };
			}
			self.round(&mut tracker);
		}
		RunOutcome { iterations: tracker.iterations(), completed: true }
	}

	fn round(&mut self, tracker: &mut IterationTracker) {
		for at in 0..self.nodes.len() {
			let batches: Vec<MultiSet> = self.nodes[at]
				.inputs
				.iter()
				.map(|id| self.nodes[id.0].current.clone())
				.collect();

			let node = &mut self.nodes[at];
			let has_work = node.operator.pending() > 0 || batches.iter().any(|b| !b.is_empty());
			node.current = if has_work { node.operator.apply(batches) } else { MultiSet::new() };

			if has_work && !node.current.is_empty() {
				tracker.track(node.operator.name());
			}
			let id = NodeId(at);
			if !node.current.is_empty() {
				if let Some(sink) = self.outputs.get_mut(&id) {
					sink.push(node.current.clone());
				}
			}
		}
	}

	fn pending_work(&self) -> Vec<(String, usize)> {
		self.nodes
			.iter()
			.map(|node| (node.operator.name().to_string(), node.operator.pending()))
			.collect()
	}

	fn push_node(&mut self, operator: Box<dyn Operator>, inputs: Vec<NodeId>) -> NodeId {
		let id = NodeId(self.nodes.len());
		self.nodes.push(Node { operator, inputs, current: MultiSet::new() });
		id
	}
}
