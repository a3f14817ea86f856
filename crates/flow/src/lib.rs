// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

//! The dataflow kernel.
//!
//! A compiled query is a finite DAG of operators exchanging [`MultiSet`]
//! deltas of `(key, payload, multiplicity)`. Sources push committed batches
//! into input nodes; [`FlowGraph::run`] propagates them through the DAG one
//! round per queued batch, bounded by a configurable iteration limit. The
//! stateful operators (join, reduce, distinct, topK) emit retractions and
//! insertions against their previously emitted state, which is what keeps a
//! live query's output collection continuously consistent without
//! recomputing it.

pub use fractional::FracIndex;
pub use graph::{FlowGraph, FlowOptions, NodeId, RunOutcome};
pub use iteration::IterationTracker;
pub use multiset::{Delta, MultiSet};
pub use operator::{
	Operator,
	consolidate::Consolidate,
	distinct::Distinct,
	filter::{Filter, PredicateFn},
	join::{Join, JoinKind},
	map::{KeyValueFn, Map},
	reduce::{FoldFn, Reduce},
	top_k::{CompareFn, TopK},
};

mod fractional;
mod graph;
mod iteration;
mod multiset;
mod operator;
