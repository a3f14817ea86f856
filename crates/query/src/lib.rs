// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

//! Live queries.
//!
//! A query is authored through the typed builder into a [`QueryIr`], lowered
//! to a dataflow graph, and wrapped by a [`LiveQuery`]: a collection-shaped
//! handle whose contents stay continuously consistent with the query's
//! inputs through the incremental pipeline. Structurally identical plans
//! that differ only in literal parameters share a compiled dataflow through
//! the [`pool`].

pub use builder::Query;
pub use compile::{CompiledQuery, compile};
pub use error::Error;
pub use fingerprint::{fingerprint, parameter_key};
pub use ir::{Direction, JoinClause, OrderBy, QueryIr, RowPredicate, SelectItem, Source};
pub use live::LiveQuery;
pub use pool::{PooledOrLive, QueryPool, instantiate, query_pool};

mod builder;
mod compile;
mod error;
mod fingerprint;
mod ir;
mod live;
mod pool;

pub type Result<T> = std::result::Result<T, Error>;
