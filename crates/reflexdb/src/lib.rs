// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

//! ReflexDB — an in-process reactive database.
//!
//! Collections of keyed records are fed from external sources and mutated
//! optimistically; live queries over them are maintained incrementally and
//! are collections themselves. See the member crates for the moving parts:
//! `reflexdb-core` (collections, transactions), `reflexdb-flow` (the
//! dataflow kernel), `reflexdb-query` (builder, compiler, coordinator,
//! pool), `reflexdb-index` and `reflexdb-expr`.

pub use reflexdb_core::{
	ChangeCallback, ChangeMessage, ChangeType, Collection, CollectionId, CollectionLike,
	CollectionOptions, CollectionStatus, CommittedTx, Deferred, Error as CoreError, GetKeyFn,
	LoadSubsetOptions, Mutation, MutationType, OptimisticInfo, PersistedCollections,
	PersistenceAdapter, PersistenceMode, PersistenceResolution, Schema, SchemaIssue,
	SchemaMismatchPolicy, Strategy,
	SubscribeOptions, SubscriptionHandle, SyncContext, SyncSource, SyncedWrite, TransactionHandle,
	TransactionId, TransactionInfo, TransactionOptions, TransactionState, Transactions,
	release_transaction_manager, settle_transactions, transaction_manager,
};
pub use reflexdb_expr::Expr;
pub use reflexdb_flow::{FlowOptions, JoinKind};
pub use reflexdb_index::{IndexKind, IndexOp, ValueRange};
pub use reflexdb_query::{
	Direction, Error as QueryError, LiveQuery, PooledOrLive, Query, QueryIr, fingerprint,
	instantiate, query_pool,
};
pub use reflexdb_type::{Key, OrderedF64, UndefinedOrder, Value, ValueKind, compare, record};

pub mod prelude {
	pub use reflexdb_core::{
		Collection, CollectionLike, CollectionOptions, SubscribeOptions, Transactions,
	};
	pub use reflexdb_expr::Expr;
	pub use reflexdb_query::{Direction, LiveQuery, Query};
	pub use reflexdb_type::{Key, Value, record};
}
