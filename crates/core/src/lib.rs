// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

//! Collection core and transaction manager.
//!
//! A [`Collection`] is a keyed mapping fed by a [`SyncSource`]: the source
//! delivers committed batches through a [`SyncContext`], the collection
//! maintains its synced and visible state, appends to the change log,
//! updates its indexes, and fans batches out to subscribers. Optimistic
//! mutations overlay the synced state immediately and reconcile when their
//! owning transaction terminates.

pub use change::{ChangeMessage, ChangeType, fold_changes};
pub use collection::{
	ChangeCallback, Collection, CollectionId, CollectionLike, CollectionOptions, GetKeyFn,
	OptimisticInfo, SubscribeOptions, SubscriptionHandle,
};
pub use error::Error;
pub use persistence::{
	CommittedTx, LoadSubsetOptions, PersistedCollections, PersistenceAdapter, PersistenceMode,
	PersistenceResolution, SchemaMismatchPolicy,
};
pub use schema::{Schema, SchemaIssue};
pub use status::CollectionStatus;
pub use sync::{SyncContext, SyncSource, SyncedWrite};
pub use transaction::{
	AwaitSyncContext, AwaitSyncFn, Deferred, Mutation, MutationFn, MutationType, PersistContext,
	Strategy, TransactionHandle, TransactionId, TransactionInfo, TransactionOptions,
	TransactionState, Transactions, release_transaction_manager, settle_transactions,
	transaction_manager,
};

mod change;
mod collection;
mod error;
mod persistence;
mod schema;
mod status;
mod sync;
mod transaction;

pub type Result<T> = std::result::Result<T, Error>;
