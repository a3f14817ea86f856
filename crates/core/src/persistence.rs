// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use reflexdb_type::Value;

use crate::{Error, collection::CollectionId, transaction::Mutation};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceMode {
	Local,
	Sync,
}

/// What to do when the persisted schema version disagrees with the
/// collection's.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaMismatchPolicy {
	/// Error only when the synced copy is absent (default for local mode).
	SyncAbsentError,
	/// Reset local state when a synced copy exists (default for sync mode).
	SyncPresentReset,
	Throw,
}

impl SchemaMismatchPolicy {
	pub fn default_for(mode: PersistenceMode) -> Self {
		match mode {
			PersistenceMode::Local => SchemaMismatchPolicy::SyncAbsentError,
			PersistenceMode::Sync => SchemaMismatchPolicy::SyncPresentReset,
		}
	}
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadSubsetOptions {
	pub limit: Option<usize>,
	pub offset: Option<usize>,
	/// Adapter-interpreted filter payload.
	pub filter: Option<Value>,
}

/// A transaction as handed to a local-persistence adapter.
#[derive(Clone, Debug)]
pub struct CommittedTx {
	pub tx_id: String,
	pub seq: u64,
	pub row_version: u64,
	pub mutations: Vec<Mutation>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PersistenceResolution {
	pub mode: PersistenceMode,
	pub policy: SchemaMismatchPolicy,
	pub schema_version: u64,
}

/// Local-persistence adapter contract (SQLite, IndexedDB and friends live
/// outside the core behind this trait).
pub trait PersistenceAdapter: Send + Sync {
	fn load_subset(
		&self,
		collection_id: &CollectionId,
		options: &LoadSubsetOptions,
	) -> crate::Result<Vec<Value>>;

	fn apply_committed_tx(&self, collection_id: &CollectionId, tx: &CommittedTx) -> crate::Result<()>;

	fn resolve_persistence_for_collection(
		&self,
		collection_id: &CollectionId,
		mode: PersistenceMode,
		schema_version: u64,
	) -> crate::Result<PersistenceResolution>;
}

/// Process-wide adapter registry; operations against an unregistered
/// collection surface `UnknownCollection`.
#[derive(Default)]
pub struct PersistedCollections {
	adapters: DashMap<CollectionId, Arc<dyn PersistenceAdapter>>,
}

impl PersistedCollections {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&self, collection_id: CollectionId, adapter: Arc<dyn PersistenceAdapter>) {
		self.adapters.insert(collection_id, adapter);
	}

	pub fn release(&self, collection_id: &CollectionId) {
		self.adapters.remove(collection_id);
	}

	pub fn adapter(&self, collection_id: &CollectionId) -> crate::Result<Arc<dyn PersistenceAdapter>> {
		self.adapters
			.get(collection_id)
			.map(|entry| entry.value().clone())
			.ok_or_else(|| Error::UnknownCollection(collection_id.clone()))
	}
}
