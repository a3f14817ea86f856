// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::{
	collections::BTreeSet,
	fmt::{self, Display, Formatter},
	sync::Arc,
	time::Duration,
};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use reflexdb_expr::Expr;
use reflexdb_index::{IndexId, IndexKind, IndexOp, ValueRange};
use reflexdb_type::{Key, Value};

use crate::{
	Error,
	change::{ChangeMessage, ChangeType, fold_changes},
	schema::Schema,
	status::CollectionStatus,
	sync::{SyncContext, SyncSource, SyncedWrite},
	transaction::{
		AwaitSyncFn, Deferred, Mutation, MutationFn, MutationType, Strategy, TransactionHandle,
		TransactionId, TransactionOptions, Transactions, manager::DEFAULT_AWAIT_SYNC_TIMEOUT,
		manager::ambient_transaction, settle_transactions,
	},
};

pub use subscription::{ChangeCallback, SubscribeOptions, SubscriptionHandle};

pub(crate) use state::CollectionState;

mod state;
mod subscription;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionId(String);

impl CollectionId {
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl Display for CollectionId {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for CollectionId {
	fn from(v: &str) -> Self {
		Self(v.to_string())
	}
}

impl From<String> for CollectionId {
	fn from(v: String) -> Self {
		Self(v)
	}
}

pub type GetKeyFn = Arc<dyn Fn(&Value) -> Key + Send + Sync>;

pub struct CollectionOptions {
	pub id: CollectionId,
	pub get_key: GetKeyFn,
	pub schema: Option<Arc<dyn Schema>>,
	pub source: Option<Arc<dyn SyncSource>>,
	pub on_insert: Option<MutationFn>,
	pub on_update: Option<MutationFn>,
	pub on_delete: Option<MutationFn>,
	pub await_sync: Option<AwaitSyncFn>,
	pub await_sync_timeout: Duration,
}

impl CollectionOptions {
	/// Keys derived from a record field, the overwhelmingly common shape.
	pub fn new(id: impl Into<CollectionId>, key_field: &str) -> Self {
		let field = key_field.to_string();
		Self::with_get_key(id, Arc::new(move |value: &Value| Key::from_value(&value.field(&field))))
	}

	pub fn with_get_key(id: impl Into<CollectionId>, get_key: GetKeyFn) -> Self {
		Self {
			id: id.into(),
			get_key,
			schema: None,
			source: None,
			on_insert: None,
			on_update: None,
			on_delete: None,
			await_sync: None,
			await_sync_timeout: DEFAULT_AWAIT_SYNC_TIMEOUT,
		}
	}

	pub fn schema(mut self, schema: Arc<dyn Schema>) -> Self {
		self.schema = Some(schema);
		self
	}

	pub fn source(mut self, source: Arc<dyn SyncSource>) -> Self {
		self.source = Some(source);
		self
	}

	pub fn on_insert(mut self, handler: MutationFn) -> Self {
		self.on_insert = Some(handler);
		self
	}

	pub fn on_update(mut self, handler: MutationFn) -> Self {
		self.on_update = Some(handler);
		self
	}

	pub fn on_delete(mut self, handler: MutationFn) -> Self {
		self.on_delete = Some(handler);
		self
	}

	pub fn await_sync(mut self, handler: AwaitSyncFn) -> Self {
		self.await_sync = Some(handler);
		self
	}

	pub fn await_sync_timeout(mut self, timeout: Duration) -> Self {
		self.await_sync_timeout = timeout;
		self
	}
}

/// Per-key optimistic bookkeeping, cleared when owning transactions
/// terminate.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OptimisticInfo {
	pub is_optimistic: bool,
	pub mutation_count: usize,
}

pub(crate) struct CollectionInner {
	options: CollectionOptions,
	state: RwLock<CollectionState>,
	subscribers: subscription::Subscribers,
}

/// A keyed, reactive collection. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Collection {
	inner: Arc<CollectionInner>,
}

impl Collection {
	pub fn new(options: CollectionOptions) -> Self {
		Self {
			inner: Arc::new(CollectionInner {
				options,
				state: RwLock::new(CollectionState::new()),
				subscribers: subscription::Subscribers::new(),
			}),
		}
	}

	pub fn id(&self) -> &CollectionId {
		&self.inner.options.id
	}

	pub fn status(&self) -> CollectionStatus {
		self.inner.state.read().status
	}

	pub fn last_error(&self) -> Option<String> {
		self.inner.state.read().last_error.clone()
	}

	pub fn key_of(&self, value: &Value) -> Key {
		(self.inner.options.get_key)(value)
	}

	// ---- reads -------------------------------------------------------

	pub fn get(&self, key: &Key) -> Option<Value> {
		self.revive_if_cleaned();
		self.inner.state.read().visible.get(key).cloned()
	}

	pub fn has(&self, key: &Key) -> bool {
		self.revive_if_cleaned();
		self.inner.state.read().visible.contains_key(key)
	}

	pub fn size(&self) -> usize {
		self.revive_if_cleaned();
		self.inner.state.read().visible.len()
	}

	pub fn values(&self) -> Vec<Value> {
		self.revive_if_cleaned();
		self.inner.state.read().visible.values().cloned().collect()
	}

	pub fn entries(&self) -> Vec<(Key, Value)> {
		self.revive_if_cleaned();
		self.inner.state.read().visible.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
	}

	/// Values in insertion order.
	pub fn to_array(&self) -> Vec<Value> {
		self.values()
	}

	pub fn change_log(&self) -> Vec<ChangeMessage> {
		self.inner.state.read().change_log.clone()
	}

	pub fn current_state_as_changes(&self) -> Vec<ChangeMessage> {
		self.revive_if_cleaned();
		self.inner.state.read().state_as_changes()
	}

	pub fn get_optimistic_info(&self, key: &Key) -> OptimisticInfo {
		let state = self.inner.state.read();
		let mutation_count =
			state.overlay.values().filter(|mutations| mutations.contains_key(key)).count();
		OptimisticInfo { is_optimistic: mutation_count > 0, mutation_count }
	}

	// ---- lifecycle ---------------------------------------------------

	/// Starts the source if this collection has never loaded (or was
	/// cleaned up). First subscription and preload both land here.
	pub fn preload(&self) {
		self.ensure_started();
	}

	/// Resolves with the visible values once the collection is ready;
	/// already settled when it is.
	pub fn state_when_ready(&self) -> Deferred<Vec<Value>> {
		self.ensure_started();
		let mut state = self.inner.state.write();
		match state.status {
			CollectionStatus::Ready => Deferred::resolved(state.visible.values().cloned().collect()),
			CollectionStatus::Error => {
				let deferred = Deferred::new();
				deferred.reject(Error::CollectionNotReady(self.id().clone()));
				deferred
			}
			_ => {
				let deferred = Deferred::new();
				state.ready_waiters.push(deferred.clone());
				deferred
			}
		}
	}

	/// Unsubscribes from the source, releases indexes and subscribers. Any
	/// later access restarts sync with a fresh state.
	pub fn cleanup(&self) {
		{
			let mut state = self.inner.state.write();
			state.status = CollectionStatus::CleanedUp;
			state.indexes.clear();
			state.pending_batch = None;
		}
		self.inner.subscribers.clear();
		if let Some(source) = &self.inner.options.source {
			source.stop();
		}
		debug!(collection = %self.id(), "collection cleaned up");
	}

	pub fn subscribe_changes(
		&self,
		callback: ChangeCallback,
		options: SubscribeOptions,
	) -> SubscriptionHandle {
		self.ensure_started();
		let id = self.inner.subscribers.subscribe(callback);
		if options.include_initial_state {
			let initial = self.current_state_as_changes();
			self.inner.subscribers.notify_direct(id, initial);
		}
		SubscriptionHandle::new(id, self.clone())
	}

	pub(crate) fn unsubscribe(&self, id: u64) {
		self.inner.subscribers.unsubscribe(id);
	}

	/// Keyed snapshot for joined queries: the visible entries once ready,
	/// the source's buffered snapshot while loading. Never triggers
	/// `request_snapshot` once the source is ready.
	pub fn fetch_snapshot(&self) -> crate::Result<Vec<(Key, Value)>> {
		self.revive_if_cleaned();
		if self.status().is_ready() {
			return Ok(self.entries());
		}
		match &self.inner.options.source {
			Some(source) => {
				let rows = source.fetch_snapshot()?;
				Ok(rows.into_iter().map(|row| (self.key_of(&row), row)).collect())
			}
			None => Ok(Vec::new()),
		}
	}

	// ---- indexes -----------------------------------------------------

	pub fn create_index(&self, expression: Expr, kind: IndexKind) -> crate::Result<IndexId> {
		let mut state = self.inner.state.write();
		let id = IndexId(state.next_index_id);
		state.next_index_id += 1;
		let mut index = reflexdb_index::CollectionIndex::new(id, expression, kind)?;
		let rows: Vec<(Key, Value)> =
			state.visible.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
		index.build(rows.iter().map(|(k, v)| (k, v)));
		state.indexes.insert(id, index);
		Ok(id)
	}

	/// The first index whose expression matches structurally and that can
	/// answer `op`.
	pub fn index_for(&self, expression: &Expr, op: IndexOp) -> Option<IndexId> {
		let state = self.inner.state.read();
		state
			.indexes
			.values()
			.find(|index| index.expression() == expression && index.supports(op))
			.map(|index| index.id())
	}

	/// Candidate keys from an index; superset-safe, the caller re-filters.
	pub fn index_lookup(&self, index: IndexId, op: IndexOp, operand: &Value) -> Option<BTreeSet<Key>> {
		self.inner.state.read().indexes.get(&index).map(|i| i.lookup(op, operand))
	}

	pub fn index_range(&self, index: IndexId, range: &ValueRange) -> Option<BTreeSet<Key>> {
		self.inner.state.read().indexes.get(&index).map(|i| i.range(range))
	}

	pub fn index_timestamp(&self, index: IndexId) -> Option<u64> {
		self.inner.state.read().indexes.get(&index).map(|i| i.timestamp())
	}

	// ---- optimistic mutators -----------------------------------------

	pub fn insert(&self, value: Value) -> crate::Result<TransactionHandle> {
		self.insert_many(vec![value])
	}

	pub fn insert_many(&self, values: Vec<Value>) -> crate::Result<TransactionHandle> {
		self.revive_if_cleaned();
		let mut mutations = Vec::with_capacity(values.len());
		for value in values {
			self.validate(&value, ChangeType::Insert)?;
			let key = self.key_of(&value);
			if self.inner.state.read().visible.contains_key(&key) {
				return Err(Error::DuplicateKey(key));
			}
			mutations.push(Mutation::insert(self.id().clone(), key, value));
		}
		self.run_mutations(mutations, MutationType::Insert)
	}

	pub fn update<F: FnOnce(&mut Value)>(&self, key: &Key, mutator: F) -> crate::Result<TransactionHandle> {
		self.revive_if_cleaned();
		let (original, mut modified) = {
			let state = self.inner.state.read();
			let current = state.visible.get(key).ok_or_else(|| Error::KeyNotFound(key.clone()))?;
			(state.synced.get(key).cloned(), current.clone())
		};
		mutator(&mut modified);
		self.validate(&modified, ChangeType::Update)?;
		let mutation = Mutation::update(self.id().clone(), key.clone(), original, modified);
		self.run_mutations(vec![mutation], MutationType::Update)
	}

	pub fn delete(&self, key: &Key) -> crate::Result<TransactionHandle> {
		self.revive_if_cleaned();
		let original = {
			let state = self.inner.state.read();
			if !state.visible.contains_key(key) {
				return Err(Error::KeyNotFound(key.clone()));
			}
			state.synced.get(key).cloned()
		};
		let mutation = Mutation::delete(self.id().clone(), key.clone(), original);
		self.run_mutations(vec![mutation], MutationType::Delete)
	}

	fn validate(&self, value: &Value, operation: ChangeType) -> crate::Result<()> {
		if let Some(schema) = &self.inner.options.schema {
			let issues = schema.validate(value);
			if !issues.is_empty() {
				return Err(Error::SchemaValidation { operation, issues });
			}
		}
		Ok(())
	}

	/// Records mutations on the ambient transaction when one is in scope,
	/// otherwise opens an implicit auto-commit transaction wired to the
	/// collection's mutation handler for this operation.
	fn run_mutations(
		&self,
		mutations: Vec<Mutation>,
		operation: MutationType,
	) -> crate::Result<TransactionHandle> {
		if let Some(transaction) = ambient_transaction() {
			for mutation in mutations {
				transaction.record_mutation(self, mutation)?;
			}
			return Ok(transaction);
		}

		let handler = match operation {
			MutationType::Insert => self.inner.options.on_insert.clone(),
			MutationType::Update => self.inner.options.on_update.clone(),
			MutationType::Delete => self.inner.options.on_delete.clone(),
		};
		let transaction = Transactions::create(TransactionOptions {
			mutation_fn: handler,
			await_sync: self.inner.options.await_sync.clone(),
			strategy: Strategy::Parallel,
			auto_commit: true,
			await_sync_timeout: self.inner.options.await_sync_timeout,
		});
		for mutation in mutations {
			transaction.record_mutation(self, mutation)?;
		}
		transaction.commit()?;
		Ok(transaction)
	}

	/// Direct write interface for derived collections (live-query outputs)
	/// and local batch imports: applies keyed changes straight to the
	/// synced map in one atomic batch, bypassing key derivation and the
	/// optimistic pipeline.
	pub fn write_batch(&self, changes: Vec<ChangeMessage>) {
		let changes = {
			let mut state = self.inner.state.write();
			let mut touched: Vec<Key> = Vec::new();
			for change in changes {
				match change.change_type {
					ChangeType::Insert | ChangeType::Update => {
						state.synced.insert(change.key.clone(), change.value);
					}
					ChangeType::Delete => {
						state.synced.shift_remove(&change.key);
					}
				}
				if !touched.contains(&change.key) {
					touched.push(change.key);
				}
			}
			let changes = fold_changes(state.recompute_visible(&touched));
			state.apply_changes(&changes);
			changes
		};
		self.inner.subscribers.notify(changes);
	}

	/// Applies (or clears, when `mutation` is `None`) a transaction's
	/// overlay entry for one key and propagates the visible-state change.
	pub(crate) fn apply_optimistic(
		&self,
		transaction: TransactionId,
		key: &Key,
		mutation: Option<Mutation>,
	) {
		let changes = {
			let mut state = self.inner.state.write();
			match mutation {
				Some(mutation) => {
					state.overlay.entry(transaction).or_default().insert(key.clone(), mutation);
				}
				None => {
					if let Some(mutations) = state.overlay.get_mut(&transaction) {
						mutations.shift_remove(key);
						if mutations.is_empty() {
							state.overlay.shift_remove(&transaction);
						}
					}
				}
			}
			let changes = state.recompute_visible(std::slice::from_ref(key));
			state.apply_changes(&changes);
			changes
		};
		self.inner.subscribers.notify(changes);
	}

	/// Drops every overlay entry of a terminated transaction. For rollbacks
	/// (`confirmed = false`) the visible state snaps back and the inverse
	/// changes fan out. For confirmed transactions on a synced collection
	/// the diff is usually empty because the authoritative rows arrive via
	/// the source; a collection without a source accepts the confirmed
	/// mutations into its synced map directly.
	pub(crate) fn drop_optimistic(&self, transaction: TransactionId, confirmed: bool) {
		let changes = {
			let mut state = self.inner.state.write();
			let Some(mutations) = state.overlay.shift_remove(&transaction) else {
				return;
			};
			if confirmed && self.inner.options.source.is_none() {
				for (key, mutation) in &mutations {
					match mutation.visible_value() {
						Some(value) => {
							state.synced.insert(key.clone(), value.clone());
						}
						None => {
							state.synced.shift_remove(key);
						}
					}
				}
			}
			let keys: Vec<Key> = mutations.keys().cloned().collect();
			let changes = state.recompute_visible(&keys);
			state.apply_changes(&changes);
			changes
		};
		self.inner.subscribers.notify(changes);
	}

	// ---- synced ingestion (driven through SyncContext) ----------------

	pub(crate) fn sync_begin(&self) {
		let mut state = self.inner.state.write();
		if state.status == CollectionStatus::Loading {
			state.status = CollectionStatus::InitialCommit;
		}
		state.pending_batch = Some(Vec::new());
	}

	pub(crate) fn sync_write(&self, write: SyncedWrite) {
		let mut state = self.inner.state.write();
		state.pending_batch.get_or_insert_with(Vec::new).push(write);
	}

	pub(crate) fn sync_commit(&self) {
		let changes = {
			let mut state = self.inner.state.write();
			let writes = state.pending_batch.take().unwrap_or_default();

			let mut touched: Vec<Key> = Vec::new();
			for write in writes {
				let key = (self.inner.options.get_key)(&write.value);
				match write.change_type {
					ChangeType::Insert | ChangeType::Update => {
						state.synced.insert(key.clone(), write.value);
					}
					ChangeType::Delete => {
						state.synced.shift_remove(&key);
					}
				}
				if !touched.contains(&key) {
					touched.push(key);
				}
			}

			let changes = fold_changes(state.recompute_visible(&touched));
			state.apply_changes(&changes);

			if !state.seen_first_commit {
				state.seen_first_commit = true;
				state.status = CollectionStatus::Ready;
				self.resolve_ready_waiters(&mut state);
			}
			changes
		};
		self.inner.subscribers.notify(changes);
		// Transactions racing their sync barrier get a timeout check on
		// every committed batch.
		settle_transactions();
	}

	pub(crate) fn sync_mark_ready(&self) {
		let resolved = {
			let mut state = self.inner.state.write();
			if state.status == CollectionStatus::Loading
				|| state.status == CollectionStatus::InitialCommit
			{
				state.status = CollectionStatus::Ready;
				self.resolve_ready_waiters(&mut state);
				true
			} else {
				false
			}
		};
		if resolved {
			debug!(collection = %self.id(), "collection ready");
		}
	}

	pub(crate) fn sync_truncate(&self) {
		let changes = {
			let mut state = self.inner.state.write();
			let keys: Vec<Key> = state.synced.keys().cloned().collect();
			state.synced.clear();
			let changes = state.recompute_visible(&keys);
			state.apply_changes(&changes);
			changes
		};
		self.inner.subscribers.notify(changes);
	}

	pub(crate) fn sync_error(&self, message: String) {
		let mut state = self.inner.state.write();
		state.status = CollectionStatus::Error;
		state.last_error = Some(message);
		for waiter in state.ready_waiters.drain(..) {
			waiter.reject(Error::CollectionNotReady(self.id().clone()));
		}
	}

	fn resolve_ready_waiters(&self, state: &mut CollectionState) {
		let values: Vec<Value> = state.visible.values().cloned().collect();
		for waiter in state.ready_waiters.drain(..) {
			waiter.resolve(values.clone());
		}
	}

	/// Idle-or-cleaned collections start syncing here; called by the first
	/// subscription, preload and `state_when_ready`.
	fn ensure_started(&self) {
		self.revive_if_cleaned();
		let start = {
			let mut state = self.inner.state.write();
			if state.status == CollectionStatus::Idle {
				state.status = CollectionStatus::Loading;
				true
			} else {
				false
			}
		};
		if !start {
			return;
		}
		match &self.inner.options.source {
			Some(source) => {
				let ctx = SyncContext::new(Arc::downgrade(&self.inner));
				if let Err(error) = source.start(ctx) {
					self.sync_error(error.to_string());
				}
			}
			None => {
				// Local-only collections are ready the moment they start.
				let mut state = self.inner.state.write();
				state.status = CollectionStatus::Ready;
				state.seen_first_commit = true;
				self.resolve_ready_waiters(&mut state);
			}
		}
	}

	/// A cleaned-up collection restarts sync with a fresh state on any
	/// subsequent access.
	fn revive_if_cleaned(&self) {
		let revived = {
			let mut state = self.inner.state.write();
			if state.status == CollectionStatus::CleanedUp {
				state.reset();
				true
			} else {
				false
			}
		};
		if revived {
			self.ensure_started();
		}
	}

	pub(crate) fn from_inner(inner: Arc<CollectionInner>) -> Self {
		Self { inner }
	}
}

/// The capability set the query layer depends on; live queries and pooled
/// instances implement it too, so queries can source from other queries.
pub trait CollectionLike: Send + Sync {
	fn id(&self) -> &CollectionId;
	fn status(&self) -> CollectionStatus;
	fn get(&self, key: &Key) -> Option<Value>;
	fn has(&self, key: &Key) -> bool;
	fn entries(&self) -> Vec<(Key, Value)>;
	fn size(&self) -> usize;
	fn subscribe_changes(&self, callback: ChangeCallback, options: SubscribeOptions) -> SubscriptionHandle;
	fn start_sync(&self);
	fn cleanup(&self);
	fn fetch_snapshot(&self) -> crate::Result<Vec<(Key, Value)>>;

	/// Candidate keys from a matching secondary index, superset-safe;
	/// `None` when no index can answer. Sources without indexes keep the
	/// default.
	fn index_candidates(&self, expression: &Expr, op: IndexOp, operand: &Value) -> Option<BTreeSet<Key>> {
		let _ = (expression, op, operand);
		None
	}
}

impl CollectionLike for Collection {
	fn id(&self) -> &CollectionId {
		Collection::id(self)
	}

	fn status(&self) -> CollectionStatus {
		Collection::status(self)
	}

	fn get(&self, key: &Key) -> Option<Value> {
		Collection::get(self, key)
	}

	fn has(&self, key: &Key) -> bool {
		Collection::has(self, key)
	}

	fn entries(&self) -> Vec<(Key, Value)> {
		Collection::entries(self)
	}

	fn size(&self) -> usize {
		Collection::size(self)
	}

	fn subscribe_changes(&self, callback: ChangeCallback, options: SubscribeOptions) -> SubscriptionHandle {
		Collection::subscribe_changes(self, callback, options)
	}

	fn start_sync(&self) {
		self.preload();
	}

	fn cleanup(&self) {
		Collection::cleanup(self);
	}

	fn fetch_snapshot(&self) -> crate::Result<Vec<(Key, Value)>> {
		Collection::fetch_snapshot(self)
	}

	fn index_candidates(&self, expression: &Expr, op: IndexOp, operand: &Value) -> Option<BTreeSet<Key>> {
		let index = self.index_for(expression, op)?;
		self.index_lookup(index, op, operand)
	}
}
