// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::{
	cell::RefCell,
	sync::{
		Arc,
		atomic::{AtomicU64, Ordering},
	},
	time::{Duration, Instant},
};

use dashmap::DashMap;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use reflexdb_type::{Key, Value};

use crate::{
	Error,
	collection::{Collection, CollectionId},
	transaction::{
		Deferred, Mutation, Strategy, TransactionId, TransactionState, merge_mutations,
	},
};

pub const DEFAULT_AWAIT_SYNC_TIMEOUT: Duration = Duration::from_millis(2_000);

/// Persists a transaction's mutations; resolves `is_persisted` with its
/// result.
pub type MutationFn = Arc<dyn Fn(PersistContext) -> crate::Result<Value> + Send + Sync>;

/// Started after a successful persist; the returned task settles when the
/// authoritative copy of the write has come back through the source. Raced
/// against the transaction's sync timeout.
pub type AwaitSyncFn = Arc<dyn Fn(AwaitSyncContext) -> Deferred<()> + Send + Sync>;

#[derive(Clone)]
pub struct PersistContext {
	pub transaction: TransactionInfo,
}

#[derive(Clone)]
pub struct AwaitSyncContext {
	pub transaction: TransactionInfo,
	pub persist_result: Value,
}

#[derive(Clone)]
pub struct TransactionOptions {
	pub mutation_fn: Option<MutationFn>,
	pub await_sync: Option<AwaitSyncFn>,
	pub strategy: Strategy,
	pub auto_commit: bool,
	pub await_sync_timeout: Duration,
}

impl Default for TransactionOptions {
	fn default() -> Self {
		Self {
			mutation_fn: None,
			await_sync: None,
			strategy: Strategy::default(),
			auto_commit: true,
			await_sync_timeout: DEFAULT_AWAIT_SYNC_TIMEOUT,
		}
	}
}

/// Point-in-time snapshot of a transaction record. Handles read through to
/// the live record; snapshots are what mutation handlers receive.
#[derive(Clone, Debug)]
pub struct TransactionInfo {
	pub id: TransactionId,
	pub state: TransactionState,
	pub strategy: Strategy,
	pub mutations: Vec<Mutation>,
	pub queued_behind: Option<TransactionId>,
	pub error: Option<Error>,
	pub is_persisted: bool,
	pub is_synced: bool,
}

struct TransactionRecord {
	id: TransactionId,
	sequence: u64,
	state: TransactionState,
	strategy: Strategy,
	auto_commit: bool,
	created_at: Instant,
	mutations: Vec<Mutation>,
	queued_behind: Option<TransactionId>,
	error: Option<Error>,
}

struct TransactionShared {
	record: RwLock<TransactionRecord>,
	mutation_fn: Option<MutationFn>,
	await_sync: Option<AwaitSyncFn>,
	await_sync_timeout: Duration,
	is_persisted: Deferred<Value>,
	is_synced: Deferred<()>,
	sync_barrier: Mutex<Option<(Deferred<()>, Instant)>>,
	collections: Mutex<IndexMap<CollectionId, Collection>>,
}

/// Live reference to a transaction. Every clone dereferences the same
/// record, so observers of `state`, `mutations` or `error` always see the
/// latest values; fields cannot be assigned from outside the manager.
#[derive(Clone)]
pub struct TransactionHandle {
	shared: Arc<TransactionShared>,
}

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

thread_local! {
	static AMBIENT: RefCell<Vec<TransactionHandle>> = const { RefCell::new(Vec::new()) };
}

/// Entry point for explicit transactions.
pub struct Transactions;

impl Transactions {
	pub fn create(options: TransactionOptions) -> TransactionHandle {
		let record = TransactionRecord {
			id: TransactionId::generate(),
			sequence: SEQUENCE.fetch_add(1, Ordering::Relaxed),
			state: TransactionState::Pending,
			strategy: options.strategy,
			auto_commit: options.auto_commit,
			created_at: Instant::now(),
			mutations: Vec::new(),
			queued_behind: None,
			error: None,
		};
		TransactionHandle {
			shared: Arc::new(TransactionShared {
				record: RwLock::new(record),
				mutation_fn: options.mutation_fn,
				await_sync: options.await_sync,
				await_sync_timeout: options.await_sync_timeout,
				is_persisted: Deferred::new(),
				is_synced: Deferred::new(),
				sync_barrier: Mutex::new(None),
				collections: Mutex::new(IndexMap::new()),
			}),
		}
	}
}

/// The transaction currently scoped by `mutate`, if any. Collection
/// mutators record onto it instead of opening an implicit transaction.
pub(crate) fn ambient_transaction() -> Option<TransactionHandle> {
	AMBIENT.with(|stack| stack.borrow().last().cloned())
}

/// Pops the ambient stack even when the scoped closure panics.
struct AmbientScope;

impl Drop for AmbientScope {
	fn drop(&mut self) {
		AMBIENT.with(|stack| {
			stack.borrow_mut().pop();
		});
	}
}

impl TransactionHandle {
	pub fn id(&self) -> TransactionId {
		self.shared.record.read().id
	}

	pub fn state(&self) -> TransactionState {
		self.shared.record.read().state
	}

	pub fn strategy(&self) -> Strategy {
		self.shared.record.read().strategy
	}

	pub fn error(&self) -> Option<Error> {
		self.shared.record.read().error.clone()
	}

	pub fn created_at(&self) -> Instant {
		self.shared.record.read().created_at
	}

	pub fn mutations(&self) -> Vec<Mutation> {
		self.shared.record.read().mutations.clone()
	}

	pub fn info(&self) -> TransactionInfo {
		let record = self.shared.record.read();
		TransactionInfo {
			id: record.id,
			state: record.state,
			strategy: record.strategy,
			mutations: record.mutations.clone(),
			queued_behind: record.queued_behind,
			error: record.error.clone(),
			is_persisted: matches!(self.shared.is_persisted.peek(), Some(Ok(_))),
			is_synced: matches!(self.shared.is_synced.peek(), Some(Ok(_))),
		}
	}

	/// Awaitable persist outcome.
	pub fn is_persisted(&self) -> Deferred<Value> {
		self.shared.is_persisted.clone()
	}

	/// Awaitable sync outcome.
	pub fn is_synced(&self) -> Deferred<()> {
		self.shared.is_synced.clone()
	}

	fn sequence(&self) -> u64 {
		self.shared.record.read().sequence
	}

	/// Runs `f` with this transaction as the ambient mutation scope;
	/// collection mutators called inside record onto it. Auto-commit
	/// transactions commit when the scope closes.
	pub fn mutate<F: FnOnce()>(&self, f: F) -> crate::Result<()> {
		if self.state().is_terminal() {
			return Err(Error::TransactionClosed);
		}
		AMBIENT.with(|stack| stack.borrow_mut().push(self.clone()));
		let _scope = AmbientScope;
		f();
		drop(_scope);
		let auto_commit = self.shared.record.read().auto_commit;
		if auto_commit && self.state() == TransactionState::Pending {
			self.commit()?;
		}
		Ok(())
	}

	/// Commit pipeline: ordered-strategy overlap scan (queue behind the
	/// blocker), then persist, then the optional sync wait.
	pub fn commit(&self) -> crate::Result<()> {
		match self.state() {
			state if state.is_terminal() => return Err(Error::TransactionClosed),
			TransactionState::Queued => return Ok(()),
			_ => {}
		}

		if self.strategy() == Strategy::Ordered {
			if let Some(blocker) = self.find_blocker() {
				let mut record = self.shared.record.write();
				record.state = TransactionState::Queued;
				record.queued_behind = Some(blocker.id());
				debug!(transaction = %record.id, behind = %blocker.id(), "transaction queued");
				return Ok(());
			}
		}
		self.persist()
	}

	/// Explicit rollback; also the entry point for cascaded rollbacks.
	pub fn rollback(&self, reason: Option<String>) -> crate::Result<()> {
		if self.state().is_terminal() {
			return Err(Error::TransactionClosed);
		}
		self.fail(Error::transaction_failed(reason.unwrap_or_else(|| "rolled back".to_string())));
		Ok(())
	}

	/// Blocks until the persist outcome is known.
	pub fn wait_persisted(&self) -> crate::Result<Value> {
		self.shared.is_persisted.wait()
	}

	/// Blocks until the transaction terminates, driving the sync-timeout
	/// race while it waits.
	pub fn wait_synced(&self) -> crate::Result<()> {
		loop {
			self.try_settle();
			if let Some(outcome) = self.shared.is_synced.peek() {
				return outcome;
			}
			let barrier = self.shared.sync_barrier.lock().clone();
			match barrier {
				Some((barrier, deadline)) => {
					let remaining = deadline.saturating_duration_since(Instant::now());
					barrier.wait_timeout(remaining);
				}
				None => return self.shared.is_synced.wait(),
			}
		}
	}

	/// Checks the sync barrier and the timeout; settles the transaction
	/// when either has an outcome. Called from waits and from the global
	/// settle pump after synced commits.
	pub fn try_settle(&self) {
		if self.state() != TransactionState::PersistedAwaitingSync {
			return;
		}
		let barrier = self.shared.sync_barrier.lock().clone();
		let Some((barrier, deadline)) = barrier else { return };
		match barrier.peek() {
			Some(Ok(())) => self.complete(),
			Some(Err(error)) => self.fail(error),
			None => {
				if Instant::now() >= deadline {
					self.fail(Error::transaction_failed(format!(
						"await_sync timed out after {:?}",
						self.shared.await_sync_timeout
					)));
				}
			}
		}
	}

	/// Records a mutation for `collection`, merging with an earlier
	/// mutation of the same key, and applies it to the collection's
	/// optimistic overlay.
	pub(crate) fn record_mutation(
		&self,
		collection: &Collection,
		mutation: Mutation,
	) -> crate::Result<()> {
		if self.state().is_terminal() {
			return Err(Error::TransactionClosed);
		}
		{
			let mut collections = self.shared.collections.lock();
			if !collections.contains_key(collection.id()) {
				collections.insert(collection.id().clone(), collection.clone());
				transaction_manager(collection.id()).register(self.clone());
			}
		}

		let key = mutation.key.clone();
		let merged: Option<Mutation>;
		{
			let mut record = self.shared.record.write();
			let existing = record
				.mutations
				.iter()
				.position(|m| m.collection_id == mutation.collection_id && m.key == mutation.key);
			match existing {
				Some(at) => {
					merged = merge_mutations(&record.mutations[at], mutation);
					match merged.clone() {
						Some(m) => record.mutations[at] = m,
						None => {
							record.mutations.remove(at);
						}
					}
				}
				None => {
					record.mutations.push(mutation.clone());
					merged = Some(mutation);
				}
			}
		}
		collection.apply_optimistic(self.id(), &key, merged);
		Ok(())
	}

	fn mutation_keys(&self) -> Vec<(CollectionId, Key)> {
		self.shared
			.record
			.read()
			.mutations
			.iter()
			.map(|m| (m.collection_id.clone(), m.key.clone()))
			.collect()
	}

	fn overlaps(&self, other: &TransactionHandle) -> bool {
		let ours = self.mutation_keys();
		other
			.mutation_keys()
			.iter()
			.any(|slot| ours.iter().any(|o| o == slot))
	}

	/// The earliest active, non-queued transaction overlapping this one.
	fn find_blocker(&self) -> Option<TransactionHandle> {
		let mut candidates: Vec<TransactionHandle> = active_transactions()
			.into_iter()
			.filter(|other| other.id() != self.id())
			.filter(|other| !other.state().is_terminal())
			.filter(|other| other.state() != TransactionState::Queued)
			.filter(|other| self.overlaps(other))
			.collect();
		candidates.sort_by_key(|handle| handle.sequence());
		candidates.into_iter().next()
	}

	fn persist(&self) -> crate::Result<()> {
		self.shared.record.write().state = TransactionState::Persisting;

		let outcome = match &self.shared.mutation_fn {
			Some(mutation_fn) => mutation_fn(PersistContext { transaction: self.info() }),
			// Local-only transactions persist trivially.
			None => Ok(Value::Undefined),
		};

		match outcome {
			Ok(result) => {
				self.shared.is_persisted.resolve(result.clone());
				match &self.shared.await_sync {
					Some(await_sync) => {
						self.shared.record.write().state = TransactionState::PersistedAwaitingSync;
						let barrier = await_sync(AwaitSyncContext {
							transaction: self.info(),
							persist_result: result,
						});
						let deadline = Instant::now() + self.shared.await_sync_timeout;
						*self.shared.sync_barrier.lock() = Some((barrier, deadline));
						self.try_settle();
					}
					None => self.complete(),
				}
				Ok(())
			}
			Err(error) => {
				let wrapped = Error::transaction_failed(error.to_string());
				self.fail(wrapped.clone());
				Err(wrapped)
			}
		}
	}

	fn complete(&self) {
		{
			let mut record = self.shared.record.write();
			if record.state.is_terminal() {
				return;
			}
			record.state = TransactionState::Completed;
		}
		self.shared.is_synced.resolve(());
		self.drop_overlays(true);
		self.deregister();
		self.release_queued();
	}

	/// Terminal failure: both deferreds reject, the overlay entries for
	/// this transaction are removed, and every overlapping active
	/// transaction is rolled back as well (user-observed state is tainted).
	/// The overlap walk visits each transaction once.
	fn fail(&self, error: Error) {
		let mut cascade: Vec<TransactionHandle> = vec![self.clone()];
		let mut visited = vec![self.id()];
		let mut at = 0;
		while at < cascade.len() {
			let current = cascade[at].clone();
			for other in active_transactions() {
				if visited.contains(&other.id()) || other.state().is_terminal() {
					continue;
				}
				if current.overlaps(&other) {
					visited.push(other.id());
					cascade.push(other);
				}
			}
			at += 1;
		}

		for (position, transaction) in cascade.iter().enumerate() {
			let reason = if position == 0 {
				error.clone()
			} else {
				Error::transaction_failed(format!(
					"rolled back by overlapping transaction {}",
					self.id()
				))
			};
			transaction.fail_alone(reason);
		}
		for transaction in &cascade {
			transaction.release_queued();
		}
	}

	fn fail_alone(&self, error: Error) {
		{
			let mut record = self.shared.record.write();
			if record.state.is_terminal() {
				return;
			}
			record.state = TransactionState::Failed;
			record.error = Some(error.clone());
		}
		self.shared.is_persisted.reject(error.clone());
		self.shared.is_synced.reject(error);
		self.drop_overlays(false);
		self.deregister();
	}

	fn drop_overlays(&self, confirmed: bool) {
		let collections: Vec<Collection> =
			self.shared.collections.lock().values().cloned().collect();
		for collection in collections {
			collection.drop_optimistic(self.id(), confirmed);
		}
	}

	fn deregister(&self) {
		let ids: Vec<CollectionId> = self.shared.collections.lock().keys().cloned().collect();
		for id in ids {
			transaction_manager(&id).remove(self.id());
		}
	}

	/// Releases transactions queued behind this one, FIFO by sequence.
	fn release_queued(&self) {
		let mut queued: Vec<TransactionHandle> = active_transactions()
			.into_iter()
			.filter(|other| other.state() == TransactionState::Queued)
			.filter(|other| other.shared.record.read().queued_behind == Some(self.id()))
			.collect();
		queued.sort_by_key(|handle| handle.sequence());
		for transaction in queued {
			{
				let mut record = transaction.shared.record.write();
				record.state = TransactionState::Pending;
				record.queued_behind = None;
			}
			// Errors surface through the released transaction's deferreds.
			let _ = transaction.commit();
		}
	}
}

/// Per-collection manager tracking the transactions that touch it.
pub struct TransactionManager {
	active: Mutex<Vec<TransactionHandle>>,
}

impl TransactionManager {
	fn new() -> Self {
		Self { active: Mutex::new(Vec::new()) }
	}

	fn register(&self, handle: TransactionHandle) {
		let mut active = self.active.lock();
		if !active.iter().any(|h| h.id() == handle.id()) {
			active.push(handle);
		}
	}

	fn remove(&self, id: TransactionId) {
		self.active.lock().retain(|h| h.id() != id);
	}

	pub fn active(&self) -> Vec<TransactionHandle> {
		self.active.lock().clone()
	}
}

static REGISTRY: Lazy<DashMap<CollectionId, Arc<TransactionManager>>> = Lazy::new(DashMap::new);

/// Lazily initialized per collection id; lifetime = program lifetime unless
/// explicitly released.
pub fn transaction_manager(collection_id: &CollectionId) -> Arc<TransactionManager> {
	REGISTRY
		.entry(collection_id.clone())
		.or_insert_with(|| Arc::new(TransactionManager::new()))
		.clone()
}

pub fn release_transaction_manager(collection_id: &CollectionId) {
	REGISTRY.remove(collection_id);
}

fn active_transactions() -> Vec<TransactionHandle> {
	let mut seen: Vec<TransactionId> = Vec::new();
	let mut out: Vec<TransactionHandle> = Vec::new();
	for entry in REGISTRY.iter() {
		for handle in entry.value().active() {
			if !seen.contains(&handle.id()) {
				seen.push(handle.id());
				out.push(handle);
			}
		}
	}
	out
}

/// Settle pump: drives the sync-timeout race for every awaiting
/// transaction. Collections call this after applying a synced batch.
pub fn settle_transactions() {
	for handle in active_transactions() {
		handle.try_settle();
	}
}
