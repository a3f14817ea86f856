// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::{
	collections::{BTreeSet, HashMap},
	sync::{
		Arc, Weak,
		atomic::{AtomicBool, AtomicU64, Ordering},
	},
};

use parking_lot::Mutex;
use tracing::debug;

use reflexdb_core::{
	ChangeCallback, ChangeMessage, ChangeType, Collection, CollectionId, CollectionLike,
	CollectionOptions, CollectionStatus, SubscribeOptions, SubscriptionHandle, fold_changes,
};
use reflexdb_expr::Expr;
use reflexdb_flow::{CompareFn, Delta, FlowGraph, FlowOptions, MultiSet, NodeId};
use reflexdb_index::IndexOp;
use reflexdb_type::{Key, Value};

use crate::{
	compile::{CompiledQuery, compile},
	ir::QueryIr,
};

static NEXT_QUERY: AtomicU64 = AtomicU64::new(0);

#[derive(Clone)]
struct InputMeta {
	alias: String,
	collection: Arc<dyn CollectionLike>,
	node: NodeId,
	root: bool,
	join_member: bool,
}

/// The compiled graph plus its input wiring; rebuilt wholesale when a
/// cleaned-up query restarts, so no stale operator state survives.
struct Wiring {
	graph: FlowGraph,
	output: NodeId,
	inputs: Vec<InputMeta>,
}

struct LiveQueryInner {
	id: CollectionId,
	ir: QueryIr,
	options: FlowOptions,
	result: Collection,
	wiring: Mutex<Wiring>,
	subscriptions: Mutex<Vec<SubscriptionHandle>>,
	started: AtomicBool,
	comparator: Option<CompareFn>,
	single_result: bool,
	root_params: Vec<(Expr, IndexOp, Value)>,
	root_alias: Option<String>,
}

/// A live query: a compiled dataflow wrapped as a collection. On first
/// subscription or preload it starts the input collections, feeds their
/// current state through the graph, then switches to incremental mode.
#[derive(Clone)]
pub struct LiveQuery {
	inner: Arc<LiveQueryInner>,
}

impl LiveQuery {
	pub fn new(ir: QueryIr) -> crate::Result<Self> {
		Self::with_options(ir, FlowOptions::default())
	}

	pub fn with_options(ir: QueryIr, options: FlowOptions) -> crate::Result<Self> {
		let id = CollectionId::from(format!("live_query_{}", NEXT_QUERY.fetch_add(1, Ordering::Relaxed)));
		let compiled: CompiledQuery = compile(&ir, options, Some(&id))?;

		let result = Collection::new(CollectionOptions::with_get_key(
			id.clone(),
			Arc::new(|value: &Value| Key::from_value(value)),
		));

		let wiring = Wiring {
			inputs: compiled
				.inputs
				.iter()
				.map(|input| InputMeta {
					alias: input.alias.clone(),
					collection: input.collection.clone(),
					node: input.node,
					root: input.root,
					join_member: input.join_member,
				})
				.collect(),
			graph: compiled.graph,
			output: compiled.output,
		};

		Ok(Self {
			inner: Arc::new(LiveQueryInner {
				id,
				ir,
				options,
				result,
				wiring: Mutex::new(wiring),
				subscriptions: Mutex::new(Vec::new()),
				started: AtomicBool::new(false),
				comparator: compiled.comparator,
				single_result: compiled.single_result,
				root_params: compiled.root_params,
				root_alias: compiled.root_alias,
			}),
		})
	}

	pub fn id(&self) -> &CollectionId {
		&self.inner.id
	}

	pub fn single_result(&self) -> bool {
		self.inner.single_result
	}

	/// The sole value of a single-result query, or `None`. Never a list.
	pub fn single(&self) -> Option<Value> {
		self.start();
		self.to_array().into_iter().next()
	}

	/// Result rows; ordered by the query's comparator when one exists.
	pub fn to_array(&self) -> Vec<Value> {
		self.start();
		let mut rows = self.inner.result.values();
		if let Some(comparator) = &self.inner.comparator {
			rows.sort_by(|a, b| comparator(a, b));
		}
		rows
	}

	pub fn result_collection(&self) -> &Collection {
		&self.inner.result
	}

	/// Wires inputs to the graph: seed each source's current state (via
	/// the index when one can narrow an already-ready root scan, via
	/// `fetch_snapshot` for buffering join sides), then stay incremental
	/// through the subscriptions.
	pub fn start(&self) {
		if self.inner.started.swap(true, Ordering::AcqRel) {
			return;
		}
		debug!(query = %self.inner.id, "live query starting");
		self.inner.result.preload();

		let metas: Vec<InputMeta> = self.inner.wiring.lock().inputs.clone();
		for meta in metas {
			// Index acceleration is only sound against a ready root: the
			// candidate set must describe the same state the initial
			// replay delivers.
			let root_candidates = if meta.root && meta.collection.status().is_ready() {
				self.root_candidates(&meta)
			} else {
				None
			};

			// Rows pre-fed from a buffering source, so the eventual synced
			// inserts for them fold into updates instead of duplicating.
			let prefed: Arc<Mutex<HashMap<Key, Value>>> = Arc::new(Mutex::new(HashMap::new()));

			let weak: Weak<LiveQueryInner> = Arc::downgrade(&self.inner);
			let node = meta.node;
			let callback_prefed = prefed.clone();
			let mut first_batch = root_candidates.is_some();
			let callback: ChangeCallback = Box::new(move |changes: &[ChangeMessage]| {
				let Some(inner) = weak.upgrade() else { return };
				let candidates = if first_batch {
					first_batch = false;
					root_candidates.clone()
				} else {
					None
				};
				let deltas = to_deltas(changes, &callback_prefed, candidates.as_ref());
				inner.ingest(node, deltas);
			});
			let subscription = meta
				.collection
				.subscribe_changes(callback, SubscribeOptions { include_initial_state: true });
			self.inner.subscriptions.lock().push(subscription);

			// Progressive mode: a join side still buffering is read through
			// the adapter's fetch_snapshot, never request_snapshot.
			if meta.join_member && !meta.collection.status().is_ready() {
				match meta.collection.fetch_snapshot() {
					Ok(entries) => {
						let mut deltas = MultiSet::new();
						let mut fed = prefed.lock();
						for (key, row) in entries {
							deltas.push(Delta::insert(key_to_value(&key), row.clone()));
							fed.insert(key, row);
						}
						drop(fed);
						self.inner.ingest(node, deltas);
					}
					Err(error) => {
						debug!(query = %self.inner.id, alias = %meta.alias, %error, "snapshot fetch failed");
					}
				}
			}
		}
	}

	fn root_candidates(&self, meta: &InputMeta) -> Option<BTreeSet<Key>> {
		for (reference, op, operand) in &self.inner.root_params {
			let Some(stripped) = strip_alias(reference, self.inner.root_alias.as_deref()) else {
				continue;
			};
			if let Some(keys) = meta.collection.index_candidates(&stripped, *op, operand) {
				return Some(keys);
			}
		}
		None
	}
}

impl LiveQueryInner {
	/// One synchronous tick: push, run bounded, collect consolidated
	/// output, apply to the result collection.
	fn ingest(&self, node: NodeId, deltas: MultiSet) {
		if deltas.is_empty() {
			return;
		}
		let batches = {
			let mut wiring = self.wiring.lock();
			wiring.graph.push(node, deltas);
			wiring.graph.run();
			let output = wiring.output;
			wiring.graph.take_output(output)
		};
		let mut changes = Vec::new();
		for batch in batches {
			for delta in batch.into_entries() {
				let key = Key::from_value(&delta.key);
				if delta.diff > 0 {
					changes.push(ChangeMessage::insert(key, delta.value));
				} else {
					changes.push(ChangeMessage::delete(key, delta.value));
				}
			}
		}
		let changes = fold_changes(changes);
		if !changes.is_empty() {
			self.result.write_batch(changes);
		}
	}

	fn derived_status(&self) -> CollectionStatus {
		if !self.started.load(Ordering::Acquire) {
			return CollectionStatus::Idle;
		}
		let ready = self.wiring.lock().inputs.iter().all(|meta| meta.collection.status().is_ready());
		if ready { CollectionStatus::Ready } else { CollectionStatus::Loading }
	}
}

/// Collection change messages to graph deltas. `prefed` holds snapshot
/// rows already in the graph; their authoritative insert folds into an
/// update (or nothing when identical). `candidates` narrows an initial
/// replay through an index, superset-safe.
fn to_deltas(
	changes: &[ChangeMessage],
	prefed: &Arc<Mutex<HashMap<Key, Value>>>,
	candidates: Option<&BTreeSet<Key>>,
) -> MultiSet {
	let mut deltas = MultiSet::new();
	let mut fed = prefed.lock();
	for change in changes {
		if let Some(keys) = candidates {
			if !keys.contains(&change.key) {
				continue;
			}
		}
		let key = key_to_value(&change.key);
		match change.change_type {
			ChangeType::Insert => {
				if let Some(previous) = fed.remove(&change.key) {
					if previous == change.value {
						continue;
					}
					deltas.push(Delta::remove(key.clone(), previous));
				}
				deltas.push(Delta::insert(key, change.value.clone()));
			}
			ChangeType::Update => {
				let previous = fed.remove(&change.key).or_else(|| change.previous_value.clone());
				if let Some(previous) = previous {
					deltas.push(Delta::remove(key.clone(), previous));
				}
				deltas.push(Delta::insert(key, change.value.clone()));
			}
			ChangeType::Delete => {
				let previous = fed.remove(&change.key).unwrap_or_else(|| change.value.clone());
				deltas.push(Delta::remove(key, previous));
			}
		}
	}
	deltas
}

fn key_to_value(key: &Key) -> Value {
	match key {
		Key::Int(i) => Value::Int(*i),
		Key::Text(s) => Value::Text(s.clone()),
	}
}

pub(crate) fn strip_alias(reference: &Expr, alias: Option<&str>) -> Option<Expr> {
	let path = reference.as_ref_path()?;
	match (path.split_first(), alias) {
		(Some((head, rest)), Some(alias)) if head == alias && !rest.is_empty() => {
			Some(Expr::Ref(rest.iter().cloned().collect()))
		}
		_ => Some(Expr::Ref(path.clone())),
	}
}

impl CollectionLike for LiveQuery {
	fn id(&self) -> &CollectionId {
		&self.inner.id
	}

	fn status(&self) -> CollectionStatus {
		self.inner.derived_status()
	}

	fn get(&self, key: &Key) -> Option<Value> {
		self.start();
		self.inner.result.get(key)
	}

	fn has(&self, key: &Key) -> bool {
		self.start();
		self.inner.result.has(key)
	}

	fn entries(&self) -> Vec<(Key, Value)> {
		self.start();
		self.inner.result.entries()
	}

	fn size(&self) -> usize {
		self.start();
		self.inner.result.size()
	}

	fn subscribe_changes(&self, callback: ChangeCallback, options: SubscribeOptions) -> SubscriptionHandle {
		self.start();
		self.inner.result.subscribe_changes(callback, options)
	}

	fn start_sync(&self) {
		self.start();
	}

	/// Detaches from the inputs and resets the compiled graph, so a later
	/// access rebuilds from a clean slate instead of double-feeding stale
	/// operator state.
	fn cleanup(&self) {
		for subscription in self.inner.subscriptions.lock().drain(..) {
			subscription.unsubscribe();
		}
		self.inner.result.cleanup();
		if let Ok(compiled) = compile(&self.inner.ir, self.inner.options, Some(&self.inner.id)) {
			let mut wiring = self.inner.wiring.lock();
			wiring.inputs = compiled
				.inputs
				.iter()
				.map(|input| InputMeta {
					alias: input.alias.clone(),
					collection: input.collection.clone(),
					node: input.node,
					root: input.root,
					join_member: input.join_member,
				})
				.collect();
			wiring.graph = compiled.graph;
			wiring.output = compiled.output;
		}
		self.inner.started.store(false, Ordering::Release);
	}

	fn fetch_snapshot(&self) -> reflexdb_core::Result<Vec<(Key, Value)>> {
		self.start();
		Ok(self.inner.result.entries())
	}
}
