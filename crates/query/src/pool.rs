// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::sync::{
	Arc, Weak,
	atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::debug;

use reflexdb_core::{
	ChangeCallback, ChangeMessage, ChangeType, Collection, CollectionLike, CollectionOptions,
	SubscribeOptions, SubscriptionHandle,
};
use reflexdb_expr::RowEvaluator;
use reflexdb_type::{Key, Value};

use crate::{
	compile::build_projection,
	fingerprint::{fingerprint, parameter_key},
	ir::{QueryIr, Source},
	live::LiveQuery,
};

/// Process-wide pool: plans keyed by structural fingerprint, instances
/// keyed by parameter tuple. Lazily initialized, explicitly releasable.
pub struct QueryPool {
	plans: DashMap<u64, Arc<PooledPlan>>,
}

static POOL: Lazy<QueryPool> = Lazy::new(|| QueryPool { plans: DashMap::new() });

pub fn query_pool() -> &'static QueryPool {
	&POOL
}

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(0);

/// One compiled shape shared by every instance: the source subscription
/// routes each incoming record to the output whose parameter tuple matches,
/// in O(1) per record.
struct PooledPlan {
	fingerprint: u64,
	source: Arc<dyn CollectionLike>,
	/// Extracts the parameter tuple from a raw source row, in WHERE order.
	param_extractors: Vec<RowEvaluator>,
	/// Optional projection over the namespaced row.
	projection: Option<Arc<dyn Fn(&Value) -> Value + Send + Sync>>,
	alias: String,
	outputs: DashMap<String, Collection>,
	subscription: Mutex<Option<SubscriptionHandle>>,
}

impl PooledPlan {
	fn param_key_of(&self, row: &Value) -> String {
		let params: Vec<Value> = self.param_extractors.iter().map(|eval| eval(row)).collect();
		parameter_key(&params)
	}

	fn project(&self, row: &Value) -> Value {
		match &self.projection {
			Some(projection) => {
				let namespaced = Value::record([(self.alias.clone(), row.clone())]);
				projection(&namespaced)
			}
			None => row.clone(),
		}
	}

	/// Routes one source change to the matching instance, moving the row
	/// between instances when its parameter tuple changed.
	fn route(&self, change: &ChangeMessage) {
		let bucket = self.param_key_of(&change.value);
		match change.change_type {
			ChangeType::Insert => {
				self.deliver(&bucket, ChangeMessage::insert(change.key.clone(), self.project(&change.value)));
			}
			ChangeType::Update => {
				let previous_bucket = change
					.previous_value
					.as_ref()
					.map(|previous| self.param_key_of(previous))
					.unwrap_or_else(|| bucket.clone());
				if previous_bucket != bucket {
					if let Some(previous) = &change.previous_value {
						self.deliver(
							&previous_bucket,
							ChangeMessage::delete(change.key.clone(), self.project(previous)),
						);
					}
					self.deliver(
						&bucket,
						ChangeMessage::insert(change.key.clone(), self.project(&change.value)),
					);
				} else {
					self.deliver(
						&bucket,
						ChangeMessage::insert(change.key.clone(), self.project(&change.value)),
					);
				}
			}
			ChangeType::Delete => {
				self.deliver(&bucket, ChangeMessage::delete(change.key.clone(), self.project(&change.value)));
			}
		}
	}

	fn deliver(&self, bucket: &str, change: ChangeMessage) {
		if let Some(output) = self.outputs.get(bucket) {
			output.write_batch(vec![change]);
		}
	}
}

impl QueryPool {
	/// Pool admission: `Some` for poolable plans, routed to the instance
	/// for this parameter tuple; `None` sends the caller to a dedicated
	/// [`LiveQuery`].
	pub fn acquire(&self, ir: &QueryIr) -> Option<Collection> {
		if !ir.is_poolable() {
			return None;
		}
		let Some(Source::Collection { collection, alias }) = &ir.from else { return None };

		let parameters = ir.parameters();
		let fp = fingerprint(ir);

		let plan = match self.plans.get(&fp) {
			Some(entry) => entry.value().clone(),
			None => {
				let built = build_plan(fp, collection.clone(), alias, ir).ok()?;
				self.plans.entry(fp).or_insert(built).clone()
			}
		};

		let literals: Vec<Value> = parameters.into_iter().map(|(_, value)| value).collect();
		let key = parameter_key(&literals);

		// Seed outside the map entry: starting the source may deliver
		// batches synchronously through the routing subscription.
		let output = match plan.outputs.get(&key) {
			Some(output) => output.clone(),
			None => {
				let output = seed_instance(&plan, &key);
				plan.outputs.insert(key.clone(), output.clone());
				output
			}
		};
		ensure_routing(&plan);
		Some(output)
	}

	/// Drops one plan and all its instances.
	pub fn release(&self, fingerprint: u64) {
		if let Some((_, plan)) = self.plans.remove(&fingerprint) {
			if let Some(subscription) = plan.subscription.lock().take() {
				subscription.unsubscribe();
			}
			debug!(fingerprint, "pooled plan released");
		}
	}

	pub fn clear(&self) {
		let fingerprints: Vec<u64> = self.plans.iter().map(|entry| *entry.key()).collect();
		for fp in fingerprints {
			self.release(fp);
		}
	}

	pub fn len(&self) -> usize {
		self.plans.len()
	}

	pub fn is_empty(&self) -> bool {
		self.plans.is_empty()
	}
}

fn build_plan(
	fp: u64,
	source: Arc<dyn CollectionLike>,
	alias: &str,
	ir: &QueryIr,
) -> crate::Result<Arc<PooledPlan>> {
	let mut extractors = Vec::new();
	for (reference, _) in ir.parameters() {
		let stripped = crate::live::strip_alias(&reference, Some(alias))
			.ok_or_else(|| crate::Error::InvalidSource("pool parameter is not a field ref".into()))?;
		extractors.push(reflexdb_expr::compile(&stripped)?);
	}
	let projection = if ir.select.is_empty() { None } else { Some(build_projection(&ir.select)?) };
	Ok(Arc::new(PooledPlan {
		fingerprint: fp,
		source,
		param_extractors: extractors,
		projection,
		alias: alias.to_string(),
		outputs: DashMap::new(),
		subscription: Mutex::new(None),
	}))
}

/// New instance seeded from the source's current state, filtered by the
/// parameter tuple.
fn seed_instance(plan: &Arc<PooledPlan>, key: &str) -> Collection {
	let id = format!("pooled_{}_{}", plan.fingerprint, NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed));
	let output = Collection::new(CollectionOptions::with_get_key(
		id,
		Arc::new(|value: &Value| Key::from_value(value)),
	));
	output.preload();

	plan.source.start_sync();
	let seed: Vec<ChangeMessage> = plan
		.source
		.entries()
		.into_iter()
		.filter(|(_, row)| plan.param_key_of(row) == key)
		.map(|(row_key, row)| ChangeMessage::insert(row_key, plan.project(&row)))
		.collect();
	if !seed.is_empty() {
		output.write_batch(seed);
	}
	output
}

fn ensure_routing(plan: &Arc<PooledPlan>) {
	let mut subscription = plan.subscription.lock();
	if subscription.is_some() {
		return;
	}
	let weak: Weak<PooledPlan> = Arc::downgrade(plan);
	let callback: ChangeCallback = Box::new(move |changes: &[ChangeMessage]| {
		let Some(plan) = weak.upgrade() else { return };
		for change in changes {
			plan.route(change);
		}
	});
	*subscription =
		Some(plan.source.subscribe_changes(callback, SubscribeOptions { include_initial_state: false }));
}

/// Convenience: pooled instance when the plan qualifies, dedicated live
/// query otherwise.
pub enum PooledOrLive {
	Pooled(Collection),
	Live(LiveQuery),
}

pub fn instantiate(ir: QueryIr) -> crate::Result<PooledOrLive> {
	match query_pool().acquire(&ir) {
		Some(collection) => Ok(PooledOrLive::Pooled(collection)),
		None => Ok(PooledOrLive::Live(LiveQuery::new(ir)?)),
	}
}
