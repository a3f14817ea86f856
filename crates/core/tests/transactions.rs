// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;

use reflexdb_core::{
	Collection, CollectionOptions, Deferred, Error, MutationType, Strategy, SyncContext,
	SyncSource, SyncedWrite, TransactionOptions, TransactionState, Transactions,
	settle_transactions,
};
use reflexdb_type::{Key, Value, record};

fn local(id: &str) -> Collection {
	Collection::new(CollectionOptions::new(id, "id"))
}

fn set_field(value: &mut Value, field: &str, v: Value) {
	if let Value::Record(fields) = value {
		fields.insert(field.to_string(), v);
	}
}

#[test]
fn test_optimistic_insert_is_visible_immediately() {
	let collection = local("txn_visible");
	let seen = Arc::new(Mutex::new(false));
	{
		let collection = collection.clone();
		let seen = seen.clone();
		let txn = Transactions::create(TransactionOptions { auto_commit: false, ..Default::default() });
		txn.mutate(|| {
			collection.insert(record! { "id" => 1, "v" => 1 }).unwrap();
			// Visible inside the mutate scope, before any persist.
			*seen.lock() = collection.has(&Key::from(1));
		})
		.unwrap();
		assert!(*seen.lock());
		assert!(collection.get_optimistic_info(&Key::from(1)).is_optimistic);
		txn.commit().unwrap();
	}
	assert_eq!(collection.get(&Key::from(1)), Some(record! { "id" => 1, "v" => 1 }));
	assert!(!collection.get_optimistic_info(&Key::from(1)).is_optimistic);
}

#[test]
fn test_insert_and_update_merge_to_single_insert_mutation() {
	// Scenario: insert + update of the same key inside one transaction
	// merges into one insert mutation carrying the combined value.
	let collection = local("txn_merge");
	let txn = Transactions::create(TransactionOptions { auto_commit: false, ..Default::default() });
	txn.mutate(|| {
		collection.insert(record! { "id" => 1, "a" => 1 }).unwrap();
		collection.update(&Key::from(1), |v| set_field(v, "b", Value::Int(2))).unwrap();
	})
	.unwrap();

	let mutations = txn.mutations();
	assert_eq!(mutations.len(), 1);
	assert_eq!(mutations[0].mutation_type, MutationType::Insert);
	assert_eq!(mutations[0].modified, Some(record! { "id" => 1, "a" => 1, "b" => 2 }));

	txn.commit().unwrap();
	assert_eq!(txn.state(), TransactionState::Completed);
	let info = collection.get_optimistic_info(&Key::from(1));
	assert!(!info.is_optimistic);
	assert_eq!(info.mutation_count, 0);
}

#[test]
fn test_failed_persist_rolls_back_and_rejects_deferreds() {
	let collection = local("txn_fail");
	let txn = Transactions::create(TransactionOptions {
		mutation_fn: Some(Arc::new(|_| Err(Error::transaction_failed("backend down")))),
		auto_commit: false,
		..Default::default()
	});
	txn.mutate(|| {
		collection.insert(record! { "id" => 1 }).unwrap();
	})
	.unwrap();
	assert!(collection.has(&Key::from(1)));

	assert!(txn.commit().is_err());
	assert_eq!(txn.state(), TransactionState::Failed);
	assert!(matches!(txn.is_persisted().peek(), Some(Err(_))));
	assert!(matches!(txn.is_synced().peek(), Some(Err(_))));
	// Overlay reversed: the optimistic row is gone.
	assert!(!collection.has(&Key::from(1)));
	assert!(txn.error().is_some());
}

#[test]
fn test_rollback_cascades_to_overlapping_transactions() {
	let collection = local("txn_cascade");
	collection.insert(record! { "id" => 1, "v" => 0 }).unwrap();

	let a = Transactions::create(TransactionOptions { auto_commit: false, ..Default::default() });
	a.mutate(|| {
		collection.update(&Key::from(1), |v| set_field(v, "v", Value::Int(1))).unwrap();
	})
	.unwrap();

	let b = Transactions::create(TransactionOptions { auto_commit: false, ..Default::default() });
	b.mutate(|| {
		collection.update(&Key::from(1), |v| set_field(v, "v", Value::Int(2))).unwrap();
	})
	.unwrap();

	// A non-overlapping bystander survives.
	let c = Transactions::create(TransactionOptions { auto_commit: false, ..Default::default() });
	c.mutate(|| {
		collection.insert(record! { "id" => 99 }).unwrap();
	})
	.unwrap();

	a.rollback(None).unwrap();
	assert_eq!(a.state(), TransactionState::Failed);
	assert_eq!(b.state(), TransactionState::Failed);
	assert_eq!(c.state(), TransactionState::Pending);

	// Both overlays reverted; the synced base shows through again.
	assert_eq!(collection.get(&Key::from(1)), Some(record! { "id" => 1, "v" => 0 }));
	assert!(collection.has(&Key::from(99)));
}

#[test]
fn test_delete_then_insert_succeeds_after_termination() {
	let collection = local("txn_delete_insert");
	collection.insert(record! { "id" => 1, "v" => 1 }).unwrap();

	collection.delete(&Key::from(1)).unwrap();
	assert!(!collection.has(&Key::from(1)));

	// Optimistic tracking cleared on termination: the key is free again.
	collection.insert(record! { "id" => 1, "v" => 2 }).unwrap();
	assert_eq!(collection.get(&Key::from(1)), Some(record! { "id" => 1, "v" => 2 }));
}

#[test]
fn test_duplicate_insert_is_rejected() {
	let collection = local("txn_duplicate");
	collection.insert(record! { "id" => 1 }).unwrap();
	assert!(matches!(
		collection.insert(record! { "id" => 1 }),
		Err(Error::DuplicateKey(_))
	));
}

#[test]
fn test_ordered_strategy_queues_behind_overlap() {
	let collection = local("txn_ordered");
	collection.insert(record! { "id" => 1, "v" => 0 }).unwrap();

	// A persists but keeps awaiting its sync barrier, staying active.
	let barrier = Deferred::<()>::new();
	let a = Transactions::create(TransactionOptions {
		await_sync: Some(Arc::new({
			let barrier = barrier.clone();
			move |_| barrier.clone()
		})),
		strategy: Strategy::Ordered,
		auto_commit: false,
		await_sync_timeout: Duration::from_secs(5),
		..Default::default()
	});
	a.mutate(|| {
		collection.update(&Key::from(1), |v| set_field(v, "v", Value::Int(1))).unwrap();
	})
	.unwrap();
	a.commit().unwrap();
	assert_eq!(a.state(), TransactionState::PersistedAwaitingSync);

	// B overlaps and is ordered: it queues instead of persisting.
	let b = Transactions::create(TransactionOptions {
		strategy: Strategy::Ordered,
		auto_commit: false,
		..Default::default()
	});
	b.mutate(|| {
		collection.update(&Key::from(1), |v| set_field(v, "v", Value::Int(2))).unwrap();
	})
	.unwrap();
	b.commit().unwrap();
	assert_eq!(b.state(), TransactionState::Queued);

	// No two active, non-queued ordered transactions overlap.
	barrier.resolve(());
	settle_transactions();

	assert_eq!(a.state(), TransactionState::Completed);
	// Released FIFO and processed to completion.
	assert_eq!(b.state(), TransactionState::Completed);
	assert_eq!(collection.get(&Key::from(1)), Some(record! { "id" => 1, "v" => 2 }));
}

#[test]
fn test_await_sync_timeout_fails_the_transaction() {
	let collection = local("txn_timeout");
	let never = Deferred::<()>::new();
	let txn = Transactions::create(TransactionOptions {
		await_sync: Some(Arc::new({
			let never = never.clone();
			move |_| never.clone()
		})),
		auto_commit: false,
		await_sync_timeout: Duration::from_millis(20),
		..Default::default()
	});
	txn.mutate(|| {
		collection.insert(record! { "id" => 1 }).unwrap();
	})
	.unwrap();
	txn.commit().unwrap();
	assert_eq!(txn.state(), TransactionState::PersistedAwaitingSync);

	// The sync wait races the timeout and loses.
	assert!(txn.wait_synced().is_err());
	assert_eq!(txn.state(), TransactionState::Failed);
	assert!(!collection.has(&Key::from(1)));
}

#[test]
fn test_mutations_on_terminal_transaction_are_rejected() {
	let collection = local("txn_closed");
	let txn = Transactions::create(TransactionOptions { auto_commit: false, ..Default::default() });
	txn.mutate(|| {
		collection.insert(record! { "id" => 1 }).unwrap();
	})
	.unwrap();
	txn.commit().unwrap();

	assert!(matches!(txn.commit(), Err(Error::TransactionClosed)));
	assert!(matches!(txn.rollback(None), Err(Error::TransactionClosed)));
	assert!(matches!(txn.mutate(|| {}), Err(Error::TransactionClosed)));
}

#[test]
fn test_sequential_and_batched_application_agree() {
	let sequential = local("txn_seq");
	for i in 0..3 {
		sequential.insert(record! { "id" => i, "v" => i }).unwrap();
	}

	let batched = local("txn_batched");
	batched
		.insert_many((0..3).map(|i| record! { "id" => i, "v" => i }).collect())
		.unwrap();

	assert_eq!(sequential.to_array(), batched.to_array());
}

/// awaitSync resolved by the source delivering the authoritative row.
#[derive(Default)]
struct EchoSource {
	ctx: Mutex<Option<SyncContext>>,
}

impl EchoSource {
	fn confirm(&self, value: Value) {
		let ctx = self.ctx.lock().clone().expect("started");
		ctx.begin();
		ctx.write(SyncedWrite::insert(value));
		ctx.commit();
	}
}

impl SyncSource for EchoSource {
	fn start(&self, ctx: SyncContext) -> reflexdb_core::Result<()> {
		*self.ctx.lock() = Some(ctx.clone());
		ctx.mark_ready();
		Ok(())
	}
}

#[test]
fn test_synced_batch_during_await_sync_keeps_overlay_until_termination() {
	let source = Arc::new(EchoSource::default());
	let barrier = Deferred::<()>::new();
	let collection = Collection::new(
		CollectionOptions::new("txn_reconcile", "id")
			.source(source.clone())
			.await_sync(Arc::new({
				let barrier = barrier.clone();
				move |_| barrier.clone()
			})),
	);
	collection.preload();

	let txn = collection.insert(record! { "id" => 1, "v" => "optimistic" }).unwrap();
	assert_eq!(txn.state(), TransactionState::PersistedAwaitingSync);

	// The authoritative row lands while the overlay is still applied: the
	// overlay wins until the transaction terminates.
	source.confirm(record! { "id" => 1, "v" => "synced" });
	assert_eq!(collection.get(&Key::from(1)), Some(record! { "id" => 1, "v" => "optimistic" }));

	barrier.resolve(());
	settle_transactions();
	assert_eq!(txn.state(), TransactionState::Completed);
	// Overlay dropped as the authoritative delta took over.
	assert_eq!(collection.get(&Key::from(1)), Some(record! { "id" => 1, "v" => "synced" }));
}

#[test]
fn test_ordered_strategy_without_overlap_runs_immediately() {
	let collection = local("txn_ordered_disjoint");
	collection.insert(record! { "id" => 1, "v" => 0 }).unwrap();
	collection.insert(record! { "id" => 2, "v" => 0 }).unwrap();

	// A stays active on its sync barrier; B is ordered but touches a
	// different key, so it never queues.
	let barrier = Deferred::<()>::new();
	let a = Transactions::create(TransactionOptions {
		await_sync: Some(Arc::new({
			let barrier = barrier.clone();
			move |_| barrier.clone()
		})),
		strategy: Strategy::Ordered,
		auto_commit: false,
		await_sync_timeout: Duration::from_secs(5),
		..Default::default()
	});
	a.mutate(|| {
		collection.update(&Key::from(1), |v| set_field(v, "v", Value::Int(1))).unwrap();
	})
	.unwrap();
	a.commit().unwrap();

	let b = Transactions::create(TransactionOptions {
		strategy: Strategy::Ordered,
		auto_commit: false,
		..Default::default()
	});
	b.mutate(|| {
		collection.update(&Key::from(2), |v| set_field(v, "v", Value::Int(2))).unwrap();
	})
	.unwrap();
	b.commit().unwrap();
	assert_eq!(b.state(), TransactionState::Completed);
	assert_eq!(a.state(), TransactionState::PersistedAwaitingSync);

	barrier.resolve(());
	settle_transactions();
	assert_eq!(a.state(), TransactionState::Completed);
}
