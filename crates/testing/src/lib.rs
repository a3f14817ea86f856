// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

//! Shared test plumbing: a scriptable sync source and change-capture
//! helpers used across the workspace's test suites.

use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};

use parking_lot::Mutex;

use reflexdb_core::{ChangeCallback, ChangeMessage, SyncContext, SyncSource, SyncedWrite};
use reflexdb_type::Value;

/// A sync source driven by the test. Three modes:
/// - `with_initial`: delivers the rows and marks ready inside `start`;
/// - `buffering`: stays loading, answering `fetch_snapshot` from a buffer
///   until the test calls `commit_initial`;
/// - `new`: delivers nothing until pushed.
#[derive(Default)]
pub struct ScriptedSource {
	ctx: Mutex<Option<SyncContext>>,
	initial: Vec<Value>,
	snapshot: Mutex<Vec<Value>>,
	request_snapshot_calls: AtomicUsize,
}

impl ScriptedSource {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_initial(initial: Vec<Value>) -> Self {
		Self { initial, ..Self::default() }
	}

	pub fn buffering(snapshot: Vec<Value>) -> Self {
		Self { snapshot: Mutex::new(snapshot), ..Self::default() }
	}

	fn ctx(&self) -> SyncContext {
		self.ctx.lock().clone().expect("source not started")
	}

	/// One committed batch.
	pub fn push(&self, writes: Vec<SyncedWrite>) {
		let ctx = self.ctx();
		ctx.begin();
		for write in writes {
			ctx.write(write);
		}
		ctx.commit();
	}

	/// Completes a buffering source: commits the snapshot rows and marks
	/// ready.
	pub fn commit_initial(&self) {
		let rows: Vec<Value> = self.snapshot.lock().clone();
		let ctx = self.ctx();
		ctx.begin();
		for row in rows {
			ctx.write(SyncedWrite::insert(row));
		}
		ctx.commit();
		ctx.mark_ready();
	}

	pub fn mark_ready(&self) {
		self.ctx().mark_ready();
	}

	pub fn truncate(&self) {
		self.ctx().truncate();
	}

	pub fn error(&self, message: &str) {
		self.ctx().error(message);
	}

	/// How often the legacy pull trigger was (wrongly) invoked.
	pub fn request_snapshot_count(&self) -> usize {
		self.request_snapshot_calls.load(Ordering::Relaxed)
	}
}

impl SyncSource for ScriptedSource {
	fn start(&self, ctx: SyncContext) -> reflexdb_core::Result<()> {
		*self.ctx.lock() = Some(ctx.clone());
		if !self.initial.is_empty() {
			ctx.begin();
			for value in &self.initial {
				ctx.write(SyncedWrite::insert(value.clone()));
			}
			ctx.commit();
			ctx.mark_ready();
		}
		Ok(())
	}

	fn fetch_snapshot(&self) -> reflexdb_core::Result<Vec<Value>> {
		Ok(self.snapshot.lock().clone())
	}

	fn request_snapshot(&self) -> reflexdb_core::Result<()> {
		self.request_snapshot_calls.fetch_add(1, Ordering::Relaxed);
		Ok(())
	}
}

/// Captured subscriber batches plus the callback that fills them.
pub fn capture_changes() -> (Arc<Mutex<Vec<Vec<ChangeMessage>>>>, ChangeCallback) {
	let store: Arc<Mutex<Vec<Vec<ChangeMessage>>>> = Arc::new(Mutex::new(Vec::new()));
	let sink = store.clone();
	(store, Box::new(move |changes: &[ChangeMessage]| sink.lock().push(changes.to_vec())))
}
