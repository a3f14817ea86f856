// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::sync::Weak;

use serde::{Deserialize, Serialize};

use reflexdb_type::Value;

use crate::{
	change::ChangeType,
	collection::{Collection, CollectionInner},
};

/// One write inside a synced batch. The key is derived by the collection's
/// `get_key`, so sources only ship values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncedWrite {
	#[serde(rename = "type")]
	pub change_type: ChangeType,
	pub value: Value,
	#[serde(rename = "previousValue", skip_serializing_if = "Option::is_none")]
	pub previous_value: Option<Value>,
}

impl SyncedWrite {
	pub fn insert(value: Value) -> Self {
		Self { change_type: ChangeType::Insert, value, previous_value: None }
	}

	pub fn update(value: Value, previous: Option<Value>) -> Self {
		Self { change_type: ChangeType::Update, value, previous_value: previous }
	}

	pub fn delete(value: Value) -> Self {
		Self { change_type: ChangeType::Delete, value, previous_value: None }
	}
}

/// A sync adapter. `start` receives the context once per sync lifetime and
/// must deliver `begin, write*, commit` batches plus at least one
/// `mark_ready` when the initial snapshot is known complete. The core never
/// retries; retry policy belongs to the adapter.
pub trait SyncSource: Send + Sync {
	fn start(&self, ctx: SyncContext) -> crate::Result<()>;

	/// Cooperative stop on cleanup; in-flight work may still resolve but
	/// its results are ignored.
	fn stop(&self) {}

	/// Snapshot read used by joined queries while this source is still
	/// buffering (progressive mode).
	fn fetch_snapshot(&self) -> crate::Result<Vec<Value>> {
		Ok(Vec::new())
	}

	/// Legacy pull trigger. The core never issues this once the source has
	/// reached ready; buffering-time reads go through `fetch_snapshot`.
	fn request_snapshot(&self) -> crate::Result<()> {
		Ok(())
	}
}

/// Handle a source writes through. Writes between `begin` and `commit` are
/// buffered; `commit` applies them atomically and notifies subscribers.
///
/// Holds the collection weakly: a source outliving its collection writes
/// into the void instead of keeping it alive.
#[derive(Clone)]
pub struct SyncContext {
	inner: Weak<CollectionInner>,
}

impl SyncContext {
	pub(crate) fn new(inner: Weak<CollectionInner>) -> Self {
		Self { inner }
	}

	pub fn collection(&self) -> Option<Collection> {
		self.inner.upgrade().map(Collection::from_inner)
	}

	pub fn begin(&self) {
		if let Some(collection) = self.collection() {
			collection.sync_begin();
		}
	}

	pub fn write(&self, write: SyncedWrite) {
		if let Some(collection) = self.collection() {
			collection.sync_write(write);
		}
	}

	pub fn commit(&self) {
		if let Some(collection) = self.collection() {
			collection.sync_commit();
		}
	}

	/// Declares the initial snapshot complete; legal before the first batch
	/// to declare empty readiness.
	pub fn mark_ready(&self) {
		if let Some(collection) = self.collection() {
			collection.sync_mark_ready();
		}
	}

	/// Single event clearing the synced state of the collection.
	pub fn truncate(&self) {
		if let Some(collection) = self.collection() {
			collection.sync_truncate();
		}
	}

	/// Surfaces a source failure through the collection status.
	pub fn error(&self, message: impl Into<String>) {
		if let Some(collection) = self.collection() {
			collection.sync_error(message.into());
		}
	}
}
