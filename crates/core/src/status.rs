// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use serde::{Deserialize, Serialize};

/// Collection lifecycle.
///
/// `Idle` until the first subscriber or preload starts the source;
/// `Loading` while the initial snapshot is in flight; `InitialCommit` while
/// the first batch is being applied; `Ready` once the first commit (or an
/// early `mark_ready`) lands. `CleanedUp` collections restart sync with a
/// fresh state on the next access.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollectionStatus {
	Idle,
	Loading,
	InitialCommit,
	Ready,
	Error,
	CleanedUp,
}

impl CollectionStatus {
	pub fn is_ready(&self) -> bool {
		matches!(self, CollectionStatus::Ready)
	}

	pub fn can_transition(self, to: CollectionStatus) -> bool {
		use CollectionStatus::*;
		match (self, to) {
			(Idle, Loading) => true,
			(Loading, InitialCommit | Ready | Error) => true,
			(InitialCommit, Ready | Error) => true,
			(Ready, Error) => true,
			(Error, Loading) => true,
			// Cooperative cleanup is allowed from anywhere, and any access
			// afterwards resets to Idle for a fresh sync.
			(_, CleanedUp) => true,
			(CleanedUp, Idle) => true,
			_ => false,
		}
	}
}
