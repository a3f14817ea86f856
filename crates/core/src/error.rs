// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use reflexdb_type::Key;
use thiserror::Error;

use crate::{change::ChangeType, collection::CollectionId, schema::SchemaIssue, status::CollectionStatus};

/// Errors surfaced by collections and transactions. Validation errors are
/// synchronous; transaction failures travel through the `is_persisted` /
/// `is_synced` deferreds, which is why the type is `Clone`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
	#[error("schema validation failed on {operation:?}: {issues:?}")]
	SchemaValidation { operation: ChangeType, issues: Vec<SchemaIssue> },

	#[error("collection `{0}` is not registered")]
	UnknownCollection(CollectionId),

	#[error("collection `{0}` is not ready")]
	CollectionNotReady(CollectionId),

	#[error("invalid status transition {from:?} -> {to:?}")]
	InvalidStatusTransition { from: CollectionStatus, to: CollectionStatus },

	#[error("key `{0}` already exists")]
	DuplicateKey(Key),

	#[error("key `{0}` does not exist")]
	KeyNotFound(Key),

	#[error("transaction failed: {reason}")]
	TransactionFailed { reason: String },

	#[error("transaction is already in a terminal state")]
	TransactionClosed,

	#[error(transparent)]
	Expression(#[from] reflexdb_expr::Error),
}

impl Error {
	/// Wraps an underlying mutation or sync error the way the transaction
	/// manager attaches it to the transaction record.
	pub fn transaction_failed(reason: impl Into<String>) -> Self {
		Error::TransactionFailed { reason: reason.into() }
	}
}
