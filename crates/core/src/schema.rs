// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use serde::{Deserialize, Serialize};

use reflexdb_type::Value;

/// One validation finding with the path of the offending field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchemaIssue {
	pub path: Vec<String>,
	pub message: String,
}

impl SchemaIssue {
	pub fn new(path: &[&str], message: impl Into<String>) -> Self {
		Self { path: path.iter().map(|s| s.to_string()).collect(), message: message.into() }
	}
}

/// Caller-supplied record validation, run synchronously on insert and
/// update before any state is touched. An empty issue list accepts the row.
pub trait Schema: Send + Sync {
	fn validate(&self, value: &Value) -> Vec<SchemaIssue>;
}

impl<F> Schema for F
where
	F: Fn(&Value) -> Vec<SchemaIssue> + Send + Sync,
{
	fn validate(&self, value: &Value) -> Vec<SchemaIssue> {
		self(value)
	}
}
