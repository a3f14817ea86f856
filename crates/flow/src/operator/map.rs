// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::sync::Arc;

use reflexdb_type::Value;

use crate::{
	multiset::{Delta, MultiSet},
	operator::Operator,
};

pub type KeyValueFn = Arc<dyn Fn(&Value, &Value) -> (Value, Value) + Send + Sync>;

/// Pointwise transform of `(key, payload)`; multiplicities pass through.
/// Re-keying (`key_by`) is a map whose closure derives a new key.
pub struct Map {
	name: &'static str,
	f: KeyValueFn,
}

impl Map {
	pub fn new(f: KeyValueFn) -> Self {
		Self { name: "map", f }
	}

	/// Rewraps the stream under a key derived from the payload.
	pub fn key_by(f: Arc<dyn Fn(&Value) -> Value + Send + Sync>) -> Self {
		Self {
			name: "key_by",
			f: Arc::new(move |_key, payload| (f(payload), payload.clone())),
		}
	}

	/// Payload-only transform.
	pub fn values(f: Arc<dyn Fn(&Value) -> Value + Send + Sync>) -> Self {
		Self {
			name: "map",
			f: Arc::new(move |key, payload| (key.clone(), f(payload))),
		}
	}
}

impl Operator for Map {
	fn name(&self) -> &'static str {
		self.name
	}

	fn apply(&mut self, inputs: Vec<MultiSet>) -> MultiSet {
		let mut out = MultiSet::new();
		for batch in inputs {
			for delta in batch.iter() {
				let (key, value) = (self.f)(&delta.key, &delta.value);
				out.push(Delta { key, value, diff: delta.diff });
			}
		}
		out
	}
}
