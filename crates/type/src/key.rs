// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::Value;

/// A record key: string or integer, equality by value.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Key {
	Int(i64),
	Text(String),
}

impl Key {
	/// Derives a key from a value: `Int` and `Text` map directly, anything
	/// else keys by its canonical encoding. Group rows and composite join
	/// keys land in the `Text` arm this way.
	pub fn from_value(value: &Value) -> Key {
		match value {
			Value::Int(i) => Key::Int(*i),
			Value::Text(s) => Key::Text(s.clone()),
			other => Key::Text(other.canonical()),
		}
	}
}

impl Display for Key {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Key::Int(i) => Display::fmt(i, f),
			Key::Text(s) => Display::fmt(s, f),
		}
	}
}

impl From<i64> for Key {
	fn from(v: i64) -> Self {
		Key::Int(v)
	}
}

impl From<i32> for Key {
	fn from(v: i32) -> Self {
		Key::Int(v as i64)
	}
}

impl From<&str> for Key {
	fn from(v: &str) -> Self {
		Key::Text(v.to_string())
	}
}

impl From<String> for Key {
	fn from(v: String) -> Self {
		Key::Text(v)
	}
}
