// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::{
	fmt::{self, Display, Formatter},
	hash::{Hash, Hasher},
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ordered_float::OrderedF64;

/// The kind of a [`Value`], used in diagnostics and type-rank ordering.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
	Undefined,
	Bool,
	Int,
	Float,
	BigInt,
	Date,
	Text,
	List,
	Record,
}

impl Display for ValueKind {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			ValueKind::Undefined => f.write_str("UNDEFINED"),
			ValueKind::Bool => f.write_str("BOOL"),
			ValueKind::Int => f.write_str("INT"),
			ValueKind::Float => f.write_str("FLOAT"),
			ValueKind::BigInt => f.write_str("BIGINT"),
			ValueKind::Date => f.write_str("DATE"),
			ValueKind::Text => f.write_str("TEXT"),
			ValueKind::List => f.write_str("LIST"),
			ValueKind::Record => f.write_str("RECORD"),
		}
	}
}

/// A dynamically typed record value.
///
/// Equality is structural; `Record` equality ignores field order while
/// iteration preserves insertion order, which is how SELECT authoring order
/// survives projection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
	/// Value is not defined (think null in common programming languages)
	Undefined,
	Bool(bool),
	Int(i64),
	Float(OrderedF64),
	/// Arbitrary-precision integer, carried as i128.
	BigInt(i128),
	/// Milliseconds since the Unix epoch.
	Date(i64),
	Text(String),
	List(Vec<Value>),
	Record(IndexMap<String, Value>),
}

impl Eq for Value {}

impl From<&Value> for ValueKind {
	fn from(value: &Value) -> Self {
		match value {
			Value::Undefined => ValueKind::Undefined,
			Value::Bool(_) => ValueKind::Bool,
			Value::Int(_) => ValueKind::Int,
			Value::Float(_) => ValueKind::Float,
			Value::BigInt(_) => ValueKind::BigInt,
			Value::Date(_) => ValueKind::Date,
			Value::Text(_) => ValueKind::Text,
			Value::List(_) => ValueKind::List,
			Value::Record(_) => ValueKind::Record,
		}
	}
}

impl Value {
	pub fn kind(&self) -> ValueKind {
		ValueKind::from(self)
	}

	/// NaN becomes `Undefined`, every other f64 is representable.
	pub fn float(v: impl Into<f64>) -> Self {
		OrderedF64::try_from(v.into()).map(Value::Float).unwrap_or(Value::Undefined)
	}

	pub fn text(v: impl Into<String>) -> Self {
		Value::Text(v.into())
	}

	pub fn record<I, S>(fields: I) -> Self
	where
		I: IntoIterator<Item = (S, Value)>,
		S: Into<String>,
	{
		Value::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
	}

	pub fn is_undefined(&self) -> bool {
		matches!(self, Value::Undefined)
	}

	/// True only for `Bool(true)`; everything else (including `Undefined`)
	/// is not truthy. Filter predicates rely on this.
	pub fn is_truthy(&self) -> bool {
		matches!(self, Value::Bool(true))
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Value::Bool(b) => Some(*b),
			_ => None,
		}
	}

	pub fn as_int(&self) -> Option<i64> {
		match self {
			Value::Int(i) => Some(*i),
			_ => None,
		}
	}

	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Value::Int(i) => Some(*i as f64),
			Value::Float(f) => Some(f.value()),
			Value::BigInt(i) => Some(*i as f64),
			_ => None,
		}
	}

	pub fn as_text(&self) -> Option<&str> {
		match self {
			Value::Text(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_record(&self) -> Option<&IndexMap<String, Value>> {
		match self {
			Value::Record(fields) => Some(fields),
			_ => None,
		}
	}

	/// Field lookup on a record; `Undefined` for anything else or a missing
	/// field. Never panics.
	pub fn field(&self, name: &str) -> Value {
		match self {
			Value::Record(fields) => fields.get(name).cloned().unwrap_or(Value::Undefined),
			_ => Value::Undefined,
		}
	}

	/// Walks a path of record fields, `Undefined` past the first miss.
	pub fn at_path<S: AsRef<str>>(&self, path: &[S]) -> Value {
		let mut current = self.clone();
		for segment in path {
			current = current.field(segment.as_ref());
		}
		current
	}

	/// Deterministic textual encoding, used for pool parameter keys and
	/// derived collection keys. `Undefined` encodes distinctly from every
	/// defined value.
	pub fn canonical(&self) -> String {
		serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
	}
}

impl Hash for Value {
	fn hash<H: Hasher>(&self, state: &mut H) {
		std::mem::discriminant(self).hash(state);
		match self {
			Value::Undefined => {}
			Value::Bool(b) => b.hash(state),
			Value::Int(i) => i.hash(state),
			Value::Float(f) => f.hash(state),
			Value::BigInt(i) => i.hash(state),
			Value::Date(ms) => ms.hash(state),
			Value::Text(s) => s.hash(state),
			Value::List(items) => {
				items.len().hash(state);
				for item in items {
					item.hash(state);
				}
			}
			Value::Record(fields) => {
				// Field order is not part of record identity.
				let mut entries: Vec<_> = fields.iter().collect();
				entries.sort_by(|(a, _), (b, _)| a.cmp(b));
				entries.len().hash(state);
				for (k, v) in entries {
					k.hash(state);
					v.hash(state);
				}
			}
		}
	}
}

impl Display for Value {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Value::Undefined => f.write_str("undefined"),
			Value::Bool(true) => f.write_str("true"),
			Value::Bool(false) => f.write_str("false"),
			Value::Int(value) => Display::fmt(value, f),
			Value::Float(value) => Display::fmt(value, f),
			Value::BigInt(value) => Display::fmt(value, f),
			Value::Date(ms) => write!(f, "date:{ms}"),
			Value::Text(value) => Display::fmt(value, f),
			Value::List(items) => {
				f.write_str("[")?;
				for (i, item) in items.iter().enumerate() {
					if i > 0 {
						f.write_str(", ")?;
					}
					Display::fmt(item, f)?;
				}
				f.write_str("]")
			}
			Value::Record(fields) => {
				f.write_str("{")?;
				for (i, (k, v)) in fields.iter().enumerate() {
					if i > 0 {
						f.write_str(", ")?;
					}
					write!(f, "{k}: {v}")?;
				}
				f.write_str("}")
			}
		}
	}
}

impl From<bool> for Value {
	fn from(v: bool) -> Self {
		Value::Bool(v)
	}
}

impl From<i64> for Value {
	fn from(v: i64) -> Self {
		Value::Int(v)
	}
}

impl From<i32> for Value {
	fn from(v: i32) -> Self {
		Value::Int(v as i64)
	}
}

impl From<f64> for Value {
	fn from(v: f64) -> Self {
		Value::float(v)
	}
}

impl From<&str> for Value {
	fn from(v: &str) -> Self {
		Value::Text(v.to_string())
	}
}

impl From<String> for Value {
	fn from(v: String) -> Self {
		Value::Text(v)
	}
}

/// Builds a `Value::Record` with the given fields in authoring order.
///
/// ```
/// use reflexdb_type::{Value, record};
///
/// let row = record! { "id" => 1, "name" => "ada" };
/// assert_eq!(row.field("id"), Value::Int(1));
/// ```
#[macro_export]
macro_rules! record {
	{ $( $key:literal => $value:expr ),* $(,)? } => {
		$crate::Value::record([ $( ($key, $crate::Value::from($value)) ),* ])
	};
}
