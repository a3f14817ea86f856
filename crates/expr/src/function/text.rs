// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use reflexdb_type::Value;

use crate::function::ScalarFunction;

pub struct Upper;

impl ScalarFunction for Upper {
	fn name(&self) -> &'static str {
		"upper"
	}

	fn eval(&self, args: &[Value]) -> Value {
		match args {
			[Value::Text(s)] => Value::Text(s.to_uppercase()),
			_ => Value::Undefined,
		}
	}
}

pub struct Lower;

impl ScalarFunction for Lower {
	fn name(&self) -> &'static str {
		"lower"
	}

	fn eval(&self, args: &[Value]) -> Value {
		match args {
			[Value::Text(s)] => Value::Text(s.to_lowercase()),
			_ => Value::Undefined,
		}
	}
}

pub struct Length;

impl ScalarFunction for Length {
	fn name(&self) -> &'static str {
		"length"
	}

	fn eval(&self, args: &[Value]) -> Value {
		match args {
			[Value::Text(s)] => Value::Int(s.chars().count() as i64),
			[Value::List(items)] => Value::Int(items.len() as i64),
			_ => Value::Undefined,
		}
	}
}

pub struct Concat;

impl ScalarFunction for Concat {
	fn name(&self) -> &'static str {
		"concat"
	}

	fn eval(&self, args: &[Value]) -> Value {
		let mut out = String::new();
		for arg in args {
			match arg {
				Value::Undefined => return Value::Undefined,
				other => out.push_str(&other.to_string()),
			}
		}
		Value::Text(out)
	}
}

/// SQL LIKE with `%` (any run) and `_` (any single char).
pub struct Like;

impl ScalarFunction for Like {
	fn name(&self) -> &'static str {
		"like"
	}

	fn eval(&self, args: &[Value]) -> Value {
		match args {
			[Value::Text(s), Value::Text(pattern)] => {
				let text: Vec<char> = s.chars().collect();
				let pat: Vec<char> = pattern.chars().collect();
				Value::Bool(like_match(&text, &pat))
			}
			_ => Value::Bool(false),
		}
	}
}

fn like_match(text: &[char], pattern: &[char]) -> bool {
	match pattern.first() {
		None => text.is_empty(),
		Some('%') => {
			// Greedy backtracking over the remaining suffixes.
			(0..=text.len()).any(|skip| like_match(&text[skip..], &pattern[1..]))
		}
		Some('_') => !text.is_empty() && like_match(&text[1..], &pattern[1..]),
		Some(c) => text.first() == Some(c) && like_match(&text[1..], &pattern[1..]),
	}
}

pub struct Coalesce;

impl ScalarFunction for Coalesce {
	fn name(&self) -> &'static str {
		"coalesce"
	}

	fn eval(&self, args: &[Value]) -> Value {
		args.iter().find(|v| !v.is_undefined()).cloned().unwrap_or(Value::Undefined)
	}
}
