// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::{collections::HashMap, sync::Arc};

use once_cell::sync::Lazy;

use reflexdb_type::Value;

mod arithmetic;
mod comparison;
mod logic;
mod text;

/// A compiled n-ary scalar operator.
///
/// Implementations are total: they never panic on malformed input and map
/// undefined or mistyped operands to `Undefined` (or `false` for
/// predicates), so a bad row degrades to a skipped row rather than a failed
/// query.
pub trait ScalarFunction: Send + Sync {
	fn name(&self) -> &'static str;
	fn eval(&self, args: &[Value]) -> Value;
}

static REGISTRY: Lazy<HashMap<&'static str, Arc<dyn ScalarFunction>>> = Lazy::new(|| {
	let functions: Vec<Arc<dyn ScalarFunction>> = vec![
		Arc::new(comparison::Eq),
		Arc::new(comparison::Neq),
		Arc::new(comparison::Gt),
		Arc::new(comparison::Gte),
		Arc::new(comparison::Lt),
		Arc::new(comparison::Lte),
		Arc::new(comparison::In),
		Arc::new(logic::And),
		Arc::new(logic::Or),
		Arc::new(logic::Not),
		Arc::new(arithmetic::Add),
		Arc::new(arithmetic::Sub),
		Arc::new(arithmetic::Mul),
		Arc::new(arithmetic::Div),
		Arc::new(text::Upper),
		Arc::new(text::Lower),
		Arc::new(text::Length),
		Arc::new(text::Concat),
		Arc::new(text::Like),
		Arc::new(text::Coalesce),
	];
	functions.into_iter().map(|f| (f.name(), f)).collect()
});

/// Resolve a scalar operator by registry name.
pub fn scalar_function(name: &str) -> Option<Arc<dyn ScalarFunction>> {
	REGISTRY.get(name).cloned()
}
