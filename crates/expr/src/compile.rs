// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::sync::Arc;

use smallvec::SmallVec;

use reflexdb_type::Value;

use crate::{Error, Expr, function::scalar_function};

/// A compiled `(row) -> Value` closure. Rows are namespaced records
/// (`{alias: {..fields}}`); evaluators never panic on malformed rows.
pub type RowEvaluator = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Compiles an expression tree into a per-row evaluator. The walk happens
/// once per query; the returned closure is called on every flowing row.
///
/// Aggregate placeholders cannot be evaluated per row and are rejected here;
/// the group/aggregate block patches them in during GROUP BY processing.
pub fn compile(expr: &Expr) -> crate::Result<RowEvaluator> {
	match expr {
		Expr::Ref(path) => {
			let path = path.clone();
			Ok(Arc::new(move |row| row.at_path(&path)))
		}
		Expr::Val(value) => {
			let value = value.clone();
			Ok(Arc::new(move |_| value.clone()))
		}
		Expr::Func(func) => {
			let implementation = scalar_function(&func.name)
				.ok_or_else(|| Error::UnknownFunction(func.name.clone()))?;
			let args: Vec<RowEvaluator> =
				func.args.iter().map(compile).collect::<crate::Result<_>>()?;
			Ok(Arc::new(move |row| {
				let evaluated: SmallVec<[Value; 4]> = args.iter().map(|arg| arg(row)).collect();
				implementation.eval(&evaluated)
			}))
		}
		Expr::Agg(agg) => Err(Error::AggregateNotAllowed(agg.name.clone())),
	}
}

/// Compiles a predicate: truthy output keeps the row.
pub fn compile_predicate(expr: &Expr) -> crate::Result<Arc<dyn Fn(&Value) -> bool + Send + Sync>> {
	let evaluator = compile(expr)?;
	Ok(Arc::new(move |row| evaluator(row).is_truthy()))
}

#[cfg(test)]
mod tests {
	use reflexdb_type::record;

	use super::*;

	fn row() -> Value {
		Value::record([("users", record! { "id" => 1, "active" => true, "age" => 30 })])
	}

	#[test]
	fn test_ref_resolves_namespaced_field() {
		let eval = compile(&Expr::field("users.age")).unwrap();
		assert_eq!(eval(&row()), Value::Int(30));
	}

	#[test]
	fn test_missing_field_is_undefined() {
		let eval = compile(&Expr::field("users.missing")).unwrap();
		assert_eq!(eval(&row()), Value::Undefined);
	}

	#[test]
	fn test_nested_function_composition() {
		let expr = Expr::field("users.age").gte(Expr::val(18)).and(Expr::field("users.active"));
		let eval = compile(&expr).unwrap();
		assert_eq!(eval(&row()), Value::Bool(true));
	}

	#[test]
	fn test_unknown_function_fails_compile() {
		let expr = Expr::func("frobnicate", vec![]);
		match compile(&expr) {
			Err(e) => assert_eq!(e, Error::UnknownFunction("frobnicate".to_string())),
			Ok(_) => panic!("expected compile to fail"),
		}
	}

	#[test]
	fn test_aggregate_rejected_outside_group() {
		let expr = Expr::agg("count", Expr::field("users.id"));
		assert!(matches!(compile(&expr), Err(Error::AggregateNotAllowed(_))));
	}
}
