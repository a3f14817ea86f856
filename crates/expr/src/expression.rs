// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use reflexdb_type::Value;

/// Path segments of a field reference. Two segments cover the common
/// `alias.field` shape without allocating.
pub type RefPath = SmallVec<[String; 2]>;

/// Tagged expression tree, relative to a namespaced row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Expr {
	/// Field reference, e.g. `users.active`.
	Ref(RefPath),
	/// Literal value.
	Val(Value),
	/// Compiled n-ary operator, resolved by name in the scalar registry.
	Func(FuncExpr),
	/// Aggregate placeholder, patched in during GROUP BY processing.
	Agg(AggExpr),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FuncExpr {
	pub name: String,
	pub args: Vec<Expr>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggExpr {
	pub name: String,
	pub arg: Box<Expr>,
}

impl Expr {
	/// Reference from a dotted path: `Expr::field("users.active")`.
	pub fn field(path: &str) -> Expr {
		Expr::Ref(path.split('.').map(str::to_string).collect())
	}

	pub fn val(value: impl Into<Value>) -> Expr {
		Expr::Val(value.into())
	}

	pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Expr {
		Expr::Func(FuncExpr { name: name.into(), args })
	}

	pub fn agg(name: impl Into<String>, arg: Expr) -> Expr {
		Expr::Agg(AggExpr { name: name.into(), arg: Box::new(arg) })
	}

	pub fn eq(self, other: Expr) -> Expr {
		Expr::func("eq", vec![self, other])
	}

	pub fn neq(self, other: Expr) -> Expr {
		Expr::func("neq", vec![self, other])
	}

	pub fn gt(self, other: Expr) -> Expr {
		Expr::func("gt", vec![self, other])
	}

	pub fn gte(self, other: Expr) -> Expr {
		Expr::func("gte", vec![self, other])
	}

	pub fn lt(self, other: Expr) -> Expr {
		Expr::func("lt", vec![self, other])
	}

	pub fn lte(self, other: Expr) -> Expr {
		Expr::func("lte", vec![self, other])
	}

	pub fn in_list(self, values: Vec<Value>) -> Expr {
		Expr::func("in", vec![self, Expr::Val(Value::List(values))])
	}

	pub fn and(self, other: Expr) -> Expr {
		Expr::func("and", vec![self, other])
	}

	pub fn or(self, other: Expr) -> Expr {
		Expr::func("or", vec![self, other])
	}

	pub fn not(self) -> Expr {
		Expr::func("not", vec![self])
	}

	/// Does any aggregate placeholder occur in this tree?
	pub fn contains_aggregate(&self) -> bool {
		match self {
			Expr::Agg(_) => true,
			Expr::Func(f) => f.args.iter().any(Expr::contains_aggregate),
			_ => false,
		}
	}

	/// The reference path if this is a plain field reference.
	pub fn as_ref_path(&self) -> Option<&RefPath> {
		match self {
			Expr::Ref(path) => Some(path),
			_ => None,
		}
	}
}
