// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::sync::Arc;

use reflexdb_core::CollectionLike;
use reflexdb_expr::Expr;
use reflexdb_flow::JoinKind;
use reflexdb_type::Value;

/// Arbitrary predicate over the namespaced row; opaque to the optimizer and
/// to the pool (a query carrying one is never poolable).
pub type RowPredicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// A query source: a collection-shaped input or a nested query.
#[derive(Clone)]
pub enum Source {
	Collection { collection: Arc<dyn CollectionLike>, alias: String },
	Query { query: Box<QueryIr>, alias: String },
}

impl Source {
	pub fn alias(&self) -> &str {
		match self {
			Source::Collection { alias, .. } => alias,
			Source::Query { alias, .. } => alias,
		}
	}
}

#[derive(Clone)]
pub struct JoinClause {
	pub source: Source,
	pub kind: JoinKind,
	/// Equi-join: `left` evaluates over the already-bound namespaces,
	/// `right` over the joined source's namespace.
	pub left: Expr,
	pub right: Expr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
	Asc,
	Desc,
}

#[derive(Clone)]
pub struct OrderBy {
	pub expr: Expr,
	pub direction: Direction,
}

/// One SELECT entry, in authoring order.
#[derive(Clone)]
pub enum SelectItem {
	/// `target: expr`; aggregate expressions are patched in during GROUP BY
	/// processing.
	Field { target: String, expr: Expr },
	/// Spread of a namespace's fields into the output row.
	Spread { namespace: String },
}

/// The query IR the builder produces and the compiler lowers.
#[derive(Clone, Default)]
pub struct QueryIr {
	pub from: Option<Source>,
	pub joins: Vec<JoinClause>,
	pub wheres: Vec<Expr>,
	pub fn_where: Option<RowPredicate>,
	pub group_by: Vec<Expr>,
	pub having: Vec<Expr>,
	pub select: Vec<SelectItem>,
	pub order_by: Vec<OrderBy>,
	pub limit: Option<usize>,
	pub offset: usize,
	pub distinct: bool,
	pub single_result: bool,
}

impl QueryIr {
	pub fn has_aggregates(&self) -> bool {
		!self.group_by.is_empty()
			|| self.select.iter().any(|item| match item {
				SelectItem::Field { expr, .. } => expr.contains_aggregate(),
				SelectItem::Spread { .. } => false,
			})
	}

	/// A plan is poolable iff it has no joins, no aggregation, no
	/// functional where clauses, no ordered windowing, no distinct, and its
	/// WHERE is a conjunction of `eq(ref, literal)` comparisons over a
	/// plain collection source.
	pub fn is_poolable(&self) -> bool {
		matches!(self.from, Some(Source::Collection { .. }))
			&& self.joins.is_empty()
			&& !self.has_aggregates()
			&& self.fn_where.is_none()
			&& self.order_by.is_empty()
			&& self.limit.is_none()
			&& self.offset == 0
			&& !self.distinct
			&& !self.wheres.is_empty()
			&& self.wheres.iter().all(|clause| eq_ref_literal(clause).is_some())
	}

	/// The `(field ref, literal)` pairs of a poolable WHERE conjunction.
	pub fn parameters(&self) -> Vec<(Expr, Value)> {
		self.wheres.iter().filter_map(eq_ref_literal).collect()
	}
}

/// Matches `eq(Ref, Val)` (either operand order), the only shape the pool
/// parameterizes.
pub fn eq_ref_literal(expr: &Expr) -> Option<(Expr, Value)> {
	let Expr::Func(func) = expr else { return None };
	if func.name != "eq" || func.args.len() != 2 {
		return None;
	}
	match (&func.args[0], &func.args[1]) {
		(Expr::Ref(path), Expr::Val(value)) => Some((Expr::Ref(path.clone()), value.clone())),
		(Expr::Val(value), Expr::Ref(path)) => Some((Expr::Ref(path.clone()), value.clone())),
		_ => None,
	}
}
