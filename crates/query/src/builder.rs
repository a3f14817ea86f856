// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::sync::Arc;

use reflexdb_core::CollectionLike;
use reflexdb_expr::Expr;
use reflexdb_flow::JoinKind;

use crate::{
	Error,
	ir::{Direction, JoinClause, OrderBy, QueryIr, RowPredicate, SelectItem, Source},
};

/// Typed query builder; the fluent surface over [`QueryIr`].
///
/// ```ignore
/// let query = Query::from(users.clone(), "users")
/// 	.where_(Expr::field("users.active").eq(Expr::val(true)))
/// 	.build()?;
/// ```
#[derive(Default)]
pub struct Query {
	ir: QueryIr,
	errors: Vec<Error>,
}

impl Query {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn from(collection: Arc<dyn CollectionLike>, alias: &str) -> Self {
		Query::new().source(Source::Collection { collection, alias: alias.to_string() })
	}

	pub fn from_query(query: QueryIr, alias: &str) -> Self {
		Query::new().source(Source::Query { query: Box::new(query), alias: alias.to_string() })
	}

	fn source(mut self, source: Source) -> Self {
		if self.ir.from.is_some() {
			self.errors.push(Error::OnlyOneSourceAllowed);
			return self;
		}
		self.ir.from = Some(source);
		self
	}

	pub fn join(
		mut self,
		collection: Arc<dyn CollectionLike>,
		alias: &str,
		kind: JoinKind,
		left: Expr,
		right: Expr,
	) -> Self {
		self.ir.joins.push(JoinClause {
			source: Source::Collection { collection, alias: alias.to_string() },
			kind,
			left,
			right,
		});
		self
	}

	pub fn join_query(mut self, query: QueryIr, alias: &str, kind: JoinKind, left: Expr, right: Expr) -> Self {
		self.ir.joins.push(JoinClause {
			source: Source::Query { query: Box::new(query), alias: alias.to_string() },
			kind,
			left,
			right,
		});
		self
	}

	/// Multiple calls conjoin.
	pub fn where_(mut self, predicate: Expr) -> Self {
		self.ir.wheres.push(predicate);
		self
	}

	/// Arbitrary row predicate; disables pooling and index acceleration.
	pub fn where_fn(mut self, predicate: RowPredicate) -> Self {
		self.ir.fn_where = Some(predicate);
		self
	}

	pub fn group_by(mut self, expr: Expr) -> Self {
		self.ir.group_by.push(expr);
		self
	}

	pub fn having(mut self, predicate: Expr) -> Self {
		self.ir.having.push(predicate);
		self
	}

	pub fn select(mut self, target: &str, expr: Expr) -> Self {
		self.ir.select.push(SelectItem::Field { target: target.to_string(), expr });
		self
	}

	/// Spread a namespace's fields into the output row at this position.
	pub fn select_spread(mut self, namespace: &str) -> Self {
		self.ir.select.push(SelectItem::Spread { namespace: namespace.to_string() });
		self
	}

	pub fn order_by(mut self, expr: Expr, direction: Direction) -> Self {
		self.ir.order_by.push(OrderBy { expr, direction });
		self
	}

	pub fn limit(mut self, limit: usize) -> Self {
		self.ir.limit = Some(limit);
		self
	}

	pub fn offset(mut self, offset: usize) -> Self {
		self.ir.offset = offset;
		self
	}

	pub fn distinct(mut self) -> Self {
		self.ir.distinct = true;
		self
	}

	/// Single-result query: the output exposes the sole value or nothing.
	pub fn find_one(mut self) -> Self {
		self.ir.single_result = true;
		self
	}

	pub fn build(self) -> crate::Result<QueryIr> {
		if let Some(error) = self.errors.into_iter().next() {
			return Err(error);
		}
		if self.ir.from.is_none() {
			return Err(Error::QueryMustHaveFromClause);
		}
		validate_sources(&self.ir, true)?;
		Ok(self.ir)
	}
}

fn validate_sources(ir: &QueryIr, top_level: bool) -> crate::Result<()> {
	match &ir.from {
		None if top_level => return Err(Error::QueryMustHaveFromClause),
		None => return Err(Error::SubQueryMustHaveFromClause),
		Some(Source::Query { query, .. }) => validate_sources(query, false)?,
		Some(Source::Collection { .. }) => {}
	}
	for join in &ir.joins {
		if let Source::Query { query, .. } = &join.source {
			validate_sources(query, false)?;
		}
	}
	Ok(())
}
