// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::{cmp::Ordering, sync::Arc};

use indexmap::IndexMap;

use reflexdb_core::{CollectionId, CollectionLike};
use reflexdb_expr::{Aggregate, Expr, RowEvaluator, aggregate, compile as compile_expr, compile_predicate};
use reflexdb_flow::{
	CompareFn, Consolidate, Distinct, Filter, FlowGraph, FlowOptions, Join, Map, NodeId, Reduce,
	TopK,
};
use reflexdb_index::IndexOp;
use reflexdb_type::{Value, compare};

use crate::{
	Error,
	ir::{Direction, QueryIr, SelectItem, Source},
};

/// One bound source: the graph input node fed by this collection's deltas.
pub struct QueryInput {
	pub alias: String,
	pub collection: Arc<dyn CollectionLike>,
	pub node: NodeId,
	/// The top-level FROM source; index acceleration applies to it.
	pub root: bool,
	/// Participates in a join, so buffering-time reads go through
	/// `fetch_snapshot`.
	pub join_member: bool,
}

/// A lowered query: the dataflow graph plus what the coordinator needs to
/// wire it to live collections.
pub struct CompiledQuery {
	pub graph: FlowGraph,
	pub inputs: Vec<QueryInput>,
	pub output: NodeId,
	/// Read-time ordering for `order_by` without a window.
	pub comparator: Option<CompareFn>,
	pub single_result: bool,
	/// Root WHERE clauses answerable by a collection index:
	/// `(ref, op, literal)` with the ref still alias-qualified.
	pub root_params: Vec<(Expr, IndexOp, Value)>,
	pub root_alias: Option<String>,
}

/// Lowers a query IR to a dataflow graph: bind sources (recursing into
/// subqueries), predicates, group/aggregate, select with spread handling,
/// the ordered window, then distinct.
pub fn compile(
	ir: &QueryIr,
	options: FlowOptions,
	self_id: Option<&CollectionId>,
) -> crate::Result<CompiledQuery> {
	let mut graph = FlowGraph::new(options);
	let mut inputs = Vec::new();

	let node = build_query(&mut graph, &mut inputs, ir, self_id, true)?;
	let output = graph.add(Box::new(Consolidate::new()), &[node]);
	graph.mark_output(output);

	let comparator = if ir.order_by.is_empty() { None } else { Some(build_comparator(&ir.order_by)?) };
	let root_alias = ir.from.as_ref().map(|source| source.alias().to_string());

	Ok(CompiledQuery {
		graph,
		inputs,
		output,
		comparator,
		single_result: ir.single_result,
		root_params: root_index_params(ir),
		root_alias,
	})
}

fn build_query(
	graph: &mut FlowGraph,
	inputs: &mut Vec<QueryInput>,
	ir: &QueryIr,
	self_id: Option<&CollectionId>,
	top_level: bool,
) -> crate::Result<NodeId> {
	let from = ir.from.as_ref().ok_or(if top_level {
		Error::QueryMustHaveFromClause
	} else {
		Error::SubQueryMustHaveFromClause
	})?;

	let join_member = !ir.joins.is_empty();
	let mut node = bind_source(graph, inputs, from, self_id, top_level, join_member)?;
	let mut aliases = vec![from.alias().to_string()];

	// Joins: wrap each side as (join_key, [row_key, row]), join, then
	// re-key by the composite of both source keys and merge namespaces.
	for join in &ir.joins {
		let right = bind_source(graph, inputs, &join.source, self_id, false, true)?;

		let left_key = compile_expr(&join.left)?;
		let right_key = compile_expr(&join.right)?;
		let left_arm = graph.add(
			Box::new(Map::new(Arc::new(move |key: &Value, row: &Value| {
				(left_key(row), Value::List(vec![key.clone(), row.clone()]))
			}))),
			&[node],
		);
		let right_arm = graph.add(
			Box::new(Map::new(Arc::new(move |key: &Value, row: &Value| {
				(right_key(row), Value::List(vec![key.clone(), row.clone()]))
			}))),
			&[right],
		);
		let joined = graph.add(Box::new(Join::new(join.kind)), &[left_arm, right_arm]);

		let left_aliases = aliases.clone();
		let right_alias = join.source.alias().to_string();
		let right_alias_for_closure = right_alias.clone();
		node = graph.add(
			Box::new(Map::new(Arc::new(move |_join_key: &Value, pair: &Value| {
				unwrap_join_pair(pair, &left_aliases, &right_alias_for_closure)
			}))),
			&[joined],
		);
		aliases.push(right_alias);
	}

	// WHERE conjunction, one filter per clause.
	for clause in &ir.wheres {
		let predicate = compile_predicate(clause)?;
		node = graph.add(Box::new(Filter::new(predicate)), &[node]);
	}
	if let Some(predicate) = &ir.fn_where {
		node = graph.add(Box::new(Filter::new(predicate.clone())), &[node]);
	}

	// GROUP BY + aggregates, or plain SELECT projection.
	if ir.has_aggregates() {
		node = build_group_block(graph, ir, node)?;
	} else if !ir.select.is_empty() {
		let project = build_projection(&ir.select)?;
		node = graph.add(Box::new(Map::values(project)), &[node]);
	} else if ir.joins.is_empty() {
		// Single-source, select-less queries emit the bare row.
		let alias = from.alias().to_string();
		node = graph.add(
			Box::new(Map::values(Arc::new(move |row: &Value| row.field(&alias)))),
			&[node],
		);
	}

	// Ordered window for order_by + limit/offset; findOne is a window of 1.
	let limit = match (ir.limit, ir.single_result) {
		(Some(limit), _) => Some(limit),
		(None, true) => Some(1),
		(None, false) => None,
	};
	if limit.is_some() || ir.offset > 0 {
		let comparator = if ir.order_by.is_empty() {
			arrival_order()
		} else {
			build_comparator(&ir.order_by)?
		};
		node = graph.add(Box::new(TopK::new(comparator, limit, ir.offset)), &[node]);
	}

	if ir.distinct {
		node = graph.add(Box::new(Distinct::new()), &[node]);
	}
	Ok(node)
}

/// Binds a FROM or JOIN source: an input node whose payload is wrapped in
/// the source's namespace. Subqueries lower into the same graph.
fn bind_source(
	graph: &mut FlowGraph,
	inputs: &mut Vec<QueryInput>,
	source: &Source,
	self_id: Option<&CollectionId>,
	root: bool,
	join_member: bool,
) -> crate::Result<NodeId> {
	match source {
		Source::Collection { collection, alias } => {
			if Some(CollectionLike::id(collection.as_ref())) == self_id {
				return Err(Error::CyclicQuery(alias.clone()));
			}
			let input = graph.input();
			inputs.push(QueryInput {
				alias: alias.clone(),
				collection: collection.clone(),
				node: input,
				root,
				join_member,
			});
			let alias = alias.clone();
			Ok(graph.add(
				Box::new(Map::values(Arc::new(move |row: &Value| {
					Value::record([(alias.clone(), row.clone())])
				}))),
				&[input],
			))
		}
		Source::Query { query, alias } => {
			let nested = build_query(graph, inputs, query, self_id, false)?;
			let alias = alias.clone();
			Ok(graph.add(
				Box::new(Map::values(Arc::new(move |row: &Value| {
					Value::record([(alias.clone(), row.clone())])
				}))),
				&[nested],
			))
		}
	}
}

/// `[left, right]` join payload → composite key + merged namespaces, with
/// `Undefined` pads expanded per alias.
fn unwrap_join_pair(pair: &Value, left_aliases: &[String], right_alias: &str) -> (Value, Value) {
	let side = |at: usize| -> (Value, Option<Value>) {
		match pair {
			Value::List(items) => match items.get(at) {
				Some(Value::List(entry)) if entry.len() == 2 => {
					(entry[0].clone(), Some(entry[1].clone()))
				}
				_ => (Value::Undefined, None),
			},
			_ => (Value::Undefined, None),
		}
	};
	let (left_key, left_row) = side(0);
	let (right_key, right_row) = side(1);

	let mut merged: IndexMap<String, Value> = IndexMap::new();
	match left_row {
		Some(Value::Record(fields)) => merged.extend(fields),
		_ => {
			for alias in left_aliases {
				merged.insert(alias.clone(), Value::Undefined);
			}
		}
	}
	match right_row {
		Some(Value::Record(fields)) => merged.extend(fields),
		_ => {
			merged.insert(right_alias.to_string(), Value::Undefined);
		}
	}

	(Value::List(vec![left_key, right_key]), Value::Record(merged))
}

enum GroupItem {
	Plain { target: String, evaluator: RowEvaluator },
	Agg { target: String, aggregate: Aggregate, argument: RowEvaluator },
	Spread { namespace: String },
}

/// key_by(group key) → reduce. Aggregate placeholders in SELECT are patched
/// here: they fold over the group's rows while plain fields evaluate on a
/// representative row. HAVING filters the reduced output rows.
fn build_group_block(graph: &mut FlowGraph, ir: &QueryIr, node: NodeId) -> crate::Result<NodeId> {
	let group_evals: Vec<RowEvaluator> =
		ir.group_by.iter().map(compile_expr).collect::<reflexdb_expr::Result<_>>()?;
	let keyed = graph.add(
		Box::new(Map::key_by(Arc::new(move |row: &Value| {
			Value::List(group_evals.iter().map(|eval| eval(row)).collect())
		}))),
		&[node],
	);

	let select = if ir.select.is_empty() { synthesized_select(ir) } else { ir.select.clone() };
	let mut items = Vec::new();
	for item in &select {
		match item {
			SelectItem::Spread { namespace } => {
				items.push(GroupItem::Spread { namespace: namespace.clone() })
			}
			SelectItem::Field { target, expr } => match expr {
				Expr::Agg(agg) => {
					let aggregate = aggregate(&agg.name)
						.ok_or_else(|| reflexdb_expr::Error::UnknownAggregate(agg.name.clone()))?;
					items.push(GroupItem::Agg {
						target: target.clone(),
						aggregate,
						argument: compile_expr(&agg.arg)?,
					});
				}
				expr => items.push(GroupItem::Plain {
					target: target.clone(),
					evaluator: compile_expr(expr)?,
				}),
			},
		}
	}

	let fold = Arc::new(move |_key: &Value, rows: &[(Value, isize)]| {
		let representative =
			rows.iter().find(|(_, m)| *m > 0).map(|(row, _)| row).cloned().unwrap_or(Value::Undefined);
		let mut out: IndexMap<String, Value> = IndexMap::new();
		for item in &items {
			match item {
				GroupItem::Plain { target, evaluator } => {
					out.insert(target.clone(), evaluator(&representative));
				}
				GroupItem::Spread { namespace } => {
					if let Value::Record(fields) = representative.field(namespace) {
						out.extend(fields);
					}
				}
				GroupItem::Agg { target, aggregate, argument } => {
					let weighted: Vec<(Value, isize)> = rows
						.iter()
						.map(|(row, mult)| ((aggregate.pre_map)(&argument(row)), *mult))
						.collect();
					out.insert(target.clone(), aggregate.apply(&weighted));
				}
			}
		}
		Value::Record(out)
	});
	let mut node = graph.add(Box::new(Reduce::new(fold)), &[keyed]);

	for clause in &ir.having {
		let predicate = compile_predicate(clause)?;
		node = graph.add(Box::new(Filter::new(predicate)), &[node]);
	}
	Ok(node)
}

/// Grouped query without an explicit SELECT: emit the group key fields,
/// named after the last ref segment (or positionally).
fn synthesized_select(ir: &QueryIr) -> Vec<SelectItem> {
	ir.group_by
		.iter()
		.enumerate()
		.map(|(at, expr)| {
			let target = expr
				.as_ref_path()
				.and_then(|path| path.last().cloned())
				.unwrap_or_else(|| format!("group_{at}"));
			SelectItem::Field { target, expr: expr.clone() }
		})
		.collect()
}

pub(crate) fn build_projection(
	select: &[SelectItem],
) -> crate::Result<Arc<dyn Fn(&Value) -> Value + Send + Sync>> {
	enum Item {
		Field { target: String, evaluator: RowEvaluator },
		Spread { namespace: String },
	}
	let mut items = Vec::new();
	for item in select {
		match item {
			SelectItem::Field { target, expr } => items.push(Item::Field {
				target: target.clone(),
				evaluator: compile_expr(expr)?,
			}),
			SelectItem::Spread { namespace } => {
				items.push(Item::Spread { namespace: namespace.clone() })
			}
		}
	}
	Ok(Arc::new(move |row: &Value| {
		let mut out: IndexMap<String, Value> = IndexMap::new();
		for item in &items {
			match item {
				Item::Field { target, evaluator } => {
					out.insert(target.clone(), evaluator(row));
				}
				Item::Spread { namespace } => {
					if let Value::Record(fields) = row.field(namespace) {
						out.extend(fields);
					}
				}
			}
		}
		Value::Record(out)
	}))
}

/// Chained ordering over output rows; `Undefined` stays the minimal
/// element in both directions, which keeps windows over partially
/// undefined values terminating.
fn build_comparator(order_by: &[crate::ir::OrderBy]) -> crate::Result<CompareFn> {
	let items: Vec<(RowEvaluator, Direction)> = order_by
		.iter()
		.map(|order| Ok((compile_expr(&order.expr)?, order.direction)))
		.collect::<crate::Result<_>>()?;
	Ok(Arc::new(move |a: &Value, b: &Value| {
		for (evaluator, direction) in &items {
			let ordering = compare(&evaluator(a), &evaluator(b));
			let ordering = match direction {
				Direction::Asc => ordering,
				Direction::Desc => ordering.reverse(),
			};
			if ordering != Ordering::Equal {
				return ordering;
			}
		}
		Ordering::Equal
	}))
}

/// Window without ordering: everything compares equal and the fractional
/// tie-break keeps arrival order.
fn arrival_order() -> CompareFn {
	Arc::new(|_a: &Value, _b: &Value| Ordering::Equal)
}

/// WHERE clauses on the root source that an index could answer:
/// comparison functions over `(ref, literal)`.
fn root_index_params(ir: &QueryIr) -> Vec<(Expr, IndexOp, Value)> {
	let mut params = Vec::new();
	for clause in &ir.wheres {
		let Expr::Func(func) = clause else { continue };
		let op = match func.name.as_str() {
			"eq" => IndexOp::Eq,
			"gt" => IndexOp::Gt,
			"gte" => IndexOp::Gte,
			"lt" => IndexOp::Lt,
			"lte" => IndexOp::Lte,
			"in" => IndexOp::In,
			_ => continue,
		};
		if func.args.len() != 2 {
			continue;
		}
		match (&func.args[0], &func.args[1]) {
			(Expr::Ref(path), Expr::Val(value)) => {
				params.push((Expr::Ref(path.clone()), op, value.clone()))
			}
			(Expr::Val(value), Expr::Ref(path)) if op == IndexOp::Eq => {
				params.push((Expr::Ref(path.clone()), op, value.clone()))
			}
			_ => {}
		}
	}
	params
}
