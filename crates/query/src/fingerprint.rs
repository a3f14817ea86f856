// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use serde_json::{Value as Json, json};
use xxhash_rust::xxh3::xxh3_64;

use reflexdb_core::CollectionLike;
use reflexdb_expr::Expr;
use reflexdb_type::Value;

use crate::ir::{QueryIr, SelectItem, Source};

/// Structural fingerprint of a plan, excluding literal parameter values:
/// two queries that differ only in WHERE literals hash identically and can
/// share one compiled dataflow.
pub fn fingerprint(ir: &QueryIr) -> u64 {
	xxh3_64(canonical_ir(ir).to_string().as_bytes())
}

/// Canonical routing key for a parameter tuple. Uses the typed canonical
/// encoding, so `Undefined` is a distinct key and never conflates with a
/// textual `"null"` — the same policy the index comparator applies.
pub fn parameter_key(params: &[Value]) -> String {
	Value::List(params.to_vec()).canonical()
}

fn canonical_ir(ir: &QueryIr) -> Json {
	json!({
		"from": ir.from.as_ref().map(canonical_source),
		"joins": ir.joins.iter().map(|join| json!({
			"source": canonical_source(&join.source),
			"kind": format!("{:?}", join.kind),
			"left": canonical_expr(&join.left),
			"right": canonical_expr(&join.right),
		})).collect::<Vec<_>>(),
		"wheres": ir.wheres.iter().map(canonical_expr).collect::<Vec<_>>(),
		"fn_where": ir.fn_where.is_some(),
		"group_by": ir.group_by.iter().map(canonical_expr).collect::<Vec<_>>(),
		"having": ir.having.iter().map(canonical_expr).collect::<Vec<_>>(),
		"select": ir.select.iter().map(canonical_select).collect::<Vec<_>>(),
		"order_by": ir.order_by.iter().map(|order| json!({
			"expr": canonical_expr(&order.expr),
			"direction": format!("{:?}", order.direction),
		})).collect::<Vec<_>>(),
		"limit": ir.limit,
		"offset": ir.offset,
		"distinct": ir.distinct,
		"single_result": ir.single_result,
	})
}

fn canonical_source(source: &Source) -> Json {
	match source {
		Source::Collection { collection, alias } => json!({
			"collection": CollectionLike::id(collection.as_ref()).as_str(),
			"alias": alias,
		}),
		Source::Query { query, alias } => json!({
			"query": canonical_ir(query),
			"alias": alias,
		}),
	}
}

fn canonical_select(item: &SelectItem) -> Json {
	match item {
		SelectItem::Field { target, expr } => json!({ "field": target, "expr": canonical_expr(expr) }),
		SelectItem::Spread { namespace } => json!({ "spread": namespace }),
	}
}

/// Expression structure with literals replaced by a placeholder.
fn canonical_expr(expr: &Expr) -> Json {
	match expr {
		Expr::Ref(path) => json!({ "ref": path.to_vec() }),
		Expr::Val(_) => json!("?"),
		Expr::Func(func) => json!({
			"fn": func.name,
			"args": func.args.iter().map(canonical_expr).collect::<Vec<_>>(),
		}),
		Expr::Agg(agg) => json!({ "agg": agg.name, "arg": canonical_expr(&agg.arg) }),
	}
}
