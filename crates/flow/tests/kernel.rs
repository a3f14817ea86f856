// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::sync::Arc;

use reflexdb_flow::{
	Consolidate, Delta, Distinct, Filter, FlowGraph, FlowOptions, Join, JoinKind, Map, MultiSet,
	Reduce, TopK,
};
use reflexdb_type::{Value, compare, record};

fn batch(entries: Vec<Delta>) -> MultiSet {
	MultiSet::from_entries(entries)
}

fn drain(graph: &mut FlowGraph, node: reflexdb_flow::NodeId) -> Vec<Delta> {
	graph
		.take_output(node)
		.into_iter()
		.flat_map(MultiSet::into_entries)
		.collect()
}

#[test]
fn test_map_filter_pipeline() {
	let mut graph = FlowGraph::new(FlowOptions::default());
	let input = graph.input();
	let doubled = graph.add(
		Box::new(Map::values(Arc::new(|v: &Value| {
			Value::Int(v.as_int().unwrap_or(0) * 2)
		}))),
		&[input],
	);
	let big = graph.add(
		Box::new(Filter::new(Arc::new(|v: &Value| v.as_int().unwrap_or(0) > 4))),
		&[doubled],
	);
	graph.mark_output(big);

	graph.push(
		input,
		batch(vec![
			Delta::insert(Value::Int(1), Value::Int(1)),
			Delta::insert(Value::Int(2), Value::Int(3)),
		]),
	);
	let outcome = graph.run();
	assert!(outcome.completed);

	let out = drain(&mut graph, big);
	assert_eq!(out, vec![Delta::insert(Value::Int(2), Value::Int(6))]);
}

#[test]
fn test_inner_join_emits_and_retracts() {
	let mut graph = FlowGraph::new(FlowOptions::default());
	let users = graph.input();
	let departments = graph.input();
	let joined = graph.add(Box::new(Join::new(JoinKind::Inner)), &[users, departments]);
	graph.mark_output(joined);

	graph.push(users, batch(vec![Delta::insert(Value::Int(1), Value::text("ada"))]));
	graph.run();
	// No match yet: inner join stays silent.
	assert!(drain(&mut graph, joined).is_empty());

	graph.push(departments, batch(vec![Delta::insert(Value::Int(1), Value::text("eng"))]));
	graph.run();
	let out = drain(&mut graph, joined);
	assert_eq!(
		out,
		vec![Delta::insert(Value::Int(1), Join::pair(&Value::text("ada"), &Value::text("eng")))]
	);

	// Deleting the user retracts exactly one joined row.
	graph.push(users, batch(vec![Delta::remove(Value::Int(1), Value::text("ada"))]));
	graph.run();
	let out = drain(&mut graph, joined);
	assert_eq!(
		out,
		vec![Delta::remove(Value::Int(1), Join::pair(&Value::text("ada"), &Value::text("eng")))]
	);
}

#[test]
fn test_left_join_pad_retracts_on_match() {
	let mut graph = FlowGraph::new(FlowOptions::default());
	let left = graph.input();
	let right = graph.input();
	let joined = graph.add(Box::new(Join::new(JoinKind::Left)), &[left, right]);
	graph.mark_output(joined);

	graph.push(left, batch(vec![Delta::insert(Value::Int(1), Value::text("ada"))]));
	graph.run();
	let out = drain(&mut graph, joined);
	assert_eq!(
		out,
		vec![Delta::insert(Value::Int(1), Join::pair(&Value::text("ada"), &Value::Undefined))]
	);

	// Pad row retracts when the match arrives.
	graph.push(right, batch(vec![Delta::insert(Value::Int(1), Value::text("eng"))]));
	graph.run();
	let out = drain(&mut graph, joined);
	assert_eq!(
		out,
		vec![
			Delta::remove(Value::Int(1), Join::pair(&Value::text("ada"), &Value::Undefined)),
			Delta::insert(Value::Int(1), Join::pair(&Value::text("ada"), &Value::text("eng"))),
		]
	);
}

#[test]
fn test_full_join_pads_both_sides() {
	let mut graph = FlowGraph::new(FlowOptions::default());
	let left = graph.input();
	let right = graph.input();
	let joined = graph.add(Box::new(Join::new(JoinKind::Full)), &[left, right]);
	graph.mark_output(joined);

	graph.push(left, batch(vec![Delta::insert(Value::Int(1), Value::text("l"))]));
	graph.push(right, batch(vec![Delta::insert(Value::Int(2), Value::text("r"))]));
	graph.run();
	let mut out = drain(&mut graph, joined);
	out.sort_by(|a, b| compare(&a.key, &b.key));
	assert_eq!(
		out,
		vec![
			Delta::insert(Value::Int(1), Join::pair(&Value::text("l"), &Value::Undefined)),
			Delta::insert(Value::Int(2), Join::pair(&Value::Undefined, &Value::text("r"))),
		]
	);
}

#[test]
fn test_reduce_retracts_old_group_row() {
	// GroupBy-count shape: adding a second member of a group must retract
	// the old group row and insert the new one, never assert a duplicate.
	let mut graph = FlowGraph::new(FlowOptions::default());
	let input = graph.input();
	let counted = graph.add(
		Box::new(Reduce::new(Arc::new(|_key: &Value, rows: &[(Value, isize)]| {
			let total: isize = rows.iter().map(|(_, m)| *m).sum();
			Value::record([("count", Value::Int(total as i64))])
		}))),
		&[input],
	);
	graph.mark_output(counted);

	let ru = Value::text("ru");
	graph.push(input, batch(vec![Delta::insert(ru.clone(), record! { "id" => "e1" })]));
	graph.run();
	assert_eq!(
		drain(&mut graph, counted),
		vec![Delta::insert(ru.clone(), Value::record([("count", Value::Int(1))]))]
	);

	graph.push(input, batch(vec![Delta::insert(ru.clone(), record! { "id" => "e2" })]));
	graph.run();
	assert_eq!(
		drain(&mut graph, counted),
		vec![
			Delta::remove(ru.clone(), Value::record([("count", Value::Int(1))])),
			Delta::insert(ru.clone(), Value::record([("count", Value::Int(2))])),
		]
	);

	// Last member leaving removes the group row entirely.
	graph.push(
		input,
		batch(vec![
			Delta::remove(ru.clone(), record! { "id" => "e1" }),
			Delta::remove(ru.clone(), record! { "id" => "e2" }),
		]),
	);
	graph.run();
	assert_eq!(
		drain(&mut graph, counted),
		vec![Delta::remove(ru, Value::record([("count", Value::Int(2))]))]
	);
}

#[test]
fn test_distinct_clamps_multiplicity() {
	let mut graph = FlowGraph::new(FlowOptions::default());
	let input = graph.input();
	let distinct = graph.add(Box::new(Distinct::new()), &[input]);
	graph.mark_output(distinct);

	let key = Value::Int(1);
	let row = Value::text("x");
	graph.push(
		input,
		batch(vec![
			Delta { key: key.clone(), value: row.clone(), diff: 3 },
		]),
	);
	graph.run();
	assert_eq!(drain(&mut graph, distinct), vec![Delta::insert(key.clone(), row.clone())]);

	// Dropping from 3 to 1 is invisible; dropping to 0 retracts once.
	graph.push(input, batch(vec![Delta { key: key.clone(), value: row.clone(), diff: -2 }]));
	graph.run();
	assert!(drain(&mut graph, distinct).is_empty());

	graph.push(input, batch(vec![Delta { key: key.clone(), value: row.clone(), diff: -1 }]));
	graph.run();
	assert_eq!(drain(&mut graph, distinct), vec![Delta::remove(key, row)]);
}

fn value_desc() -> reflexdb_flow::CompareFn {
	Arc::new(|a: &Value, b: &Value| compare(&b.field("value"), &a.field("value")))
}

#[test]
fn test_top_k_window_eviction_emits_delete() {
	// orderBy value desc, limit 3, offset 2 over values 100,90,80,70,60:
	// the visible page is [80,70,60]. Deleting 80 slides the page to
	// [70,60] and the delete must be emitted, not silently dropped.
	let mut graph = FlowGraph::new(FlowOptions::default());
	let input = graph.input();
	let window = graph.add(Box::new(TopK::new(value_desc(), Some(3), 2)), &[input]);
	graph.mark_output(window);

	let row = |id: i64, value: i64| (Value::Int(id), record! { "id" => id, "value" => value });
	let mut seed = Vec::new();
	for (id, value) in [(1, 100), (2, 90), (3, 80), (4, 70), (5, 60)] {
		let (k, v) = row(id, value);
		seed.push(Delta::insert(k, v));
	}
	graph.push(input, batch(seed));
	graph.run();

	let mut visible: Vec<i64> = drain(&mut graph, window)
		.into_iter()
		.filter(|d| d.diff > 0)
		.map(|d| d.value.field("value").as_int().unwrap())
		.collect();
	visible.sort_unstable_by(|a, b| b.cmp(a));
	assert_eq!(visible, vec![80, 70, 60]);

	// Delete the row at visible offset 0 (value 80).
	let (k, v) = row(3, 80);
	graph.push(input, batch(vec![Delta::remove(k, v)]));
	graph.run();
	let out = drain(&mut graph, window);

	let deletes: Vec<i64> = out
		.iter()
		.filter(|d| d.diff < 0)
		.map(|d| d.value.field("value").as_int().unwrap())
		.collect();
	assert_eq!(deletes, vec![80]);

	let inserts: Vec<i64> = out
		.iter()
		.filter(|d| d.diff > 0)
		.map(|d| d.value.field("value").as_int().unwrap())
		.collect();
	assert!(inserts.is_empty(), "70 and 60 were already visible: {inserts:?}");
}

#[test]
fn test_top_k_cardinality_never_exceeds_limit() {
	let mut graph = FlowGraph::new(FlowOptions::default());
	let input = graph.input();
	let window = graph.add(Box::new(TopK::new(value_desc(), Some(2), 0)), &[input]);
	graph.mark_output(window);

	let mut live = 0isize;
	for value in [10, 50, 30, 20, 40] {
		graph.push(
			input,
			batch(vec![Delta::insert(
				Value::Int(value),
				record! { "id" => value, "value" => value },
			)]),
		);
		graph.run();
		for delta in drain(&mut graph, window) {
			live += delta.diff.signum();
		}
		assert!(live <= 2, "window grew past the limit");
	}
	assert_eq!(live, 2);
}

#[test]
fn test_top_k_ties_break_by_arrival() {
	let mut graph = FlowGraph::new(FlowOptions::default());
	let input = graph.input();
	let window = graph.add(Box::new(TopK::new(value_desc(), Some(1), 0)), &[input]);
	graph.mark_output(window);

	graph.push(
		input,
		batch(vec![
			Delta::insert(Value::Int(1), record! { "id" => 1, "value" => 7 }),
			Delta::insert(Value::Int(2), record! { "id" => 2, "value" => 7 }),
		]),
	);
	graph.run();
	let out = drain(&mut graph, window);
	assert_eq!(out.len(), 1);
	assert_eq!(out[0].value.field("id"), Value::Int(1));
}

#[test]
fn test_consolidate_folds_same_tick_noise() {
	let mut graph = FlowGraph::new(FlowOptions::default());
	let input = graph.input();
	let tidy = graph.add(Box::new(Consolidate::new()), &[input]);
	graph.mark_output(tidy);

	graph.push(
		input,
		batch(vec![
			Delta::insert(Value::Int(1), Value::text("a")),
			Delta::remove(Value::Int(1), Value::text("a")),
			Delta::insert(Value::Int(2), Value::text("b")),
		]),
	);
	graph.run();
	assert_eq!(drain(&mut graph, tidy), vec![Delta::insert(Value::Int(2), Value::text("b"))]);
}

#[test]
fn test_iteration_limit_preserves_progress() {
	let mut graph = FlowGraph::new(FlowOptions { iteration_limit: 2 });
	let input = graph.input();
	graph.mark_output(input);

	for i in 0..5 {
		graph.push(input, batch(vec![Delta::insert(Value::Int(i), Value::Int(i))]));
	}
	let outcome = graph.run();
	assert!(!outcome.completed);
	assert_eq!(outcome.iterations, 2);
	// Two batches made it through; three are still queued.
	assert_eq!(drain(&mut graph, input).len(), 2);
	assert!(graph.has_pending());

	let outcome = graph.run();
	assert!(!outcome.completed);
	let outcome = graph.run();
	assert!(outcome.completed);
	assert_eq!(drain(&mut graph, input).len(), 3);
}

#[test]
fn test_top_k_with_undefined_sort_values_terminates() {
	// Rows whose sort expression is undefined sit at the window's low end
	// (undefined is the minimal element) and window maintenance stays
	// incremental, batch after batch.
	let mut graph = FlowGraph::new(FlowOptions::default());
	let input = graph.input();
	let window = graph.add(Box::new(TopK::new(value_desc(), Some(2), 0)), &[input]);
	graph.mark_output(window);

	graph.push(
		input,
		batch(vec![
			Delta::insert(Value::Int(1), record! { "id" => 1 }),
			Delta::insert(Value::Int(2), record! { "id" => 2, "value" => 5 }),
			Delta::insert(Value::Int(3), record! { "id" => 3 }),
		]),
	);
	let outcome = graph.run();
	assert!(outcome.completed);

	let mut live: Vec<i64> = drain(&mut graph, window)
		.into_iter()
		.filter(|d| d.diff > 0)
		.map(|d| d.value.field("id").as_int().unwrap())
		.collect();
	live.sort_unstable();
	// Descending: the defined value first, then the first undefined row.
	assert_eq!(live, vec![1, 2]);

	// Removing the defined row pulls the second undefined row in.
	graph.push(
		input,
		batch(vec![Delta::remove(Value::Int(2), record! { "id" => 2, "value" => 5 })]),
	);
	let outcome = graph.run();
	assert!(outcome.completed);
	let out = drain(&mut graph, window);
	assert_eq!(out.iter().filter(|d| d.diff < 0).count(), 1);
	assert_eq!(out.iter().filter(|d| d.diff > 0).count(), 1);
}

#[test]
fn test_output_multiplicity_stays_within_unit_range() {
	// Per-key multiplicity of a consolidated query output is 0 or 1 at
	// rest, whatever the churn.
	let mut graph = FlowGraph::new(FlowOptions::default());
	let input = graph.input();
	let distinct = graph.add(Box::new(Distinct::new()), &[input]);
	let tidy = graph.add(Box::new(Consolidate::new()), &[distinct]);
	graph.mark_output(tidy);

	let mut net: std::collections::HashMap<i64, isize> = std::collections::HashMap::new();
	for round in 0..4 {
		let mut deltas = Vec::new();
		for id in 0..3 {
			let row = record! { "id" => id };
			if round % 2 == 0 {
				deltas.push(Delta { key: Value::Int(id), value: row, diff: 2 });
			} else {
				deltas.push(Delta { key: Value::Int(id), value: row, diff: -2 });
			}
		}
		graph.push(input, batch(deltas));
		graph.run();
		for delta in drain(&mut graph, tidy) {
			let key = delta.value.field("id").as_int().unwrap();
			*net.entry(key).or_insert(0) += delta.diff;
			assert!((0..=1).contains(&net[&key]), "key {key} left the unit range");
		}
	}
}
