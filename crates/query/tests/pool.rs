// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::sync::Arc;

use reflexdb_core::{Collection, CollectionOptions, SyncedWrite};
use reflexdb_expr::Expr;
use reflexdb_query::{Query, fingerprint, query_pool};
use reflexdb_testing::ScriptedSource;
use reflexdb_type::{Key, Value, record};

fn users(id: &str, source: Arc<ScriptedSource>) -> Collection {
	Collection::new(CollectionOptions::new(id, "id").source(source))
}

fn by_team(collection: &Collection, team: Value) -> reflexdb_query::QueryIr {
	Query::from(Arc::new(collection.clone()), "users")
		.where_(Expr::field("users.team").eq(Expr::Val(team)))
		.build()
		.unwrap()
}

#[test]
fn test_same_structure_shares_fingerprint_and_plan() {
	let source = Arc::new(ScriptedSource::with_initial(vec![
		record! { "id" => 1, "team" => "red" },
		record! { "id" => 2, "team" => "blue" },
		record! { "id" => 3, "team" => "red" },
	]));
	let collection = users("pool_users_share", source.clone());
	collection.preload();

	let red = by_team(&collection, Value::text("red"));
	let blue = by_team(&collection, Value::text("blue"));

	// Literals are excluded from the structural fingerprint.
	assert_eq!(fingerprint(&red), fingerprint(&blue));
	assert!(red.is_poolable());

	let red_out = query_pool().acquire(&red).expect("poolable");
	let blue_out = query_pool().acquire(&blue).expect("poolable");

	assert_eq!(red_out.size(), 2);
	assert_eq!(blue_out.size(), 1);

	// Incoming records route by parameter tuple.
	source.push(vec![SyncedWrite::insert(record! { "id" => 4, "team" => "blue" })]);
	assert_eq!(blue_out.size(), 2);
	assert_eq!(red_out.size(), 2);

	// A row switching tuples moves between instances.
	source.push(vec![SyncedWrite::update(record! { "id" => 3, "team" => "blue" }, None)]);
	assert_eq!(red_out.size(), 1);
	assert_eq!(blue_out.size(), 3);
	assert!(blue_out.has(&Key::from(3)));

	query_pool().release(fingerprint(&red));
}

#[test]
fn test_acquiring_same_parameters_reuses_instance() {
	let source = Arc::new(ScriptedSource::with_initial(vec![
		record! { "id" => 1, "team" => "red" },
	]));
	let collection = users("pool_users_reuse", source.clone());
	collection.preload();

	let first = query_pool().acquire(&by_team(&collection, Value::text("red"))).unwrap();
	let second = query_pool().acquire(&by_team(&collection, Value::text("red"))).unwrap();
	assert_eq!(first.id(), second.id());

	query_pool().release(fingerprint(&by_team(&collection, Value::text("red"))));
}

#[test]
fn test_non_poolable_shapes_are_refused() {
	let source = Arc::new(ScriptedSource::new());
	let collection = users("pool_users_refuse", source);

	let ordered = Query::from(Arc::new(collection.clone()), "users")
		.where_(Expr::field("users.team").eq(Expr::val("red")))
		.order_by(Expr::field("team"), reflexdb_query::Direction::Asc)
		.build()
		.unwrap();
	assert!(!ordered.is_poolable());
	assert!(query_pool().acquire(&ordered).is_none());

	let range = Query::from(Arc::new(collection.clone()), "users")
		.where_(Expr::field("users.age").gt(Expr::val(18)))
		.build()
		.unwrap();
	assert!(!range.is_poolable());

	let grouped = Query::from(Arc::new(collection.clone()), "users")
		.group_by(Expr::field("users.team"))
		.select("n", Expr::agg("count", Expr::field("users.id")))
		.build()
		.unwrap();
	assert!(!grouped.is_poolable());
}

#[test]
fn test_undefined_parameter_is_a_distinct_key() {
	// The extractor sees Undefined for rows without the field; that tuple
	// must never conflate with a textual "null" parameter.
	let source = Arc::new(ScriptedSource::with_initial(vec![
		record! { "id" => 1, "team" => "null" },
		record! { "id" => 2 },
	]));
	let collection = users("pool_users_undefined", source.clone());
	collection.preload();

	let textual = by_team(&collection, Value::text("null"));
	let undefined = by_team(&collection, Value::Undefined);

	let textual_out = query_pool().acquire(&textual).unwrap();
	let undefined_out = query_pool().acquire(&undefined).unwrap();

	assert_eq!(textual_out.size(), 1);
	assert!(textual_out.has(&Key::from(1)));
	assert_eq!(undefined_out.size(), 1);
	assert!(undefined_out.has(&Key::from(2)));

	query_pool().release(fingerprint(&textual));
}
