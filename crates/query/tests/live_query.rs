// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::sync::Arc;

use reflexdb_core::{
	ChangeType, Collection, CollectionLike, CollectionOptions, SubscribeOptions, SyncedWrite,
};
use reflexdb_expr::Expr;
use reflexdb_flow::JoinKind;
use reflexdb_index::IndexKind;
use reflexdb_query::{Direction, LiveQuery, Query};
use reflexdb_testing::{ScriptedSource, capture_changes};
use reflexdb_type::{Key, Value, record};

fn collection(id: &str, source: Arc<ScriptedSource>) -> Collection {
	Collection::new(CollectionOptions::new(id, "id").source(source))
}

#[test]
fn test_where_filter_tracks_updates() {
	// from users where active = true; seed one active and one inactive
	// user, then flip the inactive one back and forth.
	let source = Arc::new(ScriptedSource::with_initial(vec![
		record! { "id" => 1, "active" => true },
		record! { "id" => 2, "active" => false },
	]));
	let users = collection("lq_users_filter", source.clone());

	let query = Query::from(Arc::new(users.clone()), "users")
		.where_(Expr::field("users.active").eq(Expr::val(true)))
		.build()
		.unwrap();
	let live = LiveQuery::new(query).unwrap();

	let (batches, callback) = capture_changes();
	let _sub = live.subscribe_changes(callback, SubscribeOptions { include_initial_state: true });

	{
		let seen = batches.lock();
		assert_eq!(seen.len(), 1);
		assert_eq!(seen[0].len(), 1);
		assert_eq!(seen[0][0].change_type, ChangeType::Insert);
		assert_eq!(seen[0][0].key, Key::from(1));
	}

	// id=2 becomes active: one insert delta.
	source.push(vec![SyncedWrite::update(record! { "id" => 2, "active" => true }, None)]);
	{
		let seen = batches.lock();
		assert_eq!(seen.len(), 2);
		assert_eq!(seen[1].len(), 1);
		assert_eq!(seen[1][0].change_type, ChangeType::Insert);
		assert_eq!(seen[1][0].key, Key::from(2));
	}

	// And back: one delete delta.
	source.push(vec![SyncedWrite::update(record! { "id" => 2, "active" => false }, None)]);
	{
		let seen = batches.lock();
		assert_eq!(seen.len(), 3);
		assert_eq!(seen[2].len(), 1);
		assert_eq!(seen[2][0].change_type, ChangeType::Delete);
		assert_eq!(seen[2][0].key, Key::from(2));
	}
	assert_eq!(live.size(), 1);
}

#[test]
fn test_group_by_count_replaces_group_row() {
	let source = Arc::new(ScriptedSource::new());
	let events = collection("lq_events_group", source.clone());

	let query = Query::from(Arc::new(events.clone()), "events")
		.group_by(Expr::field("events.lang"))
		.select("lang", Expr::field("events.lang"))
		.select("count", Expr::agg("count", Expr::field("events.id")))
		.build()
		.unwrap();
	let live = LiveQuery::new(query).unwrap();

	let (batches, callback) = capture_changes();
	let _sub = live.subscribe_changes(callback, SubscribeOptions::default());

	source.push(vec![SyncedWrite::insert(record! { "id" => "e1", "lang" => "ru" })]);
	{
		let seen = batches.lock();
		assert_eq!(seen.len(), 1);
		assert_eq!(seen[0][0].change_type, ChangeType::Insert);
		assert_eq!(seen[0][0].value, record! { "lang" => "ru", "count" => 1 });
	}

	// The old group row retracts and the new one asserts; at the collection
	// boundary that folds into a single update, never a duplicate key.
	source.push(vec![SyncedWrite::insert(record! { "id" => "e2", "lang" => "ru" })]);
	{
		let seen = batches.lock();
		assert_eq!(seen.len(), 2);
		assert_eq!(seen[1].len(), 1);
		assert_eq!(seen[1][0].change_type, ChangeType::Update);
		assert_eq!(seen[1][0].value, record! { "lang" => "ru", "count" => 2 });
		assert_eq!(seen[1][0].previous_value, Some(record! { "lang" => "ru", "count" => 1 }));
	}
	assert_eq!(live.size(), 1);
}

#[test]
fn test_progressive_join_uses_fetch_snapshot() {
	// users is ready; departments is still buffering its initial sync and
	// must be read through fetch_snapshot, never request_snapshot.
	let users_source = Arc::new(ScriptedSource::with_initial(vec![
		record! { "id" => 1, "name" => "ada", "dept" => 10 },
		record! { "id" => 2, "name" => "bob", "dept" => 10 },
		record! { "id" => 3, "name" => "cyd", "dept" => 20 },
	]));
	let users = collection("lq_users_join", users_source.clone());
	users.preload();

	let dept_source = Arc::new(ScriptedSource::buffering(vec![
		record! { "id" => 10, "dname" => "eng" },
		record! { "id" => 20, "dname" => "ops" },
	]));
	let departments = collection("lq_departments_join", dept_source.clone());

	let query = Query::from(Arc::new(users.clone()), "users")
		.join(
			Arc::new(departments.clone()),
			"departments",
			JoinKind::Inner,
			Expr::field("users.dept"),
			Expr::field("departments.id"),
		)
		.build()
		.unwrap();
	let live = LiveQuery::new(query).unwrap();

	let (batches, callback) = capture_changes();
	let _sub = live.subscribe_changes(callback, SubscribeOptions::default());

	assert_eq!(live.size(), 3);
	assert_eq!(dept_source.request_snapshot_count(), 0);

	// The authoritative initial commit arrives: identical rows fold into
	// nothing, the join stays at 3.
	dept_source.commit_initial();
	assert_eq!(live.size(), 3);

	// Deleting a user issues exactly one join output delete.
	users_source.push(vec![SyncedWrite::delete(record! { "id" => 2, "name" => "bob", "dept" => 10 })]);
	assert_eq!(live.size(), 2);
	let seen = batches.lock();
	let last = seen.last().unwrap();
	assert_eq!(last.len(), 1);
	assert_eq!(last[0].change_type, ChangeType::Delete);
}

#[test]
fn test_order_limit_offset_window_slides_on_delete() {
	// orderBy value desc, limit 3, offset 2 over values 100..60: the page
	// is [80,70,60]; deleting the row at visible offset 0 (value 80)
	// yields [70,60] and the delete reaches subscribers.
	let source = Arc::new(ScriptedSource::with_initial(vec![
		record! { "id" => 1, "value" => 100 },
		record! { "id" => 2, "value" => 90 },
		record! { "id" => 3, "value" => 80 },
		record! { "id" => 4, "value" => 70 },
		record! { "id" => 5, "value" => 60 },
	]));
	let items = collection("lq_items_window", source.clone());

	let query = Query::from(Arc::new(items.clone()), "items")
		.order_by(Expr::field("value"), Direction::Desc)
		.limit(3)
		.offset(2)
		.build()
		.unwrap();
	let live = LiveQuery::new(query).unwrap();

	let (batches, callback) = capture_changes();
	let _sub = live.subscribe_changes(callback, SubscribeOptions { include_initial_state: true });

	let page: Vec<i64> = live.to_array().iter().map(|v| v.field("value").as_int().unwrap()).collect();
	assert_eq!(page, vec![80, 70, 60]);

	source.push(vec![SyncedWrite::delete(record! { "id" => 3, "value" => 80 })]);
	let page: Vec<i64> = live.to_array().iter().map(|v| v.field("value").as_int().unwrap()).collect();
	assert_eq!(page, vec![70, 60]);

	let seen = batches.lock();
	let last = seen.last().unwrap();
	assert!(last.iter().any(|change| {
		change.change_type == ChangeType::Delete && change.value.field("value") == Value::Int(80)
	}));
}

#[test]
fn test_find_one_returns_sole_value_or_none() {
	let source = Arc::new(ScriptedSource::with_initial(vec![
		record! { "id" => 1, "name" => "ada" },
	]));
	let users = collection("lq_users_one", source.clone());

	let hit = Query::from(Arc::new(users.clone()), "users")
		.where_(Expr::field("users.id").eq(Expr::val(1)))
		.find_one()
		.build()
		.unwrap();
	let live = LiveQuery::new(hit).unwrap();
	assert_eq!(live.single(), Some(record! { "id" => 1, "name" => "ada" }));

	let miss = Query::from(Arc::new(users.clone()), "users")
		.where_(Expr::field("users.id").eq(Expr::val(42)))
		.find_one()
		.build()
		.unwrap();
	let live = LiveQuery::new(miss).unwrap();
	assert_eq!(live.single(), None);
}

#[test]
fn test_select_projects_and_spreads_in_authoring_order() {
	let source = Arc::new(ScriptedSource::with_initial(vec![
		record! { "id" => 1, "name" => "ada", "age" => 36 },
	]));
	let users = collection("lq_users_select", source.clone());

	let query = Query::from(Arc::new(users.clone()), "users")
		.select("label", Expr::func("upper", vec![Expr::field("users.name")]))
		.select_spread("users")
		.build()
		.unwrap();
	let live = LiveQuery::new(query).unwrap();

	let rows = live.to_array();
	assert_eq!(rows.len(), 1);
	let fields: Vec<String> = rows[0].as_record().unwrap().keys().cloned().collect();
	assert_eq!(fields, vec!["label", "id", "name", "age"]);
	assert_eq!(rows[0].field("label"), Value::text("ADA"));
}

#[test]
fn test_query_on_query_chains_incrementally() {
	// A live query is itself a collection-shaped source.
	let source = Arc::new(ScriptedSource::with_initial(vec![
		record! { "id" => 1, "active" => true, "score" => 5 },
		record! { "id" => 2, "active" => true, "score" => 9 },
		record! { "id" => 3, "active" => false, "score" => 9 },
	]));
	let users = collection("lq_users_chain", source.clone());

	let active = Query::from(Arc::new(users.clone()), "users")
		.where_(Expr::field("users.active").eq(Expr::val(true)))
		.build()
		.unwrap();
	let active_live = LiveQuery::new(active).unwrap();

	let high = Query::from(Arc::new(active_live.clone()), "active")
		.where_(Expr::field("active.score").gte(Expr::val(8)))
		.build()
		.unwrap();
	let high_live = LiveQuery::new(high).unwrap();

	assert_eq!(high_live.size(), 1);
	assert!(high_live.has(&Key::from(2)));

	// A newly activated high scorer flows through both stages.
	source.push(vec![SyncedWrite::update(record! { "id" => 3, "active" => true, "score" => 9 }, None)]);
	assert_eq!(high_live.size(), 2);
}

#[test]
fn test_index_accelerated_seed_matches_full_scan() {
	let source = Arc::new(ScriptedSource::with_initial(vec![
		record! { "id" => 1, "active" => true },
		record! { "id" => 2, "active" => false },
		record! { "id" => 3, "active" => true },
	]));
	let users = collection("lq_users_indexed", source.clone());
	users.preload();
	users.create_index(Expr::field("active"), IndexKind::BTree).unwrap();

	let query = Query::from(Arc::new(users.clone()), "users")
		.where_(Expr::field("users.active").eq(Expr::val(true)))
		.build()
		.unwrap();
	let live = LiveQuery::new(query).unwrap();

	assert_eq!(live.size(), 2);
	assert!(live.has(&Key::from(1)) && live.has(&Key::from(3)));

	// Incremental changes keep flowing after the indexed seed.
	source.push(vec![SyncedWrite::update(record! { "id" => 2, "active" => true }, None)]);
	assert_eq!(live.size(), 3);
}

#[test]
fn test_subquery_source() {
	let source = Arc::new(ScriptedSource::with_initial(vec![
		record! { "id" => 1, "kind" => "a", "v" => 1 },
		record! { "id" => 2, "kind" => "b", "v" => 2 },
		record! { "id" => 3, "kind" => "a", "v" => 3 },
	]));
	let rows = collection("lq_rows_sub", source.clone());

	let inner = Query::from(Arc::new(rows.clone()), "rows")
		.where_(Expr::field("rows.kind").eq(Expr::val("a")))
		.build()
		.unwrap();
	let outer = Query::from_query(inner, "a_rows")
		.select("v", Expr::field("a_rows.v"))
		.build()
		.unwrap();
	let live = LiveQuery::new(outer).unwrap();

	let mut values: Vec<i64> =
		live.to_array().iter().map(|row| row.field("v").as_int().unwrap()).collect();
	values.sort_unstable();
	assert_eq!(values, vec![1, 3]);
}

#[test]
fn test_order_by_with_undefined_values_pages_cleanly() {
	// Rows missing the sort field sort as the minimal element; windows over
	// them settle in one pass instead of looping.
	let source = Arc::new(ScriptedSource::with_initial(vec![
		record! { "id" => 1, "rank" => 3 },
		record! { "id" => 2 },
		record! { "id" => 3, "rank" => 1 },
		record! { "id" => 4 },
	]));
	let items = collection("lq_items_undefined", source.clone());

	let query = Query::from(Arc::new(items.clone()), "items")
		.order_by(Expr::field("rank"), Direction::Asc)
		.limit(3)
		.build()
		.unwrap();
	let live = LiveQuery::new(query).unwrap();

	let page: Vec<i64> = live.to_array().iter().map(|v| v.field("id").as_int().unwrap()).collect();
	// Two undefined ranks first (arrival order), then rank 1.
	assert_eq!(page, vec![2, 4, 3]);

	// Giving an undefined row a rank moves it to the defined region.
	source.push(vec![SyncedWrite::update(record! { "id" => 2, "rank" => 2 }, None)]);
	let page: Vec<i64> = live.to_array().iter().map(|v| v.field("id").as_int().unwrap()).collect();
	assert_eq!(page, vec![4, 3, 2]);
}
