// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::cmp::Ordering;

use reflexdb_type::{Value, compare};

/// An aggregate definition: `pre_map` shapes each input row, `reduce` folds
/// the accumulated multiset of shaped values (entries carry their net
/// multiplicity), `post_map` finishes the fold.
///
/// The group/aggregate dataflow block evaluates the aggregate argument per
/// row, applies `pre_map`, and re-runs `reduce` over the group's multiset on
/// every delta so a retraction of the old fold and an insertion of the new
/// one can be emitted.
#[derive(Clone, Copy)]
pub struct Aggregate {
	pub name: &'static str,
	pub pre_map: fn(&Value) -> Value,
	pub reduce: fn(&[(Value, isize)]) -> Value,
	pub post_map: Option<fn(&Value) -> Value>,
}

impl Aggregate {
	/// Full pipeline over an already pre-mapped multiset.
	pub fn apply(&self, group: &[(Value, isize)]) -> Value {
		let reduced = (self.reduce)(group);
		match self.post_map {
			Some(post) => post(&reduced),
			None => reduced,
		}
	}
}

/// Resolve an aggregate by name: `count`, `sum`, `avg`, `min`, `max`.
pub fn aggregate(name: &str) -> Option<Aggregate> {
	match name {
		"count" => Some(COUNT),
		"sum" => Some(SUM),
		"avg" => Some(AVG),
		"min" => Some(MIN),
		"max" => Some(MAX),
		_ => None,
	}
}

const COUNT: Aggregate = Aggregate {
	name: "count",
	pre_map: |_| Value::Int(1),
	reduce: |group| {
		let total: isize = group.iter().map(|(_, m)| *m).sum();
		Value::Int(total.max(0) as i64)
	},
	post_map: None,
};

const SUM: Aggregate = Aggregate {
	name: "sum",
	pre_map: |v| match v {
		Value::Int(_) | Value::Float(_) | Value::BigInt(_) => v.clone(),
		_ => Value::Undefined,
	},
	reduce: |group| sum_weighted(group),
	post_map: None,
};

const AVG: Aggregate = Aggregate {
	name: "avg",
	// Carry (value, 1) so the fold can divide at the end.
	pre_map: |v| match v {
		Value::Int(_) | Value::Float(_) | Value::BigInt(_) => {
			Value::List(vec![v.clone(), Value::Int(1)])
		}
		_ => Value::Undefined,
	},
	reduce: |group| {
		let mut sum = 0.0;
		let mut count = 0i64;
		for (entry, mult) in group {
			if let Value::List(pair) = entry {
				let v = pair.first().and_then(Value::as_f64);
				let n = pair.get(1).and_then(Value::as_int);
				if let (Some(v), Some(n)) = (v, n) {
					sum += v * *mult as f64;
					count += n * *mult as i64;
				}
			}
		}
		Value::List(vec![Value::float(sum), Value::Int(count)])
	},
	post_map: Some(|reduced| match reduced {
		Value::List(pair) => {
			let sum = pair.first().and_then(Value::as_f64);
			let count = pair.get(1).and_then(Value::as_int);
			match (sum, count) {
				(Some(_), Some(0)) => Value::Undefined,
				(Some(sum), Some(count)) => Value::float(sum / count as f64),
				_ => Value::Undefined,
			}
		}
		_ => Value::Undefined,
	}),
};

const MIN: Aggregate = Aggregate {
	name: "min",
	pre_map: |v| v.clone(),
	reduce: |group| extremum(group, Ordering::Less),
	post_map: None,
};

const MAX: Aggregate = Aggregate {
	name: "max",
	pre_map: |v| v.clone(),
	reduce: |group| extremum(group, Ordering::Greater),
	post_map: None,
};

fn sum_weighted(group: &[(Value, isize)]) -> Value {
	let mut exact: i128 = 0;
	let mut approx = 0.0;
	let mut saw_float = false;
	let mut saw_value = false;
	for (entry, mult) in group {
		match entry {
			Value::Int(i) => {
				exact += *i as i128 * *mult as i128;
				saw_value = true;
			}
			Value::BigInt(i) => {
				exact += i * *mult as i128;
				saw_value = true;
			}
			Value::Float(f) => {
				approx += f.value() * *mult as f64;
				saw_float = true;
				saw_value = true;
			}
			_ => {}
		}
	}
	if !saw_value {
		Value::Undefined
	} else if saw_float {
		Value::float(approx + exact as f64)
	} else {
		i64::try_from(exact).map(Value::Int).unwrap_or(Value::BigInt(exact))
	}
}

fn extremum(group: &[(Value, isize)], keep: Ordering) -> Value {
	let mut best: Option<&Value> = None;
	for (entry, mult) in group {
		if *mult <= 0 || entry.is_undefined() {
			continue;
		}
		match best {
			None => best = Some(entry),
			Some(current) => {
				if compare(entry, current) == keep {
					best = Some(entry);
				}
			}
		}
	}
	best.cloned().unwrap_or(Value::Undefined)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn pre(agg: &Aggregate, values: &[Value]) -> Vec<(Value, isize)> {
		values.iter().map(|v| ((agg.pre_map)(v), 1)).collect()
	}

	#[test]
	fn test_count_sums_multiplicities() {
		let agg = aggregate("count").unwrap();
		let group = vec![(Value::Int(1), 2), (Value::Int(1), 1)];
		assert_eq!(agg.apply(&group), Value::Int(3));
	}

	#[test]
	fn test_sum_exact_until_float_appears() {
		let agg = aggregate("sum").unwrap();
		let group = pre(&agg, &[Value::Int(2), Value::Int(3)]);
		assert_eq!(agg.apply(&group), Value::Int(5));

		let group = pre(&agg, &[Value::Int(2), Value::float(0.5)]);
		assert_eq!(agg.apply(&group), Value::float(2.5));
	}

	#[test]
	fn test_avg_divides_in_post_map() {
		let agg = aggregate("avg").unwrap();
		let group = pre(&agg, &[Value::Int(2), Value::Int(4)]);
		assert_eq!(agg.apply(&group), Value::float(3.0));
	}

	#[test]
	fn test_avg_of_empty_group_is_undefined() {
		let agg = aggregate("avg").unwrap();
		assert_eq!(agg.apply(&[]), Value::Undefined);
	}

	#[test]
	fn test_min_max_skip_retracted_entries() {
		let min = aggregate("min").unwrap();
		let group = vec![(Value::Int(1), 0), (Value::Int(5), 1), (Value::Int(9), 1)];
		assert_eq!(min.apply(&group), Value::Int(5));

		let max = aggregate("max").unwrap();
		assert_eq!(max.apply(&group), Value::Int(9));
	}
}
