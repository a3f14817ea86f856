// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
	#[error("unknown function `{0}`")]
	UnknownFunction(String),

	#[error("unknown aggregate `{0}`")]
	UnknownAggregate(String),

	#[error("aggregate `{0}` is only valid inside a grouped query")]
	AggregateNotAllowed(String),
}
