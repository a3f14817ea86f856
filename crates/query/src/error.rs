// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use thiserror::Error;

/// Compilation errors; fatal for the query that raised them only.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
	#[error("query must have a from clause")]
	QueryMustHaveFromClause,

	#[error("subquery must have a from clause")]
	SubQueryMustHaveFromClause,

	#[error("only one source is allowed in a from clause")]
	OnlyOneSourceAllowed,

	#[error("invalid source: {0}")]
	InvalidSource(String),

	#[error("invalid source type: {0}")]
	InvalidSourceType(String),

	#[error("query references itself through `{0}`")]
	CyclicQuery(String),

	#[error(transparent)]
	Expression(#[from] reflexdb_expr::Error),

	#[error(transparent)]
	Core(#[from] reflexdb_core::Error),
}
