// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::fmt::{self, Display, Formatter};

/// Raised when a NaN is handed to an ordered float constructor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderedFloatError;

impl Display for OrderedFloatError {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str("NaN cannot be represented as an ordered float")
	}
}

impl std::error::Error for OrderedFloatError {}
