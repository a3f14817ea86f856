// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

//! Dynamic value model shared by every ReflexDB crate.
//!
//! Records flowing through collections and dataflow graphs are opaque
//! [`Value`]s addressed by a [`Key`]. Ordering across the whole value space
//! is total; `Undefined` sorts as a distinct minimal element by default and
//! temporal / big-integer values order through a numeric normalization.

pub use compare::{UndefinedOrder, compare, compare_with};
pub use key::Key;
pub use ordered_float::{OrderedF64, OrderedFloatError};
pub use value::{Value, ValueKind};

mod compare;
mod key;
mod ordered_float;
mod value;
