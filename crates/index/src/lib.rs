// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

//! Secondary indexes over a value expression.
//!
//! A collection owns zero or more indexes, each maintained synchronously in
//! the collection's commit order. Lookups return *candidate* key sets that
//! are superset-safe: a storage kind that cannot answer an operator exactly
//! answers with every indexed key, and the calling operator re-filters.

pub use index::{CollectionIndex, IndexId};
pub use ops::{IndexKind, IndexOp, ValueRange};
pub use storage::{IndexStorage, btree::BTreeStorage, hash::HashStorage, sorted::SortedStorage};

mod index;
mod ops;
mod storage;
