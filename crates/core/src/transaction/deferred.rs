// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ReflexDB

use std::{sync::Arc, time::Duration};

use parking_lot::{Condvar, Mutex};

use crate::Error;

/// A one-shot settable result with two-phase consumption: settle once from
/// the producing side, observe any number of times from the consuming side.
///
/// Rejection before a waiter attaches is fine; the outcome is stored and
/// every later `peek`/`wait` sees it. The first settlement wins, later ones
/// are ignored.
pub struct Deferred<T: Clone> {
	inner: Arc<Inner<T>>,
}

struct Inner<T> {
	slot: Mutex<Option<Result<T, Error>>>,
	cond: Condvar,
}

impl<T: Clone> Clone for Deferred<T> {
	fn clone(&self) -> Self {
		Self { inner: self.inner.clone() }
	}
}

impl<T: Clone> Default for Deferred<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T: Clone> Deferred<T> {
	pub fn new() -> Self {
		Self { inner: Arc::new(Inner { slot: Mutex::new(None), cond: Condvar::new() }) }
	}

	pub fn resolved(value: T) -> Self {
		let deferred = Self::new();
		deferred.resolve(value);
		deferred
	}

	pub fn resolve(&self, value: T) {
		self.settle(Ok(value));
	}

	pub fn reject(&self, error: Error) {
		self.settle(Err(error));
	}

	fn settle(&self, outcome: Result<T, Error>) {
		let mut slot = self.inner.slot.lock();
		if slot.is_none() {
			*slot = Some(outcome);
			self.inner.cond.notify_all();
		}
	}

	pub fn is_settled(&self) -> bool {
		self.inner.slot.lock().is_some()
	}

	pub fn peek(&self) -> Option<Result<T, Error>> {
		self.inner.slot.lock().clone()
	}

	/// Blocks until settled.
	pub fn wait(&self) -> Result<T, Error> {
		let mut slot = self.inner.slot.lock();
		loop {
			if let Some(outcome) = slot.as_ref() {
				return outcome.clone();
			}
			self.inner.cond.wait(&mut slot);
		}
	}

	/// Blocks up to `timeout`; `None` when it elapses unsettled.
	pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T, Error>> {
		let mut slot = self.inner.slot.lock();
		if let Some(outcome) = slot.as_ref() {
			return Some(outcome.clone());
		}
		self.inner.cond.wait_for(&mut slot, timeout);
		slot.clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_first_settlement_wins() {
		let deferred: Deferred<i32> = Deferred::new();
		deferred.resolve(1);
		deferred.resolve(2);
		deferred.reject(Error::transaction_failed("late"));
		assert_eq!(deferred.peek(), Some(Ok(1)));
	}

	#[test]
	fn test_rejection_before_waiter_is_observable() {
		let deferred: Deferred<()> = Deferred::new();
		deferred.reject(Error::transaction_failed("boom"));
		assert!(matches!(deferred.wait(), Err(Error::TransactionFailed { .. })));
	}

	#[test]
	fn test_wait_timeout_elapses() {
		let deferred: Deferred<()> = Deferred::new();
		assert!(deferred.wait_timeout(Duration::from_millis(5)).is_none());
	}
}
