//! Counters for retrievals served by a refresh worker.

// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for retrievals served by a refresh worker.
#[derive(Debug, Default)]
pub struct HandlerMetrics {
	attempts: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
	cache_hits: AtomicU64,
	stale_serves: AtomicU64,
}
impl HandlerMetrics {
	/// Returns the total number of retrievals the worker computed.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of retrievals answered with a freshly generated token.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of retrievals answered with an error.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Returns the number of retrievals answered from the cache.
	pub fn cache_hits(&self) -> u64 {
		self.cache_hits.load(Ordering::Relaxed)
	}

	/// Returns the number of failed renewals answered with the still-valid cached token.
	pub fn stale_serves(&self) -> u64 {
		self.stale_serves.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_cache_hit(&self) {
		self.cache_hits.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_stale_serve(&self) {
		self.stale_serves.fetch_add(1, Ordering::Relaxed);
	}
}
