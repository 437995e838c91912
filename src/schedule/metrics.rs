// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for rotation attempts.
#[derive(Debug, Default)]
pub struct RotationMetrics {
	attempts: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
	rejection: AtomicU64,
	write_retry: AtomicU64,
	unpersisted: AtomicU64,
}
impl RotationMetrics {
	/// Returns the total number of rotation attempts.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of rotations whose material reached the store.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of failed rotations, rejections included.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Returns the number of rotations the provider rejected.
	pub fn rejections(&self) -> u64 {
		self.rejection.load(Ordering::Relaxed)
	}

	/// Returns the number of store writes that were retried.
	pub fn write_retries(&self) -> u64 {
		self.write_retry.load(Ordering::Relaxed)
	}

	/// Returns the number of rotations that ended in the pending journal.
	pub fn unpersisted(&self) -> u64 {
		self.unpersisted.load(Ordering::Relaxed)
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

	pub(crate) fn record_rejection(&self) {
		self.rejection.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_write_retry(&self) {
		self.write_retry.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_unpersisted(&self) {
		self.unpersisted.fetch_add(1, Ordering::Relaxed);
	}
}
