//! Jittered exponential backoff shared by store-write retries and transient rotation retries.

// crates.io
use rand::Rng;
// self
use crate::{_prelude::*, config::RetryPolicy};

/// Delay before retry number `attempt` (1-based), never above `cap` or the policy maximum.
///
/// The nominal delay doubles per attempt; the returned value is drawn uniformly from its
/// upper half so concurrent tenants do not retry in lockstep.
pub(crate) fn delay(policy: &RetryPolicy, attempt: u32, cap: StdDuration) -> StdDuration {
	let ceiling = policy.max_backoff().min(cap);
	let exponent = attempt.saturating_sub(1).min(31);
	let nominal = policy.initial_backoff().saturating_mul(1 << exponent).min(ceiling);
	let nominal_ms = u64::try_from(nominal.as_millis()).unwrap_or(u64::MAX);

	if nominal_ms < 2 {
		return nominal;
	}

	StdDuration::from_millis(rand::rng().random_range(nominal_ms / 2..=nominal_ms))
}
