//! Explicit configuration injected into the accessor, engine, and schedules.
//!
//! Nothing in the crate reads process-wide state after startup: callers load a
//! [`RotorConfig`] (any serde format works thanks to `#[serde(default)]`), capture the
//! operator overrides once through [`OverrideConfig::from_env`], and pass the value down.

// self
use crate::{_prelude::*, auth::TokenSecret, error::ConfigError};

/// Environment variable holding an operator-supplied refresh token.
pub const REFRESH_TOKEN_OVERRIDE_ENV: &str = "OAUTH2_ROTOR_REFRESH_TOKEN";
/// Environment variable holding an operator-supplied access token.
pub const ACCESS_TOKEN_OVERRIDE_ENV: &str = "OAUTH2_ROTOR_ACCESS_TOKEN";

/// Top-level settings for rotation cadence, deadlines, and retry policies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotorConfig {
	/// Seconds between scheduled rotations of one tenant.
	pub rotation_interval_secs: u64,
	/// Deadline for one call to the rotation endpoint, in seconds.
	pub network_timeout_secs: u64,
	/// Deadline for one token store operation, in seconds.
	pub store_timeout_secs: u64,
	/// Retry policy for writing freshly rotated tokens.
	pub write_retry: RetryPolicy,
	/// Early-retry policy after transient rotation failures.
	pub transient_retry: RetryPolicy,
	/// Operator overrides; never serialized.
	#[serde(skip)]
	pub overrides: OverrideConfig,
}
impl RotorConfig {
	/// Interval between scheduled rotations.
	pub fn rotation_interval(&self) -> StdDuration {
		StdDuration::from_secs(self.rotation_interval_secs)
	}

	/// Deadline for one rotation endpoint call.
	pub fn network_timeout(&self) -> StdDuration {
		StdDuration::from_secs(self.network_timeout_secs)
	}

	/// Deadline for one store operation.
	pub fn store_timeout(&self) -> StdDuration {
		StdDuration::from_secs(self.store_timeout_secs)
	}

	/// Replaces the operator overrides.
	pub fn with_overrides(mut self, overrides: OverrideConfig) -> Self {
		self.overrides = overrides;

		self
	}

	/// Rejects values that would stall or spin the scheduler.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.rotation_interval_secs == 0 {
			return Err(ConfigError::Invalid {
				field: "rotation_interval_secs",
				reason: "must be positive",
			});
		}
		if self.network_timeout_secs == 0 {
			return Err(ConfigError::Invalid {
				field: "network_timeout_secs",
				reason: "must be positive",
			});
		}
		if self.store_timeout_secs == 0 {
			return Err(ConfigError::Invalid {
				field: "store_timeout_secs",
				reason: "must be positive",
			});
		}

		self.write_retry.validate("write_retry")?;
		self.transient_retry.validate("transient_retry")?;

		Ok(())
	}
}
impl Default for RotorConfig {
	fn default() -> Self {
		Self {
			rotation_interval_secs: 3_600,
			network_timeout_secs: 10,
			store_timeout_secs: 5,
			write_retry: RetryPolicy {
				max_attempts: 5,
				initial_backoff_ms: 200,
				max_backoff_ms: 5_000,
			},
			transient_retry: RetryPolicy {
				max_attempts: 3,
				initial_backoff_ms: 30_000,
				max_backoff_ms: 300_000,
			},
			overrides: OverrideConfig::default(),
		}
	}
}

/// Bounded exponential backoff settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
	/// Total attempts including the first one.
	pub max_attempts: u32,
	/// Delay before the second attempt, in milliseconds.
	pub initial_backoff_ms: u64,
	/// Upper bound for any single delay, in milliseconds.
	pub max_backoff_ms: u64,
}
impl RetryPolicy {
	/// Delay before the second attempt.
	pub fn initial_backoff(&self) -> StdDuration {
		StdDuration::from_millis(self.initial_backoff_ms)
	}

	/// Upper bound for any single delay.
	pub fn max_backoff(&self) -> StdDuration {
		StdDuration::from_millis(self.max_backoff_ms)
	}

	fn validate(&self, field: &'static str) -> Result<(), ConfigError> {
		if self.max_attempts == 0 {
			return Err(ConfigError::Invalid { field, reason: "max_attempts must be positive" });
		}
		if self.initial_backoff_ms > self.max_backoff_ms {
			return Err(ConfigError::Invalid {
				field,
				reason: "initial_backoff_ms exceeds max_backoff_ms",
			});
		}

		Ok(())
	}
}

/// Operator-supplied credentials that bypass the store for reads.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct OverrideConfig {
	/// Refresh token used by the scheduler instead of the stored one.
	pub refresh_token: Option<TokenSecret>,
	/// Access token returned by the accessor instead of the stored one.
	pub access_token: Option<TokenSecret>,
}
impl OverrideConfig {
	/// Captures overrides from the process environment.
	pub fn from_env() -> Self {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	/// Captures overrides through an arbitrary lookup; empty values count as unset.
	pub fn from_lookup<F>(lookup: F) -> Self
	where
		F: Fn(&str) -> Option<String>,
	{
		let read = |key: &str| lookup(key).filter(|value| !value.is_empty()).map(TokenSecret::new);

		Self {
			refresh_token: read(REFRESH_TOKEN_OVERRIDE_ENV),
			access_token: read(ACCESS_TOKEN_OVERRIDE_ENV),
		}
	}

	/// Sets the refresh-token override.
	pub fn with_refresh_token(mut self, token: impl Into<TokenSecret>) -> Self {
		self.refresh_token = Some(token.into()).filter(|secret: &TokenSecret| !secret.is_empty());

		self
	}

	/// Sets the access-token override.
	pub fn with_access_token(mut self, token: impl Into<TokenSecret>) -> Self {
		self.access_token = Some(token.into()).filter(|secret: &TokenSecret| !secret.is_empty());

		self
	}
}
impl Debug for OverrideConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OverrideConfig")
			.field("refresh_token_set", &self.refresh_token.is_some())
			.field("access_token_set", &self.access_token.is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn defaults_are_valid() {
		let config = RotorConfig::default();

		config.validate().expect("Default configuration should validate.");

		assert_eq!(config.rotation_interval(), StdDuration::from_secs(3_600));
		assert_eq!(config.write_retry.initial_backoff(), StdDuration::from_millis(200));
	}

	#[test]
	fn partial_documents_fill_in_defaults() {
		let config: RotorConfig = serde_json::from_str(
			r#"{"rotation_interval_secs":600,"write_retry":{"max_attempts":2,"initial_backoff_ms":10,"max_backoff_ms":20}}"#,
		)
		.expect("Partial configuration should deserialize.");

		assert_eq!(config.rotation_interval(), StdDuration::from_secs(600));
		assert_eq!(config.write_retry.max_attempts, 2);
		assert_eq!(config.network_timeout_secs, 10);
		assert_eq!(config.overrides, OverrideConfig::default());
	}

	#[test]
	fn validation_rejects_zero_values() {
		let config = RotorConfig { rotation_interval_secs: 0, ..Default::default() };

		assert!(matches!(
			config.validate(),
			Err(ConfigError::Invalid { field: "rotation_interval_secs", .. })
		));

		let mut config = RotorConfig::default();

		config.write_retry.max_attempts = 0;

		assert!(matches!(config.validate(), Err(ConfigError::Invalid { field: "write_retry", .. })));
	}

	#[test]
	fn empty_override_values_are_ignored() {
		let overrides = OverrideConfig::from_lookup(|key| match key {
			REFRESH_TOKEN_OVERRIDE_ENV => Some("xoxe-1-manual".into()),
			ACCESS_TOKEN_OVERRIDE_ENV => Some(String::new()),
			_ => None,
		});

		assert_eq!(overrides.refresh_token.as_ref().map(TokenSecret::expose), Some("xoxe-1-manual"));
		assert!(overrides.access_token.is_none());
		assert!(!format!("{overrides:?}").contains("xoxe-1-manual"));
	}
}
