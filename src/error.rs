//! Crate-level error types shared by the store, rotation client, scheduler, and accessor.

// self
use crate::{
	_prelude::*,
	auth::{IdentifierError, TenantId},
	store::StoreError,
};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Rotation endpoint replied with a payload that does not match the expected shape.
	#[error(transparent)]
	MalformedResponse(#[from] MalformedResponseError),

	/// Provider answered `ok=false`; the refresh token was revoked or is otherwise invalid.
	#[error("Provider rejected the rotation: {reason}.")]
	ProviderRejected {
		/// Provider-supplied error code, or a placeholder when absent.
		reason: String,
	},
	/// No token record exists for the tenant.
	#[error("No token record exists for tenant `{tenant}`.")]
	NotFound {
		/// Tenant that was looked up.
		tenant: TenantId,
	},
	/// Provider rotated the token but the new material could not be stored.
	#[error("Rotated tokens for tenant `{tenant}` could not be stored after {attempts} attempts.")]
	RotationNotPersisted {
		/// Tenant whose rotation was lost from the store.
		tenant: TenantId,
		/// Number of write attempts performed.
		attempts: u32,
		/// Last store failure.
		#[source]
		source: StoreError,
	},
}
impl Error {
	/// Returns `true` when the failure is temporary and an early retry is worthwhile.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Storage(_) | Self::Transient(_) | Self::Transport(_))
	}

	/// Returns the `Retry-After` hint reported by the provider, if any.
	pub fn retry_after(&self) -> Option<StdDuration> {
		match self {
			Self::Transient(TransientError::RotationEndpoint { retry_after, .. }) => *retry_after,
			_ => None,
		}
	}

	/// Maps the error to the response a request handler should present to its caller.
	pub fn disposition(&self) -> Disposition {
		match self {
			Self::NotFound { .. } => Disposition::NotInstalled,
			Self::ProviderRejected { .. } => Disposition::Reauthorize,
			Self::Storage(_) | Self::Transient(_) | Self::Transport(_) =>
				Disposition::RetryLater { retry_after: self.retry_after() },
			Self::Config(_) | Self::MalformedResponse(_) | Self::RotationNotPersisted { .. } =>
				Disposition::Internal,
		}
	}
}

/// Consumer-facing classification of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
	/// The integration is not installed for the tenant; start the authorization flow.
	NotInstalled,
	/// Temporary failure; answer with a 5xx and an optional retry hint.
	RetryLater {
		/// Suggested delay before retrying.
		retry_after: Option<StdDuration>,
	},
	/// The stored credential was rejected; an operator or user must re-authorize.
	Reauthorize,
	/// Unexpected failure that retrying will not fix.
	Internal,
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// A configuration value is out of range.
	#[error("Invalid configuration for `{field}`: {reason}.")]
	Invalid {
		/// Offending field name.
		field: &'static str,
		/// Human-readable explanation.
		reason: &'static str,
	},
	/// Rotation was requested with an empty refresh token.
	#[error("Refresh token must not be empty.")]
	EmptyRefreshToken,
	/// Token record builder validation failed.
	#[error("Unable to build token record.")]
	TokenBuild(#[from] crate::auth::TokenRecordBuilderError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Rotation endpoint answered with a non-success HTTP status.
	#[error("Rotation endpoint returned an unexpected response: {message}.")]
	RotationEndpoint {
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<StdDuration>,
	},
	/// An external call exceeded its deadline.
	#[error("The {operation} call timed out after {after:?}.")]
	Timeout {
		/// Operation label (`rotation`, `store read`, ...).
		operation: &'static str,
		/// Deadline that elapsed.
		after: StdDuration,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the rotation endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the rotation endpoint.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Ways a rotation payload can fail to match the expected shape.
#[derive(Debug, ThisError)]
pub enum MalformedResponseError {
	/// Body is not JSON or a field has the wrong type.
	#[error("Rotation endpoint returned malformed JSON.")]
	Json {
		/// Structured parsing failure, including the offending JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// A successful payload omitted a required field.
	#[error("Rotation payload is missing `{field}`.")]
	MissingField {
		/// Name of the absent field.
		field: &'static str,
	},
	/// An echoed identifier failed validation.
	#[error("Rotation payload carries an invalid identifier.")]
	InvalidIdentifier(#[from] IdentifierError),
	/// An epoch timestamp or lifetime is outside the supported range.
	#[error("Rotation payload field `{field}` is out of range.")]
	OutOfRange {
		/// Name of the offending field.
		field: &'static str,
	},
}
