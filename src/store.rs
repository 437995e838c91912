//! Storage contracts and built-in store implementations for tenant token records.

pub mod file;
pub mod memory;
pub mod pending;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use pending::{
	FilePendingLog, MemoryPendingLog, PendingReason, PendingRotation, PendingRotationLog,
};

// self
use crate::{
	_prelude::*,
	auth::{AppId, TenantId, TokenRecord, TokenSecret, UserId},
};

/// Boxed future returned by [`TokenStore`] and [`PendingRotationLog`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract keyed strictly by tenant identifier.
///
/// Implementations must make each call atomic for its key: a concurrent `get` observes
/// either the record before or after an `update_fields`, never a mix.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Fetches the record for the tenant, if present.
	fn get<'a>(&'a self, tenant: &'a TenantId) -> StoreFuture<'a, Option<TokenRecord>>;

	/// Persists or replaces the whole record (first-time creation).
	fn put(&self, record: TokenRecord) -> StoreFuture<'_, ()>;

	/// Writes only the fields present in `update`, honoring its refresh-token condition.
	fn update_fields<'a>(
		&'a self,
		tenant: &'a TenantId,
		update: TokenFieldUpdate,
	) -> StoreFuture<'a, UpdateOutcome>;
}

/// Result of a conditional field update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateOutcome {
	/// The condition held (or was absent) and the fields were written.
	Updated,
	/// The record exists but its refresh token differs from the expected value.
	RefreshMismatch,
	/// No record exists for the tenant.
	Missing,
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Partial update of a [`TokenRecord`]; absent fields are left untouched.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TokenFieldUpdate {
	/// New access token.
	pub access_token: Option<TokenSecret>,
	/// New refresh token.
	pub refresh_token: Option<TokenSecret>,
	/// New issued-at instant.
	pub issued_at: Option<OffsetDateTime>,
	/// New expiry instant.
	pub expires_at: Option<OffsetDateTime>,
	/// New user identifier.
	pub user_id: Option<UserId>,
	/// New app identifier.
	pub app_id: Option<AppId>,
	/// Write only if the stored refresh token still equals this value.
	pub expected_refresh: Option<TokenSecret>,
}
impl TokenFieldUpdate {
	/// Returns `true` when the record satisfies the refresh-token condition.
	pub fn condition_holds(&self, record: &TokenRecord) -> bool {
		self.expected_refresh.as_ref().is_none_or(|expected| *expected == record.refresh_token)
	}

	/// Copies the present fields into `record` and stamps `updated_at`.
	pub fn apply_to(&self, record: &mut TokenRecord, now: OffsetDateTime) {
		if let Some(token) = &self.access_token {
			record.access_token = token.clone();
		}
		if let Some(token) = &self.refresh_token {
			record.refresh_token = token.clone();
		}
		if let Some(instant) = self.issued_at {
			record.issued_at = instant;
		}
		if let Some(instant) = self.expires_at {
			record.expires_at = instant;
		}
		if let Some(user_id) = &self.user_id {
			record.user_id = Some(user_id.clone());
		}
		if let Some(app_id) = &self.app_id {
			record.app_id = Some(app_id.clone());
		}

		record.updated_at = now;
	}

	/// Shared read-modify-write step used by the built-in backends.
	pub(crate) fn apply_conditionally(
		&self,
		current: Option<&mut TokenRecord>,
		now: OffsetDateTime,
	) -> UpdateOutcome {
		match current {
			Some(record) if self.condition_holds(record) => {
				self.apply_to(record, now);

				UpdateOutcome::Updated
			},
			Some(_) => UpdateOutcome::RefreshMismatch,
			None => UpdateOutcome::Missing,
		}
	}
}
impl Debug for TokenFieldUpdate {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenFieldUpdate")
			.field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.field("user_id", &self.user_id)
			.field("app_id", &self.app_id)
			.field("conditional", &self.expected_refresh.is_some())
			.finish()
	}
}
