//! Per-tenant token record and its builder.

// self
use crate::{
	_prelude::*,
	auth::{AppId, TenantId, UserId, token::secret::TokenSecret},
};

/// Errors produced by [`TokenRecordBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenRecordBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no refresh token value was provided.
	#[error("Refresh token is required.")]
	MissingRefreshToken,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
}

/// The single persisted credential set of one tenant.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TokenRecord {
	/// Primary key.
	pub tenant_id: TenantId,
	/// Bearer credential; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Credential exchanged for the next pair on rotation.
	pub refresh_token: TokenSecret,
	/// Issued-at instant reported by the provider (or stamped locally).
	#[serde(with = "time::serde::timestamp")]
	pub issued_at: OffsetDateTime,
	/// Expiry instant of the access token.
	#[serde(with = "time::serde::timestamp")]
	pub expires_at: OffsetDateTime,
	/// Provider-assigned user identifier, kept for audit/display.
	#[serde(default)]
	pub user_id: Option<UserId>,
	/// Provider-assigned app identifier, kept for audit/display.
	#[serde(default)]
	pub app_id: Option<AppId>,
	/// Instant of the last write through a store.
	#[serde(with = "time::serde::timestamp")]
	pub updated_at: OffsetDateTime,
	/// Fields owned by other writers (team name, granted scope, audit markers).
	#[serde(default)]
	pub attributes: BTreeMap<String, String>,
}
impl TokenRecord {
	/// Returns a builder for the given tenant.
	pub fn builder(tenant_id: TenantId) -> TokenRecordBuilder {
		TokenRecordBuilder::new(tenant_id)
	}
}
impl Debug for TokenRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRecord")
			.field("tenant_id", &self.tenant_id)
			.field("access_token", &"<redacted>")
			.field("refresh_token", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.field("user_id", &self.user_id)
			.field("app_id", &self.app_id)
			.field("updated_at", &self.updated_at)
			.field("attributes", &self.attributes)
			.finish()
	}
}

/// Builder for [`TokenRecord`].
#[derive(Clone, Debug)]
pub struct TokenRecordBuilder {
	tenant_id: TenantId,
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
	user_id: Option<UserId>,
	app_id: Option<AppId>,
	attributes: BTreeMap<String, String>,
}
impl TokenRecordBuilder {
	fn new(tenant_id: TenantId) -> Self {
		Self {
			tenant_id,
			access_token: None,
			refresh_token: None,
			issued_at: None,
			expires_at: None,
			expires_in: None,
			user_id: None,
			app_id: None,
			attributes: BTreeMap::new(),
		}
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<TokenSecret>) -> Self {
		self.access_token = Some(token.into());

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<TokenSecret>) -> Self {
		self.refresh_token = Some(token.into());

		self
	}

	/// Records the provider-assigned user identifier.
	pub fn user_id(mut self, user_id: Option<UserId>) -> Self {
		self.user_id = user_id;

		self
	}

	/// Records the provider-assigned app identifier.
	pub fn app_id(mut self, app_id: Option<AppId>) -> Self {
		self.app_id = app_id;

		self
	}

	/// Adds a field owned by another writer.
	pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.attributes.insert(key.into(), value.into());

		self
	}

	/// Consumes the builder and produces a [`TokenRecord`].
	pub fn build(self) -> Result<TokenRecord, TokenRecordBuilderError> {
		let access_token = self.access_token.ok_or(TokenRecordBuilderError::MissingAccessToken)?;
		let refresh_token =
			self.refresh_token.ok_or(TokenRecordBuilderError::MissingRefreshToken)?;
		let now = OffsetDateTime::now_utc();
		let issued_at = self.issued_at.unwrap_or(now);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => issued_at.saturating_add(delta),
			(None, None) => return Err(TokenRecordBuilderError::MissingExpiry),
		};

		Ok(TokenRecord {
			tenant_id: self.tenant_id,
			access_token,
			refresh_token,
			issued_at,
			expires_at,
			user_id: self.user_id,
			app_id: self.app_id,
			updated_at: now,
			attributes: self.attributes,
		})
	}
}
