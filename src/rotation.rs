//! Rotation client contract: one network exchange turning a refresh token into a new
//! access/refresh pair.
//!
//! [`TokenRotator`] is the seam the scheduler depends on. The reqwest-backed
//! [`RotationClient`] implements it for real providers; tests plug in scripted rotators.

#[cfg(feature = "reqwest")] pub mod client;
#[cfg(feature = "reqwest")] mod response;

#[cfg(feature = "reqwest")] pub use client::RotationClient;

// self
use crate::{
	_prelude::*,
	auth::{AppId, TenantId, TokenRecord, TokenRecordBuilderError, TokenSecret, UserId},
	store::TokenFieldUpdate,
};

/// Boxed future returned by [`TokenRotator::rotate`].
pub type RotationFuture<'a> = Pin<Box<dyn Future<Output = Result<NewTokenMaterial>> + 'a + Send>>;

/// Exchanges a refresh token for new token material.
///
/// Implementations perform exactly one request and never retry internally; retry policy
/// belongs to the scheduler.
pub trait TokenRotator
where
	Self: Send + Sync,
{
	/// Rotates `refresh_token`; the old refresh token is invalid once this succeeds.
	fn rotate<'a>(&'a self, refresh_token: &'a TokenSecret) -> RotationFuture<'a>;
}

/// Lifetime of the rotated access token as reported by the provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expiry {
	/// Absolute expiry instant (`exp`).
	Absolute(OffsetDateTime),
	/// Lifetime relative to the moment of issue (`expires_in`).
	Relative(Duration),
}

/// Output of a successful rotation.
#[derive(Clone, PartialEq, Eq)]
pub struct NewTokenMaterial {
	/// New access token.
	pub access_token: TokenSecret,
	/// New refresh token; the previous one is now invalid.
	pub refresh_token: TokenSecret,
	/// Issued-at instant, when the provider reports one.
	pub issued_at: Option<OffsetDateTime>,
	/// Expiry of the access token.
	pub expiry: Expiry,
	/// Tenant identifier echoed by the provider.
	pub tenant_id: Option<TenantId>,
	/// User identifier echoed by the provider.
	pub user_id: Option<UserId>,
	/// App identifier echoed by the provider.
	pub app_id: Option<AppId>,
}
impl NewTokenMaterial {
	/// Creates material with a relative expiry and no echoed identifiers.
	pub fn new(
		access_token: impl Into<TokenSecret>,
		refresh_token: impl Into<TokenSecret>,
		expires_in: Duration,
	) -> Self {
		Self {
			access_token: access_token.into(),
			refresh_token: refresh_token.into(),
			issued_at: None,
			expiry: Expiry::Relative(expires_in),
			tenant_id: None,
			user_id: None,
			app_id: None,
		}
	}

	/// Resolves issue and expiry instants against `now`.
	///
	/// A relative expiry that would leave the supported calendar saturates at its end.
	pub fn resolve(&self, now: OffsetDateTime) -> (OffsetDateTime, OffsetDateTime) {
		let issued_at = self.issued_at.unwrap_or(now);
		let expires_at = match self.expiry {
			Expiry::Absolute(at) => at,
			Expiry::Relative(lifetime) => issued_at.saturating_add(lifetime),
		};

		(issued_at, expires_at)
	}

	/// Field update carrying the rotated material, conditioned on `expected_refresh`.
	pub fn to_update(
		&self,
		now: OffsetDateTime,
		expected_refresh: Option<TokenSecret>,
	) -> TokenFieldUpdate {
		let (issued_at, expires_at) = self.resolve(now);

		TokenFieldUpdate {
			access_token: Some(self.access_token.clone()),
			refresh_token: Some(self.refresh_token.clone()),
			issued_at: Some(issued_at),
			expires_at: Some(expires_at),
			user_id: self.user_id.clone(),
			app_id: self.app_id.clone(),
			expected_refresh,
		}
	}

	/// Full record for `tenant`, used when no stored record exists.
	pub fn to_record(
		&self,
		tenant: TenantId,
		now: OffsetDateTime,
	) -> Result<TokenRecord, TokenRecordBuilderError> {
		let (issued_at, expires_at) = self.resolve(now);

		TokenRecord::builder(tenant)
			.access_token(self.access_token.clone())
			.refresh_token(self.refresh_token.clone())
			.issued_at(issued_at)
			.expires_at(expires_at)
			.user_id(self.user_id.clone())
			.app_id(self.app_id.clone())
			.build()
	}
}
impl Debug for NewTokenMaterial {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("NewTokenMaterial")
			.field("refresh_fingerprint", &self.refresh_token.fingerprint())
			.field("issued_at", &self.issued_at)
			.field("expiry", &self.expiry)
			.field("tenant_id", &self.tenant_id)
			.field("user_id", &self.user_id)
			.field("app_id", &self.app_id)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;
	use crate::_preludet::tenant;

	#[test]
	fn relative_expiry_counts_from_issue_time() {
		let now = datetime!(2025-01-01 12:00 UTC);
		let mut material = NewTokenMaterial::new("a1", "r1", Duration::hours(1));

		assert_eq!(material.resolve(now), (now, datetime!(2025-01-01 13:00 UTC)));

		material.issued_at = Some(datetime!(2025-01-01 11:30 UTC));

		assert_eq!(material.resolve(now).1, datetime!(2025-01-01 12:30 UTC));
	}

	#[test]
	fn oversized_relative_expiry_saturates() {
		let now = datetime!(2025-01-01 12:00 UTC);
		let material = NewTokenMaterial::new("a1", "r1", Duration::MAX);
		let (issued_at, expires_at) = material.resolve(now);

		assert_eq!(issued_at, now);
		assert!(expires_at > now);
		assert!(material.to_record(tenant("T1"), now).is_ok());
	}

	#[test]
	fn absolute_expiry_is_used_verbatim() {
		let now = datetime!(2025-01-01 12:00 UTC);
		let material = NewTokenMaterial {
			expiry: Expiry::Absolute(datetime!(2025-01-02 00:00 UTC)),
			..NewTokenMaterial::new("a1", "r1", Duration::ZERO)
		};

		assert_eq!(material.resolve(now).1, datetime!(2025-01-02 00:00 UTC));
	}

	#[test]
	fn update_and_record_carry_the_material() {
		let now = datetime!(2025-01-01 12:00 UTC);
		let material = NewTokenMaterial::new("a1", "r1", Duration::hours(12));
		let update = material.to_update(now, Some(TokenSecret::new("r0")));

		assert_eq!(update.refresh_token.as_ref().map(TokenSecret::expose), Some("r1"));
		assert_eq!(update.expected_refresh.as_ref().map(TokenSecret::expose), Some("r0"));
		assert_eq!(update.expires_at, Some(datetime!(2025-01-02 00:00 UTC)));

		let record = material.to_record(tenant("T1"), now).expect("Record should build.");

		assert_eq!(record.access_token.expose(), "a1");
		assert_eq!(record.issued_at, now);

		let secret = NewTokenMaterial::new("xoxe.xoxp-secret", "xoxe-1-secret", Duration::hours(1));

		assert!(!format!("{secret:?}").contains("secret"));
	}
}
