//! Request-path token reads.
//!
//! [`TokenAccessor`] answers "what is the current token for this tenant" with the operator
//! override taking precedence over the store. It never rotates and never inspects expiry:
//! the schedule keeps the stored token fresh.

// self
use crate::{
	_prelude::*,
	auth::{TenantId, TokenRecord, TokenSecret},
	config::OverrideConfig,
	error::TransientError,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::TokenStore,
};

/// Where a looked-up secret came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenSource {
	/// Operator-supplied override.
	Override,
	/// Token store record.
	Store,
}

/// Secret returned by [`TokenAccessor::refresh_token`], tagged with its origin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenLookup {
	/// The secret itself.
	pub secret: TokenSecret,
	/// Origin of the secret.
	pub source: TokenSource,
}

/// Reads current tokens for request handlers and the rotation engine.
#[derive(Clone)]
pub struct TokenAccessor {
	store: Arc<dyn TokenStore>,
	overrides: OverrideConfig,
	store_timeout: StdDuration,
}
impl TokenAccessor {
	/// Creates an accessor over `store`; every store read is bounded by `store_timeout`.
	pub fn new(
		store: Arc<dyn TokenStore>,
		overrides: OverrideConfig,
		store_timeout: StdDuration,
	) -> Self {
		Self { store, overrides, store_timeout }
	}

	/// Operator overrides in effect.
	pub fn overrides(&self) -> &OverrideConfig {
		&self.overrides
	}

	/// Returns the access token to present to the provider for `tenant`.
	///
	/// The access-token override wins when set; otherwise the stored token is returned even
	/// if its recorded expiry has passed.
	pub async fn current_token(&self, tenant: &TenantId) -> Result<TokenSecret> {
		if let Some(secret) = &self.overrides.access_token {
			return Ok(secret.clone());
		}

		Ok(self.current_record(tenant).await?.access_token)
	}

	/// Returns the refresh token the next rotation should present, tagged with its source.
	pub async fn refresh_token(&self, tenant: &TenantId) -> Result<TokenLookup> {
		if let Some(secret) = &self.overrides.refresh_token {
			return Ok(TokenLookup { secret: secret.clone(), source: TokenSource::Override });
		}

		let record = self.current_record(tenant).await?;

		Ok(TokenLookup { secret: record.refresh_token, source: TokenSource::Store })
	}

	/// Returns the whole stored record, ignoring overrides.
	pub async fn current_record(&self, tenant: &TenantId) -> Result<TokenRecord> {
		const KIND: FlowKind = FlowKind::Lookup;

		let span = FlowSpan::new(KIND, "current_record", tenant.as_ref());
		let result = span
			.instrument(async {
				within("store read", self.store_timeout, self.store.get(tenant))
					.await?
					.ok_or_else(|| Error::NotFound { tenant: tenant.clone() })
			})
			.await;

		obs::record_flow_outcome(KIND, FlowOutcome::of(&result));

		result
	}
}
impl Debug for TokenAccessor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenAccessor")
			.field("overrides", &self.overrides)
			.field("store_timeout", &self.store_timeout)
			.finish()
	}
}

/// Runs `fut` under a deadline; an elapsed deadline becomes [`TransientError::Timeout`].
pub(crate) async fn within<T, E, F>(
	operation: &'static str,
	after: StdDuration,
	fut: F,
) -> Result<T>
where
	F: Future<Output = std::result::Result<T, E>>,
	Error: From<E>,
{
	match tokio::time::timeout(after, fut).await {
		Ok(result) => result.map_err(Error::from),
		Err(_) => Err(TransientError::Timeout { operation, after }.into()),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::{record_fixture, tenant},
		store::MemoryStore,
	};

	fn accessor(store: MemoryStore, overrides: OverrideConfig) -> TokenAccessor {
		TokenAccessor::new(Arc::new(store), overrides, StdDuration::from_secs(5))
	}

	#[tokio::test]
	async fn store_token_is_served_without_overrides() {
		let store = MemoryStore::default();

		store.put(record_fixture("T1", "a0", "r0")).await.expect("Seeding should succeed.");

		let accessor = accessor(store, OverrideConfig::default());
		let token = accessor.current_token(&tenant("T1")).await.expect("Token should resolve.");
		let lookup = accessor.refresh_token(&tenant("T1")).await.expect("Refresh should resolve.");

		assert_eq!(token.expose(), "a0");
		assert_eq!(lookup.secret.expose(), "r0");
		assert_eq!(lookup.source, TokenSource::Store);
	}

	#[tokio::test]
	async fn overrides_win_over_any_store_state() {
		let overrides =
			OverrideConfig::default().with_access_token("a-manual").with_refresh_token("r-manual");
		let empty = accessor(MemoryStore::default(), overrides.clone());

		assert_eq!(
			empty.current_token(&tenant("T1")).await.expect("Override should resolve.").expose(),
			"a-manual"
		);

		let store = MemoryStore::default();

		store.put(record_fixture("T1", "a0", "r0")).await.expect("Seeding should succeed.");

		let seeded = accessor(store, overrides);
		let lookup = seeded.refresh_token(&tenant("T1")).await.expect("Override should resolve.");

		assert_eq!(lookup.secret.expose(), "r-manual");
		assert_eq!(lookup.source, TokenSource::Override);
		assert_eq!(
			seeded.current_token(&tenant("T1")).await.expect("Override should resolve.").expose(),
			"a-manual"
		);
	}

	#[tokio::test]
	async fn expired_records_are_still_served() {
		let store = MemoryStore::default();
		let mut record = record_fixture("T1", "a-stale", "r0");

		record.expires_at = OffsetDateTime::now_utc() - Duration::hours(1);
		store.put(record).await.expect("Seeding should succeed.");

		let token = accessor(store, OverrideConfig::default())
			.current_token(&tenant("T1"))
			.await
			.expect("Stale token should still be returned.");

		assert_eq!(token.expose(), "a-stale");
	}

	#[tokio::test]
	async fn unknown_tenant_is_not_found() {
		let err = accessor(MemoryStore::default(), OverrideConfig::default())
			.current_token(&tenant("T2"))
			.await
			.expect_err("Unknown tenant must fail.");

		assert!(matches!(err, Error::NotFound { ref tenant } if tenant.as_ref() == "T2"));
	}

	#[tokio::test(start_paused = true)]
	async fn deadline_expiry_is_transient() {
		let err = within(
			"store read",
			StdDuration::from_millis(50),
			std::future::pending::<std::result::Result<(), crate::store::StoreError>>(),
		)
		.await
		.expect_err("Pending future must time out.");

		assert!(matches!(
			err,
			Error::Transient(TransientError::Timeout { operation: "store read", .. })
		));
		assert!(err.is_retryable());
	}
}
