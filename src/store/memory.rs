//! Thread-safe in-memory [`TokenStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::{TenantId, TokenRecord},
	store::{StoreError, StoreFuture, TokenFieldUpdate, TokenStore, UpdateOutcome},
};

type StoreMap = Arc<RwLock<HashMap<TenantId, TokenRecord>>>;

/// Thread-safe storage backend that keeps records in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Number of tenants currently stored.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when no tenant is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	fn put_now(map: StoreMap, mut record: TokenRecord) -> Result<(), StoreError> {
		record.updated_at = OffsetDateTime::now_utc();

		map.write().insert(record.tenant_id.clone(), record);

		Ok(())
	}

	fn get_now(map: StoreMap, tenant: TenantId) -> Option<TokenRecord> {
		map.read().get(&tenant).cloned()
	}

	fn update_now(map: StoreMap, tenant: TenantId, update: TokenFieldUpdate) -> UpdateOutcome {
		let mut guard = map.write();

		update.apply_conditionally(guard.get_mut(&tenant), OffsetDateTime::now_utc())
	}
}
impl TokenStore for MemoryStore {
	fn get<'a>(&'a self, tenant: &'a TenantId) -> StoreFuture<'a, Option<TokenRecord>> {
		let map = self.0.clone();
		let tenant = tenant.to_owned();

		Box::pin(async move { Ok(Self::get_now(map, tenant)) })
	}

	fn put(&self, record: TokenRecord) -> StoreFuture<'_, ()> {
		let map = self.0.clone();

		Box::pin(async move { Self::put_now(map, record) })
	}

	fn update_fields<'a>(
		&'a self,
		tenant: &'a TenantId,
		update: TokenFieldUpdate,
	) -> StoreFuture<'a, UpdateOutcome> {
		let map = self.0.clone();
		let tenant = tenant.to_owned();

		Box::pin(async move { Ok(Self::update_now(map, tenant, update)) })
	}
}
