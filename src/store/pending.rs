//! Journal of rotations the provider completed but the token store never accepted.
//!
//! Once a provider rotates a refresh token the old one is gone server-side, so material
//! that cannot be written must survive somewhere an operator can replay it from.
//!
//! Entries carry a [`PendingReason`]. Only [`PendingReason::WriteFailed`] entries are
//! replayed automatically; superseded material stays until an operator clears it.

// std
use std::{
	fs::{self, OpenOptions},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::{AppId, TenantId, TokenRecord, TokenRecordBuilderError, TokenSecret, UserId},
	store::{StoreError, StoreFuture, TokenFieldUpdate, file},
};

/// Rotated material waiting to be written back to the token store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRotation {
	/// Tenant the material belongs to.
	pub tenant_id: TenantId,
	/// Rotated access token.
	pub access_token: TokenSecret,
	/// Rotated refresh token; the only valid one left.
	pub refresh_token: TokenSecret,
	/// Issued-at instant of the rotated pair.
	#[serde(with = "time::serde::timestamp")]
	pub issued_at: OffsetDateTime,
	/// Expiry instant of the rotated access token.
	#[serde(with = "time::serde::timestamp")]
	pub expires_at: OffsetDateTime,
	/// Provider-assigned user identifier.
	#[serde(default)]
	pub user_id: Option<UserId>,
	/// Provider-assigned app identifier.
	#[serde(default)]
	pub app_id: Option<AppId>,
	/// When the entry was journaled.
	#[serde(with = "time::serde::rfc3339")]
	pub recorded_at: OffsetDateTime,
	/// Why the material was journaled instead of stored.
	#[serde(default)]
	pub reason: PendingReason,
	/// Last store error observed before giving up.
	pub last_error: String,
}
impl PendingRotation {
	/// Field update that writes this material back unconditionally.
	pub fn to_update(&self) -> TokenFieldUpdate {
		TokenFieldUpdate {
			access_token: Some(self.access_token.clone()),
			refresh_token: Some(self.refresh_token.clone()),
			issued_at: Some(self.issued_at),
			expires_at: Some(self.expires_at),
			user_id: self.user_id.clone(),
			app_id: self.app_id.clone(),
			expected_refresh: None,
		}
	}

	/// Full record used when the tenant has no stored record any more.
	pub fn to_record(&self) -> Result<TokenRecord, TokenRecordBuilderError> {
		TokenRecord::builder(self.tenant_id.clone())
			.access_token(self.access_token.clone())
			.refresh_token(self.refresh_token.clone())
			.issued_at(self.issued_at)
			.expires_at(self.expires_at)
			.user_id(self.user_id.clone())
			.app_id(self.app_id.clone())
			.build()
	}
}
impl Debug for PendingRotation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PendingRotation")
			.field("tenant_id", &self.tenant_id)
			.field("refresh_fingerprint", &self.refresh_token.fingerprint())
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.field("recorded_at", &self.recorded_at)
			.field("reason", &self.reason)
			.field("last_error", &self.last_error)
			.finish()
	}
}

/// Why a rotation ended up in the journal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingReason {
	/// Every write attempt failed; the material is the tenant's live refresh token.
	#[default]
	WriteFailed,
	/// The stored refresh token changed while the rotation was in flight, so the store kept
	/// the newer pair.
	Superseded,
}

/// Durable append-only journal of [`PendingRotation`] entries.
pub trait PendingRotationLog
where
	Self: Send + Sync,
{
	/// Appends an entry; must be durable once the future resolves.
	fn append(&self, entry: PendingRotation) -> StoreFuture<'_, ()>;

	/// Returns every journaled entry in append order.
	fn entries(&self) -> StoreFuture<'_, Vec<PendingRotation>>;

	/// Drops every entry for the tenant, returning how many were removed.
	fn clear<'a>(&'a self, tenant: &'a TenantId) -> StoreFuture<'a, usize>;

	/// Drops the tenant's [`PendingReason::WriteFailed`] entries recorded at or before `at`,
	/// returning how many were removed.
	fn clear_through<'a>(
		&'a self,
		tenant: &'a TenantId,
		at: OffsetDateTime,
	) -> StoreFuture<'a, usize>;
}

fn replayed_through(entry: &PendingRotation, tenant: &TenantId, at: OffsetDateTime) -> bool {
	entry.tenant_id == *tenant
		&& entry.reason == PendingReason::WriteFailed
		&& entry.recorded_at <= at
}

/// In-process journal for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryPendingLog(Arc<Mutex<Vec<PendingRotation>>>);
impl PendingRotationLog for MemoryPendingLog {
	fn append(&self, entry: PendingRotation) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.0.lock().push(entry);

			Ok(())
		})
	}

	fn entries(&self) -> StoreFuture<'_, Vec<PendingRotation>> {
		Box::pin(async move { Ok(self.0.lock().clone()) })
	}

	fn clear<'a>(&'a self, tenant: &'a TenantId) -> StoreFuture<'a, usize> {
		Box::pin(async move { Ok(self.remove_where(|entry| entry.tenant_id == *tenant)) })
	}

	fn clear_through<'a>(
		&'a self,
		tenant: &'a TenantId,
		at: OffsetDateTime,
	) -> StoreFuture<'a, usize> {
		Box::pin(async move { Ok(self.remove_where(|entry| replayed_through(entry, tenant, at))) })
	}
}
impl MemoryPendingLog {
	fn remove_where(&self, unwanted: impl Fn(&PendingRotation) -> bool) -> usize {
		let mut guard = self.0.lock();
		let before = guard.len();

		guard.retain(|entry| !unwanted(entry));

		before - guard.len()
	}
}

/// JSON-lines journal; each append is flushed and synced before returning.
///
/// File access runs on the blocking pool, one operation at a time per handle.
#[derive(Clone, Debug)]
pub struct FilePendingLog {
	path: PathBuf,
	writer: Arc<AsyncMutex<()>>,
}
impl FilePendingLog {
	/// Opens (or lazily creates) a journal at the provided path.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		file::ensure_parent_exists(&path)?;

		Ok(Self { path, writer: Default::default() })
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	async fn remove_where<F>(&self, unwanted: F) -> Result<usize, StoreError>
	where
		F: 'static + Send + Fn(&PendingRotation) -> bool,
	{
		let path = self.path.clone();

		file::run_serialized(&self.writer, move || {
			let (dropped, kept): (Vec<_>, Vec<_>) = read_all(&path)?.into_iter().partition(unwanted);

			if dropped.is_empty() {
				return Ok(0);
			}

			let mut buf = Vec::new();

			for entry in &kept {
				buf.extend_from_slice(&encode_line(entry)?);
			}

			file::write_atomically(&path, &buf)?;

			Ok(dropped.len())
		})
		.await
	}
}
impl PendingRotationLog for FilePendingLog {
	fn append(&self, entry: PendingRotation) -> StoreFuture<'_, ()> {
		let path = self.path.clone();

		Box::pin(file::run_serialized(&self.writer, move || {
			let line = encode_line(&entry)?;
			let mut journal =
				OpenOptions::new().create(true).append(true).open(&path).map_err(|e| {
					StoreError::Backend { message: format!("Failed to open {}: {e}", path.display()) }
				})?;

			journal.write_all(&line).map_err(|e| StoreError::Backend {
				message: format!("Failed to append to {}: {e}", path.display()),
			})?;
			journal.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", path.display()),
			})
		}))
	}

	fn entries(&self) -> StoreFuture<'_, Vec<PendingRotation>> {
		let path = self.path.clone();

		Box::pin(file::run_serialized(&self.writer, move || read_all(&path)))
	}

	fn clear<'a>(&'a self, tenant: &'a TenantId) -> StoreFuture<'a, usize> {
		let tenant = tenant.to_owned();

		Box::pin(self.remove_where(move |entry| entry.tenant_id == tenant))
	}

	fn clear_through<'a>(
		&'a self,
		tenant: &'a TenantId,
		at: OffsetDateTime,
	) -> StoreFuture<'a, usize> {
		let tenant = tenant.to_owned();

		Box::pin(self.remove_where(move |entry| replayed_through(entry, &tenant, at)))
	}
}

fn encode_line(entry: &PendingRotation) -> Result<Vec<u8>, StoreError> {
	let mut line = serde_json::to_vec(entry).map_err(|e| StoreError::Serialization {
		message: format!("Failed to serialize pending rotation: {e}"),
	})?;

	line.push(b'\n');

	Ok(line)
}

fn read_all(path: &Path) -> Result<Vec<PendingRotation>, StoreError> {
	if !path.exists() {
		return Ok(Vec::new());
	}

	let raw = fs::read_to_string(path).map_err(|e| StoreError::Backend {
		message: format!("Failed to read {}: {e}", path.display()),
	})?;

	raw.lines()
		.filter(|line| !line.trim().is_empty())
		.map(|line| {
			serde_json::from_str(line).map_err(|e| StoreError::Serialization {
				message: format!("Failed to parse {}: {e}", path.display()),
			})
		})
		.collect()
}
