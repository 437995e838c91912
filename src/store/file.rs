//! Durable file-backed [`TokenStore`] for single-node deployments.
//!
//! Every mutation serializes the candidate snapshot to a temporary file, syncs it, and
//! renames it over the store path before the in-memory view changes. A failed write
//! therefore leaves both the file and the memory view at the previous state.
//!
//! Disk work runs on the blocking pool while the writer lock is held. A caller whose
//! deadline fires stops waiting, but the write it started still lands whole before the
//! next writer runs.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::{TenantId, TokenRecord},
	store::{StoreError, StoreFuture, TokenFieldUpdate, TokenStore, UpdateOutcome},
};

type Snapshot = HashMap<TenantId, TokenRecord>;

/// Persists tenant records to a JSON file after each mutation.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	records: Arc<RwLock<Snapshot>>,
	writer: Arc<AsyncMutex<()>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		ensure_parent_exists(&path)?;

		let snapshot = load_snapshot(&path)?;

		Ok(Self::with_snapshot(path, snapshot))
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn with_snapshot(path: PathBuf, snapshot: Snapshot) -> Self {
		Self { path, records: Arc::new(RwLock::new(snapshot)), writer: Default::default() }
	}

	/// Applies `mutate` to a copy of the snapshot and commits it once it is on disk.
	async fn commit<T, F>(&self, mutate: F) -> Result<T, StoreError>
	where
		T: 'static + Send,
		F: 'static + Send + FnOnce(&mut Snapshot) -> (T, bool),
	{
		let path = self.path.clone();
		let records = self.records.clone();

		run_serialized(&self.writer, move || {
			let mut candidate = records.read().clone();
			let (value, changed) = mutate(&mut candidate);

			if changed {
				persist(&path, &candidate)?;

				*records.write() = candidate;
			}

			Ok(value)
		})
		.await
	}
}
impl TokenStore for FileStore {
	fn get<'a>(&'a self, tenant: &'a TenantId) -> StoreFuture<'a, Option<TokenRecord>> {
		Box::pin(async move { Ok(self.records.read().get(tenant).cloned()) })
	}

	fn put(&self, mut record: TokenRecord) -> StoreFuture<'_, ()> {
		Box::pin(self.commit(move |candidate| {
			record.updated_at = OffsetDateTime::now_utc();
			candidate.insert(record.tenant_id.clone(), record);

			((), true)
		}))
	}

	fn update_fields<'a>(
		&'a self,
		tenant: &'a TenantId,
		update: TokenFieldUpdate,
	) -> StoreFuture<'a, UpdateOutcome> {
		let tenant = tenant.to_owned();

		Box::pin(self.commit(move |candidate| {
			let outcome =
				update.apply_conditionally(candidate.get_mut(&tenant), OffsetDateTime::now_utc());

			(outcome, matches!(outcome, UpdateOutcome::Updated))
		}))
	}
}

/// Runs `job` on the blocking pool; `writer` stays locked until `job` returns, even when
/// the caller stops waiting.
pub(crate) async fn run_serialized<T, F>(
	writer: &Arc<AsyncMutex<()>>,
	job: F,
) -> Result<T, StoreError>
where
	T: 'static + Send,
	F: 'static + Send + FnOnce() -> Result<T, StoreError>,
{
	let guard = writer.lock_arc().await;

	tokio::task::spawn_blocking(move || {
		let _guard = guard;

		job()
	})
	.await
	.map_err(|e| StoreError::Backend { message: format!("Store I/O task failed: {e}") })?
}

fn persist(path: &Path, contents: &Snapshot) -> Result<(), StoreError> {
	let mut records: Vec<_> = contents.values().collect();

	records.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));

	let serialized = serde_json::to_vec_pretty(&records).map_err(|e| {
		StoreError::Serialization { message: format!("Failed to serialize store snapshot: {e}") }
	})?;

	write_atomically(path, &serialized)
}

fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
	if !path.exists() {
		return Ok(HashMap::new());
	}

	let bytes = fs::read(path).map_err(|e| StoreError::Backend {
		message: format!("Failed to read {}: {e}", path.display()),
	})?;

	if bytes.is_empty() {
		return Ok(HashMap::new());
	}

	let records: Vec<TokenRecord> =
		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})?;

	Ok(records.into_iter().map(|record| (record.tenant_id.clone(), record)).collect())
}

pub(crate) fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
			message: format!("Failed to create store directory {}: {e}", parent.display()),
		})?;
	}

	Ok(())
}

pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
	ensure_parent_exists(path)?;

	let mut tmp_path = path.to_path_buf();

	tmp_path.set_extension("tmp");

	{
		let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
			message: format!("Failed to create {}: {e}", tmp_path.display()),
		})?;

		file.write_all(bytes).map_err(|e| StoreError::Backend {
			message: format!("Failed to write {}: {e}", tmp_path.display()),
		})?;
		file.sync_all().map_err(|e| StoreError::Backend {
			message: format!("Failed to sync {}: {e}", tmp_path.display()),
		})?;
	}

	fs::rename(&tmp_path, path).map_err(|e| StoreError::Backend {
		message: format!("Failed to replace {}: {e}", path.display()),
	})
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// crates.io
	use tokio::runtime::Runtime;
	// self
	use super::*;
	use crate::{
		_preludet::{record_fixture, tenant},
		auth::TokenSecret,
	};

	fn temp_path(label: &str) -> PathBuf {
		let unique = format!(
			"oauth2_rotor_file_store_{label}_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	#[test]
	fn put_and_reload_round_trip() {
		let path = temp_path("reload");
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let record = record_fixture("T1", "a0", "r0");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");

		rt.block_on(store.put(record.clone())).expect("Failed to put fixture record.");
		drop(store);

		let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");
		let fetched = rt
			.block_on(reopened.get(&tenant("T1")))
			.expect("Failed to read fixture record from file store.")
			.expect("File store lost record after reopen.");

		assert_eq!(fetched.access_token.expose(), "a0");
		assert_eq!(fetched.refresh_token.expose(), "r0");
		assert_eq!(fetched.expires_at.unix_timestamp(), record.expires_at.unix_timestamp());

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[test]
	fn field_update_persists_and_keeps_attributes() {
		let path = temp_path("update");
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let mut record = record_fixture("T1", "a0", "r0");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");

		record.attributes.insert("team_name".into(), "acme".into());
		rt.block_on(store.put(record)).expect("Failed to put fixture record.");

		let update = TokenFieldUpdate {
			access_token: Some(TokenSecret::new("a1")),
			refresh_token: Some(TokenSecret::new("r1")),
			expected_refresh: Some(TokenSecret::new("r0")),
			..Default::default()
		};
		let outcome = rt
			.block_on(store.update_fields(&tenant("T1"), update))
			.expect("Field update should succeed.");

		assert_eq!(outcome, UpdateOutcome::Updated);

		let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");
		let fetched = rt
			.block_on(reopened.get(&tenant("T1")))
			.expect("Failed to read updated record.")
			.expect("Updated record should be present.");

		assert_eq!(fetched.refresh_token.expose(), "r1");
		assert_eq!(fetched.attributes.get("team_name").map(String::as_str), Some("acme"));

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[test]
	fn queued_writes_honor_caller_deadlines() {
		let path = temp_path("queued");
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");
		let elapsed = rt.block_on(async {
			let _busy = store.writer.lock_arc().await;

			tokio::time::timeout(
				StdDuration::from_millis(20),
				store.put(record_fixture("T1", "a0", "r0")),
			)
			.await
		});

		assert!(elapsed.is_err(), "A writer queued behind a busy store should hit its deadline.");
		assert!(rt.block_on(store.get(&tenant("T1"))).expect("Read should succeed.").is_none());

		// Abandoning a write once it reached the blocking pool still lets it finish.
		let _ = rt.block_on(async {
			tokio::time::timeout(StdDuration::ZERO, store.put(record_fixture("T2", "a0", "r0")))
				.await
		});

		rt.block_on(store.put(record_fixture("T3", "a0", "r0")))
			.expect("The next write should wait for the previous one and succeed.");

		let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");

		for tenant_id in ["T2", "T3"] {
			assert!(
				rt.block_on(reopened.get(&tenant(tenant_id)))
					.expect("Read should succeed.")
					.is_some(),
				"{tenant_id} should be on disk."
			);
			assert!(
				rt.block_on(store.get(&tenant(tenant_id))).expect("Read should succeed.").is_some(),
				"{tenant_id} should be in memory."
			);
		}

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[test]
	fn failed_persist_leaves_memory_untouched() {
		let dir = temp_path("blocked");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");

		// A directory at the target path makes the final rename fail.
		fs::create_dir_all(&dir).expect("Failed to create blocking directory.");

		let store = FileStore::with_snapshot(dir.clone(), Snapshot::new());
		let err = rt
			.block_on(store.put(record_fixture("T1", "a0", "r0")))
			.expect_err("Persisting over a directory should fail.");

		assert!(matches!(err, StoreError::Backend { .. }));
		assert!(
			rt.block_on(store.get(&tenant("T1"))).expect("Read should still succeed.").is_none()
		);

		let _ = fs::remove_file(dir.with_extension("tmp"));

		fs::remove_dir_all(&dir).unwrap_or_else(|e| {
			panic!("Failed to remove blocking directory {}: {e}", dir.display())
		});
	}
}
