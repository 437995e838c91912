//! One guarded rotation: lookup, provider exchange, bounded write-back, and journaling.
//!
//! [`RotationEngine`] is shared by every tenant schedule and by operator calls. Each
//! rotation holds a per-tenant guard so timer ticks and [`RotationEngine::rotate_now`]
//! never overlap for the same tenant, while different tenants proceed independently.

// std
use std::collections::BTreeSet;
// self
use crate::{
	_prelude::*,
	accessor::{self, TokenAccessor, TokenSource},
	auth::{TenantId, TokenSecret},
	config::RotorConfig,
	error::ConfigError,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	rotation::{NewTokenMaterial, TokenRotator},
	schedule::{RotationMetrics, backoff},
	store::{
		PendingReason, PendingRotation, PendingRotationLog, StoreError, TokenFieldUpdate,
		TokenStore, UpdateOutcome,
	},
};

/// How rotated material reached the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
	/// The existing record was updated in place.
	Updated,
	/// No record existed; a new one was created from the material.
	Created,
	/// The stored refresh token changed underneath the rotation; the stored record was kept
	/// and the rotated material was journaled as [`PendingReason::Superseded`].
	KeptNewer,
}

/// Summary of a successful rotation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RotationReport {
	/// Rotated tenant.
	pub tenant: TenantId,
	/// Fingerprint of the new refresh token.
	pub refresh_fingerprint: String,
	/// Expiry of the new access token.
	pub expires_at: OffsetDateTime,
	/// How the material reached the store.
	pub write: WriteOutcome,
	/// Store write attempts used.
	pub write_attempts: u32,
}

/// Result of [`RotationEngine::replay_pending`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
	/// Tenants whose journaled material was written back.
	pub replayed: usize,
	/// Tenants whose stored record was newer than the journal entry.
	pub skipped: usize,
	/// Tenants whose write-back failed; their entries stay in the journal.
	pub failed: usize,
}

/// Executes rotations against a store, a rotator, and a pending journal.
pub struct RotationEngine {
	store: Arc<dyn TokenStore>,
	rotator: Arc<dyn TokenRotator>,
	pending: Arc<dyn PendingRotationLog>,
	accessor: TokenAccessor,
	config: RotorConfig,
	metrics: Arc<RotationMetrics>,
	guards: Arc<Mutex<HashMap<TenantId, Arc<AsyncMutex<()>>>>>,
}
impl RotationEngine {
	/// Creates an engine after validating `config`.
	pub fn new(
		store: Arc<dyn TokenStore>,
		rotator: Arc<dyn TokenRotator>,
		pending: Arc<dyn PendingRotationLog>,
		config: RotorConfig,
	) -> Result<Self, ConfigError> {
		config.validate()?;

		let accessor =
			TokenAccessor::new(store.clone(), config.overrides.clone(), config.store_timeout());

		Ok(Self {
			store,
			rotator,
			pending,
			accessor,
			config,
			metrics: Default::default(),
			guards: Default::default(),
		})
	}

	/// Configuration the engine runs with.
	pub fn config(&self) -> &RotorConfig {
		&self.config
	}

	/// Accessor sharing the engine's store and overrides.
	pub fn accessor(&self) -> &TokenAccessor {
		&self.accessor
	}

	/// Shared rotation counters.
	pub fn metrics(&self) -> &Arc<RotationMetrics> {
		&self.metrics
	}

	/// Runs one rotation for `tenant`; used by the schedule on every tick.
	pub async fn rotate_once(&self, tenant: &TenantId) -> Result<RotationReport> {
		self.run(tenant, "rotate_once").await
	}

	/// Runs one rotation on operator request, serialized with any scheduled rotation.
	pub async fn rotate_now(&self, tenant: &TenantId) -> Result<RotationReport> {
		self.run(tenant, "rotate_now").await
	}

	/// Writes journaled rotations back to the store, latest entry per tenant.
	///
	/// Each tenant is replayed under its rotation guard from a fresh read of the journal, so
	/// material journaled by a rotation that finished meanwhile is the one applied. Entries
	/// older than the stored record are dropped; entries that still cannot be written stay
	/// in the journal for the next replay. Superseded entries are never replayed.
	pub async fn replay_pending(&self) -> Result<ReplaySummary> {
		const KIND: FlowKind = FlowKind::Replay;

		let entries =
			accessor::within("journal read", self.config.store_timeout(), self.pending.entries())
				.await?;
		let tenants = entries
			.into_iter()
			.filter(|entry| entry.reason == PendingReason::WriteFailed)
			.map(|entry| entry.tenant_id)
			.collect::<BTreeSet<_>>();
		let mut summary = ReplaySummary::default();

		for tenant in tenants {
			let span = FlowSpan::new(KIND, "replay_pending", tenant.as_ref());

			obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

			let result = span.instrument(self.replay_one(&tenant)).await;

			obs::record_flow_outcome(KIND, FlowOutcome::of(&result));

			match result {
				Ok(Replayed::Applied(fingerprint)) => {
					tracing::info!(
						tenant = %tenant,
						fingerprint = %fingerprint,
						"Replayed pending rotation."
					);

					summary.replayed += 1;
				},
				Ok(Replayed::Stale(fingerprint)) => {
					tracing::warn!(
						tenant = %tenant,
						fingerprint = %fingerprint,
						"Dropped pending rotation older than the stored record."
					);

					summary.skipped += 1;
				},
				Ok(Replayed::Gone) => {},
				Err(e) => {
					tracing::error!(tenant = %tenant, error = %e, "Failed to replay pending rotation.");

					summary.failed += 1;
				},
			}
		}

		Ok(summary)
	}

	async fn replay_one(&self, tenant: &TenantId) -> Result<Replayed> {
		let guard = self.guard(tenant);
		let _singleflight = guard.lock().await;
		let store_timeout = self.config.store_timeout();
		let entries =
			accessor::within("journal read", store_timeout, self.pending.entries()).await?;
		let Some(entry) = entries
			.into_iter()
			.filter(|entry| entry.tenant_id == *tenant && entry.reason == PendingReason::WriteFailed)
			.max_by_key(|entry| entry.recorded_at)
		else {
			return Ok(Replayed::Gone);
		};
		let current = accessor::within("store read", store_timeout, self.store.get(tenant)).await?;
		let fresh = current.is_none_or(|record| record.updated_at <= entry.recorded_at);

		if fresh {
			let outcome = accessor::within(
				"store write",
				store_timeout,
				self.store.update_fields(tenant, entry.to_update()),
			)
			.await?;

			if matches!(outcome, UpdateOutcome::Missing) {
				let record = entry.to_record().map_err(ConfigError::from)?;

				accessor::within("store write", store_timeout, self.store.put(record)).await?;
			}
		}

		accessor::within(
			"journal clear",
			store_timeout,
			self.pending.clear_through(tenant, entry.recorded_at),
		)
		.await?;

		let fingerprint = entry.refresh_token.fingerprint();

		Ok(if fresh { Replayed::Applied(fingerprint) } else { Replayed::Stale(fingerprint) })
	}

	async fn run(&self, tenant: &TenantId, stage: &'static str) -> Result<RotationReport> {
		const KIND: FlowKind = FlowKind::Rotation;

		let span = FlowSpan::new(KIND, stage, tenant.as_ref());

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.metrics.record_attempt();

		let result = span.instrument(self.rotate_guarded(tenant)).await;

		obs::record_flow_outcome(KIND, FlowOutcome::of(&result));

		match &result {
			Ok(report) => {
				self.metrics.record_success();

				tracing::info!(
					tenant = %tenant,
					fingerprint = %report.refresh_fingerprint,
					expires_at = %report.expires_at,
					write = ?report.write,
					"Rotated tokens."
				);
			},
			Err(e) => {
				self.metrics.record_failure();

				if matches!(e, Error::ProviderRejected { .. }) {
					self.metrics.record_rejection();
				}

				log_failure(tenant, e);
			},
		}

		result
	}

	async fn rotate_guarded(&self, tenant: &TenantId) -> Result<RotationReport> {
		let guard = self.guard(tenant);
		let _singleflight = guard.lock().await;
		let lookup = self.accessor.refresh_token(tenant).await?;
		let material = accessor::within(
			"rotation",
			self.config.network_timeout(),
			self.rotator.rotate(&lookup.secret),
		)
		.await?;

		if let Some(echoed) = material.tenant_id.as_ref().filter(|echoed| *echoed != tenant) {
			tracing::warn!(
				tenant = %tenant,
				echoed = %echoed,
				"Provider echoed a different tenant; keeping the scheduled key."
			);
		}

		let now = OffsetDateTime::now_utc();
		let expected_refresh =
			matches!(lookup.source, TokenSource::Store).then(|| lookup.secret.clone());
		let (write, write_attempts) = self.persist(tenant, &material, expected_refresh, now).await?;
		let (_, expires_at) = material.resolve(now);

		Ok(RotationReport {
			tenant: tenant.clone(),
			refresh_fingerprint: material.refresh_token.fingerprint(),
			expires_at,
			write,
			write_attempts,
		})
	}

	async fn persist(
		&self,
		tenant: &TenantId,
		material: &NewTokenMaterial,
		expected_refresh: Option<TokenSecret>,
		now: OffsetDateTime,
	) -> Result<(WriteOutcome, u32)> {
		const KIND: FlowKind = FlowKind::Persist;

		let span = FlowSpan::new(KIND, "persist", tenant.as_ref());
		let policy = self.config.write_retry;
		let mut attempt = 0;

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		loop {
			attempt += 1;

			let update = material.to_update(now, expected_refresh.clone());
			let result = span.instrument(self.write(tenant, material, update, now)).await;

			match result {
				Ok(outcome) => {
					obs::record_flow_outcome(KIND, FlowOutcome::Success);

					if outcome == WriteOutcome::KeptNewer {
						let entry = pending_entry(
							tenant,
							material,
							now,
							PendingReason::Superseded,
							"stored refresh token changed during rotation".into(),
						);

						self.append_pending(entry).await;
					}

					return Ok((outcome, attempt));
				},
				Err(e) if attempt >= policy.max_attempts => {
					obs::record_flow_outcome(KIND, FlowOutcome::Failure);

					return Err(self.journal(tenant, material, now, attempt, e).await);
				},
				Err(e) => {
					self.metrics.record_write_retry();

					tracing::warn!(
						tenant = %tenant,
						attempt,
						error = %e,
						"Failed to store rotated tokens; retrying."
					);
					tokio::time::sleep(backoff::delay(&policy, attempt, policy.max_backoff())).await;
				},
			}
		}
	}

	async fn write(
		&self,
		tenant: &TenantId,
		material: &NewTokenMaterial,
		update: TokenFieldUpdate,
		now: OffsetDateTime,
	) -> Result<WriteOutcome, StoreError> {
		let store_timeout = self.config.store_timeout();

		match bounded(store_timeout, self.store.update_fields(tenant, update)).await? {
			UpdateOutcome::Updated => Ok(WriteOutcome::Updated),
			UpdateOutcome::RefreshMismatch => {
				tracing::warn!(
					tenant = %tenant,
					fingerprint = %material.refresh_token.fingerprint(),
					"Stored refresh token changed during rotation; keeping the stored record."
				);

				Ok(WriteOutcome::KeptNewer)
			},
			UpdateOutcome::Missing => {
				let record = material.to_record(tenant.clone(), now).map_err(|e| {
					StoreError::Serialization { message: format!("Failed to build record: {e}") }
				})?;

				bounded(store_timeout, self.store.put(record)).await?;

				Ok(WriteOutcome::Created)
			},
		}
	}

	async fn journal(
		&self,
		tenant: &TenantId,
		material: &NewTokenMaterial,
		now: OffsetDateTime,
		attempts: u32,
		source: StoreError,
	) -> Error {
		self.metrics.record_unpersisted();

		tracing::error!(
			tenant = %tenant,
			attempts,
			fingerprint = %material.refresh_token.fingerprint(),
			error = %source,
			"Rotated tokens could not be stored; journaling a pending rotation."
		);

		let entry =
			pending_entry(tenant, material, now, PendingReason::WriteFailed, source.to_string());

		self.append_pending(entry).await;

		Error::RotationNotPersisted { tenant: tenant.clone(), attempts, source }
	}

	async fn append_pending(&self, entry: PendingRotation) {
		let tenant = entry.tenant_id.clone();
		let fingerprint = entry.refresh_token.fingerprint();
		let reason = entry.reason;

		if let Err(e) = bounded(self.config.store_timeout(), self.pending.append(entry)).await {
			tracing::error!(
				tenant = %tenant,
				fingerprint = %fingerprint,
				reason = ?reason,
				error = %e,
				"Failed to journal the pending rotation; the rotated refresh token is lost."
			);
		}
	}

	fn guard(&self, tenant: &TenantId) -> Arc<AsyncMutex<()>> {
		let mut guards = self.guards.lock();

		guards.entry(tenant.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}
}
impl Debug for RotationEngine {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RotationEngine")
			.field("config", &self.config)
			.field("metrics", &self.metrics)
			.finish()
	}
}

enum Replayed {
	Applied(String),
	Stale(String),
	Gone,
}

fn pending_entry(
	tenant: &TenantId,
	material: &NewTokenMaterial,
	now: OffsetDateTime,
	reason: PendingReason,
	last_error: String,
) -> PendingRotation {
	let (issued_at, expires_at) = material.resolve(now);

	PendingRotation {
		tenant_id: tenant.clone(),
		access_token: material.access_token.clone(),
		refresh_token: material.refresh_token.clone(),
		issued_at,
		expires_at,
		user_id: material.user_id.clone(),
		app_id: material.app_id.clone(),
		recorded_at: OffsetDateTime::now_utc(),
		reason,
		last_error,
	}
}

async fn bounded<T, F>(after: StdDuration, fut: F) -> Result<T, StoreError>
where
	F: Future<Output = Result<T, StoreError>>,
{
	tokio::time::timeout(after, fut).await.map_err(|_| StoreError::Backend {
		message: format!("Store call timed out after {after:?}"),
	})?
}

fn log_failure(tenant: &TenantId, e: &Error) {
	match e {
		Error::NotFound { .. } =>
			tracing::info!(tenant = %tenant, "No token record for tenant; skipping rotation."),
		Error::Storage(_) | Error::Transient(_) | Error::Transport(_) =>
			tracing::warn!(tenant = %tenant, error = %e, "Rotation failed; will retry."),
		Error::ProviderRejected { reason } => tracing::error!(
			tenant = %tenant,
			reason = %reason,
			"Provider rejected the rotation; re-authorization required."
		),
		// Logged with the journaling outcome.
		Error::RotationNotPersisted { .. } => {},
		Error::Config(_) | Error::MalformedResponse(_) =>
			tracing::error!(tenant = %tenant, error = %e, "Rotation failed."),
	}
}
