//! Per-tenant rotation schedules and their supervisor.
//!
//! A [`RotationSchedule`] runs as one tokio task: it rotates immediately on start, then on
//! every cadence slot of `rotation_interval`. Rotations within a tenant never overlap. Slots
//! missed while a slow rotation was in flight are skipped rather than queued. Transient
//! failures shorten the next wait to a jittered backoff until `transient_retry.max_attempts`
//! consecutive failures, after which the regular cadence resumes.
//!
//! Cancellation is observed only while the task waits, so an in-flight rotation always
//! finishes and its material reaches the store or the pending journal.

pub mod engine;

mod backoff;
mod metrics;

pub use engine::*;
pub use metrics::RotationMetrics;

// crates.io
use tokio::{
	sync::watch,
	task::JoinHandle,
	time::{self, Instant},
};
use tokio_util::sync::CancellationToken;
// self
use crate::{_prelude::*, auth::TenantId};

/// Observable state of one tenant schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScheduleState {
	/// Spawned but not yet running.
	Idle,
	/// A rotation is in flight.
	Rotating,
	/// Waiting for the next cadence slot.
	Armed,
	/// Waiting for an early retry after a transient failure.
	FailedBackoff {
		/// Consecutive transient failures so far.
		attempt: u32,
	},
	/// The task observed cancellation and exited.
	Stopped,
}

/// Rotation loop for a single tenant.
#[derive(Clone, Debug)]
pub struct RotationSchedule {
	engine: Arc<RotationEngine>,
	tenant: TenantId,
}
impl RotationSchedule {
	/// Creates a schedule for `tenant` driven by `engine`.
	pub fn new(engine: Arc<RotationEngine>, tenant: TenantId) -> Self {
		Self { engine, tenant }
	}

	/// Spawns the loop on the current tokio runtime.
	pub fn spawn(self, cancel: CancellationToken) -> ScheduleHandle {
		let (state_tx, state_rx) = watch::channel(ScheduleState::Idle);
		let tenant = self.tenant.clone();
		let task = tokio::spawn(self.run(cancel.clone(), state_tx));

		ScheduleHandle { tenant, cancel, task, state: state_rx }
	}

	async fn run(self, cancel: CancellationToken, state: watch::Sender<ScheduleState>) {
		let config = self.engine.config();
		let interval = config.rotation_interval();
		let policy = config.transient_retry;
		let origin = Instant::now();
		let mut failures = 0_u32;

		tracing::info!(tenant = %self.tenant, interval = ?interval, "Rotation schedule started.");

		loop {
			state.send_replace(ScheduleState::Rotating);

			let result = self.engine.rotate_once(&self.tenant).await;
			let deadline = match result {
				Err(e) if backs_off(&e) && failures + 1 < policy.max_attempts => {
					failures += 1;

					let delay = backoff::delay(&policy, failures, interval)
						.max(e.retry_after().unwrap_or_default())
						.min(interval);

					state.send_replace(ScheduleState::FailedBackoff { attempt: failures });
					tracing::debug!(
						tenant = %self.tenant,
						attempt = failures,
						delay = ?delay,
						"Retrying rotation early."
					);

					Instant::now() + delay
				},
				_ => {
					failures = 0;

					state.send_replace(ScheduleState::Armed);

					next_slot(origin, interval, Instant::now())
				},
			};

			tokio::select! {
				biased;
				_ = cancel.cancelled() => break,
				_ = time::sleep_until(deadline) => {},
			}
		}

		state.send_replace(ScheduleState::Stopped);

		tracing::info!(tenant = %self.tenant, "Rotation schedule stopped.");
	}
}

/// Handle to a spawned [`RotationSchedule`].
#[derive(Debug)]
pub struct ScheduleHandle {
	tenant: TenantId,
	cancel: CancellationToken,
	task: JoinHandle<()>,
	state: watch::Receiver<ScheduleState>,
}
impl ScheduleHandle {
	/// Tenant the schedule rotates.
	pub fn tenant(&self) -> &TenantId {
		&self.tenant
	}

	/// Latest published state.
	pub fn state(&self) -> ScheduleState {
		*self.state.borrow()
	}

	/// Receiver that observes every state transition.
	pub fn subscribe(&self) -> watch::Receiver<ScheduleState> {
		self.state.clone()
	}

	/// Requests cancellation without waiting for the task.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	/// Returns `true` once the task has exited.
	pub fn is_finished(&self) -> bool {
		self.task.is_finished()
	}

	/// Cancels the schedule and waits for the task to exit.
	///
	/// An in-flight rotation completes before this returns.
	pub async fn stop(self) {
		self.cancel.cancel();

		if let Err(e) = self.task.await {
			tracing::error!(tenant = %self.tenant, error = %e, "Rotation schedule task failed.");
		}
	}
}

/// Owns one schedule per tenant under a shared cancellation root.
#[derive(Debug)]
pub struct RotationSupervisor {
	engine: Arc<RotationEngine>,
	root: CancellationToken,
	schedules: Mutex<HashMap<TenantId, ScheduleHandle>>,
}
impl RotationSupervisor {
	/// Creates a supervisor with its own cancellation root.
	pub fn new(engine: Arc<RotationEngine>) -> Self {
		Self::with_cancellation(engine, CancellationToken::new())
	}

	/// Creates a supervisor whose schedules also stop when `root` is cancelled.
	pub fn with_cancellation(engine: Arc<RotationEngine>, root: CancellationToken) -> Self {
		Self { engine, root, schedules: Default::default() }
	}

	/// Engine shared by every schedule.
	pub fn engine(&self) -> &Arc<RotationEngine> {
		&self.engine
	}

	/// Starts a schedule for `tenant`; returns `false` when one is already running.
	pub fn spawn_tenant(&self, tenant: TenantId) -> bool {
		let mut schedules = self.schedules.lock();

		if schedules.get(&tenant).is_some_and(|handle| !handle.is_finished()) {
			return false;
		}

		let handle = RotationSchedule::new(self.engine.clone(), tenant.clone())
			.spawn(self.root.child_token());

		schedules.insert(tenant, handle);

		true
	}

	/// Tenants with a registered schedule.
	pub fn tenants(&self) -> Vec<TenantId> {
		let mut tenants = self.schedules.lock().keys().cloned().collect::<Vec<_>>();

		tenants.sort();

		tenants
	}

	/// Latest state of the tenant's schedule.
	pub fn state(&self, tenant: &TenantId) -> Option<ScheduleState> {
		self.schedules.lock().get(tenant).map(ScheduleHandle::state)
	}

	/// Stops and joins the tenant's schedule; returns `false` when none was registered.
	pub async fn stop_tenant(&self, tenant: &TenantId) -> bool {
		let handle = self.schedules.lock().remove(tenant);

		match handle {
			Some(handle) => {
				handle.stop().await;

				true
			},
			None => false,
		}
	}

	/// Cancels every schedule and joins all of them.
	pub async fn shutdown(&self) {
		self.root.cancel();

		let handles = self.schedules.lock().drain().map(|(_, handle)| handle).collect::<Vec<_>>();

		for handle in handles {
			handle.stop().await;
		}
	}
}

fn backs_off(e: &Error) -> bool {
	matches!(e, Error::Transient(_) | Error::Transport(_))
}

/// First cadence slot strictly after `now`.
fn next_slot(origin: Instant, interval: StdDuration, now: Instant) -> Instant {
	let elapsed = now.saturating_duration_since(origin);
	let slots = elapsed.as_nanos() / interval.as_nanos().max(1) + 1;
	let slots = u32::try_from(slots).unwrap_or(u32::MAX);

	origin + interval.saturating_mul(slots)
}
