//! Shared stubs for integration tests: a scripted rotator, a fault-injecting store, and a
//! log capture writer.

#![allow(dead_code)]

// std
use std::{
	collections::VecDeque,
	io,
	sync::{
		Arc,
		atomic::{AtomicU32, AtomicUsize, Ordering},
	},
	time::Duration as StdDuration,
};
// crates.io
use parking_lot::Mutex;
use time::{Duration, OffsetDateTime};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;
// self
use oauth2_rotor::{
	auth::{TenantId, TokenRecord, TokenSecret},
	config::{RetryPolicy, RotorConfig},
	error::{Error, TransientError},
	rotation::{NewTokenMaterial, RotationFuture, TokenRotator},
	store::{MemoryStore, StoreError, StoreFuture, TokenFieldUpdate, TokenStore, UpdateOutcome},
};

pub fn tenant(value: &str) -> TenantId {
	TenantId::new(value).expect("Tenant fixture should be valid.")
}

pub fn record(tenant_id: &str, access: &str, refresh: &str) -> TokenRecord {
	let issued = OffsetDateTime::now_utc() - Duration::minutes(5);

	TokenRecord::builder(tenant(tenant_id))
		.access_token(access)
		.refresh_token(refresh)
		.issued_at(issued)
		.expires_at(issued + Duration::hours(1))
		.build()
		.expect("Token record fixture should build successfully.")
}

pub async fn seeded_store(tenants: &[&str]) -> MemoryStore {
	let store = MemoryStore::default();

	for tenant_id in tenants {
		store.put(record(tenant_id, "a0", "r0")).await.expect("Failed to seed fixture record.");
	}

	store
}

/// Configuration with short write retries so failure tests finish quickly.
pub fn fast_config() -> RotorConfig {
	RotorConfig {
		write_retry: RetryPolicy { max_attempts: 3, initial_backoff_ms: 1, max_backoff_ms: 2 },
		..Default::default()
	}
}

/// One scripted reply of [`ScriptedRotator`].
pub enum Step {
	Rotate(NewTokenMaterial),
	Reject(&'static str),
	Throttle,
}

/// Rotator that replays scripted steps, then chains `aN`/`rN` pairs by call number.
#[derive(Default)]
pub struct ScriptedRotator {
	steps: Mutex<VecDeque<Step>>,
	calls: Mutex<Vec<String>>,
	delay: StdDuration,
	in_flight: AtomicUsize,
	max_in_flight: AtomicUsize,
}
impl ScriptedRotator {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_delay(mut self, delay: StdDuration) -> Self {
		self.delay = delay;

		self
	}

	pub fn then(self, step: Step) -> Self {
		self.steps.lock().push_back(step);

		self
	}

	/// Refresh tokens presented so far, in call order.
	pub fn calls(&self) -> Vec<String> {
		self.calls.lock().clone()
	}

	pub fn call_count(&self) -> usize {
		self.calls.lock().len()
	}

	pub fn max_in_flight(&self) -> usize {
		self.max_in_flight.load(Ordering::SeqCst)
	}
}
impl TokenRotator for ScriptedRotator {
	fn rotate<'a>(&'a self, refresh_token: &'a TokenSecret) -> RotationFuture<'a> {
		Box::pin(async move {
			let call = {
				let mut calls = self.calls.lock();

				calls.push(refresh_token.expose().to_owned());
				calls.len()
			};
			let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;

			self.max_in_flight.fetch_max(current, Ordering::SeqCst);

			if !self.delay.is_zero() {
				tokio::time::sleep(self.delay).await;
			}

			self.in_flight.fetch_sub(1, Ordering::SeqCst);

			let step = self.steps.lock().pop_front();

			match step {
				None => Ok(NewTokenMaterial::new(
					format!("a{call}"),
					format!("r{call}"),
					Duration::hours(1),
				)),
				Some(Step::Rotate(material)) => Ok(material),
				Some(Step::Reject(reason)) => Err(Error::ProviderRejected { reason: reason.into() }),
				Some(Step::Throttle) => Err(TransientError::RotationEndpoint {
					message: "HTTP 429".into(),
					status: Some(429),
					retry_after: None,
				}
				.into()),
			}
		})
	}
}

/// Store wrapper whose writes fail while failures remain.
pub struct FlakyStore {
	inner: MemoryStore,
	failing_writes: AtomicU32,
}
impl FlakyStore {
	pub fn new(inner: MemoryStore) -> Self {
		Self { inner, failing_writes: AtomicU32::new(0) }
	}

	pub fn fail_next_writes(&self, count: u32) {
		self.failing_writes.store(count, Ordering::SeqCst);
	}

	pub fn fail_all_writes(&self) {
		self.failing_writes.store(u32::MAX, Ordering::SeqCst);
	}

	pub fn heal(&self) {
		self.failing_writes.store(0, Ordering::SeqCst);
	}

	pub fn inner(&self) -> &MemoryStore {
		&self.inner
	}

	fn take_failure(&self) -> bool {
		self.failing_writes
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
				0 => None,
				u32::MAX => Some(u32::MAX),
				left => Some(left - 1),
			})
			.is_ok()
	}
}
impl TokenStore for FlakyStore {
	fn get<'a>(&'a self, tenant: &'a TenantId) -> StoreFuture<'a, Option<TokenRecord>> {
		self.inner.get(tenant)
	}

	fn put(&self, record: TokenRecord) -> StoreFuture<'_, ()> {
		if self.take_failure() {
			return Box::pin(async { Err(injected()) });
		}

		self.inner.put(record)
	}

	fn update_fields<'a>(
		&'a self,
		tenant: &'a TenantId,
		update: TokenFieldUpdate,
	) -> StoreFuture<'a, UpdateOutcome> {
		if self.take_failure() {
			return Box::pin(async { Err(injected()) });
		}

		self.inner.update_fields(tenant, update)
	}
}

fn injected() -> StoreError {
	StoreError::Backend { message: "injected write failure".into() }
}

/// In-memory `tracing` sink for asserting on severity and message text.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);
impl LogCapture {
	/// Installs a thread-local subscriber writing into this capture.
	pub fn install(&self) -> DefaultGuard {
		let subscriber = tracing_subscriber::fmt()
			.with_writer(self.clone())
			.with_ansi(false)
			.with_max_level(tracing::Level::DEBUG)
			.finish();

		tracing::subscriber::set_default(subscriber)
	}

	pub fn contents(&self) -> String {
		String::from_utf8_lossy(&self.0.lock()).into_owned()
	}

	/// Lines emitted at `level` (`"ERROR"`, `"WARN"`, ...).
	pub fn lines_at(&self, level: &str) -> Vec<String> {
		self.contents()
			.lines()
			.filter(|line| line.split_whitespace().nth(1) == Some(level))
			.map(str::to_owned)
			.collect()
	}
}
impl<'a> MakeWriter<'a> for LogCapture {
	type Writer = CaptureWriter;

	fn make_writer(&'a self) -> Self::Writer {
		CaptureWriter(self.0.clone())
	}
}

pub struct CaptureWriter(Arc<Mutex<Vec<u8>>>);
impl io::Write for CaptureWriter {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.0.lock().extend_from_slice(buf);

		Ok(buf.len())
	}

	fn flush(&mut self) -> io::Result<()> {
		Ok(())
	}
}
