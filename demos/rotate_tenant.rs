//! Demonstrates rotating one tenant against a mock rotation endpoint, then running its
//! schedule under a supervisor until shutdown.
//!
//! 1. Seed a [`MemoryStore`] with the tenant's current refresh token.
//! 2. Describe the provider and build a reqwest-backed [`RotationClient`].
//! 3. Rotate once on demand and read the new access token through the accessor.
//! 4. Hand the tenant to a [`RotationSupervisor`] and shut it down cleanly.

// std
use std::{sync::Arc, time::Duration as StdDuration};
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use time::{Duration, OffsetDateTime};
use tracing_subscriber::EnvFilter;
use url::Url;
// self
use oauth2_rotor::{
	auth::{ProviderId, TenantId, TokenRecord},
	config::RotorConfig,
	provider::{ProviderDescriptor, RotationMethod},
	rotation::RotationClient,
	schedule::{RotationEngine, RotationSupervisor},
	store::{MemoryPendingLog, MemoryStore, TokenStore},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
		)
		.init();

	let server = MockServer::start_async().await;
	let rotation_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/tooling.tokens.rotate");
			then.status(200).header("content-type", "application/json").body(
				"{\"ok\":true,\"token\":\"demo-access-1\",\"refresh_token\":\"demo-refresh-1\",\"team_id\":\"T-ACME\",\"expires_in\":43200}",
			);
		})
		.await;
	let tenant = TenantId::new("T-ACME")?;
	let issued = OffsetDateTime::now_utc();
	let store = Arc::new(MemoryStore::default());

	store
		.put(
			TokenRecord::builder(tenant.clone())
				.access_token("demo-access-0")
				.refresh_token("demo-refresh-0")
				.issued_at(issued)
				.expires_at(issued + Duration::hours(12))
				.build()?,
		)
		.await?;

	let descriptor = ProviderDescriptor::builder(ProviderId::new("demo-provider")?)
		.rotation_endpoint(Url::parse(&server.url("/tooling.tokens.rotate"))?)
		.method(RotationMethod::Form)
		.client_credentials("demo-client", "super-secret")
		.build()?;
	let config = RotorConfig { rotation_interval_secs: 3_600, ..Default::default() };
	let client = RotationClient::new(descriptor, config.network_timeout())?;
	let engine = Arc::new(RotationEngine::new(
		store.clone(),
		Arc::new(client),
		Arc::new(MemoryPendingLog::default()),
		config,
	)?);
	let report = engine.rotate_now(&tenant).await?;

	println!(
		"Rotated {} (refresh {}), access token valid until {}.",
		report.tenant, report.refresh_fingerprint, report.expires_at
	);
	println!("Current access token: {}.", engine.accessor().current_token(&tenant).await?.expose());

	rotation_mock.assert_async().await;

	let supervisor = RotationSupervisor::new(engine.clone());

	supervisor.spawn_tenant(tenant.clone());
	tokio::time::sleep(StdDuration::from_millis(200)).await;

	println!("Schedule state before shutdown: {:?}.", supervisor.state(&tenant));

	supervisor.shutdown().await;

	let metrics = engine.metrics();

	println!(
		"Rotations attempted: {}, succeeded: {}.",
		metrics.attempts(),
		metrics.successes()
	);

	Ok(())
}
