//! Keep third-party OAuth integrations alive: per-tenant refresh-token rotation with
//! supervised schedules, durable token stores, and a pending-rotation journal.
//!
//! The crate is organized leaves first:
//!
//! - [`store`] persists one [`auth::TokenRecord`] per tenant and journals rotations that could
//!   not be written.
//! - [`rotation`] exchanges a refresh token for a new access/refresh pair.
//! - [`schedule`] owns the per-tenant rotation loop, its retry policy, and shutdown.
//! - [`accessor`] serves the current token to request handlers.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod accessor;
pub mod auth;
pub mod config;
pub mod error;
#[cfg(feature = "reqwest")] pub mod http;
pub mod obs;
pub mod provider;
pub mod rotation;
pub mod schedule;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and fixtures for tests; enabled via `cfg(test)` or the `test`
	//! crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::auth::{TenantId, TokenRecord};

	/// Builds a tenant identifier, panicking on invalid fixtures.
	pub fn tenant(value: &str) -> TenantId {
		TenantId::new(value).expect("Tenant fixture should be valid.")
	}

	/// Builds a record that was issued five minutes ago and expires in one hour.
	pub fn record_fixture(tenant_id: &str, access: &str, refresh: &str) -> TokenRecord {
		let issued = OffsetDateTime::now_utc() - Duration::minutes(5);

		TokenRecord::builder(tenant(tenant_id))
			.access_token(access)
			.refresh_token(refresh)
			.issued_at(issued)
			.expires_at(issued + Duration::hours(1))
			.build()
			.expect("Token record fixture should build successfully.")
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _, metrics_util as _, tracing_subscriber as _};
