//! Provider-facing descriptors for rotation endpoints.
//!
//! `descriptor` exposes validated metadata (`ProviderDescriptor`) covering the HTTPS-only
//! rotation endpoint, how the refresh token travels (query string or form body), and the
//! optional client credentials some providers require alongside it.

pub mod descriptor;

pub use descriptor::*;
