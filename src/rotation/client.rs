//! Reqwest-backed [`TokenRotator`] for real rotation endpoints.

// crates.io
use reqwest::Method;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::{ConfigError, TransientError, TransportError},
	http::{ReqwestHttpClient, ResponseMetadata},
	provider::{ProviderDescriptor, RotationMethod},
	rotation::{NewTokenMaterial, RotationFuture, TokenRotator, response::RotationPayload},
};

/// Calls a provider's rotation endpoint once per [`TokenRotator::rotate`] invocation.
#[derive(Clone, Debug)]
pub struct RotationClient {
	http: ReqwestHttpClient,
	descriptor: Arc<ProviderDescriptor>,
}
impl RotationClient {
	/// Builds a client whose requests are aborted after `timeout`.
	pub fn new(descriptor: ProviderDescriptor, timeout: StdDuration) -> Result<Self> {
		Ok(Self::with_http_client(descriptor, ReqwestHttpClient::new(timeout)?))
	}

	/// Builds a client around an existing HTTP client.
	pub fn with_http_client(descriptor: ProviderDescriptor, http: ReqwestHttpClient) -> Self {
		Self { http, descriptor: Arc::new(descriptor) }
	}

	/// Descriptor the client talks to.
	pub fn descriptor(&self) -> &ProviderDescriptor {
		&self.descriptor
	}

	async fn exchange(&self, refresh_token: &TokenSecret) -> Result<NewTokenMaterial> {
		if refresh_token.is_empty() {
			return Err(ConfigError::EmptyRefreshToken.into());
		}

		let descriptor = &self.descriptor;
		let params = descriptor.rotation_params(refresh_token);
		let request = match descriptor.method {
			RotationMethod::Query =>
				self.http.request(Method::GET, descriptor.rotation_endpoint.clone()).query(&params),
			RotationMethod::Form =>
				self.http.request(Method::POST, descriptor.rotation_endpoint.clone()).form(&params),
		};
		let response = request.send().await.map_err(map_send_error)?;
		let meta = ResponseMetadata::from_response(&response);
		let status = response.status();

		if !status.is_success() {
			return Err(TransientError::RotationEndpoint {
				message: format!("HTTP {}", status.as_u16()),
				status: meta.status,
				retry_after: meta.retry_after,
			}
			.into());
		}

		let body = response.bytes().await.map_err(map_send_error)?;

		RotationPayload::parse(&body, meta.status)?.into_material()
	}
}
impl TokenRotator for RotationClient {
	fn rotate<'a>(&'a self, refresh_token: &'a TokenSecret) -> RotationFuture<'a> {
		Box::pin(self.exchange(refresh_token))
	}
}

fn map_send_error(e: ReqwestError) -> Error {
	if e.is_timeout() {
		TransientError::RotationEndpoint {
			message: "request timed out".into(),
			status: e.status().map(|status| status.as_u16()),
			retry_after: None,
		}
		.into()
	} else {
		TransportError::from(e).into()
	}
}
