// std
use std::net::IpAddr;
// self
use crate::{
	_prelude::*,
	auth::{ProviderId, TokenSecret},
	provider::{ClientCredentials, ProviderDescriptor, RotationMethod},
};

/// Errors raised while constructing or validating descriptors.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ProviderDescriptorError {
	/// The rotation endpoint is mandatory.
	#[error("Missing rotation endpoint.")]
	MissingRotationEndpoint,
	/// Endpoints must use HTTPS unless they point at a loopback host.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Client credentials only travel in a form body.
	#[error("Client credentials require the form rotation method.")]
	CredentialsWithoutForm,
	/// The client identifier was empty.
	#[error("Client identifier cannot be empty.")]
	EmptyClientId,
}

/// Builder for [`ProviderDescriptor`] values.
#[derive(Debug)]
pub struct ProviderDescriptorBuilder {
	/// Identifier for the descriptor being constructed.
	pub id: ProviderId,
	/// Endpoint that exchanges refresh tokens.
	pub rotation_endpoint: Option<Url>,
	/// Request shape expected by the endpoint.
	pub method: RotationMethod,
	/// Optional client credentials.
	pub client_credentials: Option<ClientCredentials>,
}
impl ProviderDescriptorBuilder {
	/// Creates a new builder seeded with the provided identifier.
	pub fn new(id: ProviderId) -> Self {
		Self {
			id,
			rotation_endpoint: None,
			method: RotationMethod::default(),
			client_credentials: None,
		}
	}

	/// Sets the rotation endpoint.
	pub fn rotation_endpoint(mut self, url: Url) -> Self {
		self.rotation_endpoint = Some(url);

		self
	}

	/// Overrides the request shape.
	pub fn method(mut self, method: RotationMethod) -> Self {
		self.method = method;

		self
	}

	/// Attaches client credentials sent with every rotation.
	pub fn client_credentials(
		mut self,
		client_id: impl Into<String>,
		client_secret: impl Into<TokenSecret>,
	) -> Self {
		self.client_credentials = Some(ClientCredentials {
			client_id: client_id.into(),
			client_secret: client_secret.into(),
		});

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<ProviderDescriptor, ProviderDescriptorError> {
		let rotation_endpoint =
			self.rotation_endpoint.ok_or(ProviderDescriptorError::MissingRotationEndpoint)?;
		let descriptor = ProviderDescriptor {
			id: self.id,
			rotation_endpoint,
			method: self.method,
			client_credentials: self.client_credentials,
		};

		descriptor.validate()?;

		Ok(descriptor)
	}
}

impl ProviderDescriptor {
	/// Validates invariants for the descriptor.
	fn validate(&self) -> Result<(), ProviderDescriptorError> {
		validate_endpoint("rotation", &self.rotation_endpoint)?;

		if let Some(credentials) = &self.client_credentials {
			if !matches!(self.method, RotationMethod::Form) {
				return Err(ProviderDescriptorError::CredentialsWithoutForm);
			}
			if credentials.client_id.is_empty() {
				return Err(ProviderDescriptorError::EmptyClientId);
			}
		}

		Ok(())
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ProviderDescriptorError> {
	if url.scheme() == "https" || (url.scheme() == "http" && is_loopback(url)) {
		Ok(())
	} else {
		Err(ProviderDescriptorError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host_str() {
		Some("localhost") => true,
		Some(host) => host
			.trim_start_matches('[')
			.trim_end_matches(']')
			.parse::<IpAddr>()
			.map(|ip| ip.is_loopback())
			.unwrap_or(false),
		None => false,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn builder() -> ProviderDescriptorBuilder {
		ProviderDescriptor::builder(
			ProviderId::new("workspace").expect("Provider fixture should be valid."),
		)
	}

	fn url(value: &str) -> Url {
		Url::parse(value).expect("Fixture URL should parse.")
	}

	#[test]
	fn rejects_missing_and_insecure_endpoints() {
		assert_eq!(
			builder().build().expect_err("Endpoint is mandatory."),
			ProviderDescriptorError::MissingRotationEndpoint
		);
		assert!(matches!(
			builder().rotation_endpoint(url("http://provider.example/rotate")).build(),
			Err(ProviderDescriptorError::InsecureEndpoint { endpoint: "rotation", .. })
		));
	}

	#[test]
	fn loopback_http_is_accepted_for_local_mocks() {
		builder()
			.rotation_endpoint(url("http://127.0.0.1:8080/rotate"))
			.build()
			.expect("IPv4 loopback should be accepted.");
		builder()
			.rotation_endpoint(url("http://localhost:8080/rotate"))
			.build()
			.expect("Localhost should be accepted.");
		builder()
			.rotation_endpoint(url("http://[::1]:8080/rotate"))
			.build()
			.expect("IPv6 loopback should be accepted.");
	}

	#[test]
	fn credentials_require_form_method() {
		let err = builder()
			.rotation_endpoint(url("https://provider.example/rotate"))
			.client_credentials("client", "secret")
			.build()
			.expect_err("Query rotation cannot carry client credentials.");

		assert_eq!(err, ProviderDescriptorError::CredentialsWithoutForm);

		let err = builder()
			.rotation_endpoint(url("https://provider.example/rotate"))
			.method(RotationMethod::Form)
			.client_credentials("", "secret")
			.build()
			.expect_err("Empty client id must be rejected.");

		assert_eq!(err, ProviderDescriptorError::EmptyClientId);
	}
}
