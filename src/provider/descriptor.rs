//! Provider descriptor data structures shared by rotation clients.

/// Builder API for assembling provider descriptors.
pub mod builder;

pub use builder::*;

// self
use crate::{_prelude::*, auth::ProviderId, auth::TokenSecret};

/// How the refresh token is presented to the rotation endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationMethod {
	#[default]
	/// `GET` with `refresh_token` in the query string (configuration-token rotation).
	Query,
	/// `POST` form body with `grant_type=refresh_token` (bot-token refresh).
	Form,
}

/// Client credentials sent in the form body by [`RotationMethod::Form`] providers.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCredentials {
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret; never logged.
	pub client_secret: TokenSecret,
}
impl Debug for ClientCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientCredentials")
			.field("client_id", &self.client_id)
			.field("client_secret", &"<redacted>")
			.finish()
	}
}

/// Immutable provider descriptor consumed by rotation clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
	/// Descriptor identifier.
	pub id: ProviderId,
	/// Endpoint that exchanges a refresh token for a new pair.
	pub rotation_endpoint: Url,
	/// Request shape expected by the endpoint.
	pub method: RotationMethod,
	/// Optional client credentials.
	pub client_credentials: Option<ClientCredentials>,
}
impl ProviderDescriptor {
	/// Creates a new builder for the provided identifier.
	pub fn builder(id: ProviderId) -> ProviderDescriptorBuilder {
		ProviderDescriptorBuilder::new(id)
	}

	/// Form or query parameters for one rotation request.
	pub fn rotation_params<'a>(&'a self, refresh_token: &'a TokenSecret) -> Vec<(&'a str, &'a str)> {
		let mut params = Vec::with_capacity(4);

		if matches!(self.method, RotationMethod::Form) {
			params.push(("grant_type", "refresh_token"));

			if let Some(credentials) = &self.client_credentials {
				params.push(("client_id", credentials.client_id.as_str()));
				params.push(("client_secret", credentials.client_secret.expose()));
			}
		}

		params.push(("refresh_token", refresh_token.expose()));

		params
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn provider_id() -> ProviderId {
		ProviderId::new("workspace").expect("Provider fixture should be valid.")
	}

	#[test]
	fn query_rotation_sends_only_the_refresh_token() {
		let descriptor = ProviderDescriptor::builder(provider_id())
			.rotation_endpoint(
				Url::parse("https://provider.example/api/tooling.tokens.rotate")
					.expect("Fixture URL should parse."),
			)
			.build()
			.expect("Descriptor should build.");
		let refresh = TokenSecret::new("r0");

		assert_eq!(descriptor.rotation_params(&refresh), vec![("refresh_token", "r0")]);
	}

	#[test]
	fn form_rotation_includes_grant_and_client() {
		let descriptor = ProviderDescriptor::builder(provider_id())
			.rotation_endpoint(
				Url::parse("https://provider.example/api/oauth.v2.access")
					.expect("Fixture URL should parse."),
			)
			.method(RotationMethod::Form)
			.client_credentials("client-1", "secret-1")
			.build()
			.expect("Descriptor should build.");
		let refresh = TokenSecret::new("r0");

		assert_eq!(descriptor.rotation_params(&refresh), vec![
			("grant_type", "refresh_token"),
			("client_id", "client-1"),
			("client_secret", "secret-1"),
			("refresh_token", "r0"),
		]);
		assert!(!format!("{descriptor:?}").contains("secret-1"));
	}
}
