//! Wire payload shared by configuration-token rotation and bot-token refresh endpoints.

// self
use crate::{
	_prelude::*,
	auth::{AppId, TenantId, UserId},
	error::MalformedResponseError,
	rotation::{Expiry, NewTokenMaterial},
};

const UNKNOWN_REJECTION: &str = "unknown_error";

#[derive(Deserialize)]
pub(crate) struct RotationPayload {
	ok: bool,
	#[serde(default)]
	error: Option<String>,
	#[serde(default, alias = "access_token")]
	token: Option<String>,
	#[serde(default)]
	refresh_token: Option<String>,
	#[serde(default)]
	team_id: Option<String>,
	#[serde(default)]
	team: Option<TeamRef>,
	#[serde(default, alias = "bot_user_id")]
	user_id: Option<String>,
	#[serde(default)]
	app_id: Option<String>,
	#[serde(default)]
	iat: Option<i64>,
	#[serde(default)]
	exp: Option<i64>,
	#[serde(default)]
	expires_in: Option<i64>,
}
impl RotationPayload {
	/// Parses a response body, recording the JSON path of any type mismatch.
	pub(crate) fn parse(body: &[u8], status: Option<u16>) -> Result<Self> {
		let mut deserializer = serde_json::Deserializer::from_slice(body);

		serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| MalformedResponseError::Json { source, status }.into())
	}

	/// Converts the payload into token material or the provider's rejection.
	pub(crate) fn into_material(self) -> Result<NewTokenMaterial> {
		if !self.ok {
			let reason = self
				.error
				.filter(|reason| !reason.is_empty())
				.unwrap_or_else(|| UNKNOWN_REJECTION.into());

			return Err(Error::ProviderRejected { reason });
		}

		let access_token = required(self.token, "token")?;
		let refresh_token = required(self.refresh_token, "refresh_token")?;
		let issued_at = self.iat.map(|secs| epoch(secs, "iat")).transpose()?;
		let expiry = match (self.exp, self.expires_in) {
			(Some(exp), _) => Expiry::Absolute(epoch(exp, "exp")?),
			(None, Some(secs)) if secs >= 0 => {
				let lifetime = Duration::seconds(secs);
				let now = OffsetDateTime::now_utc();

				if [issued_at.unwrap_or(now), now]
					.into_iter()
					.any(|from| from.checked_add(lifetime).is_none())
				{
					return Err(MalformedResponseError::OutOfRange { field: "expires_in" }.into());
				}

				Expiry::Relative(lifetime)
			},
			(None, Some(_)) =>
				return Err(MalformedResponseError::OutOfRange { field: "expires_in" }.into()),
			(None, None) => return Err(MalformedResponseError::MissingField { field: "exp" }.into()),
		};
		let tenant_id = self
			.team_id
			.or(self.team.and_then(|team| team.id))
			.map(TenantId::new)
			.transpose()
			.map_err(MalformedResponseError::from)?;
		let user_id =
			self.user_id.map(UserId::new).transpose().map_err(MalformedResponseError::from)?;
		let app_id = self.app_id.map(AppId::new).transpose().map_err(MalformedResponseError::from)?;

		Ok(NewTokenMaterial {
			access_token: access_token.into(),
			refresh_token: refresh_token.into(),
			issued_at,
			expiry,
			tenant_id,
			user_id,
			app_id,
		})
	}
}

#[derive(Deserialize)]
struct TeamRef {
	#[serde(default)]
	id: Option<String>,
}

fn required(value: Option<String>, field: &'static str) -> Result<String> {
	value
		.filter(|value| !value.is_empty())
		.ok_or_else(|| MalformedResponseError::MissingField { field }.into())
}

fn epoch(secs: i64, field: &'static str) -> Result<OffsetDateTime> {
	OffsetDateTime::from_unix_timestamp(secs)
		.map_err(|_| MalformedResponseError::OutOfRange { field }.into())
}
