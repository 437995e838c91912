//! Strongly typed identifiers for tenants, provider-assigned users/apps, and providers.
//!
//! Every identifier is non-empty, at most [`IDENTIFIER_MAX_LEN`] bytes, and free of
//! whitespace and control characters, so it can be used verbatim as a store key or log
//! field. Validation runs on construction and on deserialization.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

/// Longest accepted identifier, in bytes.
pub const IDENTIFIER_MAX_LEN: usize = 128;

macro_rules! def_id {
	($(
		$(#[$meta:meta])*
		$name:ident => $kind:ident;
	)+) => {$(
		$(#[$meta])*
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Kind reported in validation errors.
			pub const KIND: IdentifierKind = IdentifierKind::$kind;

			/// Validates `value` and wraps it.
			pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
				let value = value.into();

				Self::KIND.check(&value)?;

				Ok(Self(value))
			}

			/// Borrows the raw identifier.
			pub fn as_str(&self) -> &str {
				&self.0
			}

			/// Unwraps the raw identifier.
			pub fn into_inner(self) -> String {
				self.0
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &str {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				Self::new(value)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, "{}({})", Self::KIND, self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
	)+};
}

def_id! {
	/// Provider-assigned identifier of one installed integration; the store's primary key.
	TenantId => Tenant;
	/// Provider-assigned user (or bot user) identifier returned by rotations.
	UserId => User;
	/// Provider-assigned application identifier returned by rotations.
	AppId => App;
	/// Identifier for a rotation provider descriptor.
	ProviderId => Provider;
}

/// Which identifier failed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdentifierKind {
	/// [`TenantId`].
	Tenant,
	/// [`UserId`].
	User,
	/// [`AppId`].
	App,
	/// [`ProviderId`].
	Provider,
}
impl IdentifierKind {
	fn check(self, value: &str) -> Result<(), IdentifierError> {
		if value.is_empty() {
			return Err(IdentifierError::Empty { kind: self });
		}
		if value.len() > IDENTIFIER_MAX_LEN {
			return Err(IdentifierError::TooLong { kind: self, len: value.len() });
		}
		if let Some(character) = value.chars().find(|c| c.is_whitespace() || c.is_control()) {
			return Err(IdentifierError::InvalidCharacter { kind: self, character });
		}

		Ok(())
	}
}
impl Display for IdentifierKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(match self {
			Self::Tenant => "Tenant",
			Self::User => "User",
			Self::App => "App",
			Self::Provider => "Provider",
		})
	}
}

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Identifier being validated.
		kind: IdentifierKind,
	},
	/// The identifier contains whitespace or a control character.
	#[error("{kind} identifier contains the forbidden character {character:?}.")]
	InvalidCharacter {
		/// Identifier being validated.
		kind: IdentifierKind,
		/// First offending character.
		character: char,
	},
	/// The identifier is longer than [`IDENTIFIER_MAX_LEN`] bytes.
	#[error("{kind} identifier is {len} bytes long; the limit is {max}.", max = IDENTIFIER_MAX_LEN)]
	TooLong {
		/// Identifier being validated.
		kind: IdentifierKind,
		/// Actual length in bytes.
		len: usize,
	},
}
