//! Unverified bearer-token claims used for expiry bookkeeping.
//!
//! [`Claims::decode`] reads the payload segment of a compact, dot-separated token without
//! checking its signature. IAM already authenticated the client when it issued the token,
//! so the decoded values are trusted only for deciding when to renew, never for
//! authorization.

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::_prelude::*;

/// Errors raised while decoding a bearer token's payload.
#[derive(Debug, ThisError)]
pub enum DecodeError {
	/// The token does not contain a payload segment.
	#[error("Malformed bearer token: expected at least 2 segments, found {segments}.")]
	Segments {
		/// Number of dot-separated segments found.
		segments: usize,
	},
	/// The payload segment is not valid base64url.
	#[error("Malformed bearer token payload.")]
	Base64(#[source] base64::DecodeError),
	/// The payload is not a JSON claims object.
	#[error("Failed to parse bearer token claims.")]
	Claims(#[source] serde_json::Error),
}

/// Claims carried in an IAM-issued bearer token.
///
/// `subject` is normalized during [`Claims::decode`]; see [`Claims::normalize_subject`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
	/// Token issuer (`iss`).
	#[serde(rename = "iss", default, deserialize_with = "null_as_default")]
	pub issuer: String,
	/// Subject (`sub`), prefixed with `users/` or `clients/` after decoding.
	#[serde(rename = "sub", default)]
	pub subject: String,
	/// Expiry as Unix epoch seconds (`exp`).
	#[serde(rename = "exp", default)]
	pub expiry: i64,
	/// Issued-at as Unix epoch seconds (`iat`).
	#[serde(rename = "iat", default)]
	pub issued_at: i64,
	/// Token type (`typ`).
	#[serde(rename = "typ", default, skip_serializing_if = "Option::is_none")]
	pub token_type: Option<String>,
	/// OIDC nonce.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub nonce: Option<String>,
	/// Access-token hash (`at_hash`).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub at_hash: Option<String>,
	/// Okta service client identifier (`cid`).
	#[serde(rename = "cid", default, skip_serializing_if = "Option::is_none")]
	pub client_id: Option<String>,
	/// Okta user identifier (`uid`).
	#[serde(rename = "uid", default, skip_serializing_if = "Option::is_none")]
	pub user_id: Option<String>,
	/// Tenant the token was issued for (`tenantId`).
	#[serde(rename = "tenantId", default, deserialize_with = "null_as_default")]
	pub tenant_id: String,
	/// Authorized party (`azp`).
	#[serde(rename = "azp", default, skip_serializing_if = "Option::is_none")]
	pub authorized_party: Option<String>,
	/// Keycloak client identifier (`clientId`).
	#[serde(rename = "clientId", default, skip_serializing_if = "Option::is_none")]
	pub keycloak_client_id: Option<String>,
	/// HPE employee marker (`isHPE`).
	#[serde(rename = "isHPE", default)]
	pub is_hpe: bool,
}
impl Claims {
	/// Decodes the claims of `raw` without verifying its signature.
	pub fn decode(raw: &str) -> Result<Self, DecodeError> {
		let mut segments = raw.split('.');
		let payload = match (segments.next(), segments.next()) {
			(Some(_), Some(payload)) => payload,
			_ => return Err(DecodeError::Segments { segments: raw.split('.').count() }),
		};
		// Some issuers pad their segments even though compact serialization forbids it.
		let bytes =
			URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).map_err(DecodeError::Base64)?;
		let mut claims: Self = serde_json::from_slice(&bytes).map_err(DecodeError::Claims)?;

		claims.normalize_subject();

		Ok(claims)
	}

	/// Rewrites `subject` into its `users/` or `clients/` form.
	///
	/// A user identifier wins over any client identifier. Tokens carrying neither are
	/// legacy Keycloak user tokens.
	pub fn normalize_subject(&mut self) {
		self.subject = if let Some(user_id) = present(&self.user_id) {
			format!("users/{user_id}")
		} else if present(&self.client_id).is_some() || present(&self.keycloak_client_id).is_some()
		{
			format!("clients/{}", self.subject)
		} else {
			format!("users/{}", self.subject)
		};
	}

	/// Seconds left before `expiry`, relative to `now` (negative once expired).
	pub fn seconds_until_expiry(&self, now: OffsetDateTime) -> i64 {
		self.expiry - now.unix_timestamp()
	}
}

/// Reads an explicit JSON `null` as the type's default value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
	D: serde::Deserializer<'de>,
	T: Default + Deserialize<'de>,
{
	Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn present(value: &Option<String>) -> Option<&str> {
	value.as_deref().filter(|value| !value.is_empty())
}
