//! Form-encoded client-credentials exchange against the issuer endpoint.

// self
use crate::{
	_prelude::*,
	auth::{ClientCredentials, TokenSecret},
};

/// Content type of the issuer request body.
pub const CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
/// Scope requested from the issuer.
pub const SCOPE: &str = "hpe-tenant";
/// Grant type sent by both endpoint variants.
pub const GRANT_TYPE: &str = "client_credentials";

/// Successful issuer response; only `access_token` is required.
#[derive(Clone, Debug, Deserialize)]
pub struct IssuerTokenResponse {
	/// Issued bearer token.
	pub access_token: TokenSecret,
	/// Token type, typically `Bearer`.
	#[serde(default)]
	pub token_type: Option<String>,
	/// Lifetime in seconds as reported by the issuer.
	#[serde(default)]
	pub expires_in: Option<i64>,
	/// Granted scope.
	#[serde(default)]
	pub scope: Option<String>,
}

/// Encodes the form body for `credentials`.
pub fn encode_body(credentials: &ClientCredentials) -> Vec<u8> {
	url::form_urlencoded::Serializer::new(String::new())
		.append_pair("client_id", credentials.client_id.as_str())
		.append_pair("client_secret", credentials.client_secret.expose())
		.append_pair("grant_type", GRANT_TYPE)
		.append_pair("scope", SCOPE)
		.finish()
		.into_bytes()
}
