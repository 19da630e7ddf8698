//! JSON client-credentials exchange against the identity endpoint.

// self
use crate::{
	_prelude::*,
	auth::{ClientCredentials, TokenSecret},
	error::ConfigError,
	exchange::issuer::GRANT_TYPE,
};

/// Content type of the identity request body.
pub const CONTENT_TYPE: &str = "application/json";

/// JSON request body sent to the identity endpoint.
#[derive(Debug, Serialize)]
struct IdentityTokenRequest<'a> {
	tenant_id: &'a str,
	client_id: &'a str,
	client_secret: &'a str,
	grant_type: &'static str,
}

/// Successful identity response; only `access_token` is required.
#[derive(Clone, Debug, Deserialize)]
pub struct IdentityTokenResponse {
	/// Issued bearer token.
	pub access_token: TokenSecret,
	/// Token type, typically `Bearer`.
	#[serde(default)]
	pub token_type: Option<String>,
	/// Refresh token; unused because renewal always repeats the exchange.
	#[serde(default)]
	pub refresh_token: Option<TokenSecret>,
	/// Absolute expiry as reported by the endpoint (RFC 3339).
	#[serde(default)]
	pub expiry: Option<String>,
	/// Lifetime in seconds.
	#[serde(default)]
	pub expires_in: Option<i64>,
	/// Granted scope.
	#[serde(default)]
	pub scope: Option<String>,
	/// Set when no refresh token was issued.
	#[serde(rename = "accessTokenOnly", default)]
	pub access_token_only: bool,
}

/// Encodes the JSON body for `credentials`.
///
/// Fails with [`ConfigError::MissingTenant`] when no tenant is configured.
pub fn encode_body(credentials: &ClientCredentials) -> Result<Vec<u8>> {
	let tenant_id = credentials.tenant_id.as_ref().ok_or(ConfigError::MissingTenant)?;
	let request = IdentityTokenRequest {
		tenant_id: tenant_id.as_str(),
		client_id: credentials.client_id.as_str(),
		client_secret: credentials.client_secret.expose(),
		grant_type: GRANT_TYPE,
	};

	Ok(serde_json::to_vec(&request).map_err(ConfigError::RequestEncode)?)
}
