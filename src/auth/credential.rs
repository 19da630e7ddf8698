//! Client credentials and the single cached token a refresh worker owns.

// self
use crate::{
	_prelude::*,
	auth::{ClientId, ClientSecret, Claims, DecodeError, TenantId, TokenSecret},
};

/// Seconds before the claimed expiry at which a cached token is renewed.
pub const EXPIRY_MARGIN_SECS: i64 = 120;

/// Service client credentials exchanged for bearer tokens.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
	/// Tenant the client belongs to; required by the identity exchange only.
	pub tenant_id: Option<TenantId>,
	/// Service client identifier.
	pub client_id: ClientId,
	/// Service client secret.
	pub client_secret: ClientSecret,
}
impl ClientCredentials {
	/// Creates credentials without a tenant.
	pub fn new(client_id: ClientId, client_secret: ClientSecret) -> Self {
		Self { tenant_id: None, client_id, client_secret }
	}

	/// Attaches the tenant identifier.
	pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
		self.tenant_id = Some(tenant_id);

		self
	}
}
impl Debug for ClientCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientCredentials")
			.field("tenant_id", &self.tenant_id)
			.field("client_id", &self.client_id)
			.field("client_secret", &"<redacted>")
			.finish()
	}
}

/// Freshness of the cached token relative to the expiry margin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenState {
	/// No token has been cached yet.
	Empty,
	/// The cached token is outside the expiry margin.
	Valid,
	/// The cached token is within the expiry margin (or past expiry).
	Expiring,
}

/// A bearer token together with the claims decoded from it.
#[derive(Clone)]
pub struct CachedToken {
	/// The bearer token.
	pub token: TokenSecret,
	/// Claims decoded when the token was cached.
	pub claims: Claims,
}
impl CachedToken {
	/// Decodes the claims of a freshly issued token.
	pub fn decode(token: TokenSecret) -> Result<Self, DecodeError> {
		let claims = Claims::decode(token.expose())?;

		Ok(Self { token, claims })
	}

	/// Claimed expiry as Unix epoch seconds.
	pub fn expires_at(&self) -> i64 {
		self.claims.expiry
	}

	/// Returns `true` when the claimed expiry is at most `margin` away from `now`.
	pub fn is_expiring_at(&self, now: OffsetDateTime, margin: Duration) -> bool {
		self.claims.seconds_until_expiry(now) <= margin.whole_seconds()
	}

	/// Returns `true` once the claimed expiry has passed at `now`.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		self.claims.seconds_until_expiry(now) <= 0
	}
}
impl Debug for CachedToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CachedToken")
			.field("token", &"<redacted>")
			.field("subject", &self.claims.subject)
			.field("expires_at", &self.claims.expiry)
			.finish()
	}
}

/// Credentials plus the cached token, owned by exactly one refresh worker.
#[derive(Debug)]
pub struct Credential {
	credentials: ClientCredentials,
	cached: Option<CachedToken>,
	margin: Duration,
}
impl Credential {
	/// Creates an empty credential renewing `margin` before expiry.
	pub fn new(credentials: ClientCredentials, margin: Duration) -> Self {
		Self { credentials, cached: None, margin }
	}

	/// Client credentials used for generation.
	pub fn credentials(&self) -> &ClientCredentials {
		&self.credentials
	}

	/// Renewal window before the claimed expiry.
	pub fn margin(&self) -> Duration {
		self.margin
	}

	/// Currently cached token, if any.
	pub fn cached(&self) -> Option<&CachedToken> {
		self.cached.as_ref()
	}

	/// Evaluates the cache at `now`.
	pub fn state_at(&self, now: OffsetDateTime) -> TokenState {
		match &self.cached {
			None => TokenState::Empty,
			Some(cached) if cached.is_expiring_at(now, self.margin) => TokenState::Expiring,
			Some(_) => TokenState::Valid,
		}
	}

	/// Replaces the cached token.
	pub fn replace(&mut self, cached: CachedToken) {
		self.cached = Some(cached);
	}

	/// Drops the cached token.
	pub fn clear(&mut self) {
		self.cached = None;
	}
}
