//! Handler configuration loaded from `HPEGL_*` environment variables.
//!
//! Secrets are redacted in `Debug` output.

// std
use std::env;
// self
use crate::{
	_prelude::*,
	auth::{ClientCredentials, ClientId, ClientSecret, EXPIRY_MARGIN_SECS, TenantId, TokenSecret},
	error::ConfigError,
	exchange::DEFAULT_HTTP_TIMEOUT,
	http::RetryPolicy,
};

/// Base URL of the production IAM service.
pub const DEFAULT_IAM_SERVICE_URL: &str = "https://client.greenlake.hpe.com/api/iam";

/// IAM service URL.
pub const ENV_IAM_SERVICE_URL: &str = "HPEGL_IAM_SERVICE_URL";
/// Selects the issuer endpoint (`true`, default) or the identity endpoint (`false`).
pub const ENV_API_VENDED_SERVICE_CLIENT: &str = "HPEGL_API_VENDED_SERVICE_CLIENT";
/// Tenant identifier; required by the identity endpoint.
pub const ENV_TENANT_ID: &str = "HPEGL_TENANT_ID";
/// Service client identifier.
pub const ENV_USER_ID: &str = "HPEGL_USER_ID";
/// Service client secret.
pub const ENV_USER_SECRET: &str = "HPEGL_USER_SECRET";

/// Everything needed to spawn a [`RefreshHandler`](crate::handler::RefreshHandler).
#[derive(Clone)]
pub struct HandlerConfig {
	/// Base URL of the IAM service; `/v1/token` is appended.
	pub service_url: String,
	/// Tenant identifier, if configured.
	pub tenant_id: Option<TenantId>,
	/// Service client identifier.
	pub client_id: ClientId,
	/// Service client secret.
	pub client_secret: ClientSecret,
	/// Uses the form-encoded issuer endpoint instead of the JSON identity endpoint.
	pub use_issuer_variant: bool,
	/// Pre-issued token served instead of calling IAM.
	pub passed_in_token: Option<TokenSecret>,
	/// Whole-request timeout of the HTTP client.
	pub http_timeout: StdDuration,
	/// Retry budget shared by the transport and the refresh loop.
	pub retry: RetryPolicy,
	/// Window before expiry inside which the cached token is renewed.
	pub expiry_margin: Duration,
}
impl HandlerConfig {
	/// Creates a configuration against the production IAM service using the issuer endpoint.
	pub fn new(client_id: ClientId, client_secret: ClientSecret) -> Self {
		Self {
			service_url: DEFAULT_IAM_SERVICE_URL.into(),
			tenant_id: None,
			client_id,
			client_secret,
			use_issuer_variant: true,
			passed_in_token: None,
			http_timeout: DEFAULT_HTTP_TIMEOUT,
			retry: RetryPolicy::default(),
			expiry_margin: Duration::seconds(EXPIRY_MARGIN_SECS),
		}
	}

	/// Loads configuration from the process environment.
	pub fn from_env() -> Result<Self> {
		Self::from_vars(&env::vars().collect())
	}

	/// Loads configuration from a variable map.
	///
	/// Empty values are treated as unset.
	pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
		let get = |name: &str| vars.get(name).map(|v| v.trim()).filter(|v| !v.is_empty());
		let client_id = get(ENV_USER_ID).ok_or(ConfigError::MissingVar { name: ENV_USER_ID })?;
		let client_id = ClientId::new(client_id).map_err(|e| ConfigError::InvalidVar {
			name: ENV_USER_ID,
			reason: e.to_string(),
		})?;
		let client_secret = get(ENV_USER_SECRET)
			.map(ClientSecret::new)
			.ok_or(ConfigError::MissingVar { name: ENV_USER_SECRET })?;
		let tenant_id = get(ENV_TENANT_ID)
			.map(TenantId::new)
			.transpose()
			.map_err(|e| ConfigError::InvalidVar { name: ENV_TENANT_ID, reason: e.to_string() })?;
		let use_issuer_variant = match get(ENV_API_VENDED_SERVICE_CLIENT) {
			Some(value) => parse_bool(value).ok_or_else(|| ConfigError::InvalidVar {
				name: ENV_API_VENDED_SERVICE_CLIENT,
				reason: format!("expected a boolean, got `{value}`"),
			})?,
			None => true,
		};
		let mut config = Self::new(client_id, client_secret);

		if let Some(url) = get(ENV_IAM_SERVICE_URL) {
			config.service_url = url.to_owned();
		}

		config.tenant_id = tenant_id;
		config.use_issuer_variant = use_issuer_variant;

		Ok(config)
	}

	/// Sets the IAM service URL.
	pub fn with_service_url(mut self, service_url: impl Into<String>) -> Self {
		self.service_url = service_url.into();

		self
	}

	/// Sets the tenant identifier.
	pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
		self.tenant_id = Some(tenant_id);

		self
	}

	/// Selects the issuer (`true`) or identity (`false`) endpoint.
	pub fn with_issuer_variant(mut self, use_issuer_variant: bool) -> Self {
		self.use_issuer_variant = use_issuer_variant;

		self
	}

	/// Serves `token` instead of calling IAM.
	pub fn with_passed_in_token(mut self, token: TokenSecret) -> Self {
		self.passed_in_token = Some(token);

		self
	}

	/// Overrides the HTTP timeout.
	pub fn with_http_timeout(mut self, timeout: StdDuration) -> Self {
		self.http_timeout = timeout;

		self
	}

	/// Overrides the retry policy.
	pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	/// Overrides the expiry margin.
	pub fn with_expiry_margin(mut self, margin: Duration) -> Self {
		self.expiry_margin = margin;

		self
	}

	/// Client credentials presented to the token endpoint.
	pub fn credentials(&self) -> ClientCredentials {
		ClientCredentials {
			tenant_id: self.tenant_id.clone(),
			client_id: self.client_id.clone(),
			client_secret: self.client_secret.clone(),
		}
	}
}
impl Debug for HandlerConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HandlerConfig")
			.field("service_url", &self.service_url)
			.field("tenant_id", &self.tenant_id)
			.field("client_id", &self.client_id)
			.field("client_secret", &"<redacted>")
			.field("use_issuer_variant", &self.use_issuer_variant)
			.field("passed_in_token_set", &self.passed_in_token.is_some())
			.field("http_timeout", &self.http_timeout)
			.field("retry", &self.retry)
			.field("expiry_margin", &self.expiry_margin)
			.finish()
	}
}

fn parse_bool(value: &str) -> Option<bool> {
	match value {
		"1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
		"0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
		_ => None,
	}
}
