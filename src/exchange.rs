//! Token generation against the IAM token endpoint.
//!
//! [`ServiceClient`] implements [`TokenGenerator`] for both endpoint variants: the issuer
//! endpoint takes a form-encoded body, the identity endpoint takes JSON and requires a
//! tenant. Requests go through [`http::send_with_retries`], so HTTP 500/429 responses are
//! repeated before [`status::classify_status`] turns the final status into a typed error.

pub mod identity;
pub mod issuer;
pub mod status;

pub use status::*;

// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, http::header};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{ClientCredentials, TokenSecret},
	error::ConfigError,
	http::{self, RetryPolicy, TokenHttpClient},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};
#[cfg(feature = "reqwest")]
use crate::{
	error::{TransientError, TransportError},
	http::ReqwestHttpClient,
};

/// Path appended to the service URL to reach the token endpoint.
pub const TOKEN_PATH: &str = "/v1/token";
/// Whole-request timeout applied by [`ServiceClient::new`].
pub const DEFAULT_HTTP_TIMEOUT: StdDuration = StdDuration::from_secs(10);

/// Boxed future returned by [`TokenGenerator::generate`].
pub type GenerateFuture<'a> = Pin<Box<dyn Future<Output = Result<TokenSecret>> + 'a + Send>>;

#[cfg(feature = "reqwest")]
/// Service client specialized for the crate's default reqwest transport stack.
pub type ReqwestServiceClient = ServiceClient<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Exchanges client credentials for a bearer token.
///
/// The refresh worker is the only caller; it re-invokes `generate` when the returned error
/// is [`Error::is_retryable`].
pub trait TokenGenerator
where
	Self: Send + Sync,
{
	/// Produces a fresh bearer token for `credentials`.
	fn generate<'a>(&'a self, credentials: &'a ClientCredentials) -> GenerateFuture<'a>;
}

/// Maps HTTP transport failures into crate [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a crate error.
	///
	/// Timeouts must become [`TransientError::Timeout`] so the refresh loop retries them.
	fn map_transport_error(&self, error: HttpClientError<E>) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(&self, error: HttpClientError<ReqwestError>) -> Error {
		match error {
			HttpClientError::Reqwest(inner) => map_reqwest_error(*inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => map_io_error(inner),
			HttpClientError::Other(message) => TransportError::Other { message }.into(),
			_ => TransportError::Other { message: "unrecognized HTTP client failure".into() }
				.into(),
		}
	}
}

/// Token endpoint variant selected by configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenEndpoint {
	/// Form-encoded exchange (`scope=hpe-tenant`); no tenant required.
	Issuer,
	/// JSON exchange carrying the tenant identifier.
	Identity,
}
impl TokenEndpoint {
	/// Picks the variant from the "use issuer" configuration flag.
	pub fn from_issuer_flag(use_issuer: bool) -> Self {
		if use_issuer { Self::Issuer } else { Self::Identity }
	}

	fn flow_kind(self) -> FlowKind {
		match self {
			Self::Issuer => FlowKind::IssuerToken,
			Self::Identity => FlowKind::IdentityToken,
		}
	}
}

/// [`TokenGenerator`] that talks to the IAM token endpoint.
///
/// When a passed-in token is configured it is returned verbatim and no request is sent.
#[derive(Clone)]
pub struct ServiceClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	token_url: Url,
	endpoint: TokenEndpoint,
	passed_in_token: Option<TokenSecret>,
	retry: RetryPolicy,
	http_client: Arc<C>,
	transport_mapper: Arc<M>,
}
impl<C, M> ServiceClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a client that reuses the caller-provided transport + mapper pair.
	///
	/// Trailing slashes on `service_url` are ignored.
	pub fn with_http_client(
		service_url: &str,
		endpoint: TokenEndpoint,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		let token_url = token_url(service_url)?;

		Ok(Self {
			token_url,
			endpoint,
			passed_in_token: None,
			retry: RetryPolicy::default(),
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
		})
	}

	/// Serves `token` for every generation instead of calling IAM.
	pub fn with_passed_in_token(mut self, token: TokenSecret) -> Self {
		self.passed_in_token = Some(token);

		self
	}

	/// Overrides the status-based retry policy.
	pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	/// Fully qualified token endpoint URL.
	pub fn token_url(&self) -> &Url {
		&self.token_url
	}

	/// Endpoint variant used for exchanges.
	pub fn endpoint(&self) -> TokenEndpoint {
		self.endpoint
	}

	async fn exchange(&self, credentials: &ClientCredentials) -> Result<TokenSecret> {
		let (content_type, body) = match self.endpoint {
			TokenEndpoint::Issuer => (issuer::CONTENT_TYPE, issuer::encode_body(credentials)),
			TokenEndpoint::Identity =>
				(identity::CONTENT_TYPE, identity::encode_body(credentials)?),
		};
		let handle = self.http_client.handle();
		let handle = &handle;
		let token_url = &self.token_url;
		let body = body.as_slice();
		let response = http::send_with_retries(
			move || async move {
				let request = token_request(token_url, content_type, body.to_vec())?;

				handle.call(request).await
			},
			self.retry,
		)
		.await
		.map_err(|e| self.transport_mapper.map_transport_error(e))?;
		let status = response.status().as_u16();

		obs_event!(
			debug,
			client_id = credentials.client_id.as_str(),
			status,
			endpoint = ?self.endpoint,
			"Token endpoint responded."
		);

		classify_status(status, response.body(), credentials.client_id.as_str())?;

		match self.endpoint {
			TokenEndpoint::Issuer =>
				parse_token_response::<issuer::IssuerTokenResponse>(response.body())
					.map(|r| r.access_token),
			TokenEndpoint::Identity =>
				parse_token_response::<identity::IdentityTokenResponse>(response.body())
					.map(|r| r.access_token),
		}
	}
}
#[cfg(feature = "reqwest")]
impl ServiceClient<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a client backed by a reqwest transport with a 10 second timeout.
	pub fn new(service_url: &str, endpoint: TokenEndpoint) -> Result<Self> {
		Self::with_http_client(
			service_url,
			endpoint,
			ReqwestHttpClient::with_timeout(DEFAULT_HTTP_TIMEOUT)?,
			ReqwestTransportErrorMapper,
		)
	}
}
impl<C, M> TokenGenerator for ServiceClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn generate<'a>(&'a self, credentials: &'a ClientCredentials) -> GenerateFuture<'a> {
		Box::pin(async move {
			if let Some(token) = &self.passed_in_token {
				obs::record_flow_outcome(FlowKind::PassedInToken, FlowOutcome::Success);

				return Ok(token.clone());
			}

			let kind = self.endpoint.flow_kind();
			let span = FlowSpan::new(kind, "generate");

			obs::record_flow_outcome(kind, FlowOutcome::Attempt);

			let result = span.instrument(self.exchange(credentials)).await;

			match &result {
				Ok(_) => obs::record_flow_outcome(kind, FlowOutcome::Success),
				Err(e) => {
					span.record_failure(e);
					obs::record_flow_outcome(kind, FlowOutcome::Failure);
				},
			}

			result
		})
	}
}
impl<C, M> Debug for ServiceClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceClient")
			.field("token_url", &self.token_url.as_str())
			.field("endpoint", &self.endpoint)
			.field("passed_in_token_set", &self.passed_in_token.is_some())
			.field("retry", &self.retry)
			.finish()
	}
}

fn token_url(service_url: &str) -> Result<Url> {
	let raw = format!("{}{TOKEN_PATH}", service_url.trim_end_matches('/'));

	Url::parse(&raw)
		.map_err(|source| ConfigError::InvalidServiceUrl { url: service_url.to_owned(), source })
		.map_err(Error::from)
}

fn token_request(
	token_url: &Url,
	content_type: &'static str,
	body: Vec<u8>,
) -> Result<HttpRequest, oauth2::http::Error> {
	oauth2::http::Request::builder()
		.method(oauth2::http::Method::POST)
		.uri(token_url.as_str())
		.header(header::CONTENT_TYPE, content_type)
		.header(header::ACCEPT, "application/json")
		.body(body)
}

/// Parses a 200 response body, reporting the JSON path of any mismatch.
fn parse_token_response<T>(body: &[u8]) -> Result<T>
where
	T: DeserializeOwned,
{
	let mut deserializer = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| Error::TokenResponseParse { source })
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransientError::timeout(err).into();
	}

	TransportError::from(err).into()
}

#[cfg(feature = "reqwest")]
fn map_io_error(err: std::io::Error) -> Error {
	if err.kind() == std::io::ErrorKind::TimedOut {
		TransientError::timeout(err).into()
	} else {
		TransportError::Io(err).into()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn token_url_trims_trailing_slashes() {
		let trimmed =
			token_url("https://client.greenlake.hpe.com/api/iam/").expect("URL should parse.");

		assert_eq!(trimmed.as_str(), "https://client.greenlake.hpe.com/api/iam/v1/token");
		assert_eq!(
			token_url("http://127.0.0.1:8080").expect("URL should parse.").as_str(),
			"http://127.0.0.1:8080/v1/token"
		);
		assert!(matches!(
			token_url("not a url"),
			Err(Error::Config(ConfigError::InvalidServiceUrl { .. }))
		));
	}

	#[test]
	fn token_request_sets_headers() {
		let url = token_url("https://iam.example.com").expect("URL should parse.");
		let request = token_request(&url, issuer::CONTENT_TYPE, b"a=b".to_vec())
			.expect("Request should build.");

		assert_eq!(request.method(), oauth2::http::Method::POST);
		assert_eq!(request.uri(), "https://iam.example.com/v1/token");
		assert_eq!(request.headers()[header::CONTENT_TYPE], issuer::CONTENT_TYPE);
		assert_eq!(request.headers()[header::ACCEPT], "application/json");
		assert_eq!(request.body(), b"a=b");
	}

	#[test]
	fn parse_errors_carry_json_path() {
		let err = parse_token_response::<issuer::IssuerTokenResponse>(br#"{"access_token":42}"#)
			.expect_err("A numeric token should be rejected.");

		match err {
			Error::TokenResponseParse { source } =>
				assert_eq!(source.path().to_string(), "access_token"),
			other => panic!("Unexpected error: {other:?}"),
		}

		assert!(parse_token_response::<issuer::IssuerTokenResponse>(b"<html>").is_err());
	}

	#[test]
	fn endpoint_follows_issuer_flag() {
		assert_eq!(TokenEndpoint::from_issuer_flag(true), TokenEndpoint::Issuer);
		assert_eq!(TokenEndpoint::from_issuer_flag(false), TokenEndpoint::Identity);
	}

	#[cfg(feature = "reqwest")]
	#[test]
	fn io_timeouts_map_to_transient() {
		let mapper = ReqwestTransportErrorMapper;
		let timeout = mapper.map_transport_error(HttpClientError::Io(std::io::Error::new(
			std::io::ErrorKind::TimedOut,
			"deadline elapsed",
		)));
		let reset = mapper.map_transport_error(HttpClientError::Io(std::io::Error::new(
			std::io::ErrorKind::ConnectionReset,
			"reset",
		)));

		assert!(timeout.is_retryable());
		assert!(matches!(reset, Error::Transport(TransportError::Io(_))));
		assert!(!reset.is_retryable());
	}
}
