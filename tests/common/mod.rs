//! Fixtures shared by the integration tests.

#![allow(dead_code)]

// std
use std::{
	future::Future,
	io,
	pin::Pin,
	sync::{
		Arc,
		atomic::{AtomicU32, Ordering},
	},
	time::Duration as StdDuration,
};
// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::json;
// self
use service_token::{
	auth::{ClientCredentials, ClientId, ClientSecret, TenantId, TokenSecret},
	error::{Error, Result, TransientError},
	exchange::{GenerateFuture, TokenGenerator, TransportErrorMapper},
	handler::{RefreshHandler, RefreshSettings},
	http::{
		RetryPolicy, TokenHttpClient,
		oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse},
	},
};

pub const CLIENT_ID: &str = "svc-client";
pub const CLIENT_SECRET: &str = "svc-secret";
pub const TENANT_ID: &str = "tenant-1";

/// Retry policy with the production budget but no sleeping.
pub fn instant_retry() -> RetryPolicy {
	RetryPolicy::default().with_interval(StdDuration::ZERO)
}

pub fn credentials() -> ClientCredentials {
	ClientCredentials::new(
		ClientId::new(CLIENT_ID).expect("Fixture client id should be valid."),
		ClientSecret::new(CLIENT_SECRET),
	)
}

pub fn tenant_credentials() -> ClientCredentials {
	credentials().with_tenant(TenantId::new(TENANT_ID).expect("Fixture tenant should be valid."))
}

/// Builds an unsigned compact token whose `exp` claim is `seconds` from now.
pub fn token_expiring_in(seconds: i64) -> String {
	let now = std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.expect("Clock should be after the epoch.")
		.as_secs() as i64;
	let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
	let payload = URL_SAFE_NO_PAD.encode(
		json!({
			"iss": "https://iam.example.com",
			"sub": CLIENT_ID,
			"cid": CLIENT_ID,
			"tenantId": TENANT_ID,
			"iat": now,
			"exp": now + seconds,
		})
		.to_string(),
	);

	format!("{header}.{payload}.c2lnbmF0dXJl")
}

/// What a [`ScriptedGenerator`] does on its n-th invocation (zero-based).
pub type Script = Box<dyn Fn(u32) -> Result<TokenSecret> + Send + Sync>;

/// Generator that counts invocations and optionally sleeps before answering.
pub struct ScriptedGenerator {
	calls: AtomicU32,
	delay: StdDuration,
	script: Script,
}
impl ScriptedGenerator {
	pub fn new(script: impl 'static + Fn(u32) -> Result<TokenSecret> + Send + Sync) -> Arc<Self> {
		Self::with_delay(StdDuration::ZERO, script)
	}

	pub fn with_delay(
		delay: StdDuration,
		script: impl 'static + Fn(u32) -> Result<TokenSecret> + Send + Sync,
	) -> Arc<Self> {
		Arc::new(Self { calls: AtomicU32::new(0), delay, script: Box::new(script) })
	}

	/// Always issues a token valid for `seconds`.
	pub fn issuing(seconds: i64) -> Arc<Self> {
		Self::new(move |_| Ok(TokenSecret::new(token_expiring_in(seconds))))
	}

	pub fn calls(&self) -> u32 {
		self.calls.load(Ordering::SeqCst)
	}
}
impl TokenGenerator for ScriptedGenerator {
	fn generate<'a>(&'a self, _credentials: &'a ClientCredentials) -> GenerateFuture<'a> {
		Box::pin(async move {
			let call = self.calls.fetch_add(1, Ordering::SeqCst);

			if !self.delay.is_zero() {
				tokio::time::sleep(self.delay).await;
			}

			(self.script)(call)
		})
	}
}

pub fn spawn_handler(generator: Arc<ScriptedGenerator>) -> RefreshHandler {
	RefreshHandler::spawn(
		credentials(),
		generator,
		RefreshSettings::default().with_retry(instant_retry()),
	)
}

/// Transport whose every request times out before a response arrives.
#[derive(Clone, Default)]
pub struct TimeoutHttpClient {
	calls: Arc<AtomicU32>,
}
impl TimeoutHttpClient {
	pub fn calls(&self) -> u32 {
		self.calls.load(Ordering::SeqCst)
	}
}
impl TokenHttpClient for TimeoutHttpClient {
	type Handle = TimeoutHandle;
	type TransportError = io::Error;

	fn handle(&self) -> Self::Handle {
		TimeoutHandle { calls: self.calls.clone() }
	}
}

pub struct TimeoutHandle {
	calls: Arc<AtomicU32>,
}
impl<'c> AsyncHttpClient<'c> for TimeoutHandle {
	type Error = HttpClientError<io::Error>;
	type Future = Pin<
		Box<dyn Future<Output = std::result::Result<HttpResponse, Self::Error>> + 'c + Send + Sync>,
	>;

	fn call(&'c self, _request: HttpRequest) -> Self::Future {
		let calls = self.calls.clone();

		Box::pin(async move {
			calls.fetch_add(1, Ordering::SeqCst);

			Err(HttpClientError::Io(io::Error::new(io::ErrorKind::TimedOut, "deadline elapsed")))
		})
	}
}

/// Maps every transport failure to a timeout.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeoutMapper;
impl TransportErrorMapper<io::Error> for TimeoutMapper {
	fn map_transport_error(&self, error: HttpClientError<io::Error>) -> Error {
		TransientError::timeout(error).into()
	}
}
