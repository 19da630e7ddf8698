//! Background refresh of a single cached bearer token.
//!
//! [`RefreshHandler::spawn`] starts one worker task that exclusively owns the
//! [`Credential`]. Callers never touch the cache: they send a request over a bounded
//! channel and await the reply on a private oneshot, so concurrent callers are served one
//! after another and at most one generation is in flight. The worker is demand-driven;
//! it only renews when a request finds the cache empty or inside the expiry margin.
//!
//! Dropping a caller's pending retrieval aborts that caller's in-flight generation and
//! leaves every other caller untouched. [`RefreshHandler::shutdown`] stops the worker for
//! everyone; it also stops once every [`RefreshHandler`] and [`TokenRetriever`] is gone.

pub mod metrics;
pub mod retriever;

pub use metrics::*;
pub use retriever::*;

// crates.io
use tokio::sync::{mpsc, oneshot};
// self
use crate::{
	_prelude::*,
	auth::{
		CachedToken, ClientCredentials, Credential, EXPIRY_MARGIN_SECS, TokenSecret, TokenState,
	},
	exchange::TokenGenerator,
	http::RetryPolicy,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};
#[cfg(feature = "reqwest")]
use crate::{
	config::HandlerConfig,
	exchange::{ReqwestServiceClient, ReqwestTransportErrorMapper, TokenEndpoint},
	http::ReqwestHttpClient,
};

/// Tuning knobs for the refresh worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefreshSettings {
	/// Bound on generation retries after network timeouts.
	pub retry: RetryPolicy,
	/// Window before the claimed expiry inside which the cached token is renewed.
	pub expiry_margin: Duration,
}
impl RefreshSettings {
	/// Overrides the retry policy.
	pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	/// Overrides the expiry margin; negative values are clamped to zero.
	pub fn with_expiry_margin(mut self, margin: Duration) -> Self {
		self.expiry_margin = if margin.is_negative() { Duration::ZERO } else { margin };

		self
	}
}
impl Default for RefreshSettings {
	fn default() -> Self {
		Self { retry: RetryPolicy::default(), expiry_margin: Duration::seconds(EXPIRY_MARGIN_SECS) }
	}
}

/// Owner handle of a background token refresh worker.
///
/// Cloneable access for other tasks is available through [`RefreshHandler::retriever`].
#[derive(Debug)]
pub struct RefreshHandler {
	retriever: TokenRetriever,
	shutdown: CancellationToken,
	metrics: Arc<HandlerMetrics>,
}
impl RefreshHandler {
	/// Capacity of the request channel; callers beyond it wait for their turn.
	pub const REQUEST_CAPACITY: usize = 1;

	/// Spawns the worker on the current Tokio runtime.
	///
	/// # Panics
	///
	/// Panics when called outside a Tokio runtime.
	pub fn spawn(
		credentials: ClientCredentials,
		generator: Arc<dyn TokenGenerator>,
		settings: RefreshSettings,
	) -> Self {
		let (requests, receiver) = mpsc::channel(Self::REQUEST_CAPACITY);
		let shutdown = CancellationToken::new();
		let metrics = Arc::new(HandlerMetrics::default());
		let worker = RefreshWorker {
			credential: Credential::new(credentials, settings.expiry_margin),
			generator,
			retry: settings.retry,
			metrics: metrics.clone(),
		};

		tokio::spawn(worker.run(receiver, shutdown.clone()));

		Self { retriever: TokenRetriever::new(requests), shutdown, metrics }
	}

	/// Builds a reqwest-backed [`ServiceClient`](crate::exchange::ServiceClient) from `config`
	/// and spawns the worker.
	///
	/// # Panics
	///
	/// Panics when called outside a Tokio runtime.
	#[cfg(feature = "reqwest")]
	pub fn from_config(config: &HandlerConfig) -> Result<Self> {
		let http_client = ReqwestHttpClient::with_timeout(config.http_timeout)?;
		let mut client = ReqwestServiceClient::with_http_client(
			&config.service_url,
			TokenEndpoint::from_issuer_flag(config.use_issuer_variant),
			http_client,
			ReqwestTransportErrorMapper,
		)?
		.with_retry(config.retry);

		if let Some(token) = &config.passed_in_token {
			client = client.with_passed_in_token(token.clone());
		}

		let settings =
			RefreshSettings { retry: config.retry, expiry_margin: config.expiry_margin };

		Ok(Self::spawn(config.credentials(), Arc::new(client), settings))
	}

	/// Returns a cloneable accessor that shares this worker.
	pub fn retriever(&self) -> TokenRetriever {
		self.retriever.clone()
	}

	/// See [`TokenRetriever::retrieve`].
	pub async fn retrieve(&self, cancel: &CancellationToken) -> Result<Option<TokenSecret>> {
		self.retriever.retrieve(cancel).await
	}

	/// See [`TokenRetriever::retrieve_token`].
	pub async fn retrieve_token(&self) -> Result<TokenSecret> {
		self.retriever.retrieve_token().await
	}

	/// Counters maintained by the worker.
	pub fn metrics(&self) -> &HandlerMetrics {
		&self.metrics
	}

	/// Stops the worker. Pending and future retrievals fail with [`Error::HandlerClosed`].
	pub fn shutdown(&self) {
		self.shutdown.cancel();
	}

	/// Returns `true` once the worker no longer accepts requests.
	pub fn is_closed(&self) -> bool {
		self.retriever.is_closed()
	}
}

/// Request handed to the worker; the reply travels back on `reply`.
#[derive(Debug)]
pub(crate) struct TokenRequest {
	pub(crate) reply: oneshot::Sender<Result<TokenSecret>>,
}

struct RefreshWorker {
	credential: Credential,
	generator: Arc<dyn TokenGenerator>,
	retry: RetryPolicy,
	metrics: Arc<HandlerMetrics>,
}
impl RefreshWorker {
	async fn run(
		mut self,
		mut requests: mpsc::Receiver<TokenRequest>,
		shutdown: CancellationToken,
	) {
		obs_event!(
			debug,
			client_id = self.credential.credentials().client_id.as_str(),
			"Token refresh worker started."
		);

		loop {
			let TokenRequest { mut reply } = tokio::select! {
				biased;
				_ = shutdown.cancelled() => break,
				request = requests.recv() => match request {
					Some(request) => request,
					None => break,
				},
			};

			// The caller stopped waiting while the request was queued.
			if reply.is_closed() {
				continue;
			}

			let span = FlowSpan::new(FlowKind::Retrieve, "retrieve_token");
			let result = tokio::select! {
				biased;
				_ = shutdown.cancelled() => break,
				_ = reply.closed() => {
					obs_event!(debug, "Caller cancelled; abandoning token generation.");

					continue;
				},
				result = span.instrument(self.retrieve_token()) => result,
			};

			if let Err(e) = &result {
				span.record_failure(e);
			}

			// A send error means the caller left after the result was computed.
			let _ = reply.send(result);
		}

		obs_event!(
			debug,
			client_id = self.credential.credentials().client_id.as_str(),
			"Token refresh worker stopped."
		);
	}

	async fn retrieve_token(&mut self) -> Result<TokenSecret> {
		self.metrics.record_attempt();
		obs::record_flow_outcome(FlowKind::Retrieve, FlowOutcome::Attempt);

		if let (TokenState::Valid, Some(cached)) =
			(self.credential.state_at(OffsetDateTime::now_utc()), self.credential.cached())
		{
			self.metrics.record_cache_hit();
			obs::record_flow_outcome(FlowKind::Retrieve, FlowOutcome::CacheHit);

			return Ok(cached.token.clone());
		}

		let renewed = match self.renew().await {
			// A token issued already inside the margin is cached, then regenerated once.
			Ok(cached)
				if cached.is_expiring_at(OffsetDateTime::now_utc(), self.credential.margin()) =>
			{
				obs_event!(
					debug,
					client_id = self.credential.credentials().client_id.as_str(),
					expires_at = cached.expires_at(),
					"Renewed token is already inside the expiry margin; regenerating."
				);

				self.credential.replace(cached);
				self.renew().await
			},
			renewed => renewed,
		};

		match renewed {
			Ok(cached) => {
				let token = cached.token.clone();

				obs_event!(
					info,
					client_id = self.credential.credentials().client_id.as_str(),
					subject = cached.claims.subject.as_str(),
					expires_at = cached.expires_at(),
					"Bearer token renewed."
				);

				self.credential.replace(cached);
				self.metrics.record_success();
				obs::record_flow_outcome(FlowKind::Retrieve, FlowOutcome::Success);

				Ok(token)
			},
			Err(e) => {
				if let Some(cached) = self
					.credential
					.cached()
					.filter(|cached| !cached.is_expired_at(OffsetDateTime::now_utc()))
				{
					obs_event!(
						warn,
						client_id = self.credential.credentials().client_id.as_str(),
						expires_at = cached.expires_at(),
						error = %e,
						"Token renewal failed; serving the cached token until it expires."
					);

					self.metrics.record_stale_serve();
					obs::record_flow_outcome(FlowKind::Retrieve, FlowOutcome::Success);

					return Ok(cached.token.clone());
				}

				obs_event!(
					warn,
					client_id = self.credential.credentials().client_id.as_str(),
					error = %e,
					"Token renewal failed."
				);

				self.credential.clear();
				self.metrics.record_failure();
				obs::record_flow_outcome(FlowKind::Retrieve, FlowOutcome::Failure);

				Err(e)
			},
		}
	}

	/// Generates a token and decodes its claims.
	async fn renew(&self) -> Result<CachedToken> {
		let token = self.generate_with_retries().await?;

		Ok(CachedToken::decode(token)?)
	}

	/// Invokes the generator, repeating it while it fails with a retryable error.
	async fn generate_with_retries(&self) -> Result<TokenSecret> {
		let mut remaining = self.retry.max_retries;

		loop {
			match self.generator.generate(self.credential.credentials()).await {
				Err(e) if e.is_retryable() && remaining > 0 => {
					remaining -= 1;

					obs_event!(
						debug,
						error = %e,
						remaining,
						"Token generation timed out; retrying."
					);
				},
				result => return result,
			}
		}
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicU32, Ordering};
	// crates.io
	use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
	// self
	use super::*;
	use crate::{
		auth::{ClientId, ClientSecret},
		error::TransientError,
		exchange::GenerateFuture,
	};

	#[derive(Debug, ThisError)]
	#[error("timed out")]
	struct FakeTimeout;

	struct Scripted {
		calls: AtomicU32,
		outcome: fn(u32) -> Result<TokenSecret>,
	}
	impl TokenGenerator for Scripted {
		fn generate<'a>(&'a self, _: &'a ClientCredentials) -> GenerateFuture<'a> {
			let call = self.calls.fetch_add(1, Ordering::SeqCst);

			Box::pin(async move { (self.outcome)(call) })
		}
	}

	fn token_expiring_in(seconds: i64) -> TokenSecret {
		let exp = OffsetDateTime::now_utc().unix_timestamp() + seconds;
		let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"svc","cid":"svc","exp":{exp}}}"#));

		TokenSecret::new(format!("e30.{payload}.sig"))
	}

	fn spawn(outcome: fn(u32) -> Result<TokenSecret>) -> (RefreshHandler, Arc<Scripted>) {
		let generator = Arc::new(Scripted { calls: AtomicU32::new(0), outcome });
		let credentials = ClientCredentials::new(
			ClientId::new("svc").expect("Fixture client id should be valid."),
			ClientSecret::new("secret"),
		);
		let handler =
			RefreshHandler::spawn(credentials, generator.clone(), RefreshSettings::default());

		(handler, generator)
	}

	#[tokio::test]
	async fn timeouts_are_retried_at_most_three_times() {
		let (handler, generator) = spawn(|_| Err(TransientError::timeout(FakeTimeout).into()));
		let err = handler.retrieve_token().await.expect_err("Timeouts should eventually surface.");

		assert!(err.is_retryable());
		assert_eq!(generator.calls.load(Ordering::SeqCst), 4);
		assert_eq!(handler.metrics().failures(), 1);
	}

	#[tokio::test]
	async fn terminal_errors_are_not_retried() {
		let (handler, generator) = spawn(|_| Err(Error::Forbidden { client_id: "svc".into() }));
		let err = handler.retrieve_token().await.expect_err("Forbidden should surface.");

		assert!(matches!(err, Error::Forbidden { .. }));
		assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn recovers_after_a_timeout() {
		let (handler, generator) = spawn(|call| match call {
			0 => Err(TransientError::timeout(FakeTimeout).into()),
			_ => Ok(token_expiring_in(600)),
		});

		handler.retrieve_token().await.expect("Second attempt should succeed.");

		assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
		assert_eq!(handler.metrics().successes(), 1);
	}

	#[tokio::test]
	async fn undecodable_tokens_are_never_cached() {
		let (handler, generator) = spawn(|_| Ok(TokenSecret::new("opaque")));

		for _ in 0..2 {
			let err = handler.retrieve_token().await.expect_err("Opaque tokens cannot be decoded.");

			assert!(matches!(err, Error::Decode(_)));
		}

		assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
	}

	#[test]
	fn negative_margins_clamp_to_zero() {
		let settings = RefreshSettings::default().with_expiry_margin(Duration::seconds(-5));

		assert_eq!(settings.expiry_margin, Duration::ZERO);
		assert_eq!(RefreshSettings::default().expiry_margin, Duration::seconds(120));
	}
}
