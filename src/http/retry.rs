//! Fixed-interval retries for transient token-endpoint statuses.

// crates.io
use oauth2::HttpResponse;
// self
use crate::_prelude::*;

/// Bounded retry budget shared by the transport and the refresh loop.
///
/// The transport spends it on HTTP 500/429 responses, sleeping `interval` between
/// attempts; the refresh loop spends it on network timeouts, which the transport never
/// retries. The two layers therefore never multiply each other's attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Additional attempts after the first one.
	pub max_retries: u32,
	/// Delay between status-based transport retries.
	pub interval: StdDuration,
}
impl RetryPolicy {
	/// Default number of additional attempts.
	pub const DEFAULT_MAX_RETRIES: u32 = 3;
	/// Default delay between transport retries.
	pub const DEFAULT_INTERVAL: StdDuration = StdDuration::from_secs(3);

	/// Overrides the number of additional attempts.
	pub fn with_max_retries(mut self, max_retries: u32) -> Self {
		self.max_retries = max_retries;

		self
	}

	/// Overrides the delay between transport retries.
	pub fn with_interval(mut self, interval: StdDuration) -> Self {
		self.interval = interval;

		self
	}

	/// Disables retries entirely.
	pub fn none() -> Self {
		Self { max_retries: 0, interval: StdDuration::ZERO }
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self { max_retries: Self::DEFAULT_MAX_RETRIES, interval: Self::DEFAULT_INTERVAL }
	}
}

/// Returns `true` for statuses worth repeating the request for.
pub fn is_status_retryable(status: u16) -> bool {
	matches!(status, 429 | 500)
}

/// Invokes `call` and repeats it while the response status is retryable.
///
/// Failures raised before a response exists are returned immediately. Once
/// `policy.max_retries` repeats are spent the last response is returned as-is, whatever its
/// status.
pub async fn send_with_retries<F, Fut, E>(
	mut call: F,
	policy: RetryPolicy,
) -> Result<HttpResponse, E>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<HttpResponse, E>>,
{
	let mut remaining = policy.max_retries;

	loop {
		let response = call().await?;
		let status = response.status().as_u16();

		if !is_status_retryable(status) || remaining == 0 {
			return Ok(response);
		}

		obs_event!(
			debug,
			status,
			remaining,
			interval_ms = policy.interval.as_millis() as u64,
			"Token endpoint returned a retryable status."
		);

		tokio::time::sleep(policy.interval).await;

		remaining -= 1;
	}
}
