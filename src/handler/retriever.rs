//! Caller-facing access to a refresh worker.

// crates.io
use tokio::sync::{mpsc, oneshot};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	handler::TokenRequest,
	obs::{self, FlowKind, FlowOutcome},
};

/// Cloneable accessor that asks a refresh worker for the current bearer token.
///
/// Every clone keeps the worker alive; the worker stops when the last clone and its
/// [`RefreshHandler`](crate::handler::RefreshHandler) are dropped.
#[derive(Clone, Debug)]
pub struct TokenRetriever {
	requests: mpsc::Sender<TokenRequest>,
}
impl TokenRetriever {
	pub(crate) fn new(requests: mpsc::Sender<TokenRequest>) -> Self {
		Self { requests }
	}

	/// Waits for a token unless `cancel` fires first.
	///
	/// Returns `Ok(None)` when `cancel` is (or becomes) cancelled; cancellation is never an
	/// error. Cancelling drops this caller's request, which aborts its generation if the
	/// worker already started it. Other callers keep being served.
	pub async fn retrieve(&self, cancel: &CancellationToken) -> Result<Option<TokenSecret>> {
		if cancel.is_cancelled() {
			obs::record_flow_outcome(FlowKind::Retrieve, FlowOutcome::Cancelled);

			return Ok(None);
		}

		tokio::select! {
			biased;
			_ = cancel.cancelled() => {
				obs::record_flow_outcome(FlowKind::Retrieve, FlowOutcome::Cancelled);

				Ok(None)
			},
			result = self.retrieve_token() => result.map(Some),
		}
	}

	/// Waits for a token without a cancellation signal.
	pub async fn retrieve_token(&self) -> Result<TokenSecret> {
		let (reply, response) = oneshot::channel();

		self.requests.send(TokenRequest { reply }).await.map_err(|_| Error::HandlerClosed)?;

		response.await.map_err(|_| Error::HandlerClosed)?
	}

	/// Returns `true` once the worker no longer accepts requests.
	pub fn is_closed(&self) -> bool {
		self.requests.is_closed()
	}
}
