//! Optional observability helpers for token generation and retrieval.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `service_token.flow` with the `flow`
//!   and `stage` fields, plus events for retries, renewals, and failures. Secrets are never
//!   recorded.
//! - Enable `metrics` to increment the `service_token_flow_total` counter for every
//!   attempt/success/failure/cache hit/cancellation, labeled by `flow` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Flows observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Form-encoded exchange against the issuer endpoint.
	IssuerToken,
	/// JSON exchange against the identity endpoint.
	IdentityToken,
	/// Pre-issued token handed in by configuration.
	PassedInToken,
	/// Caller-facing retrieval through the refresh handler.
	Retrieve,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::IssuerToken => "issuer_token",
			FlowKind::IdentityToken => "identity_token",
			FlowKind::PassedInToken => "passed_in_token",
			FlowKind::Retrieve => "retrieve",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow.
	Attempt,
	/// Successful completion with a freshly generated token.
	Success,
	/// Failure propagated back to the caller.
	Failure,
	/// The cached token was reused.
	CacheHit,
	/// The caller cancelled before a result arrived.
	Cancelled,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
			FlowOutcome::CacheHit => "cache_hit",
			FlowOutcome::Cancelled => "cancelled",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
