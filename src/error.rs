//! Crate-level error types shared across the exchange, transport, and refresh layers.

// self
use crate::{_prelude::*, auth::DecodeError};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; the refresh loop retries these.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS) raised before any response arrived.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// The bearer token could not be decoded into claims.
	#[error(transparent)]
	Decode(#[from] DecodeError),

	/// Token endpoint rejected the request as malformed.
	#[error("Bad request: {body}.")]
	BadRequest {
		/// Raw response body returned by the token endpoint.
		body: String,
	},
	/// Token endpoint rejected the client credentials.
	#[error("Unauthorized access: {client_id}.")]
	Unauthorized {
		/// Client identifier used for the exchange.
		client_id: String,
	},
	/// Token endpoint refused to issue a token for the client.
	#[error("Forbidden: {client_id}.")]
	Forbidden {
		/// Client identifier used for the exchange.
		client_id: String,
	},
	/// Token endpoint answered with a status the exchange does not handle.
	#[error("Unexpected status code {status}.")]
	Internal {
		/// HTTP status code returned by the token endpoint.
		status: u16,
	},
	/// Token endpoint answered 200 with a body that is not a token response.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure, including the offending JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// The refresh worker has stopped and no longer serves requests.
	#[error("Token refresh handler is closed.")]
	HandlerClosed,
}
impl Error {
	/// Returns the failure category for token-endpoint errors, if the error has one.
	pub fn kind(&self) -> Option<ErrorKind> {
		match self {
			Self::BadRequest { .. } => Some(ErrorKind::BadRequest),
			Self::Unauthorized { .. } => Some(ErrorKind::Unauthorized),
			Self::Forbidden { .. } => Some(ErrorKind::Forbidden),
			Self::Internal { .. } => Some(ErrorKind::InternalError),
			Self::Transient(_) => Some(ErrorKind::Transient),
			_ => None,
		}
	}

	/// Returns `true` when the refresh loop may re-invoke token generation.
	///
	/// Only network timeouts qualify; every HTTP-derived failure is terminal.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Transient(TransientError::Timeout { .. }))
	}
}

/// Failure categories derived from token endpoint interactions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	/// HTTP 400.
	BadRequest,
	/// HTTP 401.
	Unauthorized,
	/// HTTP 403.
	Forbidden,
	/// Any other non-200 status.
	InternalError,
	/// Network timeout before a response arrived.
	Transient,
}
impl ErrorKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::BadRequest => "bad_request",
			Self::Unauthorized => "unauthorized",
			Self::Forbidden => "forbidden",
			Self::InternalError => "internal_error",
			Self::Transient => "transient",
		}
	}
}
impl Display for ErrorKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Token request body could not be serialized.
	#[error("Token request body could not be encoded.")]
	RequestEncode(#[source] serde_json::Error),
	/// Service URL cannot be parsed.
	#[error("Service URL `{url}` is invalid.")]
	InvalidServiceUrl {
		/// Raw URL supplied by configuration.
		url: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Identifier validation failed.
	#[error(transparent)]
	Identifier(#[from] crate::auth::IdentifierError),
	/// The identity exchange requires a tenant identifier.
	#[error("The identity token exchange requires a tenant identifier.")]
	MissingTenant,
	/// A required environment variable is not set.
	#[error("Missing required environment variable: {name}.")]
	MissingVar {
		/// Variable name.
		name: &'static str,
	},
	/// An environment variable holds an unusable value.
	#[error("Environment variable {name} is invalid: {reason}.")]
	InvalidVar {
		/// Variable name.
		name: &'static str,
		/// Human-readable explanation.
		reason: String,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// The token request timed out before a response arrived.
	#[error("Request timed out while calling the token endpoint.")]
	Timeout {
		/// Transport-specific timeout failure.
		#[source]
		source: BoxError,
	},
}
impl TransientError {
	/// Wraps a transport-specific timeout.
	pub fn timeout(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Timeout { source: Box::new(src) }
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[from] std::io::Error),
	/// HTTP client failed with a free-form message.
	#[error("HTTP client error occurred while calling the token endpoint: {message}.")]
	Other {
		/// Client-supplied message.
		message: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[derive(Debug, ThisError)]
	#[error("timed out")]
	struct FakeTimeout;

	#[test]
	fn only_timeouts_are_retryable() {
		let timeout: Error = TransientError::timeout(FakeTimeout).into();

		assert!(timeout.is_retryable());
		assert_eq!(timeout.kind(), Some(ErrorKind::Transient));
		assert!(!Error::Internal { status: 500 }.is_retryable());
		assert!(!Error::from(TransportError::Other { message: "reset".into() }).is_retryable());
		assert!(!Error::HandlerClosed.is_retryable());
	}

	#[test]
	fn messages_embed_context() {
		let bad = Error::BadRequest { body: "{\"error\":\"nope\"}".into() };

		assert_eq!(bad.to_string(), "Bad request: {\"error\":\"nope\"}.");
		assert_eq!(Error::Internal { status: 404 }.to_string(), "Unexpected status code 404.");
		assert_eq!(
			Error::Forbidden { client_id: "svc-client".into() }.to_string(),
			"Forbidden: svc-client."
		);
		assert_eq!(Error::Forbidden { client_id: "c".into() }.kind(), Some(ErrorKind::Forbidden));
		assert_eq!(Error::HandlerClosed.kind(), None);
	}
}
