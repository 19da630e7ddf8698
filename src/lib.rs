//! Background refresh of a single renewable service-client bearer token: a demand-driven
//! worker, typed IAM failures, and unverified claims bookkeeping in one crate.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

/// Emits a structured `tracing` event when the `tracing` feature is enabled.
macro_rules! obs_event {
	($level:ident, $($arg:tt)+) => {
		#[cfg(feature = "tracing")]
		{
			::tracing::$level!(target: "service_token", $($arg)+);
		}
	};
}

pub mod auth;
pub mod config;
pub mod error;
pub mod exchange;
pub mod handler;
pub mod http;
pub mod obs;

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration as StdDuration,
	};

	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use tokio_util::sync::CancellationToken;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use {tokio_util::sync::CancellationToken, url};
#[cfg(test)] use {color_eyre as _, httpmock as _};
