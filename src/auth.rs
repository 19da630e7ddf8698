//! Client identifiers, secrets, unverified token claims, and the cached credential model.

pub mod claims;
pub mod credential;
pub mod id;
pub mod secret;

pub use claims::*;
pub use credential::*;
pub use id::*;
pub use secret::*;
