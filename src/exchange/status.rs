//! Classification of token endpoint statuses.

// self
use crate::_prelude::*;

/// Maps the final token endpoint status into `Ok(())` or a typed error.
///
/// `body` is embedded verbatim (lossily decoded) in [`Error::BadRequest`]; `client_id` is
/// carried by [`Error::Unauthorized`] and [`Error::Forbidden`].
pub fn classify_status(status: u16, body: &[u8], client_id: &str) -> Result<()> {
	match status {
		200 => Ok(()),
		400 => Err(Error::BadRequest { body: String::from_utf8_lossy(body).into_owned() }),
		401 => Err(Error::Unauthorized { client_id: client_id.to_owned() }),
		403 => Err(Error::Forbidden { client_id: client_id.to_owned() }),
		status => Err(Error::Internal { status }),
	}
}
