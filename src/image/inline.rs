//! Inline (base64 / data URL) image payloads.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};

use crate::error::{Error, Result};

const DATA_URL_PREFIX: &str = "data:image";

/// Decode an inline image payload into raw bytes.
///
/// Accepts either a bare base64 string or a data URL of the form
/// `data:image/<type>;base64,<payload>`. For data URLs everything up to the
/// first comma is discarded.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the data URL has no payload separator
/// or the payload is not valid base64.
pub fn decode_inline(payload: &str) -> Result<Vec<u8>> {
    let data = if payload.starts_with(DATA_URL_PREFIX) {
        let (_, data) = payload.split_once(',').ok_or_else(|| {
            Error::invalid_input("Invalid base64 image data: missing comma in data URL")
        })?;
        data
    } else {
        payload
    };

    BASE64_STANDARD
        .decode(data.trim())
        .map_err(|err| Error::invalid_input(format!("Invalid base64 image data: {err}")))
}
