//! Shareable ids
//!
//! A shareable id is the URL-safe, unpadded base64 form of an account id. It
//! can travel in URLs and is reversed back to the account id on lookup.

use data_encoding::BASE64URL_NOPAD;

/// Encode an account id
pub fn encode_id(account_id: &str) -> String {
    BASE64URL_NOPAD.encode(account_id.as_bytes())
}

/// Decode a shareable id back to the account id.
///
/// `None` when the input is not valid unpadded URL-safe base64 or does not
/// decode to UTF-8.
pub fn decode_id(shareable_id: &str) -> Option<String> {
    let bytes = BASE64URL_NOPAD.decode(shareable_id.as_bytes()).ok()?;
    String::from_utf8(bytes).ok()
}
