//! Text encoding helpers shared by parameter blocks and bodies.
//!
//! Everything on the wire is ASCII. Binary values are framed as URL-safe
//! base64 without padding or line wraps; on input, padded values are
//! accepted as well.

use std::collections::HashMap;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

use crate::error::{ProtocolError, Result};

/// Line separator between `key=value` pairs of a parameter block.
pub const LINE_SEPARATOR: &str = "\r\n";

/// Separator between the top-level fields of a body.
pub const FIELD_SEPARATOR: &str = "&";

/// Separator between a key and its value.
pub const ENTRY_SEPARATOR: char = '=';

/// URL-safe alphabet, never pads, accepts padded and unpadded input.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode bytes as unpadded URL-safe base64.
pub fn encode_base64(data: impl AsRef<[u8]>) -> String {
    URL_SAFE_LENIENT.encode(data)
}

/// Decode URL-safe base64, padded or not.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    Ok(URL_SAFE_LENIENT.decode(data)?)
}

/// Decode URL-safe base64 and interpret the result as text.
pub fn decode_base64_text(data: &str) -> Result<String> {
    Ok(String::from_utf8(decode_base64(data)?)?)
}

/// Split `k1=v1<sep>k2=v2...` into a map.
///
/// Each entry is split on its first `=`, so values may themselves contain
/// `=`. Empty segments are skipped. A later duplicate key replaces an
/// earlier one.
pub fn split_key_value(input: &str, separator: &str) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for segment in input.split(separator).filter(|s| !s.is_empty()) {
        match segment.split_once(ENTRY_SEPARATOR) {
            Some((key, value)) if !value.is_empty() => {
                map.insert(key.to_string(), value.to_string());
            }
            _ => {
                return Err(ProtocolError::protocol(format!(
                    "malformed parameter entry: {segment:?}"
                )))
            }
        }
    }
    Ok(map)
}
