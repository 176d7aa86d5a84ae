//! Generic parameter block codec.
//!
//! A parameter block is an insertion-ordered list of `key=value` pairs.
//! Its canonical decoded form is the ASCII text `key=value\r\n...` with the
//! `ver` field always first; its encoded form is that text as unpadded
//! URL-safe base64. Client and server parameters are typed views over a
//! block.

use crate::encoding::{decode_base64, encode_base64, LINE_SEPARATOR};
use crate::error::Result;

/// Protocol version field.
pub const KEY_VER: &str = "ver";
/// Tilde-separated command list (client).
pub const KEY_CMD: &str = "cmd";
/// Identity key (client).
pub const KEY_IDK: &str = "idk";
/// Previous identity key (client).
pub const KEY_PIDK: &str = "pidk";
/// Server unlock key (client and server).
pub const KEY_SUK: &str = "suk";
/// Verify unlock key (client and server).
pub const KEY_VUK: &str = "vuk";
/// Session nonce (server).
pub const KEY_NUT: &str = "nut";
/// Transaction information flags (server).
pub const KEY_TIF: &str = "tif";
/// Server friendly name (server).
pub const KEY_SFN: &str = "sfn";

/// The only protocol version this crate speaks.
pub const PROTOCOL_VERSION: &str = "1";

/// Insertion-ordered `key=value` container with a canonical serialization.
#[derive(Debug, Clone, Default)]
pub struct ParameterBlock {
    entries: Vec<(String, String)>,
}

impl ParameterBlock {
    /// Create an empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to a plain text value. An existing key keeps its position.
    pub fn put(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
        self
    }

    /// Set `key` to the base64 encoding of `value`. Does nothing when
    /// `value` is absent.
    pub fn put_encoded(&mut self, key: &str, value: Option<&[u8]>) -> &mut Self {
        if let Some(value) = value {
            self.put(key, encode_base64(value));
        }
        self
    }

    /// Plain text value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Base64-decoded value of `key`.
    pub fn get_decoded(&self, key: &str) -> Option<Result<Vec<u8>>> {
        self.get(key).map(decode_base64)
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the block has no fields.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical text form: `ver` first, then all other fields in
    /// insertion order, each terminated by `\r\n`.
    pub fn decoded_text(&self) -> String {
        let mut text = String::new();
        let ordered = self
            .entries
            .iter()
            .filter(|(k, _)| k == KEY_VER)
            .chain(self.entries.iter().filter(|(k, _)| k != KEY_VER));
        for (key, value) in ordered {
            text.push_str(key);
            text.push('=');
            text.push_str(value);
            text.push_str(LINE_SEPARATOR);
        }
        text
    }

    /// Canonical byte form, see [`ParameterBlock::decoded_text`].
    pub fn decoded_bytes(&self) -> Vec<u8> {
        self.decoded_text().into_bytes()
    }

    /// Base64 encoding of the canonical byte form.
    pub fn encoded(&self) -> String {
        encode_base64(self.decoded_text())
    }
}

impl PartialEq for ParameterBlock {
    /// Same key set with the same values, regardless of order.
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .all(|(key, value)| other.get(key) == Some(value.as_str()))
    }
}

impl Eq for ParameterBlock {}

impl std::fmt::Display for ParameterBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.decoded_text())
    }
}
