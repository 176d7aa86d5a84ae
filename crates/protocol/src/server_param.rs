//! The `server` parameter and its transaction information flags.
//!
//! A server parameter is backed by exactly one of three representations:
//!
//! ```text
//! Uri         first contact: the literal authentication URI the client
//!             scanned, echoed back as the server value
//! Structured  built locally by a server answering a client
//! Verbatim    parsed from the wire; keeps the decoded text so the value
//!             re-encodes to the exact bytes that were received (and signed)
//! ```

use std::fmt;

use bitflags::bitflags;

use crate::crypto::KEY_LENGTH;
use crate::encoding::{
    decode_base64, decode_base64_text, encode_base64, split_key_value, LINE_SEPARATOR,
};
use crate::error::{ProtocolError, Result};
use crate::params::{
    ParameterBlock, KEY_NUT, KEY_SFN, KEY_SUK, KEY_TIF, KEY_VER, KEY_VUK, PROTOCOL_VERSION,
};
use crate::server_body::ServerBody;

/// Marker searched for in a raw URI to find the nonce.
const URI_NUT_MARKER: &str = "nut=";

bitflags! {
    /// Transaction information flags (`tif`) reported by a server.
    ///
    /// Bits without a name here are kept as they are so that they survive a
    /// parse and re-encode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TransactionFlags: u32 {
        /// The identity key is known to the server.
        const ID_MATCH = 0x0001;
        /// The previous identity key is known to the server.
        const PREVIOUS_ID_MATCH = 0x0002;
        /// The request came from the IP address that fetched the nonce.
        const IP_MATCH = 0x0004;
        /// SQRL is enabled for the account.
        const SQRL_ENABLED = 0x0008;
        /// The user is logged in.
        const USER_LOGGED_IN = 0x0010;
        /// The server would create an account for this identity.
        const ACCOUNT_CREATION_ALLOWED = 0x0020;
        /// A command could not be executed.
        const COMMAND_FAILED = 0x0040;
        /// The request was rejected at the protocol level.
        const SQRL_FAILURE = 0x0080;

        const _ = !0;
    }
}

impl TransactionFlags {
    /// Look a flag up by its kebab-case name, e.g. `"id-match"`.
    pub fn from_flag_name(name: &str) -> Option<Self> {
        if name.is_empty() || name.contains('_') {
            return None;
        }
        Self::from_name(&name.to_ascii_uppercase().replace('-', "_"))
    }

    /// Kebab-case names of every named flag.
    pub fn flag_names() -> impl Iterator<Item = String> {
        Self::all().iter_names().map(|(name, _)| kebab_case(name))
    }
}

impl Default for TransactionFlags {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for TransactionFlags {
    /// Named flags joined by `|`, followed by any unnamed remainder in hex.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let mut named = Self::empty();
        let mut parts = Vec::new();
        for (name, flag) in self.iter_names() {
            named |= flag;
            parts.push(kebab_case(name));
        }
        let rest = self.bits() & !named.bits();
        if rest != 0 {
            parts.push(format!("{rest:#x}"));
        }
        f.write_str(&parts.join("|"))
    }
}

fn kebab_case(name: &str) -> String {
    name.to_ascii_lowercase().replace('_', "-")
}

#[derive(Debug, Clone)]
enum Repr {
    Uri { uri: String },
    Structured(ParameterBlock),
    Verbatim { block: ParameterBlock, decoded: String },
}

/// The server's parameter block, or the raw URI on first contact.
#[derive(Debug, Clone)]
pub struct ServerParameter {
    repr: Repr,
}

impl ServerParameter {
    /// Wrap the literal authentication URI of a first-contact request.
    pub fn from_uri(uri: impl Into<String>) -> Self {
        Self {
            repr: Repr::Uri { uri: uri.into() },
        }
    }

    /// Start building a structured parameter. `nut` is the plain nonce text.
    pub fn builder(nut: impl Into<String>, flags: TransactionFlags) -> ServerParameterBuilder {
        ServerParameterBuilder {
            nut: nut.into(),
            flags,
            version: None,
            friendly_name: None,
            server_unlock_key: None,
            verify_unlock_key: None,
            verbatim: None,
        }
    }

    /// Parse decoded text received from the wire.
    ///
    /// Text that does not start with `ver=` is taken as a raw URI. Otherwise
    /// `ver`, `nut` and `tif` are required and the version must be `1`.
    pub fn parse(decoded: &str) -> Result<Self> {
        if !decoded.starts_with("ver=") {
            return Ok(Self::from_uri(decoded));
        }

        let map = split_key_value(decoded, LINE_SEPARATOR)?;
        let (Some(version), Some(nut), Some(tif)) =
            (map.get(KEY_VER), map.get(KEY_NUT), map.get(KEY_TIF))
        else {
            return Err(ProtocolError::protocol("missing important parameter"));
        };
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::protocol(format!("wrong version: {version}")));
        }

        let nut = decode_base64_text(nut)?;
        let flags = parse_flags(tif)?;
        let decode_key = |key: &str| -> Result<Option<Vec<u8>>> {
            map.get(key).map(|value| decode_base64(value)).transpose()
        };

        if nut.is_empty() {
            return Err(ProtocolError::protocol("nut can't be empty"));
        }

        // Received unlock keys are copied through whatever their length
        let mut builder = Self::builder(nut, flags).version(version.as_str());
        builder.friendly_name = map.get(KEY_SFN).cloned();
        builder.server_unlock_key = decode_key(KEY_SUK)?;
        builder.verify_unlock_key = decode_key(KEY_VUK)?;

        Ok(builder.verbatim(decoded).assemble())
    }

    /// Parse the base64 wire value of a `server` field.
    pub fn parse_encoded(encoded: &str) -> Result<Self> {
        Self::parse(&decode_base64_text(encoded)?)
    }

    /// Wire form of this parameter.
    pub fn encoded(&self) -> String {
        match &self.repr {
            Repr::Uri { uri } => encode_base64(uri),
            Repr::Structured(block) => block.encoded(),
            Repr::Verbatim { decoded, .. } => encode_base64(decoded),
        }
    }

    /// Decoded form of this parameter.
    pub fn decoded_bytes(&self) -> Vec<u8> {
        match &self.repr {
            Repr::Uri { uri } => uri.as_bytes().to_vec(),
            Repr::Structured(block) => block.decoded_bytes(),
            Repr::Verbatim { decoded, .. } => decoded.as_bytes().to_vec(),
        }
    }

    fn block(&self) -> Option<&ParameterBlock> {
        match &self.repr {
            Repr::Uri { .. } => None,
            Repr::Structured(block) | Repr::Verbatim { block, .. } => Some(block),
        }
    }

    /// Whether this is the raw-URI variant.
    pub fn is_uri(&self) -> bool {
        matches!(self.repr, Repr::Uri { .. })
    }

    pub fn version(&self) -> Option<&str> {
        self.block().and_then(|block| block.get(KEY_VER))
    }

    /// The session nonce as text.
    ///
    /// For a raw URI this is the literal text between `nut=` and the next
    /// `&` (or the end). For a structured block it is the base64-decoded
    /// `nut` field.
    pub fn nut(&self) -> Result<String> {
        match &self.repr {
            Repr::Uri { uri } => {
                let start = uri
                    .find(URI_NUT_MARKER)
                    .map(|i| i + URI_NUT_MARKER.len())
                    .ok_or_else(|| ProtocolError::protocol("uri carries no nut"))?;
                let rest = &uri[start..];
                let end = rest.find('&').unwrap_or(rest.len());
                Ok(rest[..end].to_string())
            }
            Repr::Structured(block) | Repr::Verbatim { block, .. } => {
                let nut = block
                    .get(KEY_NUT)
                    .ok_or_else(|| ProtocolError::protocol("missing nut"))?;
                decode_base64_text(nut)
            }
        }
    }

    /// Transaction flags, `None` for the raw-URI variant.
    pub fn transaction_flags(&self) -> Option<TransactionFlags> {
        self.block()
            .and_then(|block| block.get(KEY_TIF))
            .and_then(|tif| parse_flags(tif).ok())
    }

    /// Whether all bits of `flag` are set. A raw URI carries no `tif` and
    /// answers as if every bit were set.
    pub fn has_flag(&self, flag: TransactionFlags) -> bool {
        if self.is_uri() {
            return true;
        }
        self.transaction_flags()
            .is_some_and(|flags| flags.contains(flag))
    }

    pub fn friendly_name(&self) -> Option<&str> {
        self.block().and_then(|block| block.get(KEY_SFN))
    }

    /// Server unlock key stored for the account, if the server sent one.
    pub fn server_unlock_key(&self) -> Option<Vec<u8>> {
        self.block()
            .and_then(|block| block.get_decoded(KEY_SUK))
            .and_then(|decoded| decoded.ok())
    }

    /// Verify unlock key stored for the account, if the server sent one.
    pub fn verify_unlock_key(&self) -> Option<Vec<u8>> {
        self.block()
            .and_then(|block| block.get_decoded(KEY_VUK))
            .and_then(|decoded| decoded.ok())
    }

    /// Wrap this parameter in a server body.
    pub fn into_server_body(self) -> ServerBody {
        ServerBody::new(self)
    }

    pub fn to_server_body(&self) -> ServerBody {
        ServerBody::new(self.clone())
    }
}

impl PartialEq for ServerParameter {
    /// Raw URIs compare by text, blocks compare by their fields. A URI never
    /// equals a block.
    fn eq(&self, other: &Self) -> bool {
        match (&self.repr, &other.repr) {
            (Repr::Uri { uri: a }, Repr::Uri { uri: b }) => a == b,
            (Repr::Uri { .. }, _) | (_, Repr::Uri { .. }) => false,
            _ => self.block() == other.block(),
        }
    }
}

impl Eq for ServerParameter {}

fn parse_flags(tif: &str) -> Result<TransactionFlags> {
    tif.parse::<u32>()
        .map(TransactionFlags::from_bits_retain)
        .map_err(|_| ProtocolError::protocol(format!("malformed tif: {tif:?}")))
}

/// Builder for a structured [`ServerParameter`].
#[derive(Debug, Clone)]
pub struct ServerParameterBuilder {
    nut: String,
    flags: TransactionFlags,
    version: Option<String>,
    friendly_name: Option<String>,
    server_unlock_key: Option<Vec<u8>>,
    verify_unlock_key: Option<Vec<u8>>,
    verbatim: Option<String>,
}

impl ServerParameterBuilder {
    /// Protocol version, `"1"` unless set.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Server friendly name shown by the client.
    pub fn friendly_name(mut self, name: impl Into<String>) -> Self {
        self.friendly_name = Some(name.into());
        self
    }

    /// Unlock keys stored for the account. They are public values and the
    /// client needs them to build an unlock request.
    pub fn stored_keys(mut self, server_unlock_key: &[u8], verify_unlock_key: &[u8]) -> Self {
        self.server_unlock_key = Some(server_unlock_key.to_vec());
        self.verify_unlock_key = Some(verify_unlock_key.to_vec());
        self
    }

    pub fn server_unlock_key(mut self, key: Option<&[u8]>) -> Self {
        self.server_unlock_key = key.map(<[u8]>::to_vec);
        self
    }

    pub fn verify_unlock_key(mut self, key: Option<&[u8]>) -> Self {
        self.verify_unlock_key = key.map(<[u8]>::to_vec);
        self
    }

    /// Keep the decoded text the parameter was parsed from.
    pub(crate) fn verbatim(mut self, decoded: &str) -> Self {
        self.verbatim = Some(decoded.to_string());
        self
    }

    /// Validate and assemble the parameter.
    ///
    /// Fails with [`ProtocolError::InvalidArgument`] when the nonce is empty
    /// or an unlock key is not exactly 32 bytes.
    pub fn build(self) -> Result<ServerParameter> {
        if self.nut.is_empty() {
            return Err(ProtocolError::invalid_argument("nut can't be empty"));
        }
        for (name, key) in [
            (KEY_SUK, &self.server_unlock_key),
            (KEY_VUK, &self.verify_unlock_key),
        ] {
            if let Some(key) = key.as_ref().filter(|k| k.len() != KEY_LENGTH) {
                return Err(ProtocolError::invalid_argument(format!(
                    "illegal {name} length: expected {KEY_LENGTH}, got {}",
                    key.len()
                )));
            }
        }
        Ok(self.assemble())
    }

    fn assemble(self) -> ServerParameter {
        let mut block = ParameterBlock::new();
        block
            .put(KEY_VER, self.version.unwrap_or_else(|| PROTOCOL_VERSION.to_string()))
            .put(KEY_NUT, encode_base64(&self.nut))
            .put(KEY_TIF, self.flags.bits().to_string());
        if let Some(name) = self.friendly_name {
            block.put(KEY_SFN, name);
        }
        block
            .put_encoded(KEY_SUK, self.server_unlock_key.as_deref())
            .put_encoded(KEY_VUK, self.verify_unlock_key.as_deref());

        let repr = match self.verbatim {
            Some(decoded) => Repr::Verbatim { block, decoded },
            None => Repr::Structured(block),
        };
        ServerParameter { repr }
    }
}
