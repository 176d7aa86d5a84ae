//! The `client` parameter of a client body.
//!
//! Carries the version, the tilde-joined command list, the identity key and
//! the optional previous identity key and new unlock keys.

use crate::crypto::KEY_LENGTH;
use crate::encoding::{decode_base64, decode_base64_text, encode_base64, split_key_value, LINE_SEPARATOR};
use crate::error::{ProtocolError, Result};
use crate::params::{
    ParameterBlock, KEY_CMD, KEY_IDK, KEY_PIDK, KEY_SUK, KEY_VER, KEY_VUK, PROTOCOL_VERSION,
};

/// Separator between commands in the `cmd` field.
pub const COMMAND_SEPARATOR: char = '~';

/// Plain identity assertion.
pub const CMD_LOGIN: &str = "login";
/// Create an account for the identity.
pub const CMD_CREATE: &str = "create";
/// Publish a new identity key.
pub const CMD_SETKEY: &str = "setkey";
/// Publish new unlock keys.
pub const CMD_SETLOCK: &str = "setlock";

/// Typed view over the client's parameter block.
#[derive(Debug, Clone)]
pub struct ClientParameter {
    block: ParameterBlock,
    identity_key: [u8; KEY_LENGTH],
    previous_identity_key: Option<Vec<u8>>,
    server_unlock_key: Option<Vec<u8>>,
    verify_unlock_key: Option<Vec<u8>>,
    /// Text this parameter was parsed from, echoed byte for byte.
    verbatim: Option<String>,
}

impl ClientParameter {
    /// Start building a client parameter.
    pub fn builder<I, S>(commands: I, identity_key: &[u8]) -> ClientParameterBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ClientParameterBuilder {
            commands: commands.into_iter().map(Into::into).collect(),
            identity_key: identity_key.to_vec(),
            version: None,
            previous_identity_key: None,
            server_unlock_key: None,
            verify_unlock_key: None,
        }
    }

    /// Parse the decoded `key=value` text sent by a client.
    ///
    /// Only `idk` must be 32 bytes. `pidk`, `suk` and `vuk` are copied
    /// through whatever their length.
    pub fn parse(decoded: &str) -> Result<Self> {
        let map = split_key_value(decoded, LINE_SEPARATOR)?;

        match map.get(KEY_VER) {
            Some(version) if version == PROTOCOL_VERSION => {}
            Some(version) => {
                return Err(ProtocolError::protocol(format!("wrong version: {version}")))
            }
            None => return Err(ProtocolError::protocol("missing version")),
        }

        let (Some(commands), Some(identity_key)) = (map.get(KEY_CMD), map.get(KEY_IDK)) else {
            return Err(ProtocolError::protocol("missing important parameter"));
        };

        let decode = |key: &str| map.get(key).map(|v| decode_base64(v)).transpose();

        let mut builder = Self::builder(
            commands.split(COMMAND_SEPARATOR),
            &decode_base64(identity_key)?,
        );
        builder.previous_identity_key = decode(KEY_PIDK)?;
        builder.server_unlock_key = decode(KEY_SUK)?;
        builder.verify_unlock_key = decode(KEY_VUK)?;

        let mut parameter = builder
            .check_commands()
            .and_then(|()| builder.assemble())
            .map_err(|e| match e {
                ProtocolError::InvalidArgument(cause) => ProtocolError::Protocol(cause),
                other => other,
            })?;
        parameter.verbatim = Some(decoded.to_string());
        Ok(parameter)
    }

    /// Parse the base64 wire value of the `client` field.
    pub fn parse_encoded(encoded: &str) -> Result<Self> {
        Self::parse(&decode_base64_text(encoded)?)
    }

    /// Wire form of this parameter.
    pub fn encoded(&self) -> String {
        match &self.verbatim {
            Some(text) => encode_base64(text),
            None => self.block.encoded(),
        }
    }

    /// Decoded `key=value` form of this parameter.
    pub fn decoded_bytes(&self) -> Vec<u8> {
        match &self.verbatim {
            Some(text) => text.as_bytes().to_vec(),
            None => self.block.decoded_bytes(),
        }
    }

    /// Protocol version.
    pub fn version(&self) -> &str {
        self.block.get(KEY_VER).unwrap_or(PROTOCOL_VERSION)
    }

    /// Commands in the order the client sent them.
    pub fn commands(&self) -> Vec<&str> {
        self.block
            .get(KEY_CMD)
            .map(|cmd| cmd.split(COMMAND_SEPARATOR).collect())
            .unwrap_or_default()
    }

    /// Whether the client asked for `command`.
    pub fn has_command(&self, command: &str) -> bool {
        self.commands().contains(&command)
    }

    pub fn identity_key(&self) -> &[u8; KEY_LENGTH] {
        &self.identity_key
    }

    pub fn previous_identity_key(&self) -> Option<&[u8]> {
        self.previous_identity_key.as_deref()
    }

    pub fn server_unlock_key(&self) -> Option<&[u8]> {
        self.server_unlock_key.as_deref()
    }

    pub fn verify_unlock_key(&self) -> Option<&[u8]> {
        self.verify_unlock_key.as_deref()
    }
}

impl PartialEq for ClientParameter {
    fn eq(&self, other: &Self) -> bool {
        self.block == other.block
    }
}

impl Eq for ClientParameter {}

/// Builder for [`ClientParameter`]. All validation happens in
/// [`ClientParameterBuilder::build`].
#[derive(Debug, Clone)]
pub struct ClientParameterBuilder {
    commands: Vec<String>,
    identity_key: Vec<u8>,
    version: Option<String>,
    previous_identity_key: Option<Vec<u8>>,
    server_unlock_key: Option<Vec<u8>>,
    verify_unlock_key: Option<Vec<u8>>,
}

impl ClientParameterBuilder {
    /// Protocol version, `"1"` unless set.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn previous_identity_key(mut self, key: Option<&[u8]>) -> Self {
        self.previous_identity_key = key.map(<[u8]>::to_vec);
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

    /// Validate and assemble the parameter.
    ///
    /// Fails with [`ProtocolError::InvalidArgument`] when the command list is
    /// empty, a command is empty or contains `~`, or any key is not exactly
    /// 32 bytes.
    pub fn build(self) -> Result<ClientParameter> {
        self.check_commands()?;
        for (name, key) in [
            (KEY_PIDK, &self.previous_identity_key),
            (KEY_SUK, &self.server_unlock_key),
            (KEY_VUK, &self.verify_unlock_key),
        ] {
            if let Some(key) = key {
                to_key(name, key)?;
            }
        }
        self.assemble()
    }

    fn check_commands(&self) -> Result<()> {
        if self.commands.is_empty() {
            return Err(ProtocolError::invalid_argument("command list can't be empty"));
        }
        if let Some(bad) = self
            .commands
            .iter()
            .find(|c| c.is_empty() || c.contains(COMMAND_SEPARATOR))
        {
            return Err(ProtocolError::invalid_argument(format!(
                "illegal command: {bad:?}"
            )));
        }
        Ok(())
    }

    /// Lay out the block. Only `idk` is length checked here.
    fn assemble(self) -> Result<ClientParameter> {
        let identity_key = to_key(KEY_IDK, &self.identity_key)?;

        let mut block = ParameterBlock::new();
        block
            .put(KEY_VER, self.version.unwrap_or_else(|| PROTOCOL_VERSION.to_string()))
            .put(KEY_CMD, self.commands.join(&COMMAND_SEPARATOR.to_string()))
            .put_encoded(KEY_IDK, Some(&identity_key))
            .put_encoded(KEY_PIDK, self.previous_identity_key.as_deref())
            .put_encoded(KEY_SUK, self.server_unlock_key.as_deref())
            .put_encoded(KEY_VUK, self.verify_unlock_key.as_deref());

        Ok(ClientParameter {
            block,
            identity_key,
            previous_identity_key: self.previous_identity_key,
            server_unlock_key: self.server_unlock_key,
            verify_unlock_key: self.verify_unlock_key,
            verbatim: None,
        })
    }
}

fn to_key(name: &str, bytes: &[u8]) -> Result<[u8; KEY_LENGTH]> {
    <[u8; KEY_LENGTH]>::try_from(bytes).map_err(|_| {
        ProtocolError::invalid_argument(format!(
            "illegal {name} length: expected {KEY_LENGTH}, got {}",
            bytes.len()
        ))
    })
}
