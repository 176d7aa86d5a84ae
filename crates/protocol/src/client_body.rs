//! Client body: the signed client message.
//!
//! ```text
//! client=<enc>&server=<enc>&ids=<sig>[&pids=<sig>][&urs=<sig>]
//! ```
//!
//! `ids` and `pids` sign the ASCII concatenation of the encoded `client` and
//! `server` values exactly as they appear on the wire. `urs` signs the verify
//! unlock key bytes with the key recovered from the identity unlock key.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use zeroize::Zeroizing;

use crate::cipher::MacProvider;
use crate::client_param::{ClientParameter, CMD_CREATE, CMD_LOGIN, CMD_SETKEY, CMD_SETLOCK};
use crate::crypto::{EccProvider, KeyPair, Signature, KEY_LENGTH};
use crate::encoding::{split_key_value, FIELD_SEPARATOR};
use crate::error::{ProtocolError, Result};
use crate::params::PROTOCOL_VERSION;
use crate::server_body::ServerBody;
use crate::server_param::ServerParameter;

pub const FIELD_CLIENT: &str = "client";
pub const FIELD_SERVER: &str = "server";
pub const FIELD_IDS: &str = "ids";
pub const FIELD_PIDS: &str = "pids";
pub const FIELD_URS: &str = "urs";

/// A complete client message. Immutable once built or parsed.
#[derive(Debug, Clone)]
pub struct ClientBody {
    client_parameter: ClientParameter,
    server_parameter: ServerParameter,
    identity_signature: Signature,
    previous_identity_signature: Option<Signature>,
    unlock_request_signature: Option<Signature>,
    signed_payload: String,
    body: String,
}

impl ClientBody {
    fn assemble(
        client_parameter: ClientParameter,
        server_parameter: ServerParameter,
        client_encoded: &str,
        server_encoded: &str,
        identity_signature: WireSignature,
        previous_identity_signature: Option<WireSignature>,
        unlock_request_signature: Option<WireSignature>,
    ) -> Self {
        let (identity_signature, ids) = identity_signature;
        let mut body = format!(
            "{FIELD_CLIENT}={client_encoded}{FIELD_SEPARATOR}{FIELD_SERVER}={server_encoded}\
             {FIELD_SEPARATOR}{FIELD_IDS}={ids}"
        );
        if let Some((_, pids)) = &previous_identity_signature {
            body.push_str(&format!("{FIELD_SEPARATOR}{FIELD_PIDS}={pids}"));
        }
        if let Some((_, urs)) = &unlock_request_signature {
            body.push_str(&format!("{FIELD_SEPARATOR}{FIELD_URS}={urs}"));
        }
        let previous_identity_signature = previous_identity_signature.map(|(sig, _)| sig);
        let unlock_request_signature = unlock_request_signature.map(|(sig, _)| sig);

        Self {
            client_parameter,
            server_parameter,
            identity_signature,
            previous_identity_signature,
            unlock_request_signature,
            signed_payload: format!("{client_encoded}{server_encoded}"),
            body,
        }
    }

    pub fn client_parameter(&self) -> &ClientParameter {
        &self.client_parameter
    }

    pub fn server_parameter(&self) -> &ServerParameter {
        &self.server_parameter
    }

    pub fn identity_signature(&self) -> &Signature {
        &self.identity_signature
    }

    pub fn previous_identity_signature(&self) -> Option<&Signature> {
        self.previous_identity_signature.as_ref()
    }

    pub fn unlock_request_signature(&self) -> Option<&Signature> {
        self.unlock_request_signature.as_ref()
    }

    /// The bytes covered by `ids` and `pids`: the encoded client value
    /// followed by the encoded server value.
    pub fn signed_payload(&self) -> &str {
        &self.signed_payload
    }

    /// The flattened wire body.
    pub fn encoded(&self) -> &str {
        &self.body
    }
}

impl PartialEq for ClientBody {
    fn eq(&self, other: &Self) -> bool {
        self.body == other.body
    }
}

impl Eq for ClientBody {}

impl Hash for ClientBody {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.body.hash(state);
    }
}

impl fmt::Display for ClientBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.body)
    }
}

/// Builds and signs a [`ClientBody`].
///
/// Secret inputs are borrowed for the duration of the build only. Derived
/// seeds are wiped before the builder returns.
pub struct ClientBodyBuilder<'a> {
    ecc: &'a dyn EccProvider,
    mac: &'a dyn MacProvider,
    master_key: &'a [u8; KEY_LENGTH],
    site_key: String,
    version: String,
    commands: Vec<String>,
    identity_unlock_key: Option<&'a [u8; KEY_LENGTH]>,
    previous_master_key: Option<&'a [u8; KEY_LENGTH]>,
    previous_server_unlock_key: Option<Vec<u8>>,
    previous_verify_unlock_key: Option<Vec<u8>>,
    new_server_unlock_key: Option<Vec<u8>>,
    new_verify_unlock_key: Option<Vec<u8>>,
}

impl<'a> ClientBodyBuilder<'a> {
    /// Start a client body for `site_key` signed with keys derived from
    /// `master_key`.
    pub fn new(
        ecc: &'a dyn EccProvider,
        mac: &'a dyn MacProvider,
        master_key: &'a [u8; KEY_LENGTH],
        site_key: impl Into<String>,
    ) -> Self {
        Self {
            ecc,
            mac,
            master_key,
            site_key: site_key.into(),
            version: PROTOCOL_VERSION.to_string(),
            commands: Vec::new(),
            identity_unlock_key: None,
            previous_master_key: None,
            previous_server_unlock_key: None,
            previous_verify_unlock_key: None,
            new_server_unlock_key: None,
            new_verify_unlock_key: None,
        }
    }

    /// Protocol version, `"1"` unless set.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Append a command. Without any command the body asks for `login`.
    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.commands.push(command.into());
        self
    }

    pub fn commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands.extend(commands.into_iter().map(Into::into));
        self
    }

    /// Sign an unlock request with the key recovered from this identity
    /// unlock key. Requires [`ClientBodyBuilder::previous_server_keys`].
    pub fn identity_unlock_key(mut self, key: &'a [u8; KEY_LENGTH]) -> Self {
        self.identity_unlock_key = Some(key);
        self
    }

    /// Also sign with the identity derived from a previous master key.
    pub fn previous_master_key(mut self, key: &'a [u8; KEY_LENGTH]) -> Self {
        self.previous_master_key = Some(key);
        self
    }

    /// Unlock keys the server reported for the account.
    pub fn previous_server_keys(mut self, server_unlock_key: &[u8], verify_unlock_key: &[u8]) -> Self {
        self.previous_server_unlock_key = Some(server_unlock_key.to_vec());
        self.previous_verify_unlock_key = Some(verify_unlock_key.to_vec());
        self
    }

    /// Unlock keys to publish with this request.
    pub fn new_server_keys(mut self, server_unlock_key: &[u8], verify_unlock_key: &[u8]) -> Self {
        self.new_server_unlock_key = Some(server_unlock_key.to_vec());
        self.new_verify_unlock_key = Some(verify_unlock_key.to_vec());
        self
    }

    /// Build a first-contact request that echoes the authentication URI.
    pub fn build_request(self, signature_uri: &str) -> Result<ClientBody> {
        if signature_uri.is_empty() {
            return Err(ProtocolError::protocol("missing signature uri"));
        }
        self.build(ServerParameter::from_uri(signature_uri))
    }

    /// Build a response that echoes a server parameter.
    pub fn build_response(self, server_parameter: &ServerParameter) -> Result<ClientBody> {
        self.build(server_parameter.clone())
    }

    /// Build a response to a server body.
    pub fn build_response_to(self, server_body: &ServerBody) -> Result<ClientBody> {
        self.build_response(server_body.server_parameter())
    }

    fn build(mut self, server_parameter: ServerParameter) -> Result<ClientBody> {
        self.check_arguments()?;

        if self.commands.is_empty() {
            self.commands.push(CMD_LOGIN.to_string());
        }
        if self.commands.iter().any(|c| c == CMD_CREATE) {
            for implied in [CMD_SETKEY, CMD_SETLOCK] {
                if !self.commands.iter().any(|c| c == implied) {
                    self.commands.push(implied.to_string());
                }
            }
        }

        let identity = self.site_key_pair(self.master_key)?;
        let previous = self
            .previous_master_key
            .map(|key| self.site_key_pair(key))
            .transpose()?;

        // Fails on inconsistent previous keys before anything is signed
        let unlock_request = self
            .identity_unlock_key
            .map(|key| self.unlock_request_key_pair(key))
            .transpose()?;

        let client_parameter =
            ClientParameter::builder(self.commands.iter().map(String::as_str), identity.public_signature_key())
                .version(self.version.as_str())
                .previous_identity_key(previous.as_ref().map(|p| &p.public_signature_key()[..]))
                .server_unlock_key(self.new_server_unlock_key.as_deref())
                .verify_unlock_key(self.new_verify_unlock_key.as_deref())
                .build()?;

        let client_encoded = client_parameter.encoded();
        let server_encoded = server_parameter.encoded();
        let payload = format!("{client_encoded}{server_encoded}");

        let identity_signature = self.ecc.sign_with(payload.as_bytes(), &identity)?;
        let previous_identity_signature = previous
            .as_ref()
            .map(|pair| self.ecc.sign_with(payload.as_bytes(), pair))
            .transpose()?;
        let unlock_request_signature = unlock_request
            .as_ref()
            .map(|pair| self.ecc.sign_with(pair.public_signature_key(), pair))
            .transpose()?;

        Ok(ClientBody::assemble(
            client_parameter,
            server_parameter,
            &client_encoded,
            &server_encoded,
            with_text(identity_signature),
            previous_identity_signature.map(with_text),
            unlock_request_signature.map(with_text),
        ))
    }

    fn check_arguments(&self) -> Result<()> {
        if self.site_key.is_empty() {
            return Err(ProtocolError::invalid_argument("site key can't be empty"));
        }
        if self.commands.iter().any(String::is_empty) {
            return Err(ProtocolError::invalid_argument("command can't be empty"));
        }
        for key in [&self.new_server_unlock_key, &self.new_verify_unlock_key]
            .into_iter()
            .flatten()
        {
            if key.len() != KEY_LENGTH {
                return Err(ProtocolError::invalid_argument(format!(
                    "illegal unlock key length: expected {KEY_LENGTH}, got {}",
                    key.len()
                )));
            }
        }
        Ok(())
    }

    /// Key pair for this site: the seed is `HMAC(site_key, master_key)`.
    fn site_key_pair(&self, master_key: &[u8; KEY_LENGTH]) -> Result<KeyPair> {
        let seed = Zeroizing::new(self.mac.hmac(self.site_key.as_bytes(), master_key)?);
        Ok(self.ecc.key_pair(&seed))
    }

    fn unlock_request_key_pair(&self, identity_unlock_key: &[u8; KEY_LENGTH]) -> Result<KeyPair> {
        let (Some(server_unlock_key), Some(verify_unlock_key)) = (
            self.previous_server_unlock_key.as_deref(),
            self.previous_verify_unlock_key.as_deref(),
        ) else {
            return Err(ProtocolError::protocol(
                "unlock request needs the previous server unlock keys",
            ));
        };

        let seed = Zeroizing::new(
            self.ecc
                .diffie_hellman(identity_unlock_key, server_unlock_key)?,
        );
        let pair = self.ecc.key_pair(&seed);
        if pair.public_signature_key()[..] != *verify_unlock_key {
            return Err(ProtocolError::protocol("verify unlock key didn't match"));
        }
        Ok(pair)
    }
}

/// Parses a received [`ClientBody`], optionally checking its signatures.
pub struct ClientBodyParser<'a> {
    ecc: &'a dyn EccProvider,
    fields: HashMap<String, String>,
    stored_server_unlock_key: Option<Vec<u8>>,
    stored_verify_unlock_key: Option<Vec<u8>>,
}

impl<'a> ClientBodyParser<'a> {
    pub fn new(ecc: &'a dyn EccProvider) -> Self {
        Self {
            ecc,
            fields: HashMap::new(),
            stored_server_unlock_key: None,
            stored_verify_unlock_key: None,
        }
    }

    /// Use the fields of a flattened `a=b&c=d` body.
    pub fn from_body(self, body: &str) -> Result<Self> {
        Ok(self.from_fields(split_key_value(body, FIELD_SEPARATOR)?))
    }

    /// Use already split top-level fields.
    pub fn from_fields(mut self, fields: HashMap<String, String>) -> Self {
        self.fields = fields;
        self
    }

    /// Unlock keys stored for the account. With them, `urs` is checked
    /// against the stored verify unlock key instead of the one the client
    /// sent.
    pub fn stored_keys(mut self, server_unlock_key: &[u8], verify_unlock_key: &[u8]) -> Self {
        self.stored_server_unlock_key = Some(server_unlock_key.to_vec());
        self.stored_verify_unlock_key = Some(verify_unlock_key.to_vec());
        self
    }

    /// Parse the fields without checking any signature.
    pub fn parse_unchecked(&self) -> Result<ClientBody> {
        self.parse(false)
    }

    /// Parse the fields and check every signature present.
    pub fn verified(&self) -> Result<ClientBody> {
        self.parse(true)
    }

    fn parse(&self, check_signatures: bool) -> Result<ClientBody> {
        let (Some(client_encoded), Some(server_encoded), Some(ids)) = (
            self.fields.get(FIELD_CLIENT),
            self.fields.get(FIELD_SERVER),
            self.fields.get(FIELD_IDS),
        ) else {
            return Err(ProtocolError::protocol("missing important parameter"));
        };

        let client_parameter = ClientParameter::parse_encoded(client_encoded)?;
        let server_parameter = ServerParameter::parse_encoded(server_encoded)?;
        let payload = format!("{client_encoded}{server_encoded}");

        let identity_signature = Signature::from_base64(ids)?;
        if check_signatures {
            self.check(
                payload.as_bytes(),
                &identity_signature,
                client_parameter.identity_key(),
            )?;
        }

        let previous_identity_signature = self
            .fields
            .get(FIELD_PIDS)
            .map(|pids| Signature::from_base64(pids))
            .transpose()?;
        if let (true, Some(pids)) = (check_signatures, &previous_identity_signature) {
            let key = client_parameter
                .previous_identity_key()
                .unwrap_or_default();
            self.check(payload.as_bytes(), pids, key)?;
        }

        let unlock_request_signature = self
            .fields
            .get(FIELD_URS)
            .map(|urs| Signature::from_base64(urs))
            .transpose()?;
        if let (true, Some(urs)) = (check_signatures, &unlock_request_signature) {
            let verify_unlock_key = match (
                &self.stored_server_unlock_key,
                &self.stored_verify_unlock_key,
            ) {
                (Some(_), Some(stored)) => stored.as_slice(),
                // Without stored keys only the client's own vuk is available.
                // This proves possession of nothing the sender did not choose.
                _ => client_parameter
                    .verify_unlock_key()
                    .unwrap_or_default(),
            };
            self.check(verify_unlock_key, urs, verify_unlock_key)?;
        }

        Ok(ClientBody::assemble(
            client_parameter,
            server_parameter,
            client_encoded,
            server_encoded,
            (identity_signature, ids.clone()),
            previous_identity_signature.zip(self.fields.get(FIELD_PIDS).cloned()),
            unlock_request_signature.zip(self.fields.get(FIELD_URS).cloned()),
        ))
    }

    fn check(&self, message: &[u8], signature: &Signature, public_key: &[u8]) -> Result<()> {
        if self.ecc.verify(message, signature.as_bytes(), public_key) {
            Ok(())
        } else {
            Err(ProtocolError::protocol("signature mismatch"))
        }
    }
}

/// A signature with the exact text it has in the body.
type WireSignature = (Signature, String);

fn with_text(signature: Signature) -> WireSignature {
    let text = signature.to_base64();
    (signature, text)
}
