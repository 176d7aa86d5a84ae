//! Subcommand implementations.
//!
//! Each command returns the message it produced so `main` only decides
//! where to print it. The `describe_*` helpers render received messages
//! field by field.

use std::fmt::Write as _;

use anyhow::{bail, Context, Result};
use sqrl_protocol::encoding::{decode_base64, encode_base64};
use sqrl_protocol::{
    identity_lock_key, CipherTool, ClientBody, ServerBody, ServerParameter, ServerUnlockKeys,
    SqrlProtocol, TransactionFlags, KEY_LENGTH,
};
use zeroize::Zeroizing;

/// Decode a base64 key argument. `name` is used in error messages.
pub fn decode_key(name: &str, encoded: &str) -> Result<Zeroizing<[u8; KEY_LENGTH]>> {
    let bytes = Zeroizing::new(
        decode_base64(encoded.trim()).with_context(|| format!("{name} is not valid base64"))?,
    );
    if bytes.len() != KEY_LENGTH {
        bail!("{name} must be {KEY_LENGTH} bytes, got {}", bytes.len());
    }
    let mut key = Zeroizing::new([0u8; KEY_LENGTH]);
    key.copy_from_slice(&bytes);
    Ok(key)
}

/// Fresh key material for a new identity.
pub struct GeneratedIdentity {
    pub master_key: Zeroizing<[u8; KEY_LENGTH]>,
    pub identity_unlock_key: Zeroizing<[u8; KEY_LENGTH]>,
    pub identity_lock_key: [u8; KEY_LENGTH],
    pub rescue_code: String,
}

impl GeneratedIdentity {
    pub fn render(&self) -> String {
        format!(
            "master-key:          {}\n\
             identity-unlock-key: {}\n\
             identity-lock-key:   {}\n\
             rescue-code:         {}\n",
            encode_base64(&self.master_key[..]),
            encode_base64(&self.identity_unlock_key[..]),
            encode_base64(self.identity_lock_key),
            self.rescue_code,
        )
    }
}

pub fn keygen(protocol: &SqrlProtocol) -> GeneratedIdentity {
    let cipher = CipherTool::new();
    let master_key = cipher.random_key();
    let identity_unlock_key = cipher.random_key();
    let identity_lock_key = identity_lock_key(protocol.ecc_provider(), &identity_unlock_key);

    tracing::debug!("Generated identity keys");
    GeneratedIdentity {
        master_key,
        identity_unlock_key,
        identity_lock_key,
        rescue_code: cipher.rescue_code(),
    }
}

/// First contact: sign the URI the site presented.
pub fn login(
    protocol: &SqrlProtocol,
    master_key: &[u8; KEY_LENGTH],
    site: &str,
    uri: &str,
) -> Result<ClientBody> {
    tracing::debug!(site, uri, "Building login request");
    protocol
        .authenticate(master_key, site)
        .build_request(uri)
        .context("Failed to build login request")
}

/// Options for [`respond`] beyond the identity and the server body.
#[derive(Default)]
pub struct ResponseOptions<'a> {
    pub commands: Vec<String>,
    pub previous_master_key: Option<&'a [u8; KEY_LENGTH]>,
    pub identity_unlock_key: Option<&'a [u8; KEY_LENGTH]>,
    /// Publishes fresh unlock keys. Needs the identity lock key, or the
    /// identity unlock key to derive it from.
    pub identity_lock_key: Option<&'a [u8; KEY_LENGTH]>,
    pub create_keys: bool,
}

/// Answer a server body with the given commands.
pub fn respond(
    protocol: &SqrlProtocol,
    master_key: &[u8; KEY_LENGTH],
    site: &str,
    server_body: &str,
    options: &ResponseOptions<'_>,
) -> Result<ClientBody> {
    let server_body = inspect_server(protocol, server_body)?;

    let parameter = server_body.server_parameter();
    let server_has_keys =
        parameter.server_unlock_key().is_some() && parameter.verify_unlock_key().is_some();

    let mut builder = protocol
        .answer_server(master_key, site, &server_body)
        .commands(options.commands.iter().cloned());

    if let Some(previous) = options.previous_master_key {
        builder = builder.previous_master_key(previous);
    }

    // Without stored keys the unlock key only serves to derive the lock key
    if let Some(iuk) = options.identity_unlock_key {
        if server_has_keys || !options.create_keys {
            builder = builder.identity_unlock_key(iuk);
        }
    }

    if options.create_keys {
        let ilk = match (options.identity_lock_key, options.identity_unlock_key) {
            (Some(ilk), _) => *ilk,
            (None, Some(iuk)) => identity_lock_key(protocol.ecc_provider(), iuk),
            (None, None) => {
                bail!("--create-keys needs --identity-lock-key or --identity-unlock-key")
            }
        };
        let random_lock_key = CipherTool::new().random_key();
        let keys = ServerUnlockKeys::derive(protocol.ecc_provider(), &random_lock_key, &ilk)
            .context("Failed to derive server unlock keys")?;
        tracing::info!("Publishing new server unlock keys");
        builder = builder.new_server_keys(&keys.server_unlock_key, &keys.verify_unlock_key);
    }

    builder
        .build_response_to(&server_body)
        .context("Failed to build response")
}

/// Read a client body, checking every signature unless `unchecked`.
pub fn inspect_client(
    protocol: &SqrlProtocol,
    body: &str,
    unchecked: bool,
    stored_keys: Option<(&[u8], &[u8])>,
) -> Result<ClientBody> {
    let mut parser = protocol
        .read_client_body()
        .from_body(body)
        .context("Failed to split client body")?;
    if let Some((suk, vuk)) = stored_keys {
        parser = parser.stored_keys(suk, vuk);
    }

    if unchecked {
        tracing::warn!("Signatures are not being checked");
        parser.parse_unchecked().context("Failed to parse client body")
    } else {
        parser.verified().context("Client body failed verification")
    }
}

/// Options for [`answer`].
#[derive(Default)]
pub struct AnswerOptions {
    pub flags: TransactionFlags,
    pub friendly_name: Option<String>,
    /// Echo the unlock keys the client published so it can unlock later.
    pub store_client_keys: bool,
}

/// Verify a client body and build the server's answer to it.
pub fn answer(protocol: &SqrlProtocol, body: &str, options: &AnswerOptions) -> Result<ServerBody> {
    let client_body = inspect_client(protocol, body, false, None)?;

    let mut builder = protocol
        .answer_client_all(&client_body, [options.flags])
        .context("Failed to start answer")?;
    if let Some(name) = &options.friendly_name {
        builder = builder.friendly_name(name.clone());
    }
    if options.store_client_keys {
        let client = client_body.client_parameter();
        match (client.server_unlock_key(), client.verify_unlock_key()) {
            (Some(suk), Some(vuk)) => builder = builder.stored_keys(suk, vuk),
            _ => tracing::warn!("Client body carries no unlock keys to store"),
        }
    }

    let parameter = builder.build().context("Failed to build answer")?;
    tracing::debug!(flags = %options.flags, "Answer built");
    Ok(parameter.into_server_body())
}

pub fn inspect_server(protocol: &SqrlProtocol, body: &str) -> Result<ServerBody> {
    protocol
        .read_server_body()
        .from_body(body)
        .and_then(|parser| parser.parsed())
        .context("Failed to read server body")
}

pub fn describe_client(body: &ClientBody) -> String {
    let client = body.client_parameter();
    let mut out = String::new();

    let _ = writeln!(out, "client:");
    let _ = writeln!(out, "  ver:  {}", client.version());
    let _ = writeln!(out, "  cmd:  {}", client.commands().join("~"));
    let _ = writeln!(out, "  idk:  {}", encode_base64(client.identity_key()));
    write_optional_key(&mut out, "pidk", client.previous_identity_key());
    write_optional_key(&mut out, "suk", client.server_unlock_key());
    write_optional_key(&mut out, "vuk", client.verify_unlock_key());

    let _ = writeln!(out, "server:");
    describe_server_parameter(&mut out, body.server_parameter());

    let _ = writeln!(out, "signatures:");
    let _ = writeln!(out, "  ids:  present");
    let present = |set: bool| if set { "present" } else { "absent" };
    let _ = writeln!(
        out,
        "  pids: {}",
        present(body.previous_identity_signature().is_some())
    );
    let _ = writeln!(
        out,
        "  urs:  {}",
        present(body.unlock_request_signature().is_some())
    );
    out
}

pub fn describe_server(body: &ServerBody) -> String {
    let mut out = String::from("server:\n");
    describe_server_parameter(&mut out, body.server_parameter());
    out
}

fn describe_server_parameter(out: &mut String, parameter: &ServerParameter) {
    match parameter.nut() {
        Ok(nut) => {
            let _ = writeln!(out, "  nut:  {nut}");
        }
        Err(e) => {
            let _ = writeln!(out, "  nut:  <{e}>");
        }
    }

    if parameter.is_uri() {
        let _ = writeln!(out, "  uri:  {}", String::from_utf8_lossy(&parameter.decoded_bytes()));
        return;
    }

    if let Some(version) = parameter.version() {
        let _ = writeln!(out, "  ver:  {version}");
    }
    if let Some(flags) = parameter.transaction_flags() {
        let _ = writeln!(out, "  tif:  {:#x} ({flags})", flags.bits());
    }
    if let Some(name) = parameter.friendly_name() {
        let _ = writeln!(out, "  sfn:  {name}");
    }
    if let Some(suk) = parameter.server_unlock_key() {
        let _ = writeln!(out, "  suk:  {}", encode_base64(suk));
    }
    if let Some(vuk) = parameter.verify_unlock_key() {
        let _ = writeln!(out, "  vuk:  {}", encode_base64(vuk));
    }
}

fn write_optional_key(out: &mut String, name: &str, key: Option<&[u8]>) {
    if let Some(key) = key {
        let _ = writeln!(out, "  {:<6}{}", format!("{name}:"), encode_base64(key));
    }
}
