//! # SQRL Protocol Library
//!
//! Client and server message handling for SQRL, a login scheme in which a
//! user proves a per-site identity with an Ed25519 signature instead of a
//! shared secret.
//!
//! ## Overview
//!
//! - **Parameter blocks**: ordered `key=value` lines framed as URL-safe base64
//! - **Client bodies**: per-site key derivation and multi-signature assembly
//! - **Server bodies**: nonce, transaction flags and stored unlock keys
//! - **Providers**: Ed25519/X25519 curve operations and HMAC-SHA-256
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              SqrlProtocol               │  entry points
//! ├─────────────────────────────────────────┤
//! │     ClientBody        │   ServerBody    │  signatures, flattening
//! ├─────────────────────────────────────────┤
//! │  ClientParameter      │ ServerParameter │  typed fields
//! ├─────────────────────────────────────────┤
//! │            ParameterBlock               │  key=value\r\n, base64
//! └─────────────────────────────────────────┘
//!      EccProvider / MacProvider (injected)
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use sqrl_protocol::{Ed25519Provider, SqrlProtocol, TransactionFlags};
//!
//! let protocol = SqrlProtocol::builder()
//!     .ecc_provider(Ed25519Provider::new())
//!     .build()
//!     .unwrap();
//!
//! // Client: sign the URI that was scanned
//! let master_key = [7u8; 32];
//! let request = protocol
//!     .authenticate(&master_key, "example.com")
//!     .build_request("example.com/sqrl?nut=abc123")
//!     .unwrap();
//!
//! // Server: verify and answer with the same nonce
//! let received = protocol
//!     .read_client_body()
//!     .from_body(request.encoded())
//!     .unwrap()
//!     .verified()
//!     .unwrap();
//! let answer = protocol
//!     .answer_client(&received, TransactionFlags::ACCOUNT_CREATION_ALLOWED)
//!     .unwrap()
//!     .build()
//!     .unwrap()
//!     .into_server_body();
//!
//! assert_eq!(answer.server_parameter().nut().unwrap(), "abc123");
//! ```
//!
//! ## Modules
//!
//! - [`params`]: Generic parameter block
//! - [`client_param`] / [`server_param`]: Typed parameters and flags
//! - [`client_body`] / [`server_body`]: Full messages
//! - [`protocol`]: Entry points
//! - [`crypto`]: Curve provider, key pairs, unlock key derivation
//! - [`cipher`]: HMAC, hashing and AES-GCM helper
//! - [`encoding`]: Base64 and field splitting
//! - [`error`]: Error types

pub mod cipher;
pub mod client_body;
pub mod client_param;
pub mod crypto;
pub mod encoding;
pub mod error;
pub mod params;
pub mod protocol;
pub mod server_body;
pub mod server_param;

pub use cipher::{CipherTool, MacProvider, SealedMessage};
pub use client_body::{ClientBody, ClientBodyBuilder, ClientBodyParser};
pub use client_param::{
    ClientParameter, ClientParameterBuilder, CMD_CREATE, CMD_LOGIN, CMD_SETKEY, CMD_SETLOCK,
};
pub use crypto::{
    identity_lock_key, EccProvider, Ed25519Provider, KeyPair, ServerUnlockKeys, Signature,
    KEY_LENGTH, SIGNATURE_LENGTH,
};
pub use error::{ProtocolError, Result};
pub use params::{ParameterBlock, PROTOCOL_VERSION};
pub use protocol::{SqrlProtocol, SqrlProtocolBuilder};
pub use server_body::{ServerBody, ServerBodyParser};
pub use server_param::{ServerParameter, ServerParameterBuilder, TransactionFlags};
