//! Elliptic-curve provider used by the protocol.
//!
//! Every SQRL key is a 32-byte seed. From one seed the provider derives two
//! public keys: an Ed25519 verifying key for signatures and an X25519 public
//! key for Diffie-Hellman. The two are different byte strings and must never
//! be interchanged.
//!
//! The protocol only talks to the [`EccProvider`] trait. [`Ed25519Provider`]
//! is the implementation shipped with this crate; callers pick a provider
//! explicitly when constructing [`crate::SqrlProtocol`].

use ed25519_dalek::{
    Signature as Ed25519Signature, Signer, SigningKey, Verifier, VerifyingKey, KEYPAIR_LENGTH,
    SIGNATURE_LENGTH as ED25519_SIGNATURE_LENGTH,
};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::encoding::{decode_base64, encode_base64};
use crate::error::{ProtocolError, Result};

/// Length of every private seed and public key in bytes.
pub const KEY_LENGTH: usize = 32;

/// Length of a signature in bytes.
pub const SIGNATURE_LENGTH: usize = ED25519_SIGNATURE_LENGTH;

/// A 64-byte signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature(pub [u8; SIGNATURE_LENGTH]);

impl Signature {
    /// Creates a new Signature from raw bytes.
    pub fn from_bytes(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Creates a Signature from a slice, failing unless it is exactly 64 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes = <[u8; SIGNATURE_LENGTH]>::try_from(bytes).map_err(|_| {
            ProtocolError::protocol(format!(
                "illegal signature length: expected {}, got {}",
                SIGNATURE_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Decodes a base64 wire value.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        Self::from_slice(&decode_base64(encoded)?)
    }

    /// Returns the raw bytes of this signature.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }

    /// Wire form of this signature.
    pub fn to_base64(&self) -> String {
        encode_base64(self.0)
    }
}

/// A private seed together with both public keys derived from it.
///
/// The private seed is wiped when the pair is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyPair {
    private_key: [u8; KEY_LENGTH],
    public_signature_key: [u8; KEY_LENGTH],
    public_diffie_hellman_key: [u8; KEY_LENGTH],
}

impl KeyPair {
    /// Assemble a key pair from its parts.
    pub fn new(
        private_key: [u8; KEY_LENGTH],
        public_signature_key: [u8; KEY_LENGTH],
        public_diffie_hellman_key: [u8; KEY_LENGTH],
    ) -> Self {
        Self {
            private_key,
            public_signature_key,
            public_diffie_hellman_key,
        }
    }

    /// The private seed.
    ///
    /// **Security Warning**: keep this confidential and short-lived.
    pub fn private_key(&self) -> &[u8; KEY_LENGTH] {
        &self.private_key
    }

    /// Public key for signature verification.
    pub fn public_signature_key(&self) -> &[u8; KEY_LENGTH] {
        &self.public_signature_key
    }

    /// Public key for Diffie-Hellman.
    pub fn public_diffie_hellman_key(&self) -> &[u8; KEY_LENGTH] {
        &self.public_diffie_hellman_key
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_signature_key", &encode_base64(self.public_signature_key))
            .field(
                "public_diffie_hellman_key",
                &encode_base64(self.public_diffie_hellman_key),
            )
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Curve operations the protocol depends on.
///
/// Implementations must be deterministic: the same seed always yields the
/// same key pair, because identities are re-derived from the master key on
/// every request. They must also be safe to share between threads.
pub trait EccProvider: Send + Sync {
    /// Derive both public keys for a private seed.
    fn key_pair(&self, private_key: &[u8; KEY_LENGTH]) -> KeyPair;

    /// Sign `message`. Some backends need the public key as well.
    fn sign(
        &self,
        message: &[u8],
        private_key: &[u8; KEY_LENGTH],
        public_key: &[u8; KEY_LENGTH],
    ) -> Result<Signature>;

    /// Check `signature` over `message` against a signature public key.
    ///
    /// Malformed keys or signatures simply fail verification.
    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> bool;

    /// Shared secret between a private seed and a peer's Diffie-Hellman
    /// public key. The result is itself usable as a seed.
    fn diffie_hellman(
        &self,
        private_key: &[u8; KEY_LENGTH],
        public_key: &[u8],
    ) -> Result<[u8; KEY_LENGTH]>;

    /// Sign `message` with a derived key pair.
    fn sign_with(&self, message: &[u8], key_pair: &KeyPair) -> Result<Signature> {
        self.sign(
            message,
            key_pair.private_key(),
            key_pair.public_signature_key(),
        )
    }
}

/// Ed25519 signatures and X25519 Diffie-Hellman over the same 32-byte seed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Provider;

impl Ed25519Provider {
    /// Create the provider.
    pub fn new() -> Self {
        Self
    }
}

impl EccProvider for Ed25519Provider {
    fn key_pair(&self, private_key: &[u8; KEY_LENGTH]) -> KeyPair {
        let signing_key = SigningKey::from_bytes(private_key);
        let dh_secret = StaticSecret::from(*private_key);

        KeyPair::new(
            *private_key,
            signing_key.verifying_key().to_bytes(),
            X25519PublicKey::from(&dh_secret).to_bytes(),
        )
    }

    fn sign(
        &self,
        message: &[u8],
        private_key: &[u8; KEY_LENGTH],
        public_key: &[u8; KEY_LENGTH],
    ) -> Result<Signature> {
        let mut keypair_bytes = Zeroizing::new([0u8; KEYPAIR_LENGTH]);
        keypair_bytes[..KEY_LENGTH].copy_from_slice(private_key);
        keypair_bytes[KEY_LENGTH..].copy_from_slice(public_key);

        // Rejects a public key that does not belong to the private seed.
        let signing_key = SigningKey::from_keypair_bytes(&keypair_bytes)?;
        Ok(Signature(signing_key.sign(message).to_bytes()))
    }

    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
        let Ok(public_key) = <[u8; KEY_LENGTH]>::try_from(public_key) else {
            return false;
        };
        let Ok(verifying_key) = VerifyingKey::from_bytes(&public_key) else {
            return false;
        };
        let Ok(signature) = Ed25519Signature::from_slice(signature) else {
            return false;
        };
        verifying_key.verify(message, &signature).is_ok()
    }

    fn diffie_hellman(
        &self,
        private_key: &[u8; KEY_LENGTH],
        public_key: &[u8],
    ) -> Result<[u8; KEY_LENGTH]> {
        let public_key = <[u8; KEY_LENGTH]>::try_from(public_key).map_err(|_| {
            ProtocolError::InvalidPublicKey(format!(
                "expected {} bytes, got {}",
                KEY_LENGTH,
                public_key.len()
            ))
        })?;

        let secret = StaticSecret::from(*private_key);
        let shared = secret.diffie_hellman(&X25519PublicKey::from(public_key));
        if !shared.was_contributory() {
            return Err(ProtocolError::InvalidPublicKey(
                "low-order Diffie-Hellman public key".to_string(),
            ));
        }
        Ok(shared.to_bytes())
    }
}

/// Returns the identity lock key: the Diffie-Hellman public key of an
/// identity unlock key. Servers never see the unlock key itself.
pub fn identity_lock_key(
    ecc: &dyn EccProvider,
    identity_unlock_key: &[u8; KEY_LENGTH],
) -> [u8; KEY_LENGTH] {
    *ecc.key_pair(identity_unlock_key).public_diffie_hellman_key()
}

/// The `suk`/`vuk` pair a client publishes when it creates an account or
/// replaces its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerUnlockKeys {
    /// Server unlock key, the Diffie-Hellman public key of the random lock key.
    pub server_unlock_key: [u8; KEY_LENGTH],
    /// Verify unlock key, the signature public key of the unlock request
    /// signing key.
    pub verify_unlock_key: [u8; KEY_LENGTH],
}

impl ServerUnlockKeys {
    /// Derive the pair from a one-time random lock key and the identity
    /// lock key.
    ///
    /// Whoever later holds the identity unlock key can recompute the
    /// unlock request signing key as `DH(identity_unlock_key, suk)`; its
    /// signature public key equals `vuk`.
    pub fn derive(
        ecc: &dyn EccProvider,
        random_lock_key: &[u8; KEY_LENGTH],
        identity_lock_key: &[u8],
    ) -> Result<Self> {
        let lock_pair = ecc.key_pair(random_lock_key);
        let signing_seed = Zeroizing::new(
            ecc.diffie_hellman(lock_pair.private_key(), identity_lock_key)?,
        );
        let unlock_pair = ecc.key_pair(&signing_seed);

        Ok(Self {
            server_unlock_key: *lock_pair.public_diffie_hellman_key(),
            verify_unlock_key: *unlock_pair.public_signature_key(),
        })
    }
}
