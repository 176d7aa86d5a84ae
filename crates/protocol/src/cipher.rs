//! Symmetric helpers: HMAC, hashing, randomness and AES-GCM.
//!
//! The protocol itself only needs [`MacProvider::hmac`] to derive per-site
//! keys. The remaining operations are what a SQRL client needs around the
//! protocol (protecting its master key, generating rescue codes).

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{ProtocolError, Result};

/// SHA-256 / HMAC-SHA-256 output length in bytes.
pub const HASH_LENGTH: usize = 32;

/// AES-GCM nonce length in bytes.
pub const GCM_NONCE_LENGTH: usize = 12;

/// AES-GCM authentication tag length in bytes.
pub const GCM_TAG_LENGTH: usize = 16;

/// AES-256 key length in bytes.
pub const AES_KEY_LENGTH: usize = 32;

/// Number of decimal digits in a rescue code.
pub const RESCUE_CODE_LENGTH: usize = 24;

/// Number of random bytes hashed by [`CipherTool::random_hash`].
const RANDOM_INPUT_LENGTH: usize = 128;

/// Keyed hash used to derive the per-site private seed.
pub trait MacProvider: Send + Sync {
    /// HMAC of `data` keyed with `key`.
    fn hmac(&self, data: &[u8], key: &[u8]) -> Result<[u8; HASH_LENGTH]>;
}

/// Output of [`CipherTool::aes_gcm_encrypt`]: ciphertext and tag kept apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedMessage {
    /// Encrypted bytes, same length as the plaintext.
    pub ciphertext: Vec<u8>,
    /// GCM authentication tag.
    pub tag: [u8; GCM_TAG_LENGTH],
}

/// SHA-256 based helper with HMAC, hashing, randomness and AES-256-GCM.
#[derive(Debug, Clone, Copy, Default)]
pub struct CipherTool;

impl CipherTool {
    /// Create a new helper.
    pub fn new() -> Self {
        Self
    }

    /// SHA-256 of `data`.
    pub fn hash(&self, data: &[u8]) -> [u8; HASH_LENGTH] {
        let digest = Sha256::digest(data);
        let mut out = [0u8; HASH_LENGTH];
        out.copy_from_slice(&digest);
        out
    }

    /// SHA-256 applied `iterations` times (at least once).
    pub fn hash_iterated(&self, data: &[u8], iterations: u32) -> [u8; HASH_LENGTH] {
        let mut out = self.hash(data);
        for _ in 1..iterations.max(1) {
            out = self.hash(&out);
        }
        out
    }

    /// Lowercase hex of [`CipherTool::hash_iterated`].
    pub fn hash_hex(&self, data: &[u8], iterations: u32) -> String {
        hex::encode(self.hash_iterated(data, iterations))
    }

    /// XOR of the hash chain `H(d), H(H(d)), ...` over `rounds` rounds.
    pub fn hash_chained(&self, data: &[u8], rounds: u32) -> [u8; HASH_LENGTH] {
        let mut hash = self.hash(data);
        let mut xor = hash;
        for _ in 1..rounds.max(1) {
            hash = self.hash(&hash);
            for (acc, byte) in xor.iter_mut().zip(hash.iter()) {
                *acc ^= byte;
            }
        }
        xor
    }

    /// Hash of fresh OS randomness, truncated to `length_bits`.
    ///
    /// `length_bits` must be a non-zero multiple of 8 no larger than 256.
    pub fn random_hash(&self, length_bits: usize) -> Result<Vec<u8>> {
        if length_bits == 0 || length_bits % 8 != 0 || length_bits > HASH_LENGTH * 8 {
            return Err(ProtocolError::invalid_argument(format!(
                "random hash length must be a multiple of 8 between 8 and 256 bits, got {length_bits}"
            )));
        }
        let hash = self.random_key();
        Ok(hash[..length_bits / 8].to_vec())
    }

    /// A fresh random 32-byte key.
    pub fn random_key(&self) -> Zeroizing<[u8; HASH_LENGTH]> {
        let mut input = Zeroizing::new([0u8; RANDOM_INPUT_LENGTH]);
        OsRng.fill_bytes(&mut input[..]);
        Zeroizing::new(self.hash(&input[..]))
    }

    /// Random decimal rescue code.
    pub fn rescue_code(&self) -> String {
        (0..RESCUE_CODE_LENGTH)
            .map(|_| char::from(b'0' + OsRng.gen_range(0..10u8)))
            .collect()
    }

    /// AES-256-GCM with an all-zero nonce and no associated data.
    ///
    /// Only safe when `key` is never reused.
    pub fn aes_gcm_encrypt(&self, plain_text: &[u8], key: &[u8; AES_KEY_LENGTH]) -> Result<SealedMessage> {
        self.aes_gcm_encrypt_with(plain_text, key, &[0u8; GCM_NONCE_LENGTH], &[])
    }

    /// AES-256-GCM encryption with an explicit nonce and associated data.
    pub fn aes_gcm_encrypt_with(
        &self,
        plain_text: &[u8],
        key: &[u8; AES_KEY_LENGTH],
        iv: &[u8; GCM_NONCE_LENGTH],
        aad: &[u8],
    ) -> Result<SealedMessage> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| ProtocolError::Encryption(e.to_string()))?;
        let mut ciphertext = cipher
            .encrypt(Nonce::from_slice(iv), Payload { msg: plain_text, aad })
            .map_err(|e| ProtocolError::Encryption(e.to_string()))?;

        // aes-gcm appends the tag to the ciphertext
        let tag_bytes = ciphertext.split_off(ciphertext.len() - GCM_TAG_LENGTH);
        let mut tag = [0u8; GCM_TAG_LENGTH];
        tag.copy_from_slice(&tag_bytes);

        Ok(SealedMessage { ciphertext, tag })
    }

    /// Inverse of [`CipherTool::aes_gcm_encrypt`].
    pub fn aes_gcm_decrypt(&self, sealed: &SealedMessage, key: &[u8; AES_KEY_LENGTH]) -> Result<Vec<u8>> {
        self.aes_gcm_decrypt_with(sealed, key, &[0u8; GCM_NONCE_LENGTH], &[])
    }

    /// Inverse of [`CipherTool::aes_gcm_encrypt_with`].
    pub fn aes_gcm_decrypt_with(
        &self,
        sealed: &SealedMessage,
        key: &[u8; AES_KEY_LENGTH],
        iv: &[u8; GCM_NONCE_LENGTH],
        aad: &[u8],
    ) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| ProtocolError::Decryption(e.to_string()))?;

        let mut combined = Vec::with_capacity(sealed.ciphertext.len() + GCM_TAG_LENGTH);
        combined.extend_from_slice(&sealed.ciphertext);
        combined.extend_from_slice(&sealed.tag);

        cipher
            .decrypt(Nonce::from_slice(iv), Payload { msg: &combined, aad })
            .map_err(|_| ProtocolError::Decryption("authentication tag mismatch".to_string()))
    }
}

impl MacProvider for CipherTool {
    fn hmac(&self, data: &[u8], key: &[u8]) -> Result<[u8; HASH_LENGTH]> {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key)
            .map_err(|e| ProtocolError::invalid_argument(e.to_string()))?;
        mac.update(data);
        let digest = mac.finalize().into_bytes();

        let mut out = [0u8; HASH_LENGTH];
        out.copy_from_slice(&digest);
        Ok(out)
    }
}
