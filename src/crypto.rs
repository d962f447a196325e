//! Passphrase-based sealing of sensitive text fields.
//!
//! Evidence notes and other sensitive values are stored "sealed": encrypted
//! with ChaCha20-Poly1305 under a key derived from an operator passphrase via
//! PBKDF2-HMAC-SHA256.  The wire form is four hex segments joined by colons:
//!
//! ```text
//! salt:nonce:tag:ciphertext
//! ```
//!
//! Every call to [`seal`] draws a fresh random salt and nonce, so sealing the
//! same plaintext twice yields different output.  [`open`] rejects anything
//! with the wrong segment count, non-hex segments, wrong segment lengths, or
//! a failed authentication tag.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

pub const KEY_SIZE: usize = 32;
pub const SALT_SIZE: usize = 16;
pub const NONCE_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;

/// PBKDF2 iteration count.  Matches the cost used for other password-derived
/// keys in the deployment; changing it invalidates previously sealed values.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

#[derive(Debug)]
pub enum SealError {
    /// Wrong segment count or a segment with an unexpected length.
    Malformed(&'static str),
    Hex(hex::FromHexError),
    /// Authentication failed: wrong passphrase or tampered ciphertext.
    Aead(chacha20poly1305::aead::Error),
    Utf8(std::string::FromUtf8Error),
}

impl std::fmt::Display for SealError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SealError::Malformed(msg) => write!(f, "malformed sealed value: {msg}"),
            SealError::Hex(e) => write!(f, "hex decode error: {e}"),
            SealError::Aead(_) => write!(f, "authentication failed"),
            SealError::Utf8(e) => write!(f, "decrypted value is not utf-8: {e}"),
        }
    }
}

impl std::error::Error for SealError {}

impl From<hex::FromHexError> for SealError {
    fn from(e: hex::FromHexError) -> Self {
        SealError::Hex(e)
    }
}

impl From<chacha20poly1305::aead::Error> for SealError {
    fn from(e: chacha20poly1305::aead::Error) -> Self {
        SealError::Aead(e)
    }
}

impl From<std::string::FromUtf8Error> for SealError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        SealError::Utf8(e)
    }
}

/// PBKDF2-HMAC-SHA256 (RFC 8018 §5.2).
fn pbkdf2_sha256(passphrase: &[u8], salt: &[u8], iterations: u32, out: &mut [u8]) {
    let hmac = |key: &[u8], data: &[u8], extra: &[u8]| -> [u8; 32] {
        // HMAC accepts keys of any length, so construction cannot fail.
        let mut mac =
            <Hmac<Sha256> as Mac>::new_from_slice(key).expect("hmac key of any length");
        mac.update(data);
        if !extra.is_empty() {
            mac.update(extra);
        }
        mac.finalize().into_bytes().into()
    };

    for (i, chunk) in out.chunks_mut(32).enumerate() {
        let block_index = (i as u32 + 1).to_be_bytes();
        let mut u = hmac(passphrase, salt, &block_index);
        let mut t = u;
        for _ in 1..iterations {
            u = hmac(passphrase, &u, &[]);
            for (t_byte, u_byte) in t.iter_mut().zip(u.iter()) {
                *t_byte ^= u_byte;
            }
        }
        chunk.copy_from_slice(&t[..chunk.len()]);
    }
}

fn derive_key(passphrase: &str, salt: &[u8]) -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    pbkdf2_sha256(passphrase.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
    key
}

/// Seal a plaintext string under the given passphrase.
///
/// Returns the `salt:nonce:tag:ciphertext` hex serialization.
pub fn seal(plaintext: &str, passphrase: &str) -> Result<String, SealError> {
    let mut salt = [0u8; SALT_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let key = derive_key(passphrase, &salt);
    let aead = ChaCha20Poly1305::new(Key::from_slice(&key));
    let nonce = Nonce::from_slice(&nonce_bytes);

    // The AEAD appends the 16-byte Poly1305 tag to the ciphertext; split it
    // out so the tag travels as its own segment.
    let mut sealed = aead.encrypt(nonce, plaintext.as_bytes())?;
    let tag = sealed.split_off(sealed.len() - TAG_SIZE);

    Ok(format!(
        "{}:{}:{}:{}",
        hex::encode(salt),
        hex::encode(nonce_bytes),
        hex::encode(tag),
        hex::encode(sealed),
    ))
}

/// Open a sealed value produced by [`seal`].
///
/// Fails on wrong segment count, malformed hex, wrong segment lengths, a
/// wrong passphrase, or any tampering with salt, nonce, tag, or ciphertext.
pub fn open(sealed: &str, passphrase: &str) -> Result<String, SealError> {
    let segments: Vec<&str> = sealed.split(':').collect();
    if segments.len() != 4 {
        return Err(SealError::Malformed("expected 4 colon-separated segments"));
    }

    let salt = hex::decode(segments[0])?;
    let nonce_bytes = hex::decode(segments[1])?;
    let tag = hex::decode(segments[2])?;
    let mut ciphertext = hex::decode(segments[3])?;

    if salt.len() != SALT_SIZE {
        return Err(SealError::Malformed("salt must be 16 bytes"));
    }
    if nonce_bytes.len() != NONCE_SIZE {
        return Err(SealError::Malformed("nonce must be 12 bytes"));
    }
    if tag.len() != TAG_SIZE {
        return Err(SealError::Malformed("tag must be 16 bytes"));
    }

    let key = derive_key(passphrase, &salt);
    let aead = ChaCha20Poly1305::new(Key::from_slice(&key));
    let nonce = Nonce::from_slice(&nonce_bytes);

    ciphertext.extend_from_slice(&tag);
    let plaintext = aead.decrypt(nonce, ciphertext.as_slice())?;
    Ok(String::from_utf8(plaintext)?)
}
