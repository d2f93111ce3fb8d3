/// Per-message encryption at rest.
///
/// Every message gets its own random 256-bit key and a fresh random
/// 24-byte nonce, sealed with XChaCha20-Poly1305. The stored envelope is
/// text: `base64(nonce) ":" base64(ciphertext || tag)`.
///
/// Keys are stored next to the ciphertext by default, which isolates
/// messages from each other but not from someone holding the database.
/// A [`KeySealer`] with a master key wraps each per-message key before it
/// is persisted.
use std::fmt;

use chacha20poly1305::{
    aead::{
        rand_core::{OsRng, RngCore},
        Aead, KeyInit,
    },
    XChaCha20Poly1305, XNonce,
};
use data_encoding::BASE64;
use hkdf::Hkdf;
use sha2::Sha256;

use crate::error::CryptoError;

/// Key length in bytes (256-bit).
pub const KEY_LEN: usize = 32;

/// XChaCha20 nonce length (safe to generate randomly).
pub const NONCE_LEN: usize = 24;

/// Separator between the nonce and ciphertext parts of an envelope.
pub const ENVELOPE_SEPARATOR: char = ':';

/// Prefix marking a per-message key wrapped under the master key.
const SEALED_PREFIX: &str = "sealed:";

/// HKDF info string for domain separation of the key-encryption key.
const KEK_INFO: &[u8] = b"fadechat-message-key-seal-xchacha20poly1305-v1";

// ── MessageKey ───────────────────────────────────────────────────────────

/// Symmetric key for exactly one message.
#[derive(Clone, PartialEq, Eq)]
pub struct MessageKey([u8; KEY_LEN]);

impl MessageKey {
    /// Fresh key from the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.0)
    }

    pub fn from_base64(text: &str) -> Result<Self, CryptoError> {
        let bytes = BASE64
            .decode(text.as_bytes())
            .map_err(|e| CryptoError::InvalidKey {
                reason: format!("bad base64: {e}"),
            })?;
        Self::try_from(bytes.as_slice())
    }
}

impl TryFrom<&[u8]> for MessageKey {
    type Error = CryptoError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidKey {
            reason: format!("expected {KEY_LEN} bytes, got {}", bytes.len()),
        })?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MessageKey(..)")
    }
}

// ── Envelope encryption ──────────────────────────────────────────────────

/// Encrypt `plaintext` under `key` with a fresh random nonce.
pub fn encrypt(plaintext: &str, key: &MessageKey) -> Result<String, CryptoError> {
    seal_bytes(plaintext.as_bytes(), key.as_bytes())
}

/// Decrypt an envelope produced by [`encrypt`].
///
/// Structural problems (no separator, bad base64, wrong nonce length) are
/// `MalformedEnvelope`; a failed tag check or non-UTF-8 result is
/// `Decryption`.
pub fn decrypt(envelope: &str, key: &MessageKey) -> Result<String, CryptoError> {
    let plaintext = open_bytes(envelope, key.as_bytes())?;
    String::from_utf8(plaintext).map_err(|_| CryptoError::Decryption)
}

fn seal_bytes(plaintext: &[u8], key: &[u8; KEY_LEN]) -> Result<String, CryptoError> {
    let cipher = XChaCha20Poly1305::new(&(*key).into());

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from(nonce_bytes);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(format!(
        "{}{ENVELOPE_SEPARATOR}{}",
        BASE64.encode(&nonce_bytes),
        BASE64.encode(&ciphertext)
    ))
}

fn open_bytes(envelope: &str, key: &[u8; KEY_LEN]) -> Result<Vec<u8>, CryptoError> {
    let malformed = |reason: &str| CryptoError::MalformedEnvelope {
        reason: reason.to_string(),
    };

    let (nonce_b64, ct_b64) = envelope
        .split_once(ENVELOPE_SEPARATOR)
        .ok_or_else(|| malformed("missing separator"))?;
    if ct_b64.contains(ENVELOPE_SEPARATOR) {
        return Err(malformed("too many separators"));
    }

    let nonce_bytes = BASE64
        .decode(nonce_b64.as_bytes())
        .map_err(|_| malformed("nonce is not valid base64"))?;
    let nonce_bytes: [u8; NONCE_LEN] = nonce_bytes
        .as_slice()
        .try_into()
        .map_err(|_| malformed("wrong nonce length"))?;
    let ciphertext = BASE64
        .decode(ct_b64.as_bytes())
        .map_err(|_| malformed("ciphertext is not valid base64"))?;

    let cipher = XChaCha20Poly1305::new(&(*key).into());
    cipher
        .decrypt(&XNonce::from(nonce_bytes), ciphertext.as_ref())
        .map_err(|_| CryptoError::Decryption)
}

// ── Key sealing ──────────────────────────────────────────────────────────

/// Master secret used to wrap per-message keys.
#[derive(Clone)]
pub struct MasterKey([u8; KEY_LEN]);

impl MasterKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_base64(text: &str) -> Result<Self, CryptoError> {
        MessageKey::from_base64(text.trim()).map(|k| Self(k.0))
    }

    /// Derive the key-encryption key via HKDF-SHA256.
    fn derive_kek(&self) -> [u8; KEY_LEN] {
        let hkdf = Hkdf::<Sha256>::new(None, &self.0);
        let mut kek = [0u8; KEY_LEN];
        // 32 bytes is far below HKDF-SHA256's 8160-byte output limit.
        let _ = hkdf.expand(KEK_INFO, &mut kek);
        kek
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// How per-message keys are written to and read from the store.
#[derive(Clone, Default)]
pub enum KeySealer {
    /// Store the key as plain base64 next to its ciphertext.
    #[default]
    Plain,
    /// Wrap each key under a KEK derived from the master key.
    Sealed { kek: [u8; KEY_LEN] },
}

impl KeySealer {
    pub fn with_master_key(master: &MasterKey) -> Self {
        KeySealer::Sealed {
            kek: master.derive_kek(),
        }
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self, KeySealer::Sealed { .. })
    }

    /// Stored form of `key`.
    pub fn seal(&self, key: &MessageKey) -> Result<String, CryptoError> {
        match self {
            KeySealer::Plain => Ok(key.to_base64()),
            KeySealer::Sealed { kek } => {
                Ok(format!("{SEALED_PREFIX}{}", seal_bytes(key.as_bytes(), kek)?))
            }
        }
    }

    /// Recover a key from its stored form.
    ///
    /// A sealing sealer still reads plain keys written before the master
    /// key was configured.
    pub fn open(&self, stored: &str) -> Result<MessageKey, CryptoError> {
        match (self, stored.strip_prefix(SEALED_PREFIX)) {
            (_, None) => MessageKey::from_base64(stored),
            (KeySealer::Plain, Some(_)) => Err(CryptoError::Sealed),
            (KeySealer::Sealed { kek }, Some(envelope)) => {
                let bytes = open_bytes(envelope, kek)?;
                MessageKey::try_from(bytes.as_slice())
            }
        }
    }
}

impl fmt::Debug for KeySealer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySealer::Plain => f.write_str("KeySealer::Plain"),
            KeySealer::Sealed { .. } => f.write_str("KeySealer::Sealed(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = MessageKey::generate();
        let envelope = encrypt("Hello, FadeChat!", &key).unwrap();
        assert_eq!(decrypt(&envelope, &key).unwrap(), "Hello, FadeChat!");
    }

    #[test]
    fn encrypt_decrypt_empty_and_unicode() {
        let key = MessageKey::generate();
        for text in ["", "héllo wörld ✨", "多言語"] {
            let envelope = encrypt(text, &key).unwrap();
            assert_eq!(decrypt(&envelope, &key).unwrap(), text);
        }
    }

    #[test]
    fn same_plaintext_same_key_differs() {
        let key = MessageKey::generate();
        let e1 = encrypt("same message", &key).unwrap();
        let e2 = encrypt("same message", &key).unwrap();
        assert_ne!(e1, e2);
        assert_eq!(decrypt(&e1, &key).unwrap(), "same message");
        assert_eq!(decrypt(&e2, &key).unwrap(), "same message");
    }

    #[test]
    fn envelope_has_one_separator_and_24_byte_nonce() {
        let key = MessageKey::generate();
        let envelope = encrypt("x", &key).unwrap();
        let (nonce, _) = envelope.split_once(':').unwrap();
        assert_eq!(BASE64.decode(nonce.as_bytes()).unwrap().len(), NONCE_LEN);
        assert_eq!(envelope.matches(':').count(), 1);
    }

    #[test]
    fn wrong_key_fails() {
        let envelope = encrypt("secret", &MessageKey::generate()).unwrap();
        let result = decrypt(&envelope, &MessageKey::generate());
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = MessageKey::generate();
        let envelope = encrypt("secret", &key).unwrap();
        let (nonce, ct) = envelope.split_once(':').unwrap();
        let mut bytes = BASE64.decode(ct.as_bytes()).unwrap();
        bytes[0] ^= 0xFF;
        let tampered = format!("{nonce}:{}", BASE64.encode(&bytes));
        assert!(matches!(decrypt(&tampered, &key), Err(CryptoError::Decryption)));
    }

    #[test]
    fn missing_separator_is_malformed() {
        let key = MessageKey::generate();
        let result = decrypt("bm9zZXBhcmF0b3I=", &key);
        assert!(matches!(result, Err(CryptoError::MalformedEnvelope { .. })));
    }

    #[test]
    fn extra_separator_is_malformed() {
        let key = MessageKey::generate();
        let envelope = format!("{}:extra", encrypt("x", &key).unwrap());
        assert!(matches!(
            decrypt(&envelope, &key),
            Err(CryptoError::MalformedEnvelope { .. })
        ));
    }

    #[test]
    fn short_nonce_is_malformed() {
        let key = MessageKey::generate();
        let envelope = format!("{}:{}", BASE64.encode(&[0u8; 16]), BASE64.encode(&[0u8; 32]));
        assert!(matches!(
            decrypt(&envelope, &key),
            Err(CryptoError::MalformedEnvelope { .. })
        ));
    }

    #[test]
    fn bad_base64_is_malformed() {
        let key = MessageKey::generate();
        assert!(matches!(
            decrypt("!!!:???", &key),
            Err(CryptoError::MalformedEnvelope { .. })
        ));
    }

    #[test]
    fn key_base64_roundtrip_and_length_check() {
        let key = MessageKey::generate();
        let parsed = MessageKey::from_base64(&key.to_base64()).unwrap();
        assert_eq!(parsed, key);

        let short = BASE64.encode(&[1u8; 16]);
        assert!(matches!(
            MessageKey::from_base64(&short),
            Err(CryptoError::InvalidKey { .. })
        ));
    }

    #[test]
    fn debug_does_not_leak_key_material() {
        let key = MessageKey::from_bytes([0xAB; KEY_LEN]);
        assert_eq!(format!("{key:?}"), "MessageKey(..)");
    }

    #[test]
    fn plain_sealer_stores_base64() {
        let key = MessageKey::generate();
        let stored = KeySealer::Plain.seal(&key).unwrap();
        assert_eq!(stored, key.to_base64());
        assert_eq!(KeySealer::Plain.open(&stored).unwrap(), key);
    }

    #[test]
    fn sealed_sealer_roundtrip() {
        let sealer = KeySealer::with_master_key(&MasterKey::from_bytes([7; KEY_LEN]));
        let key = MessageKey::generate();
        let stored = sealer.seal(&key).unwrap();
        assert!(stored.starts_with("sealed:"));
        assert!(!stored.contains(&key.to_base64()));
        assert_eq!(sealer.open(&stored).unwrap(), key);
    }

    #[test]
    fn sealed_key_needs_master_key() {
        let sealer = KeySealer::with_master_key(&MasterKey::from_bytes([7; KEY_LEN]));
        let stored = sealer.seal(&MessageKey::generate()).unwrap();
        assert!(matches!(KeySealer::Plain.open(&stored), Err(CryptoError::Sealed)));
    }

    #[test]
    fn different_master_key_cannot_open() {
        let a = KeySealer::with_master_key(&MasterKey::from_bytes([1; KEY_LEN]));
        let b = KeySealer::with_master_key(&MasterKey::from_bytes([2; KEY_LEN]));
        let stored = a.seal(&MessageKey::generate()).unwrap();
        assert!(matches!(b.open(&stored), Err(CryptoError::Decryption)));
    }

    #[test]
    fn sealed_sealer_reads_legacy_plain_keys() {
        let sealer = KeySealer::with_master_key(&MasterKey::from_bytes([3; KEY_LEN]));
        let key = MessageKey::generate();
        assert_eq!(sealer.open(&key.to_base64()).unwrap(), key);
    }
}
