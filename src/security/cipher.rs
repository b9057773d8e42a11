//! Field-level encryption for sensitive values at rest.
//!
//! AES-256-GCM with a fresh random 96-bit nonce per call. The stored form is
//! `hex(nonce || ciphertext || tag)`.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use std::fmt;
use zeroize::Zeroizing;

use crate::config::FieldKey;
use crate::error::CipherError;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;

#[derive(Clone)]
pub struct FieldCipher {
    key: FieldKey,
}

impl FieldCipher {
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        let key = FieldKey::from_slice(key).map_err(|_| CipherError::InvalidKeyLength(key.len()))?;
        Ok(Self { key })
    }

    pub fn from_key(key: &FieldKey) -> Self {
        Self { key: key.clone() }
    }

    fn aead(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_bytes()))
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        self.encrypt_bytes(plaintext.as_bytes())
    }

    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<String, CipherError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .aead()
            .encrypt(&nonce, plaintext)
            .map_err(|_| CipherError::Encryption)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + sealed.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&sealed);
        Ok(hex::encode(blob))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, CipherError> {
        let plaintext = self.decrypt_bytes(encoded)?;
        String::from_utf8(plaintext.to_vec()).map_err(|_| CipherError::DecodeFailure)
    }

    /// Returns nothing unless the tag verifies.
    pub fn decrypt_bytes(&self, encoded: &str) -> Result<Zeroizing<Vec<u8>>, CipherError> {
        let blob = hex::decode(encoded.trim()).map_err(|_| CipherError::DecodeFailure)?;
        if blob.len() < NONCE_LEN {
            return Err(CipherError::TruncatedInput);
        }
        let (nonce, sealed) = blob.split_at(NONCE_LEN);
        self.aead()
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map(Zeroizing::new)
            .map_err(|_| CipherError::AuthenticationFailure)
    }
}

impl fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldCipher").field("algorithm", &"AES-256-GCM").finish()
    }
}

/// One-shot encryption; the key length is checked before any crypto runs.
pub fn encrypt(plaintext: &str, key: &[u8]) -> Result<String, CipherError> {
    FieldCipher::new(key)?.encrypt(plaintext)
}

pub fn decrypt(encoded: &str, key: &[u8]) -> Result<String, CipherError> {
    FieldCipher::new(key)?.decrypt(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8; 32] = b"an example very very secret key.";

    #[test]
    fn test_round_trip() {
        let cipher = FieldCipher::new(KEY).unwrap();
        for plaintext in ["", "A+", "Metformin 500mg twice daily", "मधुमेह", "\u{0}\u{1}"] {
            let encoded = cipher.encrypt(plaintext).unwrap();
            assert_eq!(cipher.decrypt(&encoded).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_output_layout() {
        let encoded = encrypt("hello", KEY).unwrap();
        assert!(encoded.bytes().all(|b| b.is_ascii_hexdigit()));
        // nonce + plaintext + 16-byte tag, hex encoded
        assert_eq!(encoded.len(), (NONCE_LEN + 5 + 16) * 2);
    }

    #[test]
    fn test_same_input_yields_different_ciphertexts() {
        let a = encrypt("blood type O-", KEY).unwrap();
        let b = encrypt("blood type O-", KEY).unwrap();
        assert_ne!(a, b);
        assert_ne!(a[..NONCE_LEN * 2], b[..NONCE_LEN * 2]);
    }

    #[test]
    fn test_bit_flip_fails_closed() {
        let encoded = encrypt("diagnosis: hypertension", KEY).unwrap();
        let mut blob = hex::decode(&encoded).unwrap();
        for idx in [0, NONCE_LEN, blob.len() - 1] {
            blob[idx] ^= 0x01;
            assert_eq!(
                decrypt(&hex::encode(&blob), KEY),
                Err(CipherError::AuthenticationFailure)
            );
            blob[idx] ^= 0x01;
        }
        assert_eq!(decrypt(&hex::encode(&blob), KEY).unwrap(), "diagnosis: hypertension");
    }

    #[test]
    fn test_wrong_key_fails_closed() {
        let encoded = encrypt("secret", KEY).unwrap();
        let other = [7u8; 32];
        assert_eq!(decrypt(&encoded, &other), Err(CipherError::AuthenticationFailure));
    }

    #[test]
    fn test_key_length_checked_first() {
        assert_eq!(encrypt("x", b"too short"), Err(CipherError::InvalidKeyLength(9)));
        // invalid hex would be a decode failure, but the key is rejected before decoding
        assert_eq!(decrypt("zz", &[0u8; 33]), Err(CipherError::InvalidKeyLength(33)));
        assert_eq!(FieldCipher::new(&[]).unwrap_err(), CipherError::InvalidKeyLength(0));
    }

    #[test]
    fn test_decode_failure() {
        assert_eq!(decrypt("not-hex", KEY), Err(CipherError::DecodeFailure));
        assert_eq!(decrypt("abc", KEY), Err(CipherError::DecodeFailure));
    }

    #[test]
    fn test_truncated_input() {
        assert_eq!(decrypt("", KEY), Err(CipherError::TruncatedInput));
        assert_eq!(decrypt(&"00".repeat(NONCE_LEN - 1), KEY), Err(CipherError::TruncatedInput));
        // a bare nonce with no tag is long enough to split but cannot authenticate
        assert_eq!(
            decrypt(&"00".repeat(NONCE_LEN), KEY),
            Err(CipherError::AuthenticationFailure)
        );
    }

    #[test]
    fn test_debug_hides_key() {
        let cipher = FieldCipher::new(KEY).unwrap();
        let out = format!("{cipher:?}");
        assert!(!out.contains("secret"));
    }
}
