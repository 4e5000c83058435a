use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305 as ChaChaImpl, Nonce as ChaChaNonce};

use super::{CryptoError, lengths};

/// 12-byte ChaCha20-Poly1305 nonce: 4 zero bytes || 8-byte little-endian counter.
#[derive(Clone, Copy)]
pub struct Nonce([u8; 12]);

impl Nonce {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != lengths::CHACHA_NONCE {
            return Err(CryptoError::InvalidKeyLength {
                expected: lengths::CHACHA_NONCE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 12];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Build the record-layer nonce for frame `counter`.
    pub fn from_counter(counter: u64) -> Self {
        let mut arr = [0u8; 12];
        arr[4..12].copy_from_slice(&counter.to_le_bytes());
        Self(arr)
    }

    /// Build a fixed pairing-message nonce such as `"PS-Msg05"`: the literal
    /// is right-aligned into the low 8 bytes, the high 4 bytes stay zero.
    pub fn from_label(label: &[u8; 8]) -> Self {
        let mut arr = [0u8; 12];
        arr[4..12].copy_from_slice(label);
        Self(arr)
    }

    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

/// ChaCha20-Poly1305 AEAD cipher over a single 32-byte key.
pub struct ChaCha20Poly1305Cipher {
    cipher: ChaChaImpl,
}

impl ChaCha20Poly1305Cipher {
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != lengths::CHACHA_KEY {
            return Err(CryptoError::InvalidKeyLength {
                expected: lengths::CHACHA_KEY,
                actual: key.len(),
            });
        }

        let cipher = ChaChaImpl::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
            expected: lengths::CHACHA_KEY,
            actual: key.len(),
        })?;

        Ok(Self { cipher })
    }

    /// Encrypt, returning ciphertext with the 16-byte tag appended.
    pub fn encrypt(&self, nonce: &Nonce, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.cipher
            .encrypt(ChaChaNonce::from_slice(&nonce.0), plaintext)
            .map_err(|_| CryptoError::MacMismatch)
    }

    pub fn encrypt_with_aad(&self, nonce: &Nonce, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.cipher
            .encrypt(ChaChaNonce::from_slice(&nonce.0), Payload { msg: plaintext, aad })
            .map_err(|_| CryptoError::MacMismatch)
    }

    /// Decrypt and verify. Input is ciphertext with the 16-byte tag appended.
    pub fn decrypt(&self, nonce: &Nonce, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.cipher
            .decrypt(ChaChaNonce::from_slice(&nonce.0), ciphertext)
            .map_err(|_| CryptoError::MacMismatch)
    }

    pub fn decrypt_with_aad(&self, nonce: &Nonce, aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.cipher
            .decrypt(ChaChaNonce::from_slice(&nonce.0), Payload { msg: ciphertext, aad })
            .map_err(|_| CryptoError::MacMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_from_counter_layout() {
        let nonce = Nonce::from_counter(0x0102_0304_0506_0708);
        let bytes = nonce.as_bytes();
        assert_eq!(bytes[0..4], [0, 0, 0, 0]);
        assert_eq!(bytes[4..12], [0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn nonce_from_label_layout() {
        let nonce = Nonce::from_label(b"PS-Msg05");
        assert_eq!(nonce.as_bytes()[0..4], [0, 0, 0, 0]);
        assert_eq!(&nonce.as_bytes()[4..12], b"PS-Msg05");
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = [0x11u8; 32];
        let cipher = ChaCha20Poly1305Cipher::new(&key).unwrap();
        let nonce = Nonce::from_counter(0);
        let ct = cipher.encrypt(&nonce, b"hello").unwrap();
        let pt = cipher.decrypt(&nonce, &ct).unwrap();
        assert_eq!(pt, b"hello");
    }

    #[test]
    fn tampered_tag_fails() {
        let key = [0x22u8; 32];
        let cipher = ChaCha20Poly1305Cipher::new(&key).unwrap();
        let nonce = Nonce::from_counter(0);
        let mut ct = cipher.encrypt(&nonce, b"hello").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0x01;
        assert!(matches!(cipher.decrypt(&nonce, &ct), Err(CryptoError::MacMismatch)));
    }
}
