use super::{CryptoError, lengths};
use x25519_dalek::{PublicKey, StaticSecret};

/// X25519 key pair used for the ephemeral pair-verify ECDH exchange.
pub struct X25519KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl X25519KeyPair {
    pub fn generate() -> Self {
        use rand::rngs::OsRng;
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != lengths::X25519_PUBLIC_KEY {
            return Err(CryptoError::InvalidKeyLength {
                expected: lengths::X25519_PUBLIC_KEY,
                actual: bytes.len(),
            });
        }

        let bytes: [u8; 32] = bytes.try_into().unwrap();
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);

        Ok(Self { secret, public })
    }

    pub fn public_key(&self) -> X25519PublicKey {
        X25519PublicKey { inner: self.public }
    }

    /// Diffie-Hellman exchange. Rejects the all-zero output per RFC 7748 §6.1,
    /// which Curve25519 produces for a handful of low-order public keys.
    pub fn diffie_hellman(&self, their_public: &X25519PublicKey) -> Result<X25519SharedSecret, CryptoError> {
        let shared = self.secret.diffie_hellman(&their_public.inner);
        let bytes = shared.to_bytes();
        if bytes == [0u8; 32] {
            return Err(CryptoError::BadPoint);
        }
        Ok(X25519SharedSecret { bytes })
    }
}

/// X25519 public key.
#[derive(Clone, Copy)]
pub struct X25519PublicKey {
    inner: PublicKey,
}

impl X25519PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != lengths::X25519_PUBLIC_KEY {
            return Err(CryptoError::InvalidKeyLength {
                expected: lengths::X25519_PUBLIC_KEY,
                actual: bytes.len(),
            });
        }

        let bytes: [u8; 32] = bytes.try_into().unwrap();
        Ok(Self {
            inner: PublicKey::from(bytes),
        })
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.inner.as_bytes()
    }
}

/// Shared secret from a completed DH exchange. Zeroized on drop.
pub struct X25519SharedSecret {
    bytes: [u8; 32],
}

impl X25519SharedSecret {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl Drop for X25519SharedSecret {
    fn drop(&mut self) {
        self.bytes.iter_mut().for_each(|b| *b = 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dh_agrees_both_directions() {
        let a = X25519KeyPair::generate();
        let b = X25519KeyPair::generate();

        let shared_a = a.diffie_hellman(&b.public_key()).unwrap();
        let shared_b = b.diffie_hellman(&a.public_key()).unwrap();

        assert_eq!(shared_a.as_bytes(), shared_b.as_bytes());
    }

    #[test]
    fn rejects_low_order_point() {
        // The all-zero public key is a well-known low-order point.
        let zero_pub = X25519PublicKey::from_bytes(&[0u8; 32]).unwrap();
        let a = X25519KeyPair::generate();
        let err = a.diffie_hellman(&zero_pub).unwrap_err();
        assert!(matches!(err, CryptoError::BadPoint));
    }
}
