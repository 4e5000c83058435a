use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// Ed25519 signature did not verify.
    #[error("signature verification failed")]
    BadSignature,

    /// Curve25519 shared secret was all-zero (low-order point).
    #[error("curve25519 output was the all-zero point")]
    BadPoint,

    /// ChaCha20-Poly1305 authentication tag did not match.
    #[error("AEAD tag mismatch")]
    MacMismatch,

    #[error("key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("SRP error: {0}")]
    Srp(String),
}
