//! Cryptographic primitives backing pair-setup, pair-verify, and the
//! record layer: SHA-512/HKDF, Curve25519, Ed25519, ChaCha20-Poly1305, and
//! SRP-6a. Fixed algorithm set, no negotiation.

mod chacha;
mod ed25519;
mod error;
mod hkdf;
mod srp;
mod x25519;

pub use self::chacha::{ChaCha20Poly1305Cipher, Nonce};
pub use self::ed25519::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
pub use self::error::CryptoError;
pub use self::hkdf::{HkdfSha512, derive_key_32};
pub use self::srp::{SrpServer, SrpSession};
pub use self::x25519::{X25519KeyPair, X25519PublicKey, X25519SharedSecret};

/// Byte lengths of the fixed-size values this crate moves around.
pub mod lengths {
    pub const ED25519_PUBLIC_KEY: usize = 32;
    pub const ED25519_SECRET_KEY: usize = 32;
    pub const ED25519_SIGNATURE: usize = 64;
    pub const X25519_PUBLIC_KEY: usize = 32;
    pub const X25519_SHARED_SECRET: usize = 32;
    pub const CHACHA_KEY: usize = 32;
    pub const CHACHA_NONCE: usize = 12;
    pub const CHACHA_TAG: usize = 16;
    /// SRP-6a 3072-bit group field width.
    pub const SRP_FIELD: usize = 384;
    /// 36-byte UTF-8 controller identifier (HAP `Identifier` TLV).
    pub const CONTROLLER_ID: usize = 36;
}
