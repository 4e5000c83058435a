use super::CryptoError;
use hkdf::Hkdf;
use sha2::Sha512;

/// HKDF-SHA-512 (RFC 5869) key derivation, used throughout pair-setup and
/// pair-verify to turn a shared secret into purpose-specific keys.
pub struct HkdfSha512 {
    hkdf: Hkdf<Sha512>,
}

impl HkdfSha512 {
    pub fn new(salt: Option<&[u8]>, ikm: &[u8]) -> Self {
        let hkdf = Hkdf::<Sha512>::new(salt, ikm);
        Self { hkdf }
    }

    pub fn expand(&self, info: &[u8], length: usize) -> Result<Vec<u8>, CryptoError> {
        let mut okm = vec![0u8; length];
        self.hkdf
            .expand(info, &mut okm)
            .map_err(|_| CryptoError::KeyDerivationFailed("HKDF expand failed".into()))?;
        Ok(okm)
    }

    pub fn expand_fixed<const N: usize>(&self, info: &[u8]) -> Result<[u8; N], CryptoError> {
        let mut okm = [0u8; N];
        self.hkdf
            .expand(info, &mut okm)
            .map_err(|_| CryptoError::KeyDerivationFailed("HKDF expand failed".into()))?;
        Ok(okm)
    }
}

/// One-shot HKDF-SHA-512 derivation: `HKDF(ikm, salt, info, L=32)`.
pub fn derive_key_32(ikm: &[u8], salt: &str, info: &str) -> Result<[u8; 32], CryptoError> {
    HkdfSha512::new(Some(salt.as_bytes()), ikm).expand_fixed::<32>(info.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_key_32_is_deterministic() {
        let ikm = b"shared-secret";
        let a = derive_key_32(ikm, "Pair-Verify-Encrypt-Salt", "Pair-Verify-Encrypt-Info\u{1}").unwrap();
        let b = derive_key_32(ikm, "Pair-Verify-Encrypt-Salt", "Pair-Verify-Encrypt-Info\u{1}").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_info_strings_diverge() {
        let ikm = b"shared-secret";
        let a = derive_key_32(ikm, "Control-Salt", "Control-Read-Encryption-Key\u{1}").unwrap();
        let b = derive_key_32(ikm, "Control-Salt", "Control-Write-Encryption-Key\u{1}").unwrap();
        assert_ne!(a, b);
    }
}
