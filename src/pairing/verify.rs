//! Pair-verify engine (§4.7): the accessory side of the per-connection
//! Curve25519 ECDH exchange that derives record-layer keys and
//! authenticates both sides against stored long-term keys.

use thiserror::Error;

use crate::crypto::{derive_key_32, ChaCha20Poly1305Cipher, CryptoError, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature, Nonce, X25519KeyPair, X25519PublicKey};
use crate::pairing::store::Pairing;
use crate::tlv::{errors, TlvEncoder, TlvError, TlvReader, TlvType};

#[derive(Debug, Error)]
pub enum PairVerifyError {
    #[error(transparent)]
    Tlv(#[from] TlvError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Carries the TLV `Error` code to send back; the session stays
    /// plaintext and may retry (§4.7, §7).
    #[error("pair-verify failed with TLV error {0}")]
    Protocol(u8),
}

impl PairVerifyError {
    #[must_use]
    pub fn tlv_code(&self) -> u8 {
        match self {
            Self::Protocol(code) => *code,
            Self::Crypto(_) => errors::AUTHENTICATION,
            Self::Tlv(_) => errors::UNKNOWN,
        }
    }
}

/// Record-layer keys and peer identity produced by a completed V3.
pub struct VerifiedSession {
    /// Accessory -> controller key.
    pub read_key: [u8; 32],
    /// Controller -> accessory key.
    pub write_key: [u8; 32],
    pub peer_slot: usize,
    pub peer_permissions: u8,
}

enum EngineState {
    AwaitingV1,
    AwaitingV3 {
        session_key: [u8; 32],
        shared: [u8; 32],
        accessory_public: [u8; 32],
        device_public: [u8; 32],
    },
    Done,
}

/// One pair-verify attempt, scoped to a single connection.
pub struct PairVerifyEngine {
    state: EngineState,
}

impl Default for PairVerifyEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PairVerifyEngine {
    #[must_use]
    pub fn new() -> Self {
        Self { state: EngineState::AwaitingV1 }
    }

    /// Process V1, producing V2. `find_pairing` is not consulted here (the
    /// stored LTPK lookup only happens once `Identifier` arrives in V3).
    pub fn handle_v1(&mut self, body: &[u8], accessory_id: &str, accessory_keys: &Ed25519KeyPair) -> Result<Vec<u8>, PairVerifyError> {
        if !matches!(self.state, EngineState::AwaitingV1) {
            return Err(PairVerifyError::Protocol(errors::UNKNOWN));
        }

        let tlv = TlvReader::decode(body)?;
        let state = tlv.get_state()?;
        if state != 1 {
            return Err(PairVerifyError::Protocol(errors::UNKNOWN));
        }

        let device_public_bytes = tlv.get_required(TlvType::PublicKey)?;
        let device_public = X25519PublicKey::from_bytes(device_public_bytes)?;

        let accessory_ephemeral = X25519KeyPair::generate();
        let accessory_public = accessory_ephemeral.public_key();
        let shared = accessory_ephemeral.diffie_hellman(&device_public)?;

        let mut signed = Vec::with_capacity(32 + accessory_id.len() + 32);
        signed.extend_from_slice(accessory_public.as_bytes());
        signed.extend_from_slice(accessory_id.as_bytes());
        signed.extend_from_slice(device_public_bytes);
        let signature = accessory_keys.sign(&signed);

        let inner = TlvEncoder::new()
            .add(TlvType::Identifier, accessory_id.as_bytes())
            .add(TlvType::Signature, &signature.to_bytes())
            .build();

        let session_key = derive_key_32(shared.as_bytes(), "Pair-Verify-Encrypt-Salt", "Pair-Verify-Encrypt-Info\u{1}")?;
        let cipher = ChaCha20Poly1305Cipher::new(&session_key)?;
        let encrypted = cipher.encrypt(&Nonce::from_label(b"PV-Msg02"), &inner)?;

        let reply = TlvEncoder::new()
            .add_state(2)
            .add(TlvType::PublicKey, accessory_public.as_bytes())
            .add(TlvType::EncryptedData, &encrypted)
            .build();

        let mut device_public_arr = [0u8; 32];
        device_public_arr.copy_from_slice(device_public_bytes);

        self.state = EngineState::AwaitingV3 {
            session_key,
            shared: *shared.as_bytes(),
            accessory_public: *accessory_public.as_bytes(),
            device_public: device_public_arr,
        };
        Ok(reply)
    }

    /// Process V3, producing V4 and the derived record-layer keys.
    /// `find_pairing` looks up a stored pairing by the controller
    /// `Identifier` the decrypted payload carries.
    pub fn handle_v3(&mut self, body: &[u8], find_pairing: impl Fn(&str) -> Option<Pairing>) -> Result<(Vec<u8>, VerifiedSession), PairVerifyError> {
        let EngineState::AwaitingV3 { session_key, shared, accessory_public, device_public } = std::mem::replace(&mut self.state, EngineState::AwaitingV1) else {
            return Err(PairVerifyError::Protocol(errors::UNKNOWN));
        };

        let result = self.try_handle_v3(body, &session_key, &shared, &accessory_public, &device_public, find_pairing);
        if result.is_err() {
            self.state = EngineState::AwaitingV1;
        } else {
            self.state = EngineState::Done;
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn try_handle_v3(
        &self,
        body: &[u8],
        session_key: &[u8; 32],
        shared: &[u8; 32],
        accessory_public: &[u8; 32],
        device_public: &[u8; 32],
        find_pairing: impl Fn(&str) -> Option<Pairing>,
    ) -> Result<(Vec<u8>, VerifiedSession), PairVerifyError> {
        let tlv = TlvReader::decode(body)?;
        let state = tlv.get_state()?;
        if state != 3 {
            return Err(PairVerifyError::Protocol(errors::UNKNOWN));
        }

        let encrypted = tlv.get_required(TlvType::EncryptedData)?;
        let cipher = ChaCha20Poly1305Cipher::new(session_key)?;
        let plaintext = cipher
            .decrypt(&Nonce::from_label(b"PV-Msg03"), encrypted)
            .map_err(|_| PairVerifyError::Protocol(errors::AUTHENTICATION))?;

        let inner = TlvReader::decode(&plaintext)?;
        let identifier = inner.get_required(TlvType::Identifier)?;
        let signature_bytes = inner.get_required(TlvType::Signature)?;

        let identifier_str = String::from_utf8_lossy(identifier).into_owned();
        let pairing = find_pairing(&identifier_str).ok_or(PairVerifyError::Protocol(errors::AUTHENTICATION))?;

        let mut verify_data = Vec::with_capacity(64 + identifier.len());
        verify_data.extend_from_slice(device_public);
        verify_data.extend_from_slice(identifier);
        verify_data.extend_from_slice(accessory_public);

        let controller_ltpk = Ed25519PublicKey::from_bytes(&pairing.public_key)?;
        let signature = Ed25519Signature::from_bytes(signature_bytes)?;
        controller_ltpk
            .verify(&verify_data, &signature)
            .map_err(|_| PairVerifyError::Protocol(errors::AUTHENTICATION))?;

        let read_key = derive_key_32(shared, "Control-Salt", "Control-Read-Encryption-Key\u{1}")?;
        let write_key = derive_key_32(shared, "Control-Salt", "Control-Write-Encryption-Key\u{1}")?;

        let reply = TlvEncoder::new().add_state(4).build();

        Ok((
            reply,
            VerifiedSession {
                read_key,
                write_key,
                peer_slot: pairing.slot,
                peer_permissions: pairing.permissions,
            },
        ))
    }
}
