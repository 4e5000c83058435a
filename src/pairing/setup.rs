//! Pair-setup engine: the accessory side of SRP-based controller
//! enrollment, states M1 through M6 (§4.6).

use thiserror::Error;

use crate::crypto::{derive_key_32, ChaCha20Poly1305Cipher, CryptoError, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature, Nonce, SrpServer, SrpSession};
use crate::pairing::store::{PairingStore, StorageError, StoreBackend, PERMISSION_ADMIN};
use crate::tlv::{errors, TlvEncoder, TlvError, TlvReader, TlvType};

#[derive(Debug, Error)]
pub enum PairSetupError {
    #[error(transparent)]
    Tlv(#[from] TlvError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Carries the TLV `Error` code that must be sent back to the
    /// controller instead of advancing the state machine.
    #[error("pair-setup failed with TLV error {0}")]
    Protocol(u8),
}

impl PairSetupError {
    /// Map any failure down to the single TLV error byte the wire protocol
    /// actually carries.
    #[must_use]
    pub fn tlv_code(&self) -> u8 {
        match self {
            Self::Protocol(code) => *code,
            Self::Crypto(_) => errors::AUTHENTICATION,
            Self::Tlv(_) => errors::UNKNOWN,
            Self::Storage(StorageError::MaxPeers) => errors::MAX_PEERS,
            Self::Storage(_) => errors::UNKNOWN,
        }
    }
}

enum EngineState {
    AwaitingM1,
    AwaitingM3(SrpServer),
    AwaitingM5(SrpSession),
    Done,
}

/// One pair-setup attempt. Lives for the duration of a single session;
/// discarded (and the session's "pairing" flag cleared) on any failure so
/// a retry can start over from M1.
pub struct PairSetupEngine {
    state: EngineState,
}

impl Default for PairSetupEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PairSetupEngine {
    #[must_use]
    pub fn new() -> Self {
        Self { state: EngineState::AwaitingM1 }
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self.state, EngineState::AwaitingM1)
    }

    /// Process one incoming TLV message and produce the TLV reply, driving
    /// `store` and `password` as needed. `already_pairing` reports whether
    /// some *other* session is mid pair-setup (§4.6 busy/unavailable rule).
    pub fn handle<B: StoreBackend>(
        &mut self,
        body: &[u8],
        store: &mut PairingStore<B>,
        password: &[u8],
        already_pairing: bool,
    ) -> Result<Vec<u8>, PairSetupError> {
        let tlv = TlvReader::decode(body)?;
        let state = tlv.get_state()?;

        let result = match (&self.state, state) {
            (EngineState::AwaitingM1, 1) => self.handle_m1(store, password, already_pairing),
            (EngineState::AwaitingM3(_), 3) => self.handle_m3(&tlv),
            (EngineState::AwaitingM5(_), 5) => self.handle_m5(&tlv, store),
            _ => Err(PairSetupError::Protocol(errors::UNKNOWN)),
        };

        if result.is_err() {
            self.state = EngineState::AwaitingM1;
        }
        result
    }

    fn handle_m1<B: StoreBackend>(&mut self, store: &mut PairingStore<B>, password: &[u8], already_pairing: bool) -> Result<Vec<u8>, PairSetupError> {
        if store.is_paired() {
            return Err(PairSetupError::Protocol(errors::UNAVAILABLE));
        }
        if already_pairing {
            return Err(PairSetupError::Protocol(errors::BUSY));
        }

        let srp = SrpServer::new(password)?;
        let reply = TlvEncoder::new()
            .add_state(2)
            .add(TlvType::PublicKey, srp.public_key())
            .add(TlvType::Salt, srp.salt())
            .build();

        self.state = EngineState::AwaitingM3(srp);
        Ok(reply)
    }

    fn handle_m3(&mut self, tlv: &TlvReader) -> Result<Vec<u8>, PairSetupError> {
        let EngineState::AwaitingM3(srp) = std::mem::replace(&mut self.state, EngineState::AwaitingM1) else {
            unreachable!("guarded by the match in handle()");
        };

        let client_public = tlv.get_required(TlvType::PublicKey)?;
        let client_proof = tlv.get_required(TlvType::Proof)?;

        let session = srp
            .verify_client_proof(client_public, client_proof)
            .map_err(|_| PairSetupError::Protocol(errors::AUTHENTICATION))?;

        let reply = TlvEncoder::new().add_state(4).add(TlvType::Proof, session.server_proof()).build();

        self.state = EngineState::AwaitingM5(session);
        Ok(reply)
    }

    fn handle_m5<B: StoreBackend>(&mut self, tlv: &TlvReader, store: &mut PairingStore<B>) -> Result<Vec<u8>, PairSetupError> {
        let EngineState::AwaitingM5(session) = std::mem::replace(&mut self.state, EngineState::AwaitingM1) else {
            unreachable!("guarded by the match in handle()");
        };

        let shared_key = session.shared_key();
        let encrypted = tlv.get_required(TlvType::EncryptedData)?;

        let encrypt_key = derive_key_32(shared_key, "Pair-Setup-Encrypt-Salt", "Pair-Setup-Encrypt-Info\u{1}")?;
        let cipher = ChaCha20Poly1305Cipher::new(&encrypt_key)?;
        let plaintext = cipher
            .decrypt(&Nonce::from_label(b"PS-Msg05"), encrypted)
            .map_err(|_| PairSetupError::Protocol(errors::AUTHENTICATION))?;

        let device_tlv = TlvReader::decode(&plaintext)?;
        let device_id = device_tlv.get_required(TlvType::Identifier)?;
        let device_ltpk_bytes = device_tlv.get_required(TlvType::PublicKey)?;
        let device_signature_bytes = device_tlv.get_required(TlvType::Signature)?;

        let device_x = derive_key_32(shared_key, "Pair-Setup-Controller-Sign-Salt", "Pair-Setup-Controller-Sign-Info\u{1}")?;
        let mut signed_data = Vec::with_capacity(32 + device_id.len() + device_ltpk_bytes.len());
        signed_data.extend_from_slice(&device_x);
        signed_data.extend_from_slice(device_id);
        signed_data.extend_from_slice(device_ltpk_bytes);

        let device_ltpk = Ed25519PublicKey::from_bytes(device_ltpk_bytes).map_err(|_| PairSetupError::Protocol(errors::AUTHENTICATION))?;
        let signature = Ed25519Signature::from_bytes(device_signature_bytes).map_err(|_| PairSetupError::Protocol(errors::AUTHENTICATION))?;
        device_ltpk
            .verify(&signed_data, &signature)
            .map_err(|_| PairSetupError::Protocol(errors::AUTHENTICATION))?;

        let device_id_str = String::from_utf8_lossy(device_id).into_owned();
        let mut ltpk_array = [0u8; 32];
        ltpk_array.copy_from_slice(device_ltpk_bytes);
        store.add(&device_id_str, ltpk_array, PERMISSION_ADMIN)?;

        let accessory_id = store.accessory_id()?;
        let accessory_keypair = store.accessory_keypair()?;

        let accessory_x = derive_key_32(shared_key, "Pair-Setup-Accessory-Sign-Salt", "Pair-Setup-Accessory-Sign-Info\u{1}")?;
        let mut accessory_signed = Vec::with_capacity(32 + accessory_id.len() + 32);
        accessory_signed.extend_from_slice(&accessory_x);
        accessory_signed.extend_from_slice(accessory_id.as_bytes());
        accessory_signed.extend_from_slice(accessory_keypair.public_key().as_bytes());
        let accessory_signature = accessory_keypair.sign(&accessory_signed);

        let reply_tlv = TlvEncoder::new()
            .add(TlvType::Identifier, accessory_id.as_bytes())
            .add(TlvType::PublicKey, accessory_keypair.public_key().as_bytes())
            .add(TlvType::Signature, &accessory_signature.to_bytes())
            .build();

        let reply_cipher = ChaCha20Poly1305Cipher::new(&encrypt_key)?;
        let reply_encrypted = reply_cipher.encrypt(&Nonce::from_label(b"PS-Msg06"), &reply_tlv)?;

        let reply = TlvEncoder::new().add_state(6).add(TlvType::EncryptedData, &reply_encrypted).build();

        self.state = EngineState::Done;
        Ok(reply)
    }
}

/// Builds an error reply TLV: `State=<next expected>, Error=<code>`.
#[must_use]
pub fn error_reply(state: u8, code: u8) -> Vec<u8> {
    TlvEncoder::new().add_state(state).add_u8(TlvType::Error, code).build()
}
