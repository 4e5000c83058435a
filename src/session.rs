//! Per-connection session state machine: owns the codecs and pairing
//! engines for one controller connection; the I/O itself (socket
//! reads/writes, idle timers) belongs to the caller's own accept loop.
//! Kept sans-IO, same as [`crate::http::HttpCodec`] and
//! [`crate::record::RecordLayer`], so the whole handshake can be driven
//! in tests without a real socket.

use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

use crate::accessory::Accessory;
use crate::crypto::Ed25519KeyPair;
use crate::events::{events_to_json, EventDispatcher};
use crate::http::{encode_event, HttpCodec, HttpCodecError};
use crate::pairing::{PairSetupEngine, PairVerifyEngine, PairingStore, StoreBackend};
use crate::record::{RecordError, RecordLayer};
use crate::router::{self, PeerIdentity};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Http(#[from] HttpCodecError),

    /// The record layer rejected a frame (bad auth tag or oversized
    /// length); the connection must be closed, no retry on the same
    /// connection.
    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Bytes to write back to the socket, plus side effects the server loop
/// must act on beyond this one connection.
pub struct SessionOutcome {
    pub outgoing: Vec<u8>,
    /// Peer slots (possibly other connections) whose sessions must now be
    /// closed (a RemovePairing request targeted them).
    pub close_peer_slots: Vec<usize>,
    /// The accessory lost its last admin pairing and must reset to
    /// unpaired.
    pub restart_required: bool,
}

/// One controller connection's state: transport framing plus whichever
/// pairing engine is currently active.
pub struct Session {
    id: u64,
    http: HttpCodec,
    record: Option<RecordLayer>,
    pair_setup: PairSetupEngine,
    pair_verify: PairVerifyEngine,
    peer: Option<PeerIdentity>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            http: HttpCodec::new(),
            record: None,
            pair_setup: PairSetupEngine::new(),
            pair_verify: PairVerifyEngine::new(),
            peer: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.record.is_some()
    }

    #[must_use]
    pub fn peer(&self) -> Option<PeerIdentity> {
        self.peer
    }

    /// Whether this connection's own pair-setup attempt is mid-flight. A
    /// second connection attempting M1 while this one holds the attempt
    /// is rejected.
    #[must_use]
    pub fn is_pair_setup_in_progress(&self) -> bool {
        !self.pair_setup.is_idle()
    }

    /// Feed raw bytes received from the socket, decode every complete HTTP
    /// request they contain, route each one, and return the bytes to write
    /// back (already encrypted if the session has completed pair-verify).
    #[allow(clippy::too_many_arguments)]
    pub fn process_incoming<B: StoreBackend>(
        &mut self,
        raw: &[u8],
        tree: &mut Accessory,
        store: &mut PairingStore<B>,
        events: &EventDispatcher,
        accessory_id: &str,
        accessory_keys: &Ed25519KeyPair,
        setup_code: &[u8],
        other_session_pairing: bool,
    ) -> Result<SessionOutcome, SessionError> {
        let plaintext_chunks = self.demultiplex(raw)?;
        for chunk in &plaintext_chunks {
            self.http.feed(chunk);
        }

        let mut outcome = SessionOutcome { outgoing: Vec::new(), close_peer_slots: Vec::new(), restart_required: false };

        while let Some(request) = self.http.decode()? {
            let result = router::route(
                &request,
                tree,
                store,
                events,
                &mut self.pair_setup,
                &mut self.pair_verify,
                accessory_id,
                accessory_keys,
                setup_code,
                self.id,
                self.is_encrypted(),
                self.peer,
                other_session_pairing,
            );

            if let Some(verified) = result.verify_complete {
                // The V4 reply itself crosses the wire plaintext; only
                // traffic *after* it is under the new keys (§4.7).
                outcome.outgoing.extend_from_slice(&result.response_bytes);
                // VerifiedSession names keys from the controller's Read/Write
                // perspective; RecordLayer's write_key is what the accessory
                // encrypts outgoing frames with, i.e. the controller's read key.
                self.record = Some(RecordLayer::new(verified.read_key, verified.write_key));
                self.peer = Some(PeerIdentity { slot: verified.peer_slot, permissions: verified.peer_permissions });
                events.register_session(self.id);
            } else {
                outcome.outgoing.extend_from_slice(&self.frame_outgoing(&result.response_bytes)?);
            }

            outcome.close_peer_slots.extend(result.close_peer_slots);
            outcome.restart_required |= result.restart_required;
        }

        Ok(outcome)
    }

    /// Split incoming socket bytes into plaintext HTTP chunks, decrypting
    /// through the record layer once it exists.
    fn demultiplex(&mut self, raw: &[u8]) -> Result<Vec<Vec<u8>>, SessionError> {
        match &mut self.record {
            Some(record) => {
                record.feed(raw);
                Ok(record.decrypt_all()?)
            }
            None => Ok(vec![raw.to_vec()]),
        }
    }

    fn frame_outgoing(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, SessionError> {
        match &mut self.record {
            Some(record) => Ok(record.encrypt(plaintext)?),
            None => Ok(plaintext.to_vec()),
        }
    }

    /// Flush this session's coalesced characteristic-change queue as an
    /// `EVENT/1.0` push, if anything is pending (§3 Event, driven by the
    /// server loop's [`crate::events::NOTIFY_FLUSH_PERIOD`] timer).
    pub fn flush_events(&mut self, events: &EventDispatcher) -> Result<Option<Vec<u8>>, SessionError> {
        let Some(pending) = events.drain(self.id) else {
            return Ok(None);
        };
        let body = serde_json::to_vec(&events_to_json(&pending)).expect("JSON serialization of characteristic values never fails");
        let event_bytes = encode_event(&body);
        Ok(Some(self.frame_outgoing(&event_bytes)?))
    }

    /// Clean up on disconnect: drop this session's event queue and clear
    /// every subscription it holds across the whole tree (§4.9).
    pub fn close(&self, tree: &mut Accessory, events: &EventDispatcher) {
        for service in &mut tree.services {
            for characteristic in &mut service.characteristics {
                characteristic.unsubscribe(self.id);
            }
        }
        events.remove_session(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessory::{build_information_service, AccessoryIdentity, Characteristic, Format, Permissions, Service};
    use crate::crypto::{Ed25519KeyPair, X25519KeyPair, X25519PublicKey};
    use crate::pairing::{MemoryBackend, PERMISSION_ADMIN};
    use crate::tlv::{errors, TlvEncoder, TlvReader, TlvType};
    use std::sync::Arc;

    fn test_tree() -> Accessory {
        let info = build_information_service(
            &AccessoryIdentity { name: "n".into(), manufacturer: "m".into(), model: "m".into(), serial_number: "s".into(), firmware_revision: "f".into() },
            Arc::new(|| {}),
        );
        let switch = Service::new("00000049-0000-1000-8000-0026BB765291").with_characteristic(Characteristic::new(
            "00000025-0000-1000-8000-0026BB765291",
            Format::Bool,
            Permissions::PAIRED_READ | Permissions::PAIRED_WRITE | Permissions::NOTIFY,
        ));
        Accessory::new(vec![info, switch])
    }

    fn http_request_bytes(method: &str, path: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
        let mut out = format!("{method} {path} HTTP/1.1\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n\r\n", body.len()).into_bytes();
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn unencrypted_get_accessories_before_pairing_is_rejected() {
        let mut session = Session::new();
        let mut tree = test_tree();
        let mut store = PairingStore::open(MemoryBackend::default()).unwrap();
        let events = EventDispatcher::new();
        let accessory_id = store.accessory_id().unwrap();
        let accessory_keys = store.accessory_keypair().unwrap();

        let request = b"GET /accessories HTTP/1.1\r\n\r\n".to_vec();
        let outcome = session.process_incoming(&request, &mut tree, &mut store, &events, &accessory_id, &accessory_keys, b"123-45-678", false).unwrap();

        let text = String::from_utf8_lossy(&outcome.outgoing);
        assert!(text.starts_with("HTTP/1.1 400"));
    }

    #[test]
    fn pair_setup_m1_rejects_busy_from_a_concurrent_session() {
        let mut session = Session::new();
        let mut tree = test_tree();
        let mut store = PairingStore::open(MemoryBackend::default()).unwrap();
        let events = EventDispatcher::new();
        let accessory_id = store.accessory_id().unwrap();
        let accessory_keys = store.accessory_keypair().unwrap();

        let m1 = TlvEncoder::new().add_state(1).build();
        let request = http_request_bytes("POST", "/pair-setup", "application/pairing+tlv8", &m1);
        let outcome = session.process_incoming(&request, &mut tree, &mut store, &events, &accessory_id, &accessory_keys, b"123-45-678", true).unwrap();

        let body_start = outcome.outgoing.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
        let reply = TlvReader::decode(&outcome.outgoing[body_start..]).unwrap();
        assert_eq!(reply.get_error(), Some(errors::BUSY));
    }

    #[test]
    fn full_verify_handshake_switches_session_to_encrypted() {
        let mut session = Session::new();
        let mut tree = test_tree();
        let mut store = PairingStore::open(MemoryBackend::default()).unwrap();
        let events = EventDispatcher::new();
        let accessory_id = store.accessory_id().unwrap();
        let accessory_keys = store.accessory_keypair().unwrap();

        let controller_keys = Ed25519KeyPair::generate();
        let controller_id = "AA:BB:CC:DD:EE:FF:00:11:22:33:44:55:66:77:88:99-0000-0000-0000-0000-0000-0000-0000-0000";
        store.add(controller_id, *controller_keys.public_key().as_bytes(), PERMISSION_ADMIN).unwrap();

        let ephemeral = X25519KeyPair::generate();
        let v1 = TlvEncoder::new().add_state(1).add(TlvType::PublicKey, ephemeral.public_key().as_bytes()).build();
        let request = http_request_bytes("POST", "/pair-verify", "application/pairing+tlv8", &v1);
        let outcome = session.process_incoming(&request, &mut tree, &mut store, &events, &accessory_id, &accessory_keys, b"123-45-678", false).unwrap();
        assert!(!session.is_encrypted());

        let body_start = outcome.outgoing.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
        let v2 = TlvReader::decode(&outcome.outgoing[body_start..]).unwrap();
        let accessory_ephemeral_public = X25519PublicKey::from_bytes(v2.get_required(TlvType::PublicKey).unwrap()).unwrap();
        let encrypted = v2.get_required(TlvType::EncryptedData).unwrap();

        let shared = ephemeral.diffie_hellman(&accessory_ephemeral_public).unwrap();
        let session_key = crate::crypto::derive_key_32(shared.as_bytes(), "Pair-Verify-Encrypt-Salt", "Pair-Verify-Encrypt-Info\u{1}").unwrap();
        let cipher = crate::crypto::ChaCha20Poly1305Cipher::new(&session_key).unwrap();
        let plaintext = cipher.decrypt(&crate::crypto::Nonce::from_label(b"PV-Msg02"), encrypted).unwrap();
        let inner = TlvReader::decode(&plaintext).unwrap();
        let accessory_sig = crate::crypto::Ed25519Signature::from_bytes(inner.get_required(TlvType::Signature).unwrap()).unwrap();
        let mut verify_data = Vec::new();
        verify_data.extend_from_slice(accessory_ephemeral_public.as_bytes());
        verify_data.extend_from_slice(accessory_id.as_bytes());
        verify_data.extend_from_slice(ephemeral.public_key().as_bytes());
        accessory_keys.public_key().verify(&verify_data, &accessory_sig).unwrap();

        let mut my_sign = Vec::new();
        my_sign.extend_from_slice(ephemeral.public_key().as_bytes());
        my_sign.extend_from_slice(controller_id.as_bytes());
        my_sign.extend_from_slice(accessory_ephemeral_public.as_bytes());
        let my_sig = controller_keys.sign(&my_sign);
        let my_inner = TlvEncoder::new().add(TlvType::Identifier, controller_id.as_bytes()).add(TlvType::Signature, &my_sig.to_bytes()).build();
        let my_encrypted = cipher.encrypt(&crate::crypto::Nonce::from_label(b"PV-Msg03"), &my_inner).unwrap();
        let v3 = TlvEncoder::new().add_state(3).add(TlvType::EncryptedData, &my_encrypted).build();

        let request = http_request_bytes("POST", "/pair-verify", "application/pairing+tlv8", &v3);
        let outcome = session.process_incoming(&request, &mut tree, &mut store, &events, &accessory_id, &accessory_keys, b"123-45-678", false).unwrap();

        assert!(session.is_encrypted());
        assert!(String::from_utf8_lossy(&outcome.outgoing).starts_with("HTTP/1.1 200"));
        assert_eq!(session.peer().unwrap().permissions, PERMISSION_ADMIN);
    }
}
