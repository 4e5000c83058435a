//! In-process test harness (§10.4): a `MockController` that drives a full
//! pair-setup + pair-verify handshake against a real [`crate::session::Session`],
//! the same way the controller side of a real HomeKit pairing would, but
//! without a socket. Used by the scenario tests (S1-S6) in `tests/`.

use num_bigint::BigUint;
use rand::Rng;
use sha2::{Digest, Sha512};

use crate::accessory::Accessory;
use crate::crypto::{derive_key_32, ChaCha20Poly1305Cipher, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature, Nonce, X25519KeyPair, X25519PublicKey};
use crate::events::EventDispatcher;
use crate::pairing::{PairingStore, StoreBackend};
use crate::record::RecordLayer;
use crate::session::Session;
use crate::tlv::{TlvEncoder, TlvReader, TlvType};

/// RFC 5054 group 15 constant, duplicated from `crate::crypto::srp` (which
/// keeps it private) so the mock controller can run the client side of the
/// same SRP-6a math.
const N_HEX: &[u8] = b"FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E08\
    8A67CC74020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B\
    302B0A6DF25F14374FE1356D6D51C245E485B576625E7EC6F44C42E9\
    A637ED6B0BFF5CB6F406B7EDEE386BFB5A899FA5AE9F24117C4B1FE6\
    49286651ECE45B3DC2007CB8A163BF0598DA48361C55D39A69163FA8\
    FD24CF5F83655D23DCA3AD961C62F356208552BB9ED529077096966D\
    670C354E4ABC9804F1746C08CA18217C32905E462E36CE3BE39E772C\
    180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718\
    3995497CEA956AE515D2261898FA051015728E5A8AAAC42DAD33170D\
    04507A33A85521ABDF1CBA64ECFB850458DBEF0A8AEA71575D060C7D\
    B3970F85A6E1E4C7ABF5AE8CDB0933D71E8C94E04A25619DCEE3D226\
    1AD2EE6BF12FFA06D98A0864D87602733EC86A64521F2B18177B200C\
    BBE117577A615D6C770988C0BAD946E208E24FA074E5AB3143DB5BFC\
    E0FD108E4B82D120A93AD2CAFFFFFFFFFFFFFFFF";
const FIELD_BYTES: usize = 384;

fn pad(bytes: &[u8]) -> Vec<u8> {
    if bytes.len() >= FIELD_BYTES {
        return bytes.to_vec();
    }
    let mut padded = vec![0u8; FIELD_BYTES];
    padded[FIELD_BYTES - bytes.len()..].copy_from_slice(bytes);
    padded
}

fn group() -> (BigUint, BigUint) {
    (BigUint::parse_bytes(N_HEX, 16).expect("static RFC5054 constant parses"), BigUint::from(5u32))
}

fn compute_x(salt: &[u8], password: &[u8]) -> BigUint {
    let mut inner = Sha512::new();
    inner.update(b"Pair-Setup");
    inner.update(b":");
    inner.update(password);
    let h_up = inner.finalize();
    let mut outer = Sha512::new();
    outer.update(salt);
    outer.update(h_up);
    BigUint::from_bytes_be(&outer.finalize())
}

/// Failures the mock controller can observe while driving a handshake;
/// scenario tests match on these rather than parsing TLV themselves.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("unexpected HTTP status: {0}")]
    UnexpectedStatus(String),

    #[error("expected TLV state {expected}, got {actual}")]
    UnexpectedState { expected: u8, actual: u8 },

    #[error("pairing TLV carried error code {0}")]
    TlvError(u8),

    #[error(transparent)]
    Tlv(#[from] crate::tlv::TlvError),

    #[error(transparent)]
    Crypto(#[from] crate::crypto::CryptoError),

    #[error(transparent)]
    Session(#[from] crate::session::SessionError),
}

/// Wraps one raw byte string as an HTTP/1.1 request with the given method,
/// path, and TLV8 content type.
#[must_use]
pub fn tlv_request(method: &str, path: &str, body: &[u8]) -> Vec<u8> {
    http_request(method, path, "application/pairing+tlv8", body)
}

/// Wraps a body as an HTTP/1.1 request with an explicit content type.
#[must_use]
pub fn http_request(method: &str, path: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
    let mut out = format!("{method} {path} HTTP/1.1\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n\r\n", body.len()).into_bytes();
    out.extend_from_slice(body);
    out
}

/// Extracts the HTTP status line and the TLV8 body from a raw response.
fn split_response(raw: &[u8]) -> (String, Vec<u8>) {
    let text = String::from_utf8_lossy(raw);
    let status_line = text.lines().next().unwrap_or_default().to_string();
    let idx = raw.windows(4).position(|w| w == b"\r\n\r\n").map_or(raw.len(), |i| i + 4);
    (status_line, raw[idx..].to_vec())
}

fn expect_ok(raw: &[u8]) -> Result<Vec<u8>, HarnessError> {
    let (status_line, body) = split_response(raw);
    if !status_line.starts_with("HTTP/1.1 200") {
        return Err(HarnessError::UnexpectedStatus(status_line));
    }
    Ok(body)
}

fn expect_state(tlv: &TlvReader, expected: u8) -> Result<(), HarnessError> {
    if let Some(code) = tlv.get_error() {
        return Err(HarnessError::TlvError(code));
    }
    let actual = tlv.get_state()?;
    if actual != expected {
        return Err(HarnessError::UnexpectedState { expected, actual });
    }
    Ok(())
}

/// Drives a pair-setup (SRP) and pair-verify (Curve25519) handshake
/// against a real [`Session`] the way a HomeKit controller would, so
/// scenario tests can exercise the wire protocol end to end without a
/// socket. One instance represents one controller identity; keep it
/// around across reconnects to exercise stored-pairing lookups.
pub struct MockController {
    keys: Ed25519KeyPair,
    controller_id: String,
    client_secret: BigUint,
}

impl MockController {
    /// Builds a controller identity with a 36-byte HAP-shaped id, e.g.
    /// `"AA:BB:CC:DD:EE:FF:00:11:22:33:44:55:66:77:88:99-0000-..."`.
    #[must_use]
    pub fn new(controller_id: impl Into<String>) -> Self {
        let mut rng = rand::thread_rng();
        let mut secret_bytes = [0u8; 32];
        rng.fill(&mut secret_bytes);
        Self {
            keys: Ed25519KeyPair::generate(),
            controller_id: controller_id.into(),
            client_secret: BigUint::from_bytes_be(&secret_bytes),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.controller_id
    }

    #[must_use]
    pub fn public_key(&self) -> Ed25519PublicKey {
        self.keys.public_key()
    }

    /// Runs the full M1..M6 pair-setup exchange over `session`, returning
    /// once the accessory has persisted this controller as an admin
    /// pairing (§4.6, scenario S1).
    #[allow(clippy::too_many_arguments)]
    pub fn pair_setup<B: StoreBackend>(
        &self,
        session: &mut Session,
        tree: &mut Accessory,
        store: &mut PairingStore<B>,
        events: &EventDispatcher,
        accessory_id: &str,
        accessory_keys: &Ed25519KeyPair,
        setup_code: &[u8],
    ) -> Result<(), HarnessError> {
        let m1 = TlvEncoder::new().add_state(1).build();
        let outcome = session.process_incoming(&tlv_request("POST", "/pair-setup", &m1), tree, store, events, accessory_id, accessory_keys, setup_code, false)?;
        let m2 = TlvReader::decode(&expect_ok(&outcome.outgoing)?)?;
        expect_state(&m2, 2)?;

        let salt = m2.get_required(TlvType::Salt)?;
        let server_public = m2.get_required(TlvType::PublicKey)?;
        let (client_public, client_proof, session_key) = self.srp_respond(setup_code, salt, server_public);

        let m3 = TlvEncoder::new().add_state(3).add(TlvType::PublicKey, &client_public).add(TlvType::Proof, &client_proof).build();
        let outcome = session.process_incoming(&tlv_request("POST", "/pair-setup", &m3), tree, store, events, accessory_id, accessory_keys, setup_code, false)?;
        let m4 = TlvReader::decode(&expect_ok(&outcome.outgoing)?)?;
        expect_state(&m4, 4)?;

        let m5 = self.build_m5(&session_key)?;
        let outcome = session.process_incoming(&tlv_request("POST", "/pair-setup", &m5), tree, store, events, accessory_id, accessory_keys, setup_code, false)?;
        let m6 = TlvReader::decode(&expect_ok(&outcome.outgoing)?)?;
        expect_state(&m6, 6)?;

        Ok(())
    }

    fn srp_respond(&self, password: &[u8], salt: &[u8], server_public: &[u8]) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        let (n, g) = group();
        let k = BigUint::from_bytes_be(&Sha512::digest([pad(&n.to_bytes_be()), pad(&g.to_bytes_be())].concat()));

        let a_pub = g.modpow(&self.client_secret, &n);
        let a_pub_bytes = pad(&a_pub.to_bytes_be());
        let b_pub = BigUint::from_bytes_be(server_public);

        let u = BigUint::from_bytes_be(&Sha512::digest([a_pub_bytes.clone(), pad(&b_pub.to_bytes_be())].concat()));
        let x = compute_x(salt, password);

        let g_x = g.modpow(&x, &n);
        let k_g_x = (&k * g_x) % &n;
        let base = if b_pub >= k_g_x { (&b_pub - &k_g_x) % &n } else { (&n - (&k_g_x - &b_pub) % &n) % &n };
        let exp = &self.client_secret + (&u * &x);
        let s_shared = base.modpow(&exp, &n);
        let session_key = Sha512::digest(s_shared.to_bytes_be()).to_vec();

        let hn = Sha512::digest(n.to_bytes_be());
        let hg = Sha512::digest(g.to_bytes_be());
        let mut hn_xor_hg = [0u8; 64];
        for i in 0..64 {
            hn_xor_hg[i] = hn[i] ^ hg[i];
        }
        let h_user = Sha512::digest(b"Pair-Setup");
        let mut hasher = Sha512::new();
        hasher.update(hn_xor_hg);
        hasher.update(h_user);
        hasher.update(salt);
        hasher.update(&a_pub_bytes);
        hasher.update(server_public);
        hasher.update(&session_key);
        let proof = hasher.finalize().to_vec();

        (a_pub_bytes, proof, session_key)
    }

    fn build_m5(&self, session_key: &[u8]) -> Result<Vec<u8>, HarnessError> {
        let encrypt_key = derive_key_32(session_key, "Pair-Setup-Encrypt-Salt", "Pair-Setup-Encrypt-Info\u{1}")?;
        let device_x = derive_key_32(session_key, "Pair-Setup-Controller-Sign-Salt", "Pair-Setup-Controller-Sign-Info\u{1}")?;

        let device_ltpk = *self.keys.public_key().as_bytes();
        let mut signed = Vec::with_capacity(32 + self.controller_id.len() + 32);
        signed.extend_from_slice(&device_x);
        signed.extend_from_slice(self.controller_id.as_bytes());
        signed.extend_from_slice(&device_ltpk);
        let signature = self.keys.sign(&signed);

        let inner = TlvEncoder::new()
            .add(TlvType::Identifier, self.controller_id.as_bytes())
            .add(TlvType::PublicKey, &device_ltpk)
            .add(TlvType::Signature, &signature.to_bytes())
            .build();

        let cipher = ChaCha20Poly1305Cipher::new(&encrypt_key)?;
        let encrypted = cipher.encrypt(&Nonce::from_label(b"PS-Msg05"), &inner)?;
        Ok(TlvEncoder::new().add_state(5).add(TlvType::EncryptedData, &encrypted).build())
    }

    /// Runs V1..V4 pair-verify over `session`, returning a [`RecordLayer`]
    /// keyed from the controller's side (swapped relative to the
    /// accessory's) so the caller can immediately encrypt follow-up
    /// requests and decrypt responses (§4.7, scenario S2).
    #[allow(clippy::too_many_arguments)]
    pub fn pair_verify<B: StoreBackend>(
        &self,
        session: &mut Session,
        tree: &mut Accessory,
        store: &mut PairingStore<B>,
        events: &EventDispatcher,
        accessory_id: &str,
        accessory_keys: &Ed25519KeyPair,
        setup_code: &[u8],
    ) -> Result<RecordLayer, HarnessError> {
        let ephemeral = X25519KeyPair::generate();
        let v1 = TlvEncoder::new().add_state(1).add(TlvType::PublicKey, ephemeral.public_key().as_bytes()).build();
        let outcome = session.process_incoming(&tlv_request("POST", "/pair-verify", &v1), tree, store, events, accessory_id, accessory_keys, setup_code, false)?;
        let v2 = TlvReader::decode(&expect_ok(&outcome.outgoing)?)?;
        expect_state(&v2, 2)?;

        let accessory_public_bytes = v2.get_required(TlvType::PublicKey)?;
        let accessory_public = X25519PublicKey::from_bytes(accessory_public_bytes)?;
        let encrypted = v2.get_required(TlvType::EncryptedData)?;

        let shared = ephemeral.diffie_hellman(&accessory_public)?;
        let session_key = derive_key_32(shared.as_bytes(), "Pair-Verify-Encrypt-Salt", "Pair-Verify-Encrypt-Info\u{1}")?;
        let cipher = ChaCha20Poly1305Cipher::new(&session_key)?;
        let plaintext = cipher.decrypt(&Nonce::from_label(b"PV-Msg02"), encrypted).map_err(|_| HarnessError::TlvError(crate::tlv::errors::AUTHENTICATION))?;

        let inner = TlvReader::decode(&plaintext)?;
        let identifier = inner.get_required(TlvType::Identifier)?;
        let accessory_sig = Ed25519Signature::from_bytes(inner.get_required(TlvType::Signature)?)?;
        let mut verify_data = Vec::new();
        verify_data.extend_from_slice(accessory_public_bytes);
        verify_data.extend_from_slice(identifier);
        verify_data.extend_from_slice(ephemeral.public_key().as_bytes());
        accessory_keys.public_key().verify(&verify_data, &accessory_sig)?;

        let mut my_sign = Vec::new();
        my_sign.extend_from_slice(ephemeral.public_key().as_bytes());
        my_sign.extend_from_slice(self.controller_id.as_bytes());
        my_sign.extend_from_slice(accessory_public_bytes);
        let my_sig = self.keys.sign(&my_sign);

        let my_inner = TlvEncoder::new().add(TlvType::Identifier, self.controller_id.as_bytes()).add(TlvType::Signature, &my_sig.to_bytes()).build();
        let my_encrypted = cipher.encrypt(&Nonce::from_label(b"PV-Msg03"), &my_inner)?;
        let v3 = TlvEncoder::new().add_state(3).add(TlvType::EncryptedData, &my_encrypted).build();

        let outcome = session.process_incoming(&tlv_request("POST", "/pair-verify", &v3), tree, store, events, accessory_id, accessory_keys, setup_code, false)?;
        let v4 = TlvReader::decode(&expect_ok(&outcome.outgoing)?)?;
        expect_state(&v4, 4)?;

        // Same HKDF info strings as `VerifiedSession`: "Control-Read..."
        // names the accessory->controller direction (what the controller
        // reads), "Control-Write..." names controller->accessory (what the
        // controller writes). RecordLayer::new wants (write_key, read_key)
        // from the caller's own perspective, which these already are.
        let read_key = derive_key_32(shared.as_bytes(), "Control-Salt", "Control-Read-Encryption-Key\u{1}")?;
        let write_key = derive_key_32(shared.as_bytes(), "Control-Salt", "Control-Write-Encryption-Key\u{1}")?;
        Ok(RecordLayer::new(write_key, read_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessory::{build_information_service, AccessoryIdentity};
    use crate::pairing::MemoryBackend;
    use std::sync::Arc;

    fn test_tree() -> Accessory {
        let info = build_information_service(
            &AccessoryIdentity { name: "n".into(), manufacturer: "m".into(), model: "m".into(), serial_number: "s".into(), firmware_revision: "f".into() },
            Arc::new(|| {}),
        );
        Accessory::new(vec![info])
    }

    #[test]
    fn mock_controller_completes_setup_and_verify() {
        let mut session = Session::new();
        let mut tree = test_tree();
        let mut store = PairingStore::open(MemoryBackend::default()).unwrap();
        let events = EventDispatcher::new();
        let accessory_id = store.accessory_id().unwrap();
        let accessory_keys = store.accessory_keypair().unwrap();

        let controller = MockController::new("AA:BB:CC:DD:EE:FF:00:11:22:33:44:55:66:77:88:99-0000-0000-0000-0000-0000-0000-0000-0000");
        controller.pair_setup(&mut session, &mut tree, &mut store, &events, &accessory_id, &accessory_keys, b"123-45-678").unwrap();
        assert!(store.is_paired());

        let mut verify_session = Session::new();
        let record = controller.pair_verify(&mut verify_session, &mut tree, &mut store, &events, &accessory_id, &accessory_keys, b"123-45-678").unwrap();
        assert!(verify_session.is_encrypted());
        drop(record);
    }
}
