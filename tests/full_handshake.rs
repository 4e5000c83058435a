//! S1 (pair-setup happy path) and S2 (pair-verify then GET /accessories).

use std::sync::Arc;

use hap_accessory::accessory::{build_information_service, Accessory, AccessoryIdentity};
use hap_accessory::config::AccessoryConfig;
use hap_accessory::events::EventDispatcher;
use hap_accessory::pairing::{MemoryBackend, PairingStore};
use hap_accessory::record::RecordLayer;
use hap_accessory::session::Session;
use hap_accessory::testing::{http_request, MockController};

const CONTROLLER_ID: &str = "AA:BB:CC:DD:EE:FF:00:11:22:33:44:55:66:77:88:99-0000-0000-0000-0000-0000-0000-0000-0000";
const SETUP_CODE: &[u8] = b"123-45-678";

fn lamp_tree() -> Accessory {
    let identity = AccessoryIdentity {
        name: "Lamp".into(),
        manufacturer: "Acme".into(),
        model: "L1".into(),
        serial_number: "SN1".into(),
        firmware_revision: "1.0".into(),
    };
    Accessory::new(vec![build_information_service(&identity, Arc::new(|| {}))])
}

#[test]
fn pair_setup_happy_path_persists_an_admin_pairing() {
    let mut session = Session::new();
    let mut tree = lamp_tree();
    let mut store = PairingStore::open(MemoryBackend::default()).unwrap();
    let events = EventDispatcher::new();
    let accessory_id = store.accessory_id().unwrap();
    let accessory_keys = store.accessory_keypair().unwrap();

    let config = AccessoryConfig::builder("Lamp").build().unwrap();
    assert_eq!(config.txt_record(&accessory_id, store.is_paired()).get("sf").unwrap(), "1");

    let controller = MockController::new(CONTROLLER_ID);
    controller.pair_setup(&mut session, &mut tree, &mut store, &events, &accessory_id, &accessory_keys, SETUP_CODE).unwrap();

    assert!(store.is_paired());
    assert!(store.find(CONTROLLER_ID).is_some());
    assert_eq!(config.txt_record(&accessory_id, store.is_paired()).get("sf").unwrap(), "0");
}

#[test]
fn pair_verify_then_get_accessories_returns_the_information_service_first() {
    let mut setup_session = Session::new();
    let mut tree = lamp_tree();
    let mut store = PairingStore::open(MemoryBackend::default()).unwrap();
    let events = EventDispatcher::new();
    let accessory_id = store.accessory_id().unwrap();
    let accessory_keys = store.accessory_keypair().unwrap();

    let controller = MockController::new(CONTROLLER_ID);
    controller.pair_setup(&mut setup_session, &mut tree, &mut store, &events, &accessory_id, &accessory_keys, SETUP_CODE).unwrap();

    // A fresh TCP connection for pair-verify, as a real controller would
    // open once it has a stored admin pairing rather than reusing the
    // pair-setup socket.
    let mut verify_session = Session::new();
    let mut controller_record: RecordLayer =
        controller.pair_verify(&mut verify_session, &mut tree, &mut store, &events, &accessory_id, &accessory_keys, SETUP_CODE).unwrap();
    assert!(verify_session.is_encrypted());

    let request = controller_record.encrypt(&http_request("GET", "/accessories", "application/hap+json", &[])).unwrap();
    let outcome = verify_session.process_incoming(&request, &mut tree, &mut store, &events, &accessory_id, &accessory_keys, SETUP_CODE, false).unwrap();

    controller_record.feed(&outcome.outgoing);
    let plaintext = controller_record.decrypt_all().unwrap().concat();
    let text = String::from_utf8_lossy(&plaintext);
    assert!(text.starts_with("HTTP/1.1 200 OK"));

    let body_start = plaintext.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
    let json: serde_json::Value = serde_json::from_slice(parse_chunked_body(&plaintext[body_start..]).as_slice()).unwrap();
    let accessories = json["accessories"].as_array().unwrap();
    assert_eq!(accessories.len(), 1);
    let first_service = &accessories[0]["services"][0];
    assert_eq!(first_service["type"], "0000003E-0000-1000-8000-0026BB765291");
}

/// Reassembles a chunked-transfer-encoded body into its raw bytes.
fn parse_chunked_body(mut chunked: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let line_end = chunked.windows(2).position(|w| w == b"\r\n").unwrap();
        let size_str = std::str::from_utf8(&chunked[..line_end]).unwrap();
        let size = usize::from_str_radix(size_str.trim(), 16).unwrap();
        if size == 0 {
            break;
        }
        let data_start = line_end + 2;
        out.extend_from_slice(&chunked[data_start..data_start + size]);
        chunked = &chunked[data_start + size + 2..];
    }
    out
}
