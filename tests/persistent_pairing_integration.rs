//! S5: removing the last admin pairing triggers state=2 on the wire and a
//! required restart, after which the next mDNS advertisement reverts `sf`
//! to unpaired.

use std::sync::Arc;

use hap_accessory::accessory::{build_information_service, Accessory, AccessoryIdentity};
use hap_accessory::config::AccessoryConfig;
use hap_accessory::events::EventDispatcher;
use hap_accessory::pairing::{MemoryBackend, PairingStore};
use hap_accessory::session::Session;
use hap_accessory::testing::{http_request, MockController};
use hap_accessory::tlv::{methods, TlvEncoder, TlvReader, TlvType};

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
fn removing_the_last_admin_restarts_and_readvertises_as_unpaired() {
    let mut setup_session = Session::new();
    let mut tree = lamp_tree();
    let mut store = PairingStore::open(MemoryBackend::default()).unwrap();
    let events = EventDispatcher::new();
    let accessory_id = store.accessory_id().unwrap();
    let accessory_keys = store.accessory_keypair().unwrap();
    let config = AccessoryConfig::builder("Lamp").build().unwrap();

    let controller = MockController::new(CONTROLLER_ID);
    controller.pair_setup(&mut setup_session, &mut tree, &mut store, &events, &accessory_id, &accessory_keys, SETUP_CODE).unwrap();
    assert_eq!(config.txt_record(&accessory_id, store.is_paired()).get("sf").unwrap(), "0");

    let mut session = Session::new();
    let mut controller_record = controller.pair_verify(&mut session, &mut tree, &mut store, &events, &accessory_id, &accessory_keys, SETUP_CODE).unwrap();

    let remove_body = TlvEncoder::new()
        .add_state(1)
        .add_u8(TlvType::Method, methods::REMOVE_PAIRING)
        .add(TlvType::Identifier, CONTROLLER_ID.as_bytes())
        .build();
    let request = controller_record.encrypt(&http_request("POST", "/pairings", "application/pairing+tlv8", &remove_body)).unwrap();
    let outcome = session.process_incoming(&request, &mut tree, &mut store, &events, &accessory_id, &accessory_keys, SETUP_CODE, false).unwrap();

    controller_record.feed(&outcome.outgoing);
    let reply_bytes = controller_record.decrypt_all().unwrap().concat();
    let body_start = reply_bytes.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
    let reply = TlvReader::decode(&reply_bytes[body_start..]).unwrap();
    assert_eq!(reply.get_state().unwrap(), 2);

    assert!(outcome.restart_required);
    assert!(!store.is_paired());
    assert_eq!(config.txt_record(&accessory_id, store.is_paired()).get("sf").unwrap(), "1");
}
