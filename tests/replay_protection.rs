//! S4: replaying a captured ciphertext frame once the session has moved
//! past it must fail AEAD verification rather than being accepted twice.

use std::sync::Arc;

use hap_accessory::accessory::{build_information_service, Accessory, AccessoryIdentity};
use hap_accessory::events::EventDispatcher;
use hap_accessory::pairing::{MemoryBackend, PairingStore};
use hap_accessory::session::{Session, SessionError};
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
fn replaying_a_consumed_frame_fails_auth_and_the_session_must_close() {
    let mut setup_session = Session::new();
    let mut tree = lamp_tree();
    let mut store = PairingStore::open(MemoryBackend::default()).unwrap();
    let events = EventDispatcher::new();
    let accessory_id = store.accessory_id().unwrap();
    let accessory_keys = store.accessory_keypair().unwrap();

    let controller = MockController::new(CONTROLLER_ID);
    controller.pair_setup(&mut setup_session, &mut tree, &mut store, &events, &accessory_id, &accessory_keys, SETUP_CODE).unwrap();

    let mut session = Session::new();
    let mut controller_record = controller.pair_verify(&mut session, &mut tree, &mut store, &events, &accessory_id, &accessory_keys, SETUP_CODE).unwrap();

    let request = controller_record.encrypt(&http_request("GET", "/accessories", "application/hap+json", &[])).unwrap();
    session.process_incoming(&request, &mut tree, &mut store, &events, &accessory_id, &accessory_keys, SETUP_CODE, false).unwrap();

    // Advance the session's read counter with a second, legitimate request
    // before replaying the first frame captured above.
    let second = controller_record.encrypt(&http_request("GET", "/accessories", "application/hap+json", &[])).unwrap();
    session.process_incoming(&second, &mut tree, &mut store, &events, &accessory_id, &accessory_keys, SETUP_CODE, false).unwrap();

    let replay = session.process_incoming(&request, &mut tree, &mut store, &events, &accessory_id, &accessory_keys, SETUP_CODE, false);
    assert!(matches!(replay, Err(SessionError::Record(hap_accessory::record::RecordError::AuthFailed))));
}
