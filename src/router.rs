//! HAP request router: dispatches parsed HTTP requests to the pairing
//! engines, the accessory tree, or the event subscription table.
//! Transport-agnostic — operates on already-decoded [`HttpRequest`]s and
//! borrowed shared state; [`crate::session::Session`] owns the I/O.

use serde_json::{json, Value as Json};
use thiserror::Error;

use crate::accessory::{Accessory, CharacteristicValue, Permissions, ROOT_AID};
use crate::events::EventDispatcher;
use crate::http::{HttpRequest, Method, ResponseBuilder, StatusCode};
use crate::pairing::{PairSetupEngine, PairVerifyEngine, PairingStore, StoreBackend, VerifiedSession, PERMISSION_ADMIN};
use crate::tlv::{errors, methods, TlvEncoder, TlvReader, TlvType};

/// HAP JSON `status` field codes.
pub mod hap_status {
    pub const SUCCESS: i32 = 0;
    pub const INSUFFICIENT_PRIVILEGES: i32 = -70401;
    pub const UNABLE_TO_COMMUNICATE: i32 = -70402;
    pub const RESOURCE_BUSY: i32 = -70403;
    pub const READ_ONLY: i32 = -70404;
    pub const WRITE_ONLY: i32 = -70405;
    pub const NOTIFICATIONS_UNSUPPORTED: i32 = -70406;
    pub const OUT_OF_RESOURCES: i32 = -70407;
    pub const TIMEOUT: i32 = -70408;
    pub const NO_RESOURCE: i32 = -70409;
    pub const INVALID_VALUE: i32 = -70410;
    pub const INSUFFICIENT_AUTHORIZATION: i32 = -70411;
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("malformed characteristics query string")]
    MalformedQuery,
}

/// Everything the router produced from one request, beyond the HTTP
/// response bytes themselves.
pub struct RouteResult {
    pub response_bytes: Vec<u8>,
    /// Set when a pair-verify V3 just succeeded: the caller must switch
    /// the session to Encrypted using these keys. The switch must happen
    /// atomically with this result being returned — there must be no
    /// window where the keys exist but the session is still unencrypted.
    pub verify_complete: Option<VerifiedSession>,
    /// Peer slots whose sessions must be closed (admin removed their
    /// pairing via RemovePairing).
    pub close_peer_slots: Vec<usize>,
    /// The last admin pairing was removed; the accessory must reset to
    /// unpaired and restart.
    pub restart_required: bool,
}

impl RouteResult {
    fn just(response_bytes: Vec<u8>) -> Self {
        Self { response_bytes, verify_complete: None, close_peer_slots: Vec::new(), restart_required: false }
    }
}

/// Caller-owned identity of the current peer, if pair-verify has
/// completed for this session.
#[derive(Debug, Clone, Copy)]
pub struct PeerIdentity {
    pub slot: usize,
    pub permissions: u8,
}

impl PeerIdentity {
    #[must_use]
    pub fn is_admin(self) -> bool {
        self.permissions & PERMISSION_ADMIN != 0
    }
}

/// Routes one request. `session_id` identifies the caller for event
/// subscription/exclusion; `encrypted` reports whether the session has
/// completed pair-verify; `peer` is `Some` once it has.
#[allow(clippy::too_many_arguments)]
pub fn route<B: StoreBackend>(
    request: &HttpRequest,
    tree: &mut Accessory,
    store: &mut PairingStore<B>,
    events: &EventDispatcher,
    pair_setup: &mut PairSetupEngine,
    pair_verify: &mut PairVerifyEngine,
    accessory_id: &str,
    accessory_keys: &crate::crypto::Ed25519KeyPair,
    setup_code: &[u8],
    session_id: u64,
    encrypted: bool,
    peer: Option<PeerIdentity>,
    other_session_pairing: bool,
) -> RouteResult {
    let path = request.path_without_query();

    match (request.method, path) {
        (Method::Post, "/pair-setup") => route_pair_setup(request, pair_setup, store, setup_code, other_session_pairing),

        (Method::Post, "/pair-verify") => route_pair_verify(request, pair_verify, store, accessory_id, accessory_keys),

        (Method::Post, "/identify") => route_identify(tree, store),

        (Method::Get, "/accessories") if encrypted => {
            RouteResult::just(ResponseBuilder::ok().chunked_json(serde_json::to_vec(&json!({ "accessories": [tree.to_json()] })).unwrap()).encode())
        }

        (Method::Get, "/characteristics") if encrypted => route_get_characteristics(request, tree, session_id),

        (Method::Put, "/characteristics") if encrypted => route_put_characteristics(request, tree, events, session_id, peer),

        (Method::Post, "/pairings") if encrypted => route_pairings(request, store, peer),

        (Method::Get, "/accessories" | "/characteristics") | (Method::Put, "/characteristics") | (Method::Post, "/pairings") => {
            RouteResult::just(ResponseBuilder::new(StatusCode::BAD_REQUEST).json(crate::http::json_status_body(hap_status::INSUFFICIENT_PRIVILEGES)).encode())
        }

        _ => RouteResult::just(ResponseBuilder::new(StatusCode::NOT_FOUND).encode()),
    }
}

fn route_pair_setup<B: StoreBackend>(request: &HttpRequest, pair_setup: &mut PairSetupEngine, store: &mut PairingStore<B>, setup_code: &[u8], other_session_pairing: bool) -> RouteResult {
    let Ok(tlv) = TlvReader::decode(&request.body) else {
        return RouteResult::just(ResponseBuilder::ok().tlv8(crate::pairing::setup_error_reply(2, errors::UNKNOWN)).encode());
    };
    let incoming_state = tlv.get_state().unwrap_or(1);

    let body = match pair_setup.handle(&request.body, store, setup_code, other_session_pairing) {
        Ok(reply) => reply,
        Err(err) => crate::pairing::setup_error_reply(incoming_state + 1, err.tlv_code()),
    };
    RouteResult::just(ResponseBuilder::ok().tlv8(body).encode())
}

fn route_pair_verify<B: StoreBackend>(
    request: &HttpRequest,
    pair_verify: &mut PairVerifyEngine,
    store: &PairingStore<B>,
    accessory_id: &str,
    accessory_keys: &crate::crypto::Ed25519KeyPair,
) -> RouteResult {
    let Ok(tlv) = TlvReader::decode(&request.body) else {
        return RouteResult::just(ResponseBuilder::ok().tlv8(crate::pairing::setup_error_reply(1, errors::UNKNOWN)).encode());
    };
    let state = tlv.get_state().unwrap_or(0);

    if state == 1 {
        let body = match pair_verify.handle_v1(&request.body, accessory_id, accessory_keys) {
            Ok(tlv) => tlv,
            Err(err) => crate::pairing::setup_error_reply(2, err.tlv_code()),
        };
        return RouteResult::just(ResponseBuilder::ok().tlv8(body).encode());
    }

    if state == 3 {
        return match pair_verify.handle_v3(&request.body, |id| store.find(id)) {
            Ok((body, verified)) => {
                let mut result = RouteResult::just(ResponseBuilder::ok().tlv8(body).encode());
                result.verify_complete = Some(verified);
                result
            }
            Err(err) => RouteResult::just(ResponseBuilder::ok().tlv8(crate::pairing::setup_error_reply(4, err.tlv_code())).encode()),
        };
    }

    RouteResult::just(ResponseBuilder::ok().tlv8(crate::pairing::setup_error_reply(state, errors::UNKNOWN)).encode())
}

fn route_identify<B: StoreBackend>(tree: &mut Accessory, store: &PairingStore<B>) -> RouteResult {
    if store.is_paired() {
        return RouteResult::just(ResponseBuilder::new(StatusCode::BAD_REQUEST).json(crate::http::json_status_body(hap_status::INSUFFICIENT_PRIVILEGES)).encode());
    }
    if let Some(iid) = tree.identify_iid() {
        let _ = tree.characteristic_mut(iid).unwrap().write(CharacteristicValue::Bool(true));
    }
    RouteResult::just(ResponseBuilder::no_content().encode())
}

/// Parses `id=A.I[,A.I]*` from a `GET /characteristics` query string,
/// plus the `meta/perms/type/ev` flags.
struct CharacteristicsQuery {
    pairs: Vec<(u64, u64)>,
    meta: bool,
    perms: bool,
    want_type: bool,
    ev: bool,
}

fn parse_query(query: &str) -> Result<CharacteristicsQuery, RouterError> {
    let mut pairs = Vec::new();
    let (mut meta, mut perms, mut want_type, mut ev) = (false, false, false, false);

    for part in query.split('&') {
        let Some((key, value)) = part.split_once('=') else { continue };
        match key {
            "id" => {
                for item in value.split(',') {
                    let (aid_str, iid_str) = item.split_once('.').ok_or(RouterError::MalformedQuery)?;
                    let aid: u64 = aid_str.parse().map_err(|_| RouterError::MalformedQuery)?;
                    let iid: u64 = iid_str.parse().map_err(|_| RouterError::MalformedQuery)?;
                    pairs.push((aid, iid));
                }
            }
            "meta" => meta = value == "1",
            "perms" => perms = value == "1",
            "type" => want_type = value == "1",
            "ev" => ev = value == "1",
            _ => {}
        }
    }

    if pairs.is_empty() {
        return Err(RouterError::MalformedQuery);
    }
    Ok(CharacteristicsQuery { pairs, meta, perms, want_type, ev })
}

fn route_get_characteristics(request: &HttpRequest, tree: &Accessory, session_id: u64) -> RouteResult {
    let Some(query_str) = request.query() else {
        return RouteResult::just(ResponseBuilder::new(StatusCode::BAD_REQUEST).json(crate::http::json_status_body(hap_status::INVALID_VALUE)).encode());
    };
    let Ok(query) = parse_query(query_str) else {
        return RouteResult::just(ResponseBuilder::new(StatusCode::BAD_REQUEST).json(crate::http::json_status_body(hap_status::INVALID_VALUE)).encode());
    };

    let mut any_failed = false;
    let mut items = Vec::with_capacity(query.pairs.len());

    for (aid, iid) in &query.pairs {
        let mut entry = json!({ "aid": aid, "iid": iid });
        if *aid != ROOT_AID {
            entry["status"] = Json::from(hap_status::NO_RESOURCE);
            any_failed = true;
            items.push(entry);
            continue;
        }
        let Some(characteristic) = tree.characteristic(*iid) else {
            entry["status"] = Json::from(hap_status::NO_RESOURCE);
            any_failed = true;
            items.push(entry);
            continue;
        };
        if !characteristic.permissions.contains(Permissions::PAIRED_READ) {
            entry["status"] = Json::from(hap_status::WRITE_ONLY);
            any_failed = true;
            items.push(entry);
            continue;
        }

        entry["value"] = characteristic.read().to_json();
        if query.meta {
            entry["format"] = Json::String(format!("{:?}", characteristic.format).to_lowercase());
            if let Some(unit) = &characteristic.unit {
                entry["unit"] = Json::String(unit.clone());
            }
        }
        if query.perms {
            entry["perms"] = json!(permission_strings(characteristic.permissions));
        }
        if query.want_type {
            entry["type"] = Json::String(characteristic.char_type.clone());
        }
        if query.ev {
            entry["ev"] = Json::Bool(characteristic.is_subscribed(session_id));
        }
        items.push(entry);
    }

    let status = if any_failed { StatusCode::MULTI_STATUS } else { StatusCode::OK };
    let body = serde_json::to_vec(&json!({ "characteristics": items })).unwrap();
    RouteResult::just(ResponseBuilder::new(status).chunked_json(body).encode())
}

fn permission_strings(permissions: Permissions) -> Vec<&'static str> {
    let mut out = Vec::new();
    if permissions.contains(Permissions::PAIRED_READ) {
        out.push("pr");
    }
    if permissions.contains(Permissions::PAIRED_WRITE) {
        out.push("pw");
    }
    if permissions.contains(Permissions::NOTIFY) {
        out.push("ev");
    }
    out
}

fn route_put_characteristics(request: &HttpRequest, tree: &mut Accessory, events: &EventDispatcher, session_id: u64, peer: Option<PeerIdentity>) -> RouteResult {
    let Ok(body): Result<Json, _> = serde_json::from_slice(&request.body) else {
        return RouteResult::just(ResponseBuilder::new(StatusCode::BAD_REQUEST).json(crate::http::json_status_body(hap_status::INVALID_VALUE)).encode());
    };
    let Some(entries) = body.get("characteristics").and_then(Json::as_array) else {
        return RouteResult::just(ResponseBuilder::new(StatusCode::BAD_REQUEST).json(crate::http::json_status_body(hap_status::INVALID_VALUE)).encode());
    };

    let mut any_failed = false;
    let mut items = Vec::with_capacity(entries.len());

    for entry in entries {
        let aid = entry.get("aid").and_then(Json::as_u64).unwrap_or(0);
        let iid = entry.get("iid").and_then(Json::as_u64).unwrap_or(0);
        let status = apply_write(tree, events, session_id, peer, aid, iid, entry);

        if status != hap_status::SUCCESS {
            any_failed = true;
            items.push(json!({ "aid": aid, "iid": iid, "status": status }));
        }
    }

    if !any_failed {
        return RouteResult::just(ResponseBuilder::no_content().encode());
    }
    let body = serde_json::to_vec(&json!({ "characteristics": items })).unwrap();
    RouteResult::just(ResponseBuilder::new(StatusCode::MULTI_STATUS).chunked_json(body).encode())
}

fn apply_write(tree: &mut Accessory, events: &EventDispatcher, session_id: u64, _peer: Option<PeerIdentity>, aid: u64, iid: u64, entry: &Json) -> i32 {
    if aid != ROOT_AID {
        return hap_status::NO_RESOURCE;
    }
    let Some(characteristic) = tree.characteristic_mut(iid) else {
        return hap_status::NO_RESOURCE;
    };

    if let Some(value_json) = entry.get("value") {
        if !characteristic.permissions.contains(Permissions::PAIRED_WRITE) {
            return hap_status::READ_ONLY;
        }
        let coerced = CharacteristicValue::coerce(value_json, characteristic.format, &characteristic.constraints);
        let value = match coerced {
            Ok(v) => v,
            Err(_) => return hap_status::INVALID_VALUE,
        };
        if characteristic.write(value.clone()).is_err() {
            return hap_status::INVALID_VALUE;
        }
        events.notify(tree, aid, iid, &value, Some(session_id));
    }

    if let Some(ev) = entry.get("ev").and_then(Json::as_bool) {
        let Some(characteristic) = tree.characteristic_mut(iid) else {
            return hap_status::NO_RESOURCE;
        };
        if !characteristic.permissions.contains(Permissions::NOTIFY) {
            return hap_status::NOTIFICATIONS_UNSUPPORTED;
        }
        if ev {
            characteristic.subscribe(session_id);
        } else {
            characteristic.unsubscribe(session_id);
        }
    }

    hap_status::SUCCESS
}

fn route_pairings<B: StoreBackend>(request: &HttpRequest, store: &mut PairingStore<B>, peer: Option<PeerIdentity>) -> RouteResult {
    let Ok(tlv) = TlvReader::decode(&request.body) else {
        return RouteResult::just(ResponseBuilder::ok().tlv8(crate::pairing::setup_error_reply(2, errors::UNKNOWN)).encode());
    };
    let Some(method) = tlv.get_u8(TlvType::Method) else {
        return RouteResult::just(ResponseBuilder::ok().tlv8(crate::pairing::setup_error_reply(2, errors::UNKNOWN)).encode());
    };

    let is_admin = peer.is_some_and(PeerIdentity::is_admin);
    if !is_admin {
        return RouteResult::just(ResponseBuilder::ok().tlv8(crate::pairing::setup_error_reply(2, errors::AUTHENTICATION)).encode());
    }

    match method {
        methods::ADD_PAIRING => route_add_pairing(&tlv, store),
        methods::REMOVE_PAIRING => route_remove_pairing(&tlv, store),
        methods::LIST_PAIRINGS => route_list_pairings(store),
        _ => RouteResult::just(ResponseBuilder::ok().tlv8(crate::pairing::setup_error_reply(2, errors::UNKNOWN)).encode()),
    }
}

fn route_add_pairing<B: StoreBackend>(tlv: &TlvReader, store: &mut PairingStore<B>) -> RouteResult {
    let Ok(identifier) = tlv.get_required(TlvType::Identifier) else {
        return RouteResult::just(ResponseBuilder::ok().tlv8(crate::pairing::setup_error_reply(2, errors::UNKNOWN)).encode());
    };
    let Ok(public_key) = tlv.get_required(TlvType::PublicKey) else {
        return RouteResult::just(ResponseBuilder::ok().tlv8(crate::pairing::setup_error_reply(2, errors::UNKNOWN)).encode());
    };
    let permissions = tlv.get_u8(TlvType::Permissions).unwrap_or(0);
    let device_id = String::from_utf8_lossy(identifier).into_owned();

    let mut key_array = [0u8; 32];
    if public_key.len() != 32 {
        return RouteResult::just(ResponseBuilder::ok().tlv8(crate::pairing::setup_error_reply(2, errors::UNKNOWN)).encode());
    }
    key_array.copy_from_slice(public_key);

    let result = if let Some(existing) = store.find(&device_id) {
        if existing.public_key != key_array {
            Err(errors::UNKNOWN)
        } else {
            store.update(&device_id, permissions).map_err(|_| errors::UNKNOWN)
        }
    } else {
        store.add(&device_id, key_array, permissions).map_err(|e| if matches!(e, crate::pairing::StorageError::MaxPeers) { errors::MAX_PEERS } else { errors::UNKNOWN })
    };

    let body = match result {
        Ok(()) => TlvEncoder::new().add_state(2).build(),
        Err(code) => crate::pairing::setup_error_reply(2, code),
    };
    RouteResult::just(ResponseBuilder::ok().tlv8(body).encode())
}

fn route_remove_pairing<B: StoreBackend>(tlv: &TlvReader, store: &mut PairingStore<B>) -> RouteResult {
    let Ok(identifier) = tlv.get_required(TlvType::Identifier) else {
        return RouteResult::just(ResponseBuilder::ok().tlv8(crate::pairing::setup_error_reply(2, errors::UNKNOWN)).encode());
    };
    let device_id = String::from_utf8_lossy(identifier).into_owned();
    let removed_slot = store.find(&device_id).map(|p| p.slot);

    let _ = store.remove(&device_id);
    let body = TlvEncoder::new().add_state(2).build();

    let mut result = RouteResult::just(ResponseBuilder::ok().tlv8(body).encode());
    if let Some(slot) = removed_slot {
        result.close_peer_slots.push(slot);
    }
    result.restart_required = !store.has_admin();
    result
}

fn route_list_pairings<B: StoreBackend>(store: &PairingStore<B>) -> RouteResult {
    let mut encoder = TlvEncoder::new().add_state(2);
    let pairings = store.list_pairings();
    for (i, pairing) in pairings.iter().enumerate() {
        if i > 0 {
            encoder = encoder.add_separator();
        }
        encoder = encoder
            .add(TlvType::Identifier, pairing.device_id.as_bytes())
            .add(TlvType::PublicKey, &pairing.public_key)
            .add_u8(TlvType::Permissions, pairing.permissions);
    }
    RouteResult::just(ResponseBuilder::ok().tlv8(encoder.build()).encode())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessory::{build_information_service, AccessoryIdentity, Characteristic, Format, Service};
    use crate::http::{HttpRequest, Headers};
    use crate::pairing::MemoryBackend;
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

    fn get_request(path: &str) -> HttpRequest {
        HttpRequest { method: Method::Get, path: path.to_string(), headers: Headers::new(), body: Vec::new() }
    }

    #[test]
    fn get_characteristics_single_success_is_200() {
        let tree = test_tree();
        let iid = tree.services[1].characteristics[0].iid;
        let request = get_request(&format!("/characteristics?id=1.{iid}"));
        let result = route_get_characteristics(&request, &tree, 1);
        let text = String::from_utf8_lossy(&result.response_bytes);
        assert!(text.starts_with("HTTP/1.1 200 OK"));
    }

    #[test]
    fn get_characteristics_missing_iid_is_207() {
        let tree = test_tree();
        let request = get_request("/characteristics?id=1.9999");
        let result = route_get_characteristics(&request, &tree, 1);
        let text = String::from_utf8_lossy(&result.response_bytes);
        assert!(text.starts_with("HTTP/1.1 207 Multi-Status"));
    }

    #[test]
    fn put_characteristics_write_notifies_other_subscriber() {
        let mut tree = test_tree();
        let iid = tree.services[1].characteristics[0].iid;
        tree.characteristic_mut(iid).unwrap().subscribe(2);
        let events = EventDispatcher::new();
        events.register_session(2);

        let body = serde_json::to_vec(&json!({ "characteristics": [{ "aid": 1, "iid": iid, "value": true }] })).unwrap();
        let request = HttpRequest { method: Method::Put, path: "/characteristics".into(), headers: Headers::new(), body };
        let result = route_put_characteristics(&request, &mut tree, &events, 1, None);

        let text = String::from_utf8_lossy(&result.response_bytes);
        assert!(text.starts_with("HTTP/1.1 204"));
        assert!(events.drain(2).is_some());
    }

    #[test]
    fn put_characteristics_rejects_read_only_write() {
        let mut tree = test_tree();
        let info_iid = tree.services[0].characteristics[0].iid; // Name, read-only
        let events = EventDispatcher::new();

        let body = serde_json::to_vec(&json!({ "characteristics": [{ "aid": 1, "iid": info_iid, "value": "x" }] })).unwrap();
        let request = HttpRequest { method: Method::Put, path: "/characteristics".into(), headers: Headers::new(), body };
        let result = route_put_characteristics(&request, &mut tree, &events, 1, None);

        let text = String::from_utf8_lossy(&result.response_bytes);
        assert!(text.starts_with("HTTP/1.1 207"));
    }

    #[test]
    fn pairings_requires_admin() {
        let mut store = PairingStore::open(MemoryBackend::default()).unwrap();
        let body = TlvEncoder::new().add_state(1).add_u8(TlvType::Method, methods::LIST_PAIRINGS).build();
        let request = HttpRequest { method: Method::Post, path: "/pairings".into(), headers: Headers::new(), body };
        let result = route_pairings(&request, &mut store, None);
        let reply = TlvReader::decode(&extract_tlv_body(&result.response_bytes)).unwrap();
        assert_eq!(reply.get_error(), Some(errors::AUTHENTICATION));
    }

    #[test]
    fn removing_last_admin_requires_restart() {
        let mut store = PairingStore::open(MemoryBackend::default()).unwrap();
        store.add("controller-1", [0x11; 32], PERMISSION_ADMIN).unwrap();

        let body = TlvEncoder::new().add_state(1).add_u8(TlvType::Method, methods::REMOVE_PAIRING).add(TlvType::Identifier, b"controller-1").build();
        let request = HttpRequest { method: Method::Post, path: "/pairings".into(), headers: Headers::new(), body };
        let result = route_pairings(&request, &mut store, Some(PeerIdentity { slot: 0, permissions: PERMISSION_ADMIN }));

        assert!(result.restart_required);
        assert_eq!(result.close_peer_slots, vec![0]);
    }

    fn extract_tlv_body(response: &[u8]) -> Vec<u8> {
        let text = String::from_utf8_lossy(response);
        let idx = text.find("\r\n\r\n").unwrap() + 4;
        response[idx..].to_vec()
    }
}
