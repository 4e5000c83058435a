//! Accessory tree root (§3): a single root Accessory (`aid = 1`, the only
//! value HAP permits for a single-accessory core) owning an ordered
//! sequence of Services, each owning an ordered sequence of
//! Characteristics. `iid`s are assigned once at startup by depth-first
//! traversal and are then immutable (§9: ascending indices replace parent
//! pointers, so lookups go through the tree root rather than shared-owning
//! back-references).

use serde_json::json;

use super::characteristic::Characteristic;
use super::service::Service;

/// The fixed accessory identifier this core always uses.
pub const ROOT_AID: u64 = 1;

pub struct Accessory {
    pub aid: u64,
    pub services: Vec<Service>,
}

impl Accessory {
    /// Build the root accessory from its services and assign every `iid`
    /// by depth-first traversal starting at 1 (§3).
    #[must_use]
    pub fn new(mut services: Vec<Service>) -> Self {
        let mut next_iid = 1u64;
        for service in &mut services {
            service.iid = next_iid;
            next_iid += 1;
            for characteristic in &mut service.characteristics {
                characteristic.iid = next_iid;
                next_iid += 1;
            }
        }
        Self { aid: ROOT_AID, services }
    }

    #[must_use]
    pub fn service(&self, iid: u64) -> Option<&Service> {
        self.services.iter().find(|s| s.iid == iid)
    }

    pub fn service_mut(&mut self, iid: u64) -> Option<&mut Service> {
        self.services.iter_mut().find(|s| s.iid == iid)
    }

    /// Find a characteristic anywhere in the tree by its `iid`.
    #[must_use]
    pub fn characteristic(&self, iid: u64) -> Option<&Characteristic> {
        self.services.iter().find_map(|s| s.characteristic(iid))
    }

    pub fn characteristic_mut(&mut self, iid: u64) -> Option<&mut Characteristic> {
        self.services.iter_mut().find_map(|s| s.characteristic_mut(iid))
    }

    /// Locate the `Identify` characteristic in the `AccessoryInformation`
    /// service, used by `POST /identify` (§4.8) to trigger identification
    /// without going through the ordinary `PUT /characteristics` path.
    #[must_use]
    pub fn identify_iid(&self) -> Option<u64> {
        self.services
            .iter()
            .find(|s| s.service_type == super::uuid::services::ACCESSORY_INFORMATION)
            .and_then(|s| s.characteristics.iter().find(|c| c.char_type == super::uuid::characteristics::IDENTIFY))
            .map(|c| c.iid)
    }

    /// Render the `{"accessories":[{"aid":1,"services":[...]}]}` body for
    /// `GET /accessories` (§4.8), the Information service listed first
    /// because it is always the first service in `self.services` (built
    /// that way by [`crate::accessory::information::build`] and caller
    /// convention).
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let services: Vec<_> = self
            .services
            .iter()
            .map(|service| {
                json!({
                    "iid": service.iid,
                    "type": service.service_type,
                    "hidden": service.hidden,
                    "primary": service.primary,
                    "characteristics": service.characteristics.iter().map(|c| {
                        json!({
                            "iid": c.iid,
                            "type": c.char_type,
                            "perms": permission_strings(c.permissions),
                            "format": format_string(c.format),
                            "value": c.read().to_json(),
                        })
                    }).collect::<Vec<_>>(),
                })
            })
            .collect();

        json!({ "aid": self.aid, "services": services })
    }
}

fn format_string(format: super::characteristic::Format) -> &'static str {
    use super::characteristic::Format;
    match format {
        Format::Bool => "bool",
        Format::Uint8 => "uint8",
        Format::Uint16 => "uint16",
        Format::Uint32 => "uint32",
        Format::Uint64 => "uint64",
        Format::Int => "int",
        Format::Float => "float",
        Format::String => "string",
        Format::Tlv8 => "tlv8",
        Format::Data => "data",
    }
}

fn permission_strings(permissions: super::characteristic::Permissions) -> Vec<&'static str> {
    use super::characteristic::Permissions;
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
    if permissions.contains(Permissions::ADDITIONAL_AUTHORIZATION) {
        out.push("aa");
    }
    if permissions.contains(Permissions::TIMED_WRITE) {
        out.push("tw");
    }
    if permissions.contains(Permissions::HIDDEN) {
        out.push("hd");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessory::characteristic::Format;
    use std::sync::Arc;

    fn info_identity() -> super::super::information::AccessoryIdentity {
        super::super::information::AccessoryIdentity {
            name: "Lamp".into(),
            manufacturer: "Acme".into(),
            model: "L1".into(),
            serial_number: "SN1".into(),
            firmware_revision: "1.0".into(),
        }
    }

    #[test]
    fn iids_assigned_depth_first_starting_at_one() {
        let info = super::super::information::build(&info_identity(), Arc::new(|| {}));
        let lightbulb = Service::new("00000043-0000-1000-8000-0026BB765291").with_characteristic(Characteristic::new(
            "00000025-0000-1000-8000-0026BB765291",
            Format::Bool,
            super::super::characteristic::Permissions::PAIRED_READ,
        ));

        let accessory = Accessory::new(vec![info, lightbulb]);
        assert_eq!(accessory.services[0].iid, 1);
        assert_eq!(accessory.services[0].characteristics[0].iid, 2);
        // 6 characteristics in AccessoryInformation -> iids 2..=7, service iid 1.
        assert_eq!(accessory.services[1].iid, 8);
        assert_eq!(accessory.services[1].characteristics[0].iid, 9);
    }

    #[test]
    fn aid_is_always_one() {
        let accessory = Accessory::new(vec![]);
        assert_eq!(accessory.aid, ROOT_AID);
    }

    #[test]
    fn characteristic_lookup_by_iid_traverses_all_services() {
        let info = super::super::information::build(&info_identity(), Arc::new(|| {}));
        let accessory = Accessory::new(vec![info]);
        assert!(accessory.characteristic(2).is_some());
        assert!(accessory.characteristic(999).is_none());
    }
}
