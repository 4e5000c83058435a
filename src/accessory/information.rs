//! Builds the mandatory `AccessoryInformation` service (§3 invariant:
//! "exactly one Service of type AccessoryInformation ... Name,
//! Manufacturer, Model, SerialNumber, FirmwareRevision, Identify").

use std::sync::Arc;

use super::characteristic::{Characteristic, Format, Permissions};
use super::service::Service;
use super::uuid::{characteristics, services};
use super::value::CharacteristicValue;

/// Static identity fields the `AccessoryInformation` service publishes.
#[derive(Debug, Clone)]
pub struct AccessoryIdentity {
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
    pub firmware_revision: String,
}

/// Build the `AccessoryInformation` service. `on_identify` is invoked when
/// a controller writes the `Identify` characteristic (or POSTs
/// `/identify` before pairing); it never blocks the router.
pub fn build(identity: &AccessoryIdentity, on_identify: Arc<dyn Fn() + Send + Sync>) -> Service {
    Service::new(services::ACCESSORY_INFORMATION)
        .primary()
        .with_characteristic(
            Characteristic::new(characteristics::NAME, Format::String, Permissions::PAIRED_READ)
                .with_value(CharacteristicValue::String(identity.name.clone())),
        )
        .with_characteristic(
            Characteristic::new(characteristics::MANUFACTURER, Format::String, Permissions::PAIRED_READ)
                .with_value(CharacteristicValue::String(identity.manufacturer.clone())),
        )
        .with_characteristic(
            Characteristic::new(characteristics::MODEL, Format::String, Permissions::PAIRED_READ)
                .with_value(CharacteristicValue::String(identity.model.clone())),
        )
        .with_characteristic(
            Characteristic::new(characteristics::SERIAL_NUMBER, Format::String, Permissions::PAIRED_READ)
                .with_value(CharacteristicValue::String(identity.serial_number.clone())),
        )
        .with_characteristic(
            Characteristic::new(characteristics::FIRMWARE_REVISION, Format::String, Permissions::PAIRED_READ)
                .with_value(CharacteristicValue::String(identity.firmware_revision.clone())),
        )
        .with_characteristic(
            Characteristic::new(characteristics::IDENTIFY, Format::Bool, Permissions::PAIRED_WRITE)
                .with_value(CharacteristicValue::Bool(false))
                .with_write_hook(Arc::new(move |_| on_identify())),
        )
}
