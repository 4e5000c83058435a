//! The accessory object tree (§3): Accessory -> Services -> Characteristics,
//! plus the dynamic-typed value model backing every characteristic.

mod accessory;
mod characteristic;
mod information;
mod service;
pub mod uuid;
mod value;

pub use accessory::{Accessory, ROOT_AID};
pub use characteristic::{Characteristic, Format, NumericConstraints, Permissions, ReadHook, WriteHook};
pub use information::{build as build_information_service, AccessoryIdentity};
pub use service::Service;
pub use value::{CharacteristicValue, ValueError};
