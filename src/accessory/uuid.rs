//! Well-known HAP service/characteristic type UUIDs needed for the
//! mandatory `AccessoryInformation` service (§3 invariant).

pub mod services {
    pub const ACCESSORY_INFORMATION: &str = "0000003E-0000-1000-8000-0026BB765291";
}

pub mod characteristics {
    pub const IDENTIFY: &str = "00000014-0000-1000-8000-0026BB765291";
    pub const MANUFACTURER: &str = "00000020-0000-1000-8000-0026BB765291";
    pub const MODEL: &str = "00000021-0000-1000-8000-0026BB765291";
    pub const NAME: &str = "00000023-0000-1000-8000-0026BB765291";
    pub const SERIAL_NUMBER: &str = "00000030-0000-1000-8000-0026BB765291";
    pub const FIRMWARE_REVISION: &str = "00000052-0000-1000-8000-0026BB765291";
}
