//! Accessory configuration: static identity fields, the TCP listener port,
//! the HAP accessory category code, and the derived mDNS TXT record
//! contract. Exposed as a fluent builder so callers can set only the
//! fields they care about and let the rest default sensibly.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::pairing::MAX_PAIRINGS;

/// HAP accessory category codes (a representative subset; `ci` TXT field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Other = 1,
    Lightbulb = 5,
    Switch = 8,
    Thermostat = 9,
    Sensor = 10,
    Lock = 6,
    Outlet = 7,
    Fan = 3,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("accessory name must not be empty")]
    EmptyName,

    #[error("setup code must be exactly 8 digits (format XXX-XX-XXX)")]
    InvalidSetupCode,

    #[error("port must be nonzero")]
    InvalidPort,
}

/// Static accessory configuration: everything the session loop and the
/// mDNS advertiser need that isn't per-connection state.
#[derive(Debug, Clone)]
pub struct AccessoryConfig {
    pub name: String,
    pub model: String,
    pub manufacturer: String,
    pub serial_number: String,
    pub firmware_version: String,
    /// SRP setup code, `"XXX-XX-XXX"`, 8 digits.
    pub setup_code: String,
    /// TCP port the listener binds. Defaults to 5556.
    pub port: u16,
    pub category: Category,
    /// Optional override for the persisted accessory id, for tests that
    /// need a deterministic `"id"` TXT value rather than a random one.
    pub device_id_override: Option<String>,
    /// Optional setup id for the `sh` TXT hash.
    pub setup_id: Option<String>,
    pub max_peers: usize,
    /// Maximum concurrent controller connections.
    pub max_sessions: usize,
    pub debug_logging: bool,
    /// Current HAP configuration number (`c#` TXT field); bumped whenever
    /// the accessory's exposed attribute database changes.
    pub config_number: u32,
}

impl AccessoryConfig {
    #[must_use]
    pub fn builder(name: impl Into<String>) -> AccessoryConfigBuilder {
        AccessoryConfigBuilder::new(name)
    }

    /// Build the `md/pv/id/c#/s#/ff/sf/ci/sh` TXT record map. `sf`
    /// depends on live pairing state, not configuration, so it's a
    /// parameter rather than a config field.
    #[must_use]
    pub fn txt_record(&self, accessory_id: &str, is_paired: bool) -> BTreeMap<&'static str, String> {
        let mut txt = BTreeMap::new();
        txt.insert("md", self.model.clone());
        txt.insert("pv", "1.0".to_string());
        txt.insert("id", accessory_id.to_string());
        txt.insert("c#", self.config_number.to_string());
        txt.insert("s#", "1".to_string());
        txt.insert("ff", "0".to_string());
        txt.insert("sf", if is_paired { "0" } else { "1" }.to_string());
        txt.insert("ci", (self.category as u8).to_string());
        if let Some(setup_id) = &self.setup_id {
            txt.insert("sh", setup_hash(setup_id, accessory_id));
        }
        txt
    }
}

/// `base64(first 4 bytes of SHA-512(setup_id || accessory_id))`.
fn setup_hash(setup_id: &str, accessory_id: &str) -> String {
    use sha2::{Digest, Sha512};
    let mut hasher = Sha512::new();
    hasher.update(setup_id.as_bytes());
    hasher.update(accessory_id.as_bytes());
    let digest = hasher.finalize();
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &digest[..4])
}

/// Fluent builder for [`AccessoryConfig`]; `build()` validates and returns
/// `Result<AccessoryConfig, ConfigError>`.
#[derive(Debug, Clone)]
pub struct AccessoryConfigBuilder {
    name: String,
    model: String,
    manufacturer: String,
    serial_number: String,
    firmware_version: String,
    setup_code: String,
    port: u16,
    category: Category,
    device_id_override: Option<String>,
    setup_id: Option<String>,
    max_peers: usize,
    max_sessions: usize,
    debug_logging: bool,
    config_number: u32,
}

impl AccessoryConfigBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: "Model1,1".to_string(),
            manufacturer: "hap-accessory-rs".to_string(),
            serial_number: "000000000001".to_string(),
            firmware_version: env!("CARGO_PKG_VERSION").to_string(),
            setup_code: "123-45-678".to_string(),
            port: 5556,
            category: Category::Other,
            device_id_override: None,
            setup_id: None,
            max_peers: MAX_PAIRINGS,
            max_sessions: 16,
            debug_logging: false,
            config_number: 1,
        }
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = manufacturer.into();
        self
    }

    #[must_use]
    pub fn serial_number(mut self, serial: impl Into<String>) -> Self {
        self.serial_number = serial.into();
        self
    }

    #[must_use]
    pub fn firmware_version(mut self, version: impl Into<String>) -> Self {
        self.firmware_version = version.into();
        self
    }

    #[must_use]
    pub fn setup_code(mut self, code: impl Into<String>) -> Self {
        self.setup_code = code.into();
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    #[must_use]
    pub fn device_id_override(mut self, id: impl Into<String>) -> Self {
        self.device_id_override = Some(id.into());
        self
    }

    #[must_use]
    pub fn setup_id(mut self, setup_id: impl Into<String>) -> Self {
        self.setup_id = Some(setup_id.into());
        self
    }

    #[must_use]
    pub fn max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    #[must_use]
    pub fn debug_logging(mut self, debug: bool) -> Self {
        self.debug_logging = debug;
        self
    }

    pub fn build(self) -> Result<AccessoryConfig, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        let digits: String = self.setup_code.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() != 8 {
            return Err(ConfigError::InvalidSetupCode);
        }

        Ok(AccessoryConfig {
            name: self.name,
            model: self.model,
            manufacturer: self.manufacturer,
            serial_number: self.serial_number,
            firmware_version: self.firmware_version,
            setup_code: self.setup_code,
            port: self.port,
            category: self.category,
            device_id_override: self.device_id_override,
            setup_id: self.setup_id,
            max_peers: self.max_peers,
            max_sessions: self.max_sessions,
            debug_logging: self.debug_logging,
            config_number: self.config_number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_produces_sane_defaults() {
        let config = AccessoryConfig::builder("Lamp").build().unwrap();
        assert_eq!(config.port, 5556);
        assert_eq!(config.max_peers, MAX_PAIRINGS);
    }

    #[test]
    fn empty_name_is_rejected() {
        let err = AccessoryConfig::builder("   ").build().unwrap_err();
        assert!(matches!(err, ConfigError::EmptyName));
    }

    #[test]
    fn malformed_setup_code_is_rejected() {
        let err = AccessoryConfig::builder("Lamp").setup_code("abc").build().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSetupCode));
    }

    #[test]
    fn txt_record_reflects_pairing_state() {
        let config = AccessoryConfig::builder("Lamp").build().unwrap();
        let unpaired = config.txt_record("11:22:33:44:55:66", false);
        assert_eq!(unpaired.get("sf").unwrap(), "1");
        let paired = config.txt_record("11:22:33:44:55:66", true);
        assert_eq!(paired.get("sf").unwrap(), "0");
    }
}
