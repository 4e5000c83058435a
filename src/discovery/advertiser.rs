//! mDNS advertisement for a single `_hap._tcp` accessory.

use mdns_sd::{Error as MdnsError, ServiceDaemon, ServiceInfo};

use crate::config::AccessoryConfig;

/// Errors from service advertisement.
#[derive(Debug, thiserror::Error)]
pub enum AdvertiserError {
    /// The underlying mDNS daemon rejected registration or unregistration.
    #[error("mDNS error: {0}")]
    Mdns(#[from] MdnsError),

    /// [`HapAdvertiser::update_paired_state`] or [`HapAdvertiser::unregister`]
    /// was called before the service was ever registered.
    #[error("service not registered")]
    NotRegistered,

    /// [`HapAdvertiser::register`] was called twice without an intervening
    /// unregister.
    #[error("service already registered")]
    AlreadyRegistered,
}

/// Advertises one accessory's `_hap._tcp` service and keeps its `sf` (pair
/// status) TXT field in sync with the pairing store. Synchronous, matching
/// `mdns-sd`'s own `ServiceDaemon` API; callers on an async runtime should
/// do what the accessory's own HTTP server does and run registration
/// through `spawn_blocking`.
pub struct HapAdvertiser {
    daemon: ServiceDaemon,
    config: AccessoryConfig,
    accessory_id: String,
    service_fullname: Option<String>,
    is_paired: bool,
}

impl HapAdvertiser {
    /// Create a new advertiser for an accessory identified by
    /// `accessory_id` (the 17-byte `"XX:XX:XX:XX:XX:XX"` id from the
    /// pairing store, §4.2).
    ///
    /// # Errors
    ///
    /// Returns an error if the mDNS daemon cannot be initialized.
    pub fn new(config: AccessoryConfig, accessory_id: String) -> Result<Self, AdvertiserError> {
        let daemon = ServiceDaemon::new()?;
        Ok(Self { daemon, config, accessory_id, service_fullname: None, is_paired: false })
    }

    /// The service instance name shown to controllers; HAP uses the
    /// accessory's display name directly, unlike RAOP's `MAC@name`
    /// convention.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.config.name
    }

    /// Register the service on the network with the current pairing state.
    ///
    /// # Errors
    ///
    /// Returns an error if the service is already registered or mDNS
    /// registration fails.
    pub fn register(&mut self, is_paired: bool) -> Result<(), AdvertiserError> {
        if self.service_fullname.is_some() {
            return Err(AdvertiserError::AlreadyRegistered);
        }
        self.is_paired = is_paired;

        let hostname = format!("{}.local.", self.config.name.replace(' ', "-").to_lowercase());
        let txt = self.config.txt_record(&self.accessory_id, is_paired);
        let service_info = ServiceInfo::new(
            "_hap._tcp.local.",
            &self.config.name,
            &hostname,
            "",
            self.config.port,
            txt.into_iter().map(|(k, v)| (k.to_string(), v)).collect::<std::collections::HashMap<_, _>>(),
        )?;

        self.daemon.register(service_info.clone())?;
        self.service_fullname = Some(service_info.get_fullname().to_string());

        tracing::info!(name = %self.config.name, port = %self.config.port, paired = is_paired, "HAP service registered");
        Ok(())
    }

    /// Unregister the service from the network.
    ///
    /// # Errors
    ///
    /// Returns an error if the service was never registered or mDNS
    /// unregistration fails.
    pub fn unregister(&mut self) -> Result<(), AdvertiserError> {
        let fullname = self.service_fullname.take().ok_or(AdvertiserError::NotRegistered)?;
        self.daemon.unregister(&fullname)?;
        tracing::info!(name = %fullname, "HAP service unregistered");
        Ok(())
    }

    /// Re-advertise with an updated `sf` flag (§6: "Value updated on each
    /// change to the pairing status"). Accomplished, as mDNS has no
    /// in-place TXT update, by unregistering and registering again.
    ///
    /// # Errors
    ///
    /// Returns an error if the service isn't currently registered or
    /// re-registration fails.
    pub fn update_paired_state(&mut self, is_paired: bool) -> Result<(), AdvertiserError> {
        if self.service_fullname.is_none() {
            return Err(AdvertiserError::NotRegistered);
        }
        self.unregister()?;
        self.register(is_paired)
    }
}

impl Drop for HapAdvertiser {
    fn drop(&mut self) {
        if self.service_fullname.is_some() {
            let _ = self.unregister();
        }
    }
}
