//! `_hap._tcp` mDNS service advertisement (§6): the accessory's side of
//! the Bonjour contract a controller uses to find it and read its pairing
//! status before connecting.

mod advertiser;

pub use advertiser::{AdvertiserError, HapAdvertiser};
