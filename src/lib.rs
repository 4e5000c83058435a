//! # hap-accessory
//!
//! An accessory-side HomeKit Accessory Protocol core: the cryptographic
//! handshakes (SRP pair-setup, Curve25519 pair-verify), the TLV8 and
//! HTTP/1.1 wire codecs, the ChaCha20-Poly1305 record layer, the request
//! router, and the accessory object tree, all kept sans-IO so they can be
//! driven deterministically in tests without a real socket.
//!
//! ## What this crate does not do
//!
//! It does not own a TCP listener or an event loop, and its mDNS support
//! ([`discovery`]) is limited to building and keeping the `_hap._tcp` TXT
//! record contract up to date — binding the socket and driving the
//! accept loop is the caller's responsibility, the same way
//! [`session::Session`] expects to be fed bytes rather than a socket.
//!
//! ## Example
//!
//! ```rust,no_run
//! use hap_accessory::accessory::{Accessory, AccessoryIdentity, build_information_service};
//! use hap_accessory::config::AccessoryConfig;
//! use hap_accessory::pairing::{MemoryBackend, PairingStore};
//! use hap_accessory::session::Session;
//! use std::sync::Arc;
//!
//! let config = AccessoryConfig::builder("Lamp").build().unwrap();
//! let identity = AccessoryIdentity {
//!     name: config.name.clone(),
//!     manufacturer: config.manufacturer.clone(),
//!     model: config.model.clone(),
//!     serial_number: config.serial_number.clone(),
//!     firmware_revision: config.firmware_version.clone(),
//! };
//! let mut tree = Accessory::new(vec![build_information_service(&identity, Arc::new(|| {}))]);
//! let mut store = PairingStore::open(MemoryBackend::default()).unwrap();
//! let mut session = Session::new();
//! let _ = (&mut tree, &mut store, &mut session);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// The accessory object tree: accessories, services, characteristics, and
/// the dynamic-typed value model backing every characteristic.
pub mod accessory;
/// Static accessory identity, category, and the derived mDNS TXT record.
pub mod config;
/// SHA-512/HKDF, Curve25519, Ed25519, ChaCha20-Poly1305, and SRP-6a.
pub mod crypto;
/// `_hap._tcp` mDNS service advertisement.
pub mod discovery;
/// Crate-level error aggregate.
pub mod error;
/// Per-session characteristic-change event queue and coalescing.
pub mod events;
/// HTTP/1.1 request parsing and response construction for the HAP wire format.
pub mod http;
/// Pair-setup, pair-verify, and the persistent pairing store.
pub mod pairing;
/// The AEAD record layer framing HTTP traffic once a session is verified.
pub mod record;
/// Dispatches decoded HTTP requests to the pairing engines, the accessory
/// tree, or the event subscription table.
pub mod router;
/// Per-connection session state machine tying the codecs and pairing
/// engines together.
pub mod session;
/// In-process test harness driving a full pair-setup + pair-verify
/// handshake against a real [`session::Session`], for use by integration
/// tests.
pub mod testing;
/// TLV8 encoding and decoding.
pub mod tlv;

pub use error::HapError;
