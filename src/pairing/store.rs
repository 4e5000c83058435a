//! Pairing store: the accessory's persistent identity (id + long-term
//! Ed25519 keypair) and the table of enrolled controllers (§4.2).

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::crypto::Ed25519KeyPair;

/// Maximum number of concurrently-enrolled controllers.
pub const MAX_PAIRINGS: usize = 16;

/// Sanity marker written alongside every on-disk pairing record, matching
/// the original accessory firmware's slot layout.
const PAIRING_MAGIC: [u8; 3] = *b"MAX";

/// Bit 0 of the permission byte: admin (may add/remove/list pairings).
pub const PERMISSION_ADMIN: u8 = 0x01;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("pairing store is full")]
    MaxPeers,
}

/// One enrolled controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pairing {
    pub slot: usize,
    /// 36-byte UTF-8 controller identifier.
    pub device_id: String,
    /// Controller's Ed25519 long-term public key.
    pub public_key: [u8; 32],
    pub permissions: u8,
}

impl Pairing {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.permissions & PERMISSION_ADMIN != 0
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    accessory_id: Option<String>,
    accessory_secret_key: Option<[u8; 32]>,
    accessory_public_key: Option<[u8; 32]>,
    #[serde(default)]
    pairings: HashMap<usize, Pairing>,
}

/// Accessory identity plus the pairing table, backed by a pluggable
/// persistence trait so tests can swap in an in-memory backend.
pub struct PairingStore<B: StoreBackend> {
    backend: B,
    state: PersistedState,
}

/// Durable load/save contract a pairing store is layered on. The on-disk
/// shape is left to the implementation (flat JSON file here); the only
/// requirement is that a full `save` is atomic.
pub trait StoreBackend {
    fn load(&self) -> Result<Option<Vec<u8>>, StorageError>;
    fn save(&mut self, bytes: &[u8]) -> Result<(), StorageError>;
}

impl<B: StoreBackend> PairingStore<B> {
    pub fn open(mut backend: B) -> Result<Self, StorageError> {
        let state = match backend.load()? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))?,
            None => PersistedState::default(),
        };
        Ok(Self { backend, state })
    }

    fn persist(&mut self) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(&self.state).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.backend.save(&bytes)
    }

    /// Lazily generates and persists a random 6-byte accessory id on first
    /// call, formatted as `"XX:XX:XX:XX:XX:XX"` (17 bytes).
    pub fn accessory_id(&mut self) -> Result<String, StorageError> {
        if let Some(id) = &self.state.accessory_id {
            return Ok(id.clone());
        }
        let mut raw = [0u8; 6];
        rand::thread_rng().fill_bytes(&mut raw);
        let id = raw.iter().map(|b| format!("{b:02X}")).collect::<Vec<_>>().join(":");
        self.state.accessory_id = Some(id.clone());
        self.persist()?;
        Ok(id)
    }

    /// Lazily generates and persists the accessory's long-term Ed25519
    /// keypair on first call.
    pub fn accessory_keypair(&mut self) -> Result<Ed25519KeyPair, StorageError> {
        if let (Some(sk), Some(_pk)) = (self.state.accessory_secret_key, self.state.accessory_public_key) {
            return Ed25519KeyPair::from_bytes(&sk).map_err(|e| StorageError::Serialization(e.to_string()));
        }
        let keypair = Ed25519KeyPair::generate();
        self.state.accessory_secret_key = Some(keypair.secret_bytes());
        self.state.accessory_public_key = Some(*keypair.public_key().as_bytes());
        self.persist()?;
        Ok(keypair)
    }

    #[must_use]
    pub fn list_pairings(&self) -> Vec<Pairing> {
        let mut pairings: Vec<Pairing> = self.state.pairings.values().cloned().collect();
        pairings.sort_by_key(|p| p.slot);
        pairings
    }

    #[must_use]
    pub fn find(&self, device_id: &str) -> Option<Pairing> {
        self.state.pairings.values().find(|p| p.device_id == device_id).cloned()
    }

    #[must_use]
    pub fn find_by_slot(&self, slot: usize) -> Option<Pairing> {
        self.state.pairings.get(&slot).cloned()
    }

    /// Insert a new pairing. Refuses a duplicate device id with a
    /// differing key; the caller is expected to route identical-key
    /// duplicates to [`Self::update`] instead.
    pub fn add(&mut self, device_id: &str, public_key: [u8; 32], permissions: u8) -> Result<(), StorageError> {
        if self.state.pairings.len() >= MAX_PAIRINGS {
            return Err(StorageError::MaxPeers);
        }
        let slot = (0..MAX_PAIRINGS).find(|s| !self.state.pairings.contains_key(s)).ok_or(StorageError::MaxPeers)?;
        self.state.pairings.insert(
            slot,
            Pairing {
                slot,
                device_id: device_id.to_string(),
                public_key,
                permissions,
            },
        );
        self.persist()
    }

    pub fn update(&mut self, device_id: &str, permissions: u8) -> Result<(), StorageError> {
        if let Some(pairing) = self.state.pairings.values_mut().find(|p| p.device_id == device_id) {
            pairing.permissions = permissions;
        }
        self.persist()
    }

    pub fn remove(&mut self, device_id: &str) -> Result<(), StorageError> {
        self.state.pairings.retain(|_, p| p.device_id != device_id);
        self.persist()
    }

    #[must_use]
    pub fn has_admin(&self) -> bool {
        self.state.pairings.values().any(Pairing::is_admin)
    }

    #[must_use]
    pub fn is_paired(&self) -> bool {
        !self.state.pairings.is_empty()
    }
}

/// In-memory backend, useful for tests and for ephemeral accessories.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    bytes: Option<Vec<u8>>,
}

impl StoreBackend for MemoryBackend {
    fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.bytes.clone())
    }

    fn save(&mut self, bytes: &[u8]) -> Result<(), StorageError> {
        self.bytes = Some(bytes.to_vec());
        Ok(())
    }
}

/// File-backed store. A write replaces the whole file so a crash mid-write
/// never leaves a partially-updated record; the preceding marker bytes
/// guard against loading a truncated or foreign file.
pub struct FileBackend {
    path: std::path::PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StoreBackend for FileBackend {
    fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&self.path)?;
        if bytes.len() < PAIRING_MAGIC.len() || bytes[..PAIRING_MAGIC.len()] != PAIRING_MAGIC {
            return Ok(None);
        }
        Ok(Some(bytes[PAIRING_MAGIC.len()..].to_vec()))
    }

    fn save(&mut self, bytes: &[u8]) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("tmp");
        let mut out = Vec::with_capacity(PAIRING_MAGIC.len() + bytes.len());
        out.extend_from_slice(&PAIRING_MAGIC);
        out.extend_from_slice(bytes);
        std::fs::write(&tmp_path, out)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> PairingStore<MemoryBackend> {
        PairingStore::open(MemoryBackend::default()).unwrap()
    }

    #[test]
    fn accessory_id_is_stable_across_calls() {
        let mut store = store();
        let first = store.accessory_id().unwrap();
        let second = store.accessory_id().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 17);
    }

    #[test]
    fn accessory_keypair_is_stable_across_calls() {
        let mut store = store();
        let first = store.accessory_keypair().unwrap();
        let second = store.accessory_keypair().unwrap();
        assert_eq!(first.secret_bytes(), second.secret_bytes());
    }

    #[test]
    fn add_then_find_round_trips() {
        let mut store = store();
        store.add("controller-1", [0x11; 32], PERMISSION_ADMIN).unwrap();
        let found = store.find("controller-1").unwrap();
        assert_eq!(found.public_key, [0x11; 32]);
        assert!(found.is_admin());
        assert!(store.has_admin());
    }

    #[test]
    fn full_store_refuses_new_pairings() {
        let mut store = store();
        for i in 0..MAX_PAIRINGS {
            store.add(&format!("controller-{i}"), [0u8; 32], 0).unwrap();
        }
        assert!(matches!(store.add("one-too-many", [0u8; 32], 0), Err(StorageError::MaxPeers)));
    }

    #[test]
    fn removing_last_admin_clears_the_admin_invariant() {
        let mut store = store();
        store.add("admin", [0x22; 32], PERMISSION_ADMIN).unwrap();
        assert!(store.has_admin());
        store.remove("admin").unwrap();
        assert!(!store.has_admin());
        assert!(!store.is_paired());
    }

    #[test]
    fn file_backend_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairings.json");

        {
            let mut store = PairingStore::open(FileBackend::new(&path)).unwrap();
            store.accessory_id().unwrap();
            store.add("controller-1", [0x33; 32], PERMISSION_ADMIN).unwrap();
        }

        let reopened = PairingStore::open(FileBackend::new(&path)).unwrap();
        assert!(reopened.has_admin());
        assert_eq!(reopened.find("controller-1").unwrap().public_key, [0x33; 32]);
    }
}
