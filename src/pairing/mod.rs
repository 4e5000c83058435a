//! Pairing subsystem: the SRP pair-setup state machine (§4.6), the
//! Curve25519 pair-verify state machine (§4.7), and the persistent
//! pairing store (§4.2).

mod setup;
mod store;
mod verify;

pub use setup::{error_reply as setup_error_reply, PairSetupEngine, PairSetupError};
pub use store::{FileBackend, MemoryBackend, Pairing, PairingStore, StorageError, StoreBackend, MAX_PAIRINGS, PERMISSION_ADMIN};
pub use verify::{PairVerifyEngine, PairVerifyError, VerifiedSession};
