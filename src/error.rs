//! Crate-level error aggregate. Individual modules expose their own
//! `thiserror` enums (`CryptoError`, `TlvError`, `RecordError`,
//! `HttpCodecError`, `PairSetupError`, `PairVerifyError`, `StorageError`,
//! `RouterError`, `ConfigError`); `HapError` wraps whichever of those
//! crosses a module boundary, for call sites (the router, the session
//! loop) that can fail in more than one subsystem.

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::http::HttpCodecError;
use crate::pairing::{PairSetupError, PairVerifyError, StorageError};
use crate::record::RecordError;
use crate::router::RouterError;
use crate::tlv::TlvError;

#[derive(Debug, Error)]
pub enum HapError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Tlv(#[from] TlvError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Http(#[from] HttpCodecError),

    #[error(transparent)]
    PairSetup(#[from] PairSetupError),

    #[error(transparent)]
    PairVerify(#[from] PairVerifyError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}
