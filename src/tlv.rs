//! TLV8 encoding: Apple's type-length-value format used by every pairing
//! and pair-verify message. Values longer than 255 bytes are split into
//! consecutive same-type records; only *adjacent* records of the same type
//! are joined back together on decode, so that two occurrences of the same
//! type separated by something else (e.g. a `Separator` between list
//! entries) stay distinct.

use thiserror::Error;

/// TLV type codes used in HAP pairing and pair-verify messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TlvType {
    Method = 0x00,
    Identifier = 0x01,
    Salt = 0x02,
    PublicKey = 0x03,
    Proof = 0x04,
    EncryptedData = 0x05,
    State = 0x06,
    Error = 0x07,
    RetryDelay = 0x08,
    Certificate = 0x09,
    Signature = 0x0A,
    Permissions = 0x0B,
    FragmentData = 0x0C,
    FragmentLast = 0x0D,
    SessionID = 0x0E,
    Flags = 0x13,
    /// Zero-length record that terminates one logical entry within a list.
    Separator = 0xFF,
}

impl TlvType {
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Self::Method),
            0x01 => Some(Self::Identifier),
            0x02 => Some(Self::Salt),
            0x03 => Some(Self::PublicKey),
            0x04 => Some(Self::Proof),
            0x05 => Some(Self::EncryptedData),
            0x06 => Some(Self::State),
            0x07 => Some(Self::Error),
            0x08 => Some(Self::RetryDelay),
            0x09 => Some(Self::Certificate),
            0x0A => Some(Self::Signature),
            0x0B => Some(Self::Permissions),
            0x0C => Some(Self::FragmentData),
            0x0D => Some(Self::FragmentLast),
            0x0E => Some(Self::SessionID),
            0x13 => Some(Self::Flags),
            0xFF => Some(Self::Separator),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TlvError {
    #[error("buffer too small")]
    BufferTooSmall,

    #[error("missing required field: {0:?}")]
    MissingField(TlvType),

    #[error("invalid value for {0:?}")]
    InvalidValue(TlvType),
}

/// Builds a TLV8 byte string by appending typed values in order.
pub struct TlvEncoder {
    buffer: Vec<u8>,
}

impl TlvEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Append a value, fragmenting into 255-byte records if necessary.
    /// A zero-length value is still written as one zero-length record.
    #[must_use]
    pub fn add(mut self, tlv_type: TlvType, value: &[u8]) -> Self {
        if value.is_empty() {
            self.buffer.push(tlv_type as u8);
            self.buffer.push(0);
            return self;
        }

        for chunk in value.chunks(255) {
            self.buffer.push(tlv_type as u8);
            #[allow(clippy::cast_possible_truncation)]
            self.buffer.push(chunk.len() as u8);
            self.buffer.extend_from_slice(chunk);
        }
        self
    }

    #[must_use]
    pub fn add_u8(self, tlv_type: TlvType, value: u8) -> Self {
        self.add(tlv_type, &[value])
    }

    #[must_use]
    pub fn add_state(self, state: u8) -> Self {
        self.add_u8(TlvType::State, state)
    }

    #[must_use]
    pub fn add_separator(mut self) -> Self {
        self.buffer.push(TlvType::Separator as u8);
        self.buffer.push(0);
        self
    }

    #[must_use]
    pub fn build(self) -> Vec<u8> {
        self.buffer
    }
}

impl Default for TlvEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// One decoded TLV record (type byte kept raw so unknown types round-trip).
#[derive(Debug, Clone, PartialEq, Eq)]
struct RawItem {
    tlv_type: u8,
    value: Vec<u8>,
}

/// A decoded TLV8 message: an ordered list of (type, value) entries with
/// adjacent same-type fragments already coalesced.
#[derive(Debug, Default)]
pub struct TlvReader {
    items: Vec<RawItem>,
}

impl TlvReader {
    /// Parse a TLV8 byte string.
    pub fn decode(data: &[u8]) -> Result<Self, TlvError> {
        let mut items: Vec<RawItem> = Vec::new();
        let mut pos = 0;

        while pos < data.len() {
            if pos + 2 > data.len() {
                return Err(TlvError::BufferTooSmall);
            }
            let tlv_type = data[pos];
            let length = data[pos + 1] as usize;
            pos += 2;

            if pos + length > data.len() {
                return Err(TlvError::BufferTooSmall);
            }
            let value = &data[pos..pos + length];
            pos += length;

            // Only coalesce into the *immediately preceding* record of the
            // same type — a record of any other type (including another
            // Separator) breaks the run.
            match items.last_mut() {
                Some(last) if last.tlv_type == tlv_type => {
                    last.value.extend_from_slice(value);
                }
                _ => items.push(RawItem {
                    tlv_type,
                    value: value.to_vec(),
                }),
            }
        }

        Ok(Self { items })
    }

    /// First value of the given type, if present.
    #[must_use]
    pub fn get(&self, tlv_type: TlvType) -> Option<&[u8]> {
        self.items
            .iter()
            .find(|item| item.tlv_type == tlv_type as u8)
            .map(|item| item.value.as_slice())
    }

    pub fn get_required(&self, tlv_type: TlvType) -> Result<&[u8], TlvError> {
        self.get(tlv_type).ok_or(TlvError::MissingField(tlv_type))
    }

    #[must_use]
    pub fn get_u8(&self, tlv_type: TlvType) -> Option<u8> {
        self.get(tlv_type).and_then(|v| v.first().copied())
    }

    pub fn get_state(&self) -> Result<u8, TlvError> {
        let value = self.get_required(TlvType::State)?;
        if value.len() != 1 {
            return Err(TlvError::InvalidValue(TlvType::State));
        }
        Ok(value[0])
    }

    #[must_use]
    pub fn get_error(&self) -> Option<u8> {
        self.get(TlvType::Error).and_then(|v| v.first().copied())
    }

    /// Split a list-pairings-style message into per-entry readers, divided
    /// by zero-length `Separator` records.
    #[must_use]
    pub fn split_on_separator(&self) -> Vec<TlvReader> {
        let mut groups = Vec::new();
        let mut current = Vec::new();
        for item in &self.items {
            if item.tlv_type == TlvType::Separator as u8 {
                groups.push(TlvReader { items: std::mem::take(&mut current) });
            } else {
                current.push(item.clone());
            }
        }
        if !current.is_empty() {
            groups.push(TlvReader { items: current });
        }
        groups
    }
}

/// Pairing method constants (TLV `Method` field).
pub mod methods {
    pub const PAIR_SETUP: u8 = 0;
    pub const PAIR_VERIFY: u8 = 2;
    pub const ADD_PAIRING: u8 = 3;
    pub const REMOVE_PAIRING: u8 = 4;
    pub const LIST_PAIRINGS: u8 = 5;
}

/// TLV `Error` field codes.
pub mod errors {
    pub const UNKNOWN: u8 = 0x01;
    pub const AUTHENTICATION: u8 = 0x02;
    pub const BACKOFF: u8 = 0x03;
    pub const MAX_PEERS: u8 = 0x04;
    pub const MAX_TRIES: u8 = 0x05;
    pub const UNAVAILABLE: u8 = 0x06;
    pub const BUSY: u8 = 0x07;
}
