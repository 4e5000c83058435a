//! Characteristic model (§3): declared format, permission bitset,
//! optional numeric/string constraints, current value, and the
//! read/write hook callbacks the accessory-side code plugs in.

use std::sync::Arc;

use super::value::{CharacteristicValue, ValueError};

/// HAP wire formats a characteristic may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Bool,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Int,
    Float,
    String,
    Tlv8,
    Data,
}

/// Characteristic permission bitset (§3). Hand-rolled rather than pulled
/// in from a crate: six fixed flags, no need for a general bitflags
/// dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions(u8);

impl Permissions {
    pub const PAIRED_READ: Permissions = Permissions(0b0000_0001);
    pub const PAIRED_WRITE: Permissions = Permissions(0b0000_0010);
    pub const NOTIFY: Permissions = Permissions(0b0000_0100);
    pub const ADDITIONAL_AUTHORIZATION: Permissions = Permissions(0b0000_1000);
    pub const TIMED_WRITE: Permissions = Permissions(0b0001_0000);
    pub const HIDDEN: Permissions = Permissions(0b0010_0000);
    pub const NONE: Permissions = Permissions(0);

    #[must_use]
    pub fn contains(self, other: Permissions) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Permissions {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Numeric/string constraints a characteristic may declare; absent bounds
/// mean "unconstrained" for that axis.
#[derive(Debug, Clone, Default)]
pub struct NumericConstraints {
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub min_step: Option<f64>,
    pub valid_values: Vec<u64>,
    /// `(start, end)` inclusive ranges, for formats that declare
    /// `validValuesRanges` instead of an explicit enumeration.
    pub valid_values_ranges: Vec<(u64, u64)>,
    pub max_len: Option<usize>,
}

/// A read or write hook the device-side code supplies. The core never owns
/// device state; it only calls through these (§9 "Callbacks for
/// characteristic getter/setter").
pub type ReadHook = Arc<dyn Fn() -> CharacteristicValue + Send + Sync>;
pub type WriteHook = Arc<dyn Fn(&CharacteristicValue) + Send + Sync>;

pub struct Characteristic {
    pub iid: u64,
    pub char_type: String,
    pub format: Format,
    pub permissions: Permissions,
    pub unit: Option<String>,
    pub constraints: NumericConstraints,
    value: CharacteristicValue,
    pub read_hook: Option<ReadHook>,
    pub write_hook: Option<WriteHook>,
    /// Session ids currently subscribed via `ev=1` (§3 Event).
    subscribers: Vec<u64>,
}

impl Characteristic {
    #[must_use]
    pub fn new(char_type: impl Into<String>, format: Format, permissions: Permissions) -> Self {
        Self {
            iid: 0,
            char_type: char_type.into(),
            format,
            permissions,
            unit: None,
            constraints: NumericConstraints::default(),
            value: CharacteristicValue::Null,
            read_hook: None,
            write_hook: None,
            subscribers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_value(mut self, value: CharacteristicValue) -> Self {
        self.value = value;
        self
    }

    #[must_use]
    pub fn with_constraints(mut self, constraints: NumericConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    #[must_use]
    pub fn with_read_hook(mut self, hook: ReadHook) -> Self {
        self.read_hook = Some(hook);
        self
    }

    #[must_use]
    pub fn with_write_hook(mut self, hook: WriteHook) -> Self {
        self.write_hook = Some(hook);
        self
    }

    /// Current value: the read hook if present, else the stored snapshot.
    #[must_use]
    pub fn read(&self) -> CharacteristicValue {
        self.read_hook.as_ref().map_or_else(|| self.value.clone(), |hook| hook())
    }

    /// Store a new value (invariant: format must match or be `Null`) and
    /// invoke the write hook if present.
    pub fn write(&mut self, value: CharacteristicValue) -> Result<(), ValueError> {
        if !matches!(value, CharacteristicValue::Null) && value.format() != self.format {
            return Err(ValueError::FormatMismatch(self.format));
        }
        if let Some(hook) = &self.write_hook {
            hook(&value);
        }
        self.value = value;
        Ok(())
    }

    #[must_use]
    pub fn is_subscribed(&self, session_id: u64) -> bool {
        self.subscribers.contains(&session_id)
    }

    /// Idempotent insert: subscribing twice has no additional effect (§9
    /// open question on `addCallbackEvent`).
    pub fn subscribe(&mut self, session_id: u64) {
        if !self.subscribers.contains(&session_id) {
            self.subscribers.push(session_id);
        }
    }

    /// Idempotent removal.
    pub fn unsubscribe(&mut self, session_id: u64) {
        self.subscribers.retain(|id| *id != session_id);
    }

    #[must_use]
    pub fn subscribers(&self) -> &[u64] {
        &self.subscribers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_rejects_mismatched_format() {
        let mut c = Characteristic::new("00000025-0000-1000-8000-0026BB765291", Format::Bool, Permissions::PAIRED_READ | Permissions::PAIRED_WRITE);
        let err = c.write(CharacteristicValue::Uint(1, 8)).unwrap_err();
        assert!(matches!(err, ValueError::FormatMismatch(Format::Bool)));
    }

    #[test]
    fn write_null_is_always_allowed() {
        let mut c = Characteristic::new("type", Format::Bool, Permissions::PAIRED_READ);
        c.write(CharacteristicValue::Null).unwrap();
    }

    #[test]
    fn subscribe_and_unsubscribe_are_idempotent() {
        let mut c = Characteristic::new("type", Format::Bool, Permissions::NOTIFY);
        c.subscribe(1);
        c.subscribe(1);
        assert_eq!(c.subscribers(), &[1]);
        c.unsubscribe(1);
        c.unsubscribe(1);
        assert!(c.subscribers().is_empty());
    }

    #[test]
    fn write_hook_is_invoked() {
        use std::sync::atomic::{AtomicBool, Ordering};
        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();
        let mut c = Characteristic::new("type", Format::Bool, Permissions::PAIRED_WRITE)
            .with_write_hook(Arc::new(move |_| called_clone.store(true, Ordering::SeqCst)));
        c.write(CharacteristicValue::Bool(true)).unwrap();
        assert!(called.load(Ordering::SeqCst));
    }
}
