//! Service model (§3): an ordered sequence of Characteristics under a
//! single HAP service type.

use super::characteristic::Characteristic;

pub struct Service {
    pub iid: u64,
    pub service_type: String,
    pub hidden: bool,
    pub primary: bool,
    pub characteristics: Vec<Characteristic>,
}

impl Service {
    #[must_use]
    pub fn new(service_type: impl Into<String>) -> Self {
        Self {
            iid: 0,
            service_type: service_type.into(),
            hidden: false,
            primary: false,
            characteristics: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_characteristic(mut self, characteristic: Characteristic) -> Self {
        self.characteristics.push(characteristic);
        self
    }

    #[must_use]
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn characteristic_mut(&mut self, iid: u64) -> Option<&mut Characteristic> {
        self.characteristics.iter_mut().find(|c| c.iid == iid)
    }

    #[must_use]
    pub fn characteristic(&self, iid: u64) -> Option<&Characteristic> {
        self.characteristics.iter().find(|c| c.iid == iid)
    }
}
