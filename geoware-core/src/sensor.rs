//! Sensors a node can sample: declared once at startup with a read callback.

use std::fmt;

use crate::protocol::{SensorType, Value, ValueKind};

/// Static description of a sensor channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorSpec {
    pub id: SensorType,
    pub name: String,
    pub kind: ValueKind,
}

pub type ReadFn = Box<dyn FnMut() -> Value + Send>;

struct Sensor {
    spec: SensorSpec,
    read: ReadFn,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SensorError {
    #[error("sensor table full ({0} sensors)")]
    Full(usize),
    #[error("sensor {0} already registered")]
    Duplicate(SensorType),
    #[error("sensor {0} not registered")]
    Unknown(SensorType),
    #[error("sensor {id} returned {got:?}, declared {declared:?}")]
    KindMismatch {
        id: SensorType,
        declared: ValueKind,
        got: ValueKind,
    },
}

pub struct SensorRegistry {
    sensors: Vec<Sensor>,
    capacity: usize,
}

impl SensorRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            sensors: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn register(&mut self, spec: SensorSpec, read: ReadFn) -> Result<(), SensorError> {
        if self.get(spec.id).is_some() {
            return Err(SensorError::Duplicate(spec.id));
        }
        if self.sensors.len() >= self.capacity {
            return Err(SensorError::Full(self.capacity));
        }
        self.sensors.push(Sensor { spec, read });
        Ok(())
    }

    pub fn get(&self, id: SensorType) -> Option<&SensorSpec> {
        self.sensors.iter().map(|s| &s.spec).find(|s| s.id == id)
    }

    /// Sample a sensor. The value must carry the declared kind.
    pub fn read(&mut self, id: SensorType) -> Result<Value, SensorError> {
        let sensor = self
            .sensors
            .iter_mut()
            .find(|s| s.spec.id == id)
            .ok_or(SensorError::Unknown(id))?;
        let value = (sensor.read)();
        if value.kind() != sensor.spec.kind {
            return Err(SensorError::KindMismatch {
                id,
                declared: sensor.spec.kind,
                got: value.kind(),
            });
        }
        Ok(value)
    }

    pub fn specs(&self) -> impl Iterator<Item = &SensorSpec> + '_ {
        self.sensors.iter().map(|s| &s.spec)
    }
}

impl fmt::Debug for SensorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.specs()).finish()
    }
}
