//! Decoded sensor readings and their wire encoding.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// One complete set of formatted readings, in catalog order.
///
/// Serializes as a flat JSON object, e.g. `{"CPU_TEMP": "45 °C"}`, keeping
/// insertion order on both encode and decode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    readings: Vec<(String, String)>,
}

impl Snapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a reading, replacing any earlier value with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.readings.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.readings.push((name, value)),
        }
    }

    /// Looks up a reading by sensor name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.readings
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Iterates `(name, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.readings.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of readings.
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// Whether no reading has been recorded.
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Encodes the snapshot as compact JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decodes a snapshot from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.readings.len()))?;
        for (name, value) in &self.readings {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

struct SnapshotVisitor;

impl<'de> Visitor<'de> for SnapshotVisitor {
    type Value = Snapshot;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of sensor names to formatted values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Snapshot, A::Error> {
        let mut snapshot = Snapshot::new();
        while let Some((name, value)) = access.next_entry::<String, String>()? {
            snapshot.insert(name, value);
        }
        Ok(snapshot)
    }
}

impl<'de> Deserialize<'de> for Snapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(SnapshotVisitor)
    }
}
