//! Peripheral registry: the configured allow-list of expected sources.
//!
//! An empty registry is the wildcard "accept any source". A non-empty registry
//! both filters incoming records and defines when a scan window is complete.

use std::collections::{BTreeMap, HashSet};

use crate::measurement::{Measurement, normalize_address};

/// Mapping of source address to friendly label.
///
/// Built once at startup and shared read-only (behind an `Arc`) for the
/// lifetime of the scanner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeripheralRegistry {
    peripherals: BTreeMap<String, String>,
}

impl PeripheralRegistry {
    /// Build a registry, normalizing every address.
    pub fn new<I, A, L>(peripherals: I) -> Self
    where
        I: IntoIterator<Item = (A, L)>,
        A: AsRef<str>,
        L: Into<String>,
    {
        Self {
            peripherals: peripherals
                .into_iter()
                .map(|(addr, label)| (normalize_address(addr.as_ref()), label.into()))
                .collect(),
        }
    }

    /// Registry that accepts any source.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.peripherals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.peripherals.len()
    }

    /// Friendly label for an address, if registered.
    pub fn label(&self, addr: &str) -> Option<&str> {
        self.peripherals
            .get(&normalize_address(addr))
            .map(String::as_str)
    }

    /// Whether records from `addr` should be collected.
    pub fn accepts(&self, addr: &str) -> bool {
        self.is_empty() || self.peripherals.contains_key(&normalize_address(addr))
    }

    /// Whether every registered peripheral is in `seen`.
    ///
    /// Always false for an empty registry, so wildcard windows never finish
    /// early.
    pub fn all_seen(&self, seen: &HashSet<String>) -> bool {
        !self.is_empty() && self.peripherals.keys().all(|addr| seen.contains(addr))
    }

    /// Filter a record and attach its label.
    ///
    /// Returns `None` when the registry is non-empty and does not contain the
    /// record's address.
    pub fn admit(&self, mut measurement: Measurement) -> Option<Measurement> {
        measurement.addr = normalize_address(&measurement.addr);
        if self.is_empty() {
            return Some(measurement);
        }
        let label = self.peripherals.get(&measurement.addr)?;
        if measurement.name.is_none() {
            measurement.name = Some(label.clone());
        }
        Some(measurement)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.peripherals
            .iter()
            .map(|(addr, label)| (addr.as_str(), label.as_str()))
    }
}

impl From<&BTreeMap<String, String>> for PeripheralRegistry {
    fn from(map: &BTreeMap<String, String>) -> Self {
        Self::new(map.iter().map(|(addr, label)| (addr, label.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn seen(addrs: &[&str]) -> HashSet<String> {
        addrs.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn test_empty_registry_accepts_everything() {
        let registry = PeripheralRegistry::any();
        assert!(registry.accepts("11:22:33:44:55:66"));
        assert!(!registry.all_seen(&seen(&["11:22:33:44:55:66"])));
        let m = Measurement::new("11:22:33:44:55:66", Utc::now());
        assert_eq!(registry.admit(m).unwrap().name, None);
    }

    #[test]
    fn test_registry_normalizes_keys() {
        let registry = PeripheralRegistry::new([("aa-bb", "Kitchen")]);
        assert_eq!(registry.label("AA:BB"), Some("Kitchen"));
        assert!(registry.accepts("aa:bb"));
        assert!(!registry.accepts("CC:DD"));
    }

    #[test]
    fn test_all_seen_requires_every_peripheral() {
        let registry = PeripheralRegistry::new([("AA:BB", "Kitchen"), ("CC:DD", "Garage")]);
        assert!(!registry.all_seen(&seen(&["AA:BB"])));
        assert!(!registry.all_seen(&seen(&["AA:BB", "EE:FF"])));
        assert!(registry.all_seen(&seen(&["AA:BB", "CC:DD"])));
    }

    #[test]
    fn test_admit_filters_and_labels() {
        let registry = PeripheralRegistry::new([("AA:BB", "Kitchen")]);

        let admitted = registry
            .admit(Measurement::new("aa:bb", Utc::now()))
            .unwrap();
        assert_eq!(admitted.addr, "AA:BB");
        assert_eq!(admitted.name.as_deref(), Some("Kitchen"));

        let named = Measurement::new("AA:BB", Utc::now()).with_name("Sauna");
        let relabelled = registry.admit(named).unwrap();
        assert_eq!(relabelled.name.as_deref(), Some("Sauna"));

        let stranger = Measurement::new("CC:DD", Utc::now());
        assert!(registry.admit(stranger).is_none());
    }
}
