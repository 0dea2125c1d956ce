//! Device stream reconciliation.
//!
//! The radio reports the same device many times per second. [`Reconciler`]
//! keeps at most one pending observation per identity and folds the pending
//! set into the catalog on [`flush`](Reconciler::flush), which the caller
//! drives from a fixed-interval timer.
//!
//! Merge rules for an identity already in the catalog:
//!
//! - `rssi` is always replaced by the latest observation.
//! - `manufacturer_data` and `services` are sticky-filled: replaced only while
//!   the stored value is empty and the incoming one is not.
//! - Every other field keeps the value from the first sighting.
//!
//! Devices are never evicted; the catalog only shrinks on [`clear`](Reconciler::clear).

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::device::{CanonicalDevice, RawObservation};

/// Buffer + catalog state for one scanning session.
#[derive(Debug, Default)]
pub struct Reconciler {
    /// First-seen index → device. Iteration order is first-seen order.
    catalog: BTreeMap<u64, CanonicalDevice>,
    /// Identity → first-seen index.
    index: HashMap<String, u64>,
    /// Identity → (arrival sequence of first pending sighting, latest observation).
    pending: HashMap<String, (u64, RawObservation)>,
    next_index: u64,
    next_seq: u64,
}

impl Reconciler {
    /// Create an empty reconciler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer an observation, replacing any pending one for the same identity.
    ///
    /// A replaced entry keeps its original arrival position, so identities
    /// new in this window are indexed in the order they first showed up.
    pub fn ingest(&mut self, observation: RawObservation) {
        if let Some(slot) = self.pending.get_mut(&observation.identifier) {
            slot.1 = observation;
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending
            .insert(observation.identifier.clone(), (seq, observation));
    }

    /// Merge the pending buffer into the catalog.
    ///
    /// Returns `None` when nothing was pending, otherwise the number of
    /// observations merged. Read the result with [`snapshot`](Self::snapshot).
    pub fn flush(&mut self) -> Option<usize> {
        if self.pending.is_empty() {
            return None;
        }

        let mut batch: Vec<(u64, RawObservation)> = self.pending.drain().map(|(_, v)| v).collect();
        batch.sort_unstable_by_key(|(seq, _)| *seq);
        self.next_seq = 0;

        let batch_len = batch.len();
        let mut inserted = 0usize;

        for (_, obs) in batch {
            match self.index.get(&obs.identifier) {
                Some(idx) => {
                    if let Some(existing) = self.catalog.get_mut(idx) {
                        merge_into(existing, obs);
                    }
                }
                None => {
                    let idx = self.next_index;
                    self.next_index += 1;
                    self.index.insert(obs.identifier.clone(), idx);
                    self.catalog.insert(idx, CanonicalDevice::from(obs));
                    inserted += 1;
                }
            }
        }

        debug!(
            batch = batch_len,
            inserted,
            total = self.catalog.len(),
            "flushed pending observations"
        );
        Some(batch_len)
    }

    /// Drop the catalog, the pending buffer and reset first-seen numbering.
    pub fn clear(&mut self) {
        self.catalog.clear();
        self.index.clear();
        self.pending.clear();
        self.next_index = 0;
        self.next_seq = 0;
    }

    /// Set the pairing flag on a catalogued device immediately.
    ///
    /// Returns `false` when the identity is not in the catalog.
    pub fn apply_connection_state(&mut self, identity: &str, paired: bool) -> bool {
        let Some(idx) = self.index.get(identity) else {
            return false;
        };
        match self.catalog.get_mut(idx) {
            Some(device) => {
                device.paired = paired;
                true
            }
            None => false,
        }
    }

    /// Clone of the catalog in first-seen order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<CanonicalDevice> {
        self.catalog.values().cloned().collect()
    }

    /// Look up one catalogued device.
    #[must_use]
    pub fn get(&self, identity: &str) -> Option<&CanonicalDevice> {
        self.index.get(identity).and_then(|idx| self.catalog.get(idx))
    }

    /// First-seen index of a catalogued identity.
    #[must_use]
    pub fn first_seen_index(&self, identity: &str) -> Option<u64> {
        self.index.get(identity).copied()
    }

    /// Number of catalogued devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    /// Number of identities waiting for the next flush.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn merge_into(existing: &mut CanonicalDevice, obs: RawObservation) {
    existing.rssi = obs.rssi;
    if existing.manufacturer_data.is_empty() && !obs.manufacturer_data.is_empty() {
        existing.manufacturer_data = obs.manufacturer_data;
    }
    if existing.services.is_empty() && !obs.services.is_empty() {
        existing.services = obs.services;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(id: &str, rssi: i16) -> RawObservation {
        RawObservation {
            rssi: Some(rssi),
            ..RawObservation::new(id, "00:00:00:00:00:00")
        }
    }

    fn ids(devices: &[CanonicalDevice]) -> Vec<&str> {
        devices.iter().map(|d| d.identifier.as_str()).collect()
    }

    #[test]
    fn test_flush_empty_is_noop() {
        let mut r = Reconciler::new();
        assert!(r.flush().is_none());
        assert!(r.is_empty());
    }

    #[test]
    fn test_ingest_replaces_pending_entry() {
        let mut r = Reconciler::new();
        for rssi in [-90, -80, -70] {
            r.ingest(obs("A", rssi));
        }
        assert_eq!(r.pending_len(), 1);
        assert!(r.is_empty());

        assert_eq!(r.flush(), Some(1));
        let devices = r.snapshot();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].rssi, Some(-70));
        assert_eq!(r.pending_len(), 0);
    }

    #[test]
    fn test_sticky_fill_scenario() {
        let mut r = Reconciler::new();
        r.ingest(obs("A", -55));
        r.flush();

        let mut second = obs("A", -60);
        second
            .manufacturer_data
            .insert("004C".into(), "0215AABB".into());
        second.services = vec!["1800".into()];
        r.ingest(second);
        r.flush();

        let device = r.get("A").unwrap();
        assert_eq!(device.rssi, Some(-60));
        assert_eq!(device.manufacturer_data.get("004C").map(String::as_str), Some("0215AABB"));
        assert_eq!(device.services, vec!["1800".to_string()]);
    }

    #[test]
    fn test_sticky_fields_never_regress_or_change() {
        let mut r = Reconciler::new();
        let mut first = obs("A", -50);
        first.services = vec!["180F".into()];
        first.manufacturer_data.insert("5583".into(), "01".into());
        r.ingest(first);
        r.flush();

        r.ingest(obs("A", -51));
        r.flush();
        let mut other = obs("A", -52);
        other.services = vec!["1800".into(), "1801".into()];
        other.manufacturer_data.insert("004C".into(), "02".into());
        r.ingest(other);
        r.flush();

        let device = r.get("A").unwrap();
        assert_eq!(device.rssi, Some(-52));
        assert_eq!(device.services, vec!["180F".to_string()]);
        assert_eq!(device.manufacturer_data.len(), 1);
        assert!(device.manufacturer_data.contains_key("5583"));
    }

    #[test]
    fn test_rssi_replaced_even_with_none() {
        let mut r = Reconciler::new();
        r.ingest(obs("A", -50));
        r.flush();
        r.ingest(RawObservation::new("A", "00:00:00:00:00:00"));
        r.flush();
        assert_eq!(r.get("A").unwrap().rssi, None);
    }

    #[test]
    fn test_other_fields_keep_first_sighting() {
        let mut r = Reconciler::new();
        let mut first = obs("A", -50);
        first.connectable = true;
        r.ingest(first);
        r.flush();

        let mut later = obs("A", -40);
        later.name = Some("Late Name".into());
        later.connectable = false;
        r.ingest(later);
        r.flush();

        let device = r.get("A").unwrap();
        assert_eq!(device.name, None);
        assert!(device.connectable);
    }

    #[test]
    fn test_first_seen_order_is_monotonic() {
        let mut r = Reconciler::new();
        r.ingest(obs("C", -40));
        r.ingest(obs("A", -40));
        // re-sighting keeps C ahead of A
        r.ingest(obs("C", -41));
        r.flush();
        r.ingest(obs("B", -40));
        r.ingest(obs("A", -30));
        assert_eq!(r.flush(), Some(2));
        let devices = r.snapshot();

        assert_eq!(ids(&devices), vec!["C", "A", "B"]);
        assert!(r.first_seen_index("C").unwrap() < r.first_seen_index("A").unwrap());
        assert!(r.first_seen_index("A").unwrap() < r.first_seen_index("B").unwrap());
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut r = Reconciler::new();
        r.ingest(obs("A", -40));
        r.flush();
        r.ingest(obs("B", -40));
        r.clear();

        assert!(r.is_empty());
        assert_eq!(r.pending_len(), 0);
        assert!(r.flush().is_none());

        r.ingest(obs("B", -40));
        r.flush();
        assert_eq!(r.first_seen_index("B"), Some(0));
        assert_eq!(r.first_seen_index("A"), None);
    }

    #[test]
    fn test_apply_connection_state() {
        let mut r = Reconciler::new();
        assert!(!r.apply_connection_state("A", true));

        r.ingest(obs("A", -40));
        r.flush();
        assert!(r.apply_connection_state("A", true));
        assert!(r.get("A").unwrap().paired);

        // flush does not touch the pairing flag of an existing record
        r.ingest(obs("A", -41));
        r.flush();
        assert!(r.get("A").unwrap().paired);
    }
}
