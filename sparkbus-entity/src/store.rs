use std::collections::HashMap;

use sparkbus_types::payload::PayloadMetric;
use sparkbus_types::utils::timestamp;
use sparkbus_types::{DataType, MetricValue};
use thiserror::Error;

/// Change hook invoked when a metric's value actually transitions.
pub type OnChange = Box<dyn FnMut(&MetricValue) + Send>;

#[derive(Error, Debug, PartialEq)]
pub enum MetricError {
    #[error("metric {name} is declared {expected:?}, write carried {actual:?}")]
    TypeMismatch {
        name: String,
        expected: DataType,
        actual: DataType,
    },
    #[error("unknown metric {0}")]
    Unknown(String),
}

/// A named, typed value with a timestamp and change-dirty flag.
pub struct Metric {
    name: String,
    value: MetricValue,
    datatype: DataType,
    timestamp: u64,
    dirty: bool,
    write_revision: u64,
    on_change: Option<OnChange>,
}

impl Metric {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &MetricValue {
        &self.value
    }

    pub fn datatype(&self) -> DataType {
        self.datatype
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

/// Insertion-ordered name → metric map with per-metric change tracking.
///
/// An entity composes three of these: attributes, data and commands. The
/// insertion order is preserved so payload layout stays deterministic.
#[derive(Default)]
pub struct MetricStore {
    metrics: Vec<Metric>,
    index: HashMap<String, usize>,
    revision: u64,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a metric, stamping it with the current time.
    ///
    /// See [set_value_with_timestamp](Self::set_value_with_timestamp).
    pub fn set_value<V: Into<MetricValue>>(
        &mut self,
        name: &str,
        value: V,
    ) -> Result<(), MetricError> {
        self.set_value_with_timestamp(name, value, timestamp())
    }

    /// Insert or update a metric.
    ///
    /// The first write under a name declares the metric's datatype for the
    /// lifetime of the store; a later write with a different datatype is
    /// rejected and leaves the stored value untouched. A successful write
    /// marks the metric dirty and, when the value actually changed, fires its
    /// `on_change` hook synchronously.
    pub fn set_value_with_timestamp<V: Into<MetricValue>>(
        &mut self,
        name: &str,
        value: V,
        timestamp: u64,
    ) -> Result<(), MetricError> {
        let value = value.into();
        self.revision += 1;
        match self.index.get(name) {
            Some(&index) => {
                let metric = &mut self.metrics[index];
                if metric.datatype != value.datatype() {
                    return Err(MetricError::TypeMismatch {
                        name: name.to_string(),
                        expected: metric.datatype,
                        actual: value.datatype(),
                    });
                }
                let changed = metric.value != value;
                metric.value = value;
                metric.timestamp = timestamp;
                metric.dirty = true;
                metric.write_revision = self.revision;
                if changed {
                    if let Some(on_change) = metric.on_change.as_mut() {
                        on_change(&metric.value);
                    }
                }
            }
            None => {
                self.index.insert(name.to_string(), self.metrics.len());
                self.metrics.push(Metric {
                    name: name.to_string(),
                    datatype: value.datatype(),
                    value,
                    timestamp,
                    dirty: true,
                    write_revision: self.revision,
                    on_change: None,
                });
            }
        }
        Ok(())
    }

    /// Register the change hook for an existing metric.
    pub fn set_on_change<F>(&mut self, name: &str, on_change: F) -> Result<(), MetricError>
    where
        F: FnMut(&MetricValue) + Send + 'static,
    {
        match self.index.get(name) {
            Some(&index) => {
                self.metrics[index].on_change = Some(Box::new(on_change));
                Ok(())
            }
            None => Err(MetricError::Unknown(name.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Metric> {
        self.index.get(name).map(|&index| &self.metrics[index])
    }

    pub fn get_value(&self, name: &str) -> Option<&MetricValue> {
        self.get(name).map(Metric::value)
    }

    pub fn datatype_of(&self, name: &str) -> Option<DataType> {
        self.get(name).map(Metric::datatype)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Metric names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.metrics.iter().map(Metric::name)
    }

    /// True iff at least one metric is dirty.
    pub fn is_updated(&self) -> bool {
        self.metrics.iter().any(Metric::is_dirty)
    }

    /// Clear every dirty flag. Called after a full-store flush.
    pub fn clear_dirty(&mut self) {
        for metric in &mut self.metrics {
            metric.dirty = false;
        }
    }

    /// Clear dirty flags only on metrics last written at or before `revision`.
    ///
    /// Lets a publisher snapshot, release the store lock for the send, and
    /// then clear exactly the flags it observed without losing writes that
    /// landed in between.
    pub fn clear_dirty_through(&mut self, revision: u64) {
        for metric in &mut self.metrics {
            if metric.write_revision <= revision {
                metric.dirty = false;
            }
        }
    }

    /// The store's current write revision, paired with
    /// [clear_dirty_through](Self::clear_dirty_through).
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// The metrics serialized into the next payload, in insertion order.
    pub fn snapshot(&self, dirty_only: bool) -> Vec<PayloadMetric> {
        self.metrics
            .iter()
            .filter(|metric| !dirty_only || metric.dirty)
            .map(|metric| {
                PayloadMetric::new(metric.name.clone(), metric.value.clone())
                    .with_timestamp(metric.timestamp)
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn set_value_registers_and_updates() {
        let mut store = MetricStore::new();
        store.set_value_with_timestamp("temperature", 20.0, 1).unwrap();
        assert_eq!(store.get_value("temperature"), Some(&MetricValue::Float(20.0)));
        store.set_value_with_timestamp("temperature", 21.0, 2).unwrap();
        assert_eq!(store.get_value("temperature"), Some(&MetricValue::Float(21.0)));
        assert_eq!(store.get("temperature").unwrap().timestamp(), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn datatype_fixed_at_registration() {
        let mut store = MetricStore::new();
        store.set_value("x", true).unwrap();
        let err = store.set_value("x", 5_i32).unwrap_err();
        assert_eq!(
            err,
            MetricError::TypeMismatch {
                name: "x".to_string(),
                expected: DataType::Boolean,
                actual: DataType::Integer,
            }
        );
        // rejected write leaves the stored value unchanged
        assert_eq!(store.get_value("x"), Some(&MetricValue::Boolean(true)));
    }

    #[test]
    fn dirty_tracking() {
        let mut store = MetricStore::new();
        store.set_value("a", 1_i32).unwrap();
        assert!(store.is_updated());
        store.clear_dirty();
        assert!(!store.is_updated());
        store.set_value("a", 2_i32).unwrap();
        assert!(store.is_updated());
    }

    #[test]
    fn on_change_fires_only_on_transitions() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut store = MetricStore::new();
        store.set_value("relay", false).unwrap();
        let seen_in_hook = seen.clone();
        store
            .set_on_change("relay", move |value| {
                seen_in_hook.lock().unwrap().push(value.clone());
            })
            .unwrap();

        store.set_value("relay", true).unwrap();
        store.set_value("relay", true).unwrap();
        store.set_value("relay", false).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![MetricValue::Boolean(true), MetricValue::Boolean(false)]
        );
    }

    #[test]
    fn unchanged_write_still_marks_dirty() {
        let mut store = MetricStore::new();
        store.set_value("a", 1_i32).unwrap();
        store.clear_dirty();
        store.set_value("a", 1_i32).unwrap();
        assert!(store.is_updated());
    }

    #[test]
    fn on_change_for_unknown_metric() {
        let mut store = MetricStore::new();
        assert_eq!(
            store.set_on_change("nope", |_| {}).unwrap_err(),
            MetricError::Unknown("nope".to_string())
        );
    }

    #[test]
    fn snapshot_preserves_insertion_order() {
        let mut store = MetricStore::new();
        store.set_value_with_timestamp("b", 1_i32, 1).unwrap();
        store.set_value_with_timestamp("a", 2_i32, 1).unwrap();
        store.set_value_with_timestamp("c", 3_i32, 1).unwrap();
        let names: Vec<String> = store
            .snapshot(false)
            .into_iter()
            .map(|metric| metric.name)
            .collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn dirty_only_snapshot() {
        let mut store = MetricStore::new();
        store.set_value("a", 1_i32).unwrap();
        store.set_value("b", 2_i32).unwrap();
        store.clear_dirty();
        store.set_value("b", 3_i32).unwrap();
        let snapshot = store.snapshot(true);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name, "b");
        assert_eq!(store.snapshot(false).len(), 2);
    }

    #[test]
    fn clear_dirty_through_keeps_later_writes_dirty() {
        let mut store = MetricStore::new();
        store.set_value("a", 1_i32).unwrap();
        store.set_value("b", 1_i32).unwrap();
        let revision = store.revision();
        store.set_value("b", 2_i32).unwrap();
        store.clear_dirty_through(revision);
        assert!(!store.get("a").unwrap().is_dirty());
        assert!(store.get("b").unwrap().is_dirty());
    }
}
