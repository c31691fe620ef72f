//! In-process metric registry.
//!
//! Instruments are identified by a static name and an [`Attributes`] set;
//! recording and observing go through cheaply cloneable handles so hot paths
//! never take the registry lock.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

use parking_lot::Mutex;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A sorted set of key-value pairs identifying one instrument of a metric.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Attributes(BTreeMap<&'static str, String>);

impl Attributes {
    /// Insert or replace an attribute.
    pub fn insert(&mut self, key: &'static str, value: impl Into<String>) {
        self.0.insert(key, value.into());
    }
}

impl<'a, const N: usize> From<&'a [(&'static str, &'a str); N]> for Attributes {
    fn from(pairs: &'a [(&'static str, &'a str); N]) -> Self {
        Self(
            pairs
                .iter()
                .map(|(k, v)| (*k, v.to_string()))
                .collect(),
        )
    }
}

impl<'a> From<&'a [(&'static str, &'a str)]> for Attributes {
    fn from(pairs: &'a [(&'static str, &'a str)]) -> Self {
        Self(
            pairs
                .iter()
                .map(|(k, v)| (*k, v.to_string()))
                .collect(),
        )
    }
}

/// Values that can act as per-attribute-set instruments of a [`Metric`].
pub trait Instrument: Debug + Clone + Default + Send + Sync + 'static {}

impl<T: Debug + Clone + Default + Send + Sync + 'static> Instrument for T {}

/// A monotonically increasing counter.
#[derive(Debug, Clone, Default)]
pub struct U64Counter(Arc<AtomicU64>);

impl U64Counter {
    /// Increment the counter by `count`.
    pub fn inc(&self, count: u64) {
        self.0.fetch_add(count, Ordering::Relaxed);
    }

    /// Read the current value.
    pub fn fetch(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge holding the most recently recorded value.
#[derive(Debug, Clone, Default)]
pub struct U64Gauge(Arc<AtomicU64>);

impl U64Gauge {
    /// Set the gauge.
    pub fn set(&self, value: u64) {
        self.0.store(value, Ordering::Relaxed);
    }

    /// Increment the gauge by `delta`.
    pub fn inc(&self, delta: u64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }

    /// Decrement the gauge by `delta`.
    pub fn dec(&self, delta: u64) {
        self.0.fetch_sub(delta, Ordering::Relaxed);
    }

    /// Read the current value.
    pub fn fetch(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A named family of instruments, one per [`Attributes`] set.
#[derive(Debug, Clone)]
pub struct Metric<T: Instrument> {
    name: &'static str,
    description: &'static str,
    instruments: Arc<Mutex<BTreeMap<Attributes, T>>>,
}

impl<T: Instrument> Metric<T> {
    fn new(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            instruments: Default::default(),
        }
    }

    /// The metric name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The metric help text.
    pub fn description(&self) -> &'static str {
        self.description
    }

    /// Get or create the instrument for `attributes`.
    pub fn recorder(&self, attributes: impl Into<Attributes>) -> T {
        let attributes = attributes.into();
        self.instruments
            .lock()
            .entry(attributes)
            .or_default()
            .clone()
    }

    /// Get the instrument for `attributes` if one has been recorded.
    pub fn get_observer(&self, attributes: &Attributes) -> Option<T> {
        self.instruments.lock().get(attributes).cloned()
    }
}

/// Registry of all metrics of a process.
#[derive(Default)]
pub struct Registry {
    metrics: Mutex<BTreeMap<&'static str, Box<dyn Any + Send>>>,
}

impl Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let metrics = self.metrics.lock();
        f.debug_struct("Registry")
            .field("metrics", &metrics.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or fetch the previously registered) metric called `name`.
    ///
    /// Panics if `name` was previously registered with a different
    /// instrument type.
    pub fn register_metric<T: Instrument>(
        &self,
        name: &'static str,
        description: &'static str,
    ) -> Metric<T> {
        let mut metrics = self.metrics.lock();
        let entry = metrics
            .entry(name)
            .or_insert_with(|| Box::new(Metric::<T>::new(name, description)));
        entry
            .downcast_ref::<Metric<T>>()
            .unwrap_or_else(|| panic!("metric {} registered with a different type", name))
            .clone()
    }

    /// Look up a previously registered metric.
    pub fn get_instrument<T: Instrument>(&self, name: &'static str) -> Option<Metric<T>> {
        self.metrics
            .lock()
            .get(name)
            .and_then(|m| m.downcast_ref::<Metric<T>>())
            .cloned()
    }
}
