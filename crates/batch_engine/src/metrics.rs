//! Phase timing collection.
//!
//! The engine records per-phase durations through a [`MetricsSink`]. The
//! provided [`Metrics`] collector accumulates entries in memory and offers
//! simple aggregates; attaching no sink at all is always fine.

use std::sync::Mutex;
use std::time::Duration;

/// Receives one timing observation per engine phase.
pub trait MetricsSink: Send + Sync {
    fn record(&self, name: &str, duration: Duration, unit: &str);
}

#[derive(Debug, Clone)]
pub struct MetricEntry {
    pub name: String,
    pub duration: Duration,
    pub unit: String,
}

/// An in-memory metrics collector.
#[derive(Default)]
pub struct Metrics {
    entries: Mutex<Vec<MetricEntry>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of observations recorded under `name`.
    pub fn count(&self, name: &str) -> usize {
        self.lock().iter().filter(|e| e.name == name).count()
    }

    /// Total duration recorded under `name`.
    pub fn sum(&self, name: &str) -> Duration {
        self.lock()
            .iter()
            .filter(|e| e.name == name)
            .map(|e| e.duration)
            .sum()
    }

    /// Mean duration recorded under `name`, if any observations exist.
    pub fn mean(&self, name: &str) -> Option<Duration> {
        let count = self.count(name);
        if count == 0 {
            return None;
        }
        Some(self.sum(name) / count as u32)
    }

    /// All observations, in recording order.
    pub fn entries(&self) -> Vec<MetricEntry> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<MetricEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl MetricsSink for Metrics {
    fn record(&self, name: &str, duration: Duration, unit: &str) {
        self.lock().push(MetricEntry {
            name: name.to_string(),
            duration,
            unit: unit.to_string(),
        });
    }
}
