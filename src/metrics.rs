//! Client Metrics
//!
//! Prometheus counters for fallback hops and write-visibility polling.
//! Recording never fails and never influences control flow.

use crate::error::Result;
use prometheus::core::Collector;
use prometheus::{IntCounterVec, Opts, Registry};

/// Counters emitted by the client stack
#[derive(Debug, Clone)]
pub struct ClientMetrics {
    conversion_fallbacks: IntCounterVec,
    visibility_polls: IntCounterVec,
    visibility_timeouts: IntCounterVec,
}

impl ClientMetrics {
    /// Create counters and register them on `registry`
    pub fn register(registry: &Registry) -> Result<Self> {
        let metrics = Self::unregistered()?;
        registry.register(Box::new(metrics.conversion_fallbacks.clone()))?;
        registry.register(Box::new(metrics.visibility_polls.clone()))?;
        registry.register(Box::new(metrics.visibility_timeouts.clone()))?;
        Ok(metrics)
    }

    /// Create counters without exposing them anywhere
    pub fn unregistered() -> Result<Self> {
        Ok(Self {
            conversion_fallbacks: IntCounterVec::new(
                Opts::new(
                    "resource_client_conversion_fallback_total",
                    "Reads re-issued against the version an object is stored in",
                ),
                &["stored_version"],
            )?,
            visibility_polls: IntCounterVec::new(
                Opts::new(
                    "resource_client_visibility_polls_total",
                    "Search polls issued while waiting for a write to become visible",
                ),
                &["operation"],
            )?,
            visibility_timeouts: IntCounterVec::new(
                Opts::new(
                    "resource_client_visibility_timeouts_total",
                    "Writes whose effect was not visible in search within the retry budget",
                ),
                &["operation"],
            )?,
        })
    }

    #[inline]
    pub fn record_conversion_fallback(&self, stored_version: &str) {
        self.conversion_fallbacks
            .with_label_values(&[stored_version])
            .inc();
    }

    #[inline]
    pub fn record_visibility_poll(&self, operation: &str) {
        self.visibility_polls.with_label_values(&[operation]).inc();
    }

    #[inline]
    pub fn record_visibility_timeout(&self, operation: &str) {
        self.visibility_timeouts
            .with_label_values(&[operation])
            .inc();
    }

    /// Current count for one stored version. Reads never create a series.
    pub fn conversion_fallbacks(&self, stored_version: &str) -> u64 {
        counter_value(&self.conversion_fallbacks, "stored_version", stored_version)
    }

    pub fn visibility_polls(&self, operation: &str) -> u64 {
        counter_value(&self.visibility_polls, "operation", operation)
    }

    pub fn visibility_timeouts(&self, operation: &str) -> u64 {
        counter_value(&self.visibility_timeouts, "operation", operation)
    }

    /// Total fallback hops across all stored versions
    pub fn total_conversion_fallbacks(&self) -> u64 {
        self.conversion_fallbacks
            .collect()
            .iter()
            .flat_map(|family| family.get_metric())
            .map(|m| m.get_counter().get_value() as u64)
            .sum()
    }
}

/// Value of the series labelled `label=value`, or 0 if it was never recorded
fn counter_value(vec: &IntCounterVec, label: &str, value: &str) -> u64 {
    vec.collect()
        .iter()
        .flat_map(|family| family.get_metric())
        .filter(|m| {
            m.get_label()
                .iter()
                .any(|pair| pair.get_name() == label && pair.get_value() == value)
        })
        .map(|m| m.get_counter().get_value() as u64)
        .sum()
}
