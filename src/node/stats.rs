//! Stats counters, gauges, timings, and the named provider registry.

use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::errors::NodeError;

/// A named source of stats, merged into [`Stats::get_stats`] output.
pub trait StatsProvider: Send + Sync {
    fn get_stats(&self) -> Value;
}

#[derive(Default, Clone, Copy)]
struct TimingAgg {
    count: u64,
    total_ms: u64,
    max_ms: u64,
}

#[derive(Default)]
pub struct Stats {
    counters: DashMap<String, u64>,
    gauges: DashMap<String, i64>,
    timings: DashMap<String, TimingAgg>,
    hooks: DashMap<String, Arc<dyn StatsProvider>>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(&self, name: &str) {
        *self.counters.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).map(|v| *v).unwrap_or(0)
    }

    pub fn set_gauge(&self, name: &str, value: i64) {
        self.gauges.insert(name.to_string(), value);
    }

    pub fn gauge(&self, name: &str) -> Option<i64> {
        self.gauges.get(name).map(|v| *v)
    }

    pub fn record_timing(&self, name: &str, elapsed: Duration) {
        let ms = elapsed.as_millis() as u64;
        let mut agg = self.timings.entry(name.to_string()).or_default();
        agg.count += 1;
        agg.total_ms += ms;
        agg.max_ms = agg.max_ms.max(ms);
    }

    /// Register a named stats provider. Duplicate names are a configuration
    /// error, so two subsystems cannot silently shadow each other.
    pub fn register_hook(
        &self,
        name: impl Into<String>,
        provider: Arc<dyn StatsProvider>,
    ) -> Result<(), NodeError> {
        let name = name.into();
        if self.hooks.contains_key(&name) {
            return Err(NodeError::Configuration(format!(
                "stats hook {name:?} is already registered"
            )));
        }
        self.hooks.insert(name, provider);
        Ok(())
    }

    /// Snapshot of all counters, gauges, timings, and hook outputs.
    pub fn get_stats(&self) -> Value {
        let counters: serde_json::Map<String, Value> = self
            .counters
            .iter()
            .map(|e| (e.key().clone(), json!(*e.value())))
            .collect();
        let gauges: serde_json::Map<String, Value> = self
            .gauges
            .iter()
            .map(|e| (e.key().clone(), json!(*e.value())))
            .collect();
        let timings: serde_json::Map<String, Value> = self
            .timings
            .iter()
            .map(|e| {
                let agg = e.value();
                (
                    e.key().clone(),
                    json!({
                        "count": agg.count,
                        "totalMs": agg.total_ms,
                        "maxMs": agg.max_ms,
                    }),
                )
            })
            .collect();
        let hooks: serde_json::Map<String, Value> = self
            .hooks
            .iter()
            .map(|e| (e.key().clone(), e.value().get_stats()))
            .collect();

        json!({
            "counters": counters,
            "gauges": gauges,
            "timings": timings,
            "hooks": hooks,
        })
    }
}
