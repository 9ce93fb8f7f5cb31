// Module: Monitor
// Background metric collectors bound to a unit group.

pub mod system;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

pub use crate::result::MetricPoint;

/// Plug-in contract for a metric collector.
///
/// `collect` starts the background sampler; pull-style monitors backed by a
/// metrics platform have nothing to start and keep the default no-op.
/// `stat` stops any sampler, waits for it to drain, and returns the series
/// gathered between `start` and `end`.
#[async_trait]
pub trait Monitor: Send + Sync {
    fn collect(&self) {}

    /// Dimension → unit label, e.g. `{"CPU": "percent", "Mem": "byte"}`.
    fn unit(&self) -> BTreeMap<String, String>;

    async fn stat(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BTreeMap<String, Vec<MetricPoint>>>;
}

/// Constructor registered under a monitor type name.
pub type MonitorCtor = fn(&Value) -> Result<Arc<dyn Monitor>>;

/// Monitor registry keyed by type name; closed once the run starts.
pub type MonitorMap = HashMap<String, MonitorCtor>;

pub fn default_monitor_map() -> MonitorMap {
    let mut map: MonitorMap = HashMap::new();
    map.insert("system".to_string(), |args| {
        Ok(Arc::new(system::SystemMonitor::new(args)?) as Arc<dyn Monitor>)
    });
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_contains_builtins() {
        assert!(default_monitor_map().contains_key("system"));
    }
}
