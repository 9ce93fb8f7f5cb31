//! # System monitor
//!
//! Samples host metrics on a background task while a unit group runs.
//!
//! Args: `{seconds, metrics, networkInterface}`. `seconds` is the group's
//! wall bound; the sampling delay is `seconds / 100` floored at 100ms
//! (1s when unset), so a bounded run yields on the order of a hundred
//! points.
//! Supported metrics: `CPU` (percent), `Mem` (bytes used), `Disk` (bytes
//! used across mounts), `Network` (cumulative bytes received/sent on the
//! configured interface, reported as `NetIOR`/`NetIOW`).
//!
//! The sampler owns its `sysinfo` handles and polls a stop flag between
//! sleeps; `stat` flips the flag, awaits the task, and drops each series'
//! first point (the initial CPU reading is a warm-up artifact).

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sysinfo::{Disks, Networks, System};
use tokio::task::JoinHandle;

use super::{MetricPoint, Monitor};

pub struct SystemMonitor {
    inner: Arc<Inner>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    delay: Duration,
    enabled: HashSet<String>,
    network_interface: String,
    stop: AtomicBool,
    samples: Mutex<BTreeMap<String, Vec<MetricPoint>>>,
}

fn sampling_delay(seconds: u64) -> Duration {
    if seconds == 0 {
        return Duration::from_secs(1);
    }
    Duration::from_millis(seconds * 1000 / 100).max(Duration::from_millis(100))
}

impl SystemMonitor {
    pub fn new(args: &Value) -> Result<Self> {
        let seconds = args.get("seconds").and_then(|v| v.as_u64()).unwrap_or(0);
        let enabled: HashSet<String> = args
            .get("metrics")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_else(|| ["CPU", "Mem"].iter().map(|s| s.to_string()).collect());
        let network_interface = args
            .get("networkInterface")
            .and_then(|v| v.as_str())
            .unwrap_or("eth0")
            .to_string();
        Ok(Self {
            inner: Arc::new(Inner {
                delay: sampling_delay(seconds),
                enabled,
                network_interface,
                stop: AtomicBool::new(false),
                samples: Mutex::new(BTreeMap::new()),
            }),
            handle: Mutex::new(None),
        })
    }
}

impl Inner {
    fn push(&self, dim: &str, time: DateTime<Utc>, value: f64) {
        let mut samples = self.samples.lock().expect("samples lock");
        samples
            .entry(dim.to_string())
            .or_default()
            .push(MetricPoint { time, value });
    }

    fn sample(&self, sys: &mut System, networks: &mut Networks) {
        let now = Utc::now();
        if self.enabled.contains("CPU") {
            sys.refresh_cpu_usage();
            self.push("CPU", now, sys.global_cpu_info().cpu_usage() as f64);
        }
        if self.enabled.contains("Mem") {
            sys.refresh_memory();
            self.push("Mem", now, sys.used_memory() as f64);
        }
        if self.enabled.contains("Disk") {
            let disks = Disks::new_with_refreshed_list();
            let used: u64 = disks
                .iter()
                .map(|d| d.total_space().saturating_sub(d.available_space()))
                .sum();
            self.push("Disk", now, used as f64);
        }
        if self.enabled.contains("Network") {
            networks.refresh();
            for (name, data) in networks.iter() {
                if *name == self.network_interface {
                    self.push("NetIOR", now, data.total_received() as f64);
                    self.push("NetIOW", now, data.total_transmitted() as f64);
                }
            }
        }
    }
}

#[async_trait]
impl Monitor for SystemMonitor {
    fn collect(&self) {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let mut sys = System::new();
            let mut networks = Networks::new_with_refreshed_list();
            while !inner.stop.load(Ordering::Relaxed) {
                inner.sample(&mut sys, &mut networks);
                tokio::time::sleep(inner.delay).await;
            }
        });
        *self.handle.lock().expect("handle lock") = Some(handle);
    }

    fn unit(&self) -> BTreeMap<String, String> {
        let mut units = BTreeMap::new();
        if self.inner.enabled.contains("CPU") {
            units.insert("CPU".to_string(), "percent".to_string());
        }
        if self.inner.enabled.contains("Mem") {
            units.insert("Mem".to_string(), "byte".to_string());
        }
        if self.inner.enabled.contains("Disk") {
            units.insert("Disk".to_string(), "byte".to_string());
        }
        if self.inner.enabled.contains("Network") {
            units.insert("NetIOR".to_string(), "byte".to_string());
            units.insert("NetIOW".to_string(), "byte".to_string());
        }
        units
    }

    async fn stat(
        &self,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<BTreeMap<String, Vec<MetricPoint>>> {
        self.inner.stop.store(true, Ordering::Relaxed);
        let handle = self.handle.lock().expect("handle lock").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        let samples = self.inner.samples.lock().expect("samples lock");
        Ok(samples
            .iter()
            .map(|(dim, points)| (dim.clone(), points.iter().skip(1).cloned().collect()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sampling_delay_derivation() {
        assert_eq!(sampling_delay(0), Duration::from_secs(1));
        assert_eq!(sampling_delay(5), Duration::from_millis(100));
        assert_eq!(sampling_delay(60), Duration::from_millis(600));
        assert_eq!(sampling_delay(600), Duration::from_secs(6));
    }

    #[test]
    fn test_unit_labels_follow_metric_set() {
        let monitor =
            SystemMonitor::new(&json!({"metrics": ["CPU", "Network"]})).unwrap();
        let units = monitor.unit();
        assert_eq!(units["CPU"], "percent");
        assert_eq!(units["NetIOR"], "byte");
        assert!(!units.contains_key("Mem"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_collect_then_stat_drains_sampler() {
        let monitor = SystemMonitor::new(&json!({"seconds": 10, "metrics": ["Mem"]})).unwrap();
        monitor.collect();
        tokio::time::sleep(Duration::from_millis(350)).await;
        let start = Utc::now();
        let stat = monitor.stat(start, Utc::now()).await.unwrap();
        let mem = stat.get("Mem").expect("Mem series");
        assert!(!mem.is_empty());
        assert!(mem.iter().all(|p| p.value > 0.0));
    }

    #[tokio::test]
    async fn test_stat_without_collect_is_empty() {
        let monitor = SystemMonitor::new(&json!({})).unwrap();
        let stat = monitor.stat(Utc::now(), Utc::now()).await.unwrap();
        assert!(stat.is_empty());
    }
}
