// Module: Report
// Renders a finished TestResult for humans (text) or machines (json).

pub mod json;
pub mod text;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::Value;

use crate::i18n::I18n;
use crate::result::TestResult;

pub trait Reporter: Send + Sync {
    fn report(&self, res: &TestResult) -> String;
}

/// Constructor registered under a reporter name; receives the reporter's
/// section of the customize file and the resolved label table.
pub type ReporterCtor = fn(&Value, &I18n) -> Result<Arc<dyn Reporter>>;

pub type ReporterMap = HashMap<String, ReporterCtor>;

pub fn default_reporter_map() -> ReporterMap {
    let mut map: ReporterMap = HashMap::new();
    map.insert("text".to_string(), |args, i18n| {
        Ok(Arc::new(text::TextReporter::new(args, i18n.clone())) as Arc<dyn Reporter>)
    });
    map.insert("json".to_string(), |_args, _i18n| {
        Ok(Arc::new(json::JsonReporter) as Arc<dyn Reporter>)
    });
    map
}

/// Compact human formatting for durations: `850µs`, `12.5ms`, `1.20s`,
/// `2m05s`.
pub fn fmt_duration(d: Duration) -> String {
    let micros = d.as_micros();
    if micros < 1_000 {
        format!("{micros}µs")
    } else if micros < 1_000_000 {
        format!("{:.1}ms", micros as f64 / 1_000.0)
    } else if micros < 60_000_000 {
        format!("{:.2}s", micros as f64 / 1_000_000.0)
    } else {
        let secs = d.as_secs();
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}
