//! # Result model
//!
//! The hierarchical outcome of a run:
//!
//! ```text
//! TestResult
//! ├── plans: PlanResult[]
//! │   └── unit_groups: UnitGroup[]
//! │       ├── units: UnitResult[]
//! │       │   ├── stages: UnitStageResult[]   (QPS/rate time series)
//! │       │   └── sample_steps: StepResult[]  (runtime only, for quantiles)
//! │       └── monitors: {name → MonitorStats}
//! └── sub_tests: TestResult[]
//! ```
//!
//! Every node is created by the component one level up, mutated only on its
//! owning worker or aggregator task, then published to its parent and
//! treated as read-only.
//!
//! The JSON wire format is stable: camelCase keys, durations as integer
//! microseconds, timestamps as RFC-3339. Retained step samples and the
//! sampling cap are runtime state and never serialize.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Number of stages a unit's run is divided into for time-series charts.
const STAGE_NUMBER: u64 = 100;

/// Smallest stage window; avoids thousands of near-empty stages.
const MIN_STAGE_MILLISECONDS: u64 = 100;

/// Default bound on retained step samples used for quantile estimation.
pub const DEFAULT_MAX_STEP_SIZE: usize = 200_000;

/// Default quantile keys when a group does not configure any.
pub fn default_quantile_keys() -> Vec<f64> {
    vec![80.0, 90.0, 95.0, 99.0, 99.9]
}

/// Serializes a `Duration` as integer microseconds.
mod micros {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_micros() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_micros(u64::deserialize(d)?))
    }
}

/// Serializes a quantile map as `{key → microseconds}`.
mod micros_map {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<String, Duration>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        let plain: BTreeMap<&String, u64> =
            map.iter().map(|(k, v)| (k, v.as_micros() as u64)).collect();
        plain.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<BTreeMap<String, Duration>, D::Error> {
        let plain = BTreeMap::<String, u64>::deserialize(d)?;
        Ok(plain
            .into_iter()
            .map(|(k, v)| (k, Duration::from_micros(v)))
            .collect())
    }
}

/// Map key for a quantile: `80` → `"80"`, `99.9` → `"99.9"`.
pub fn quantile_key(key: f64) -> String {
    if key.fract() == 0.0 {
        format!("{}", key as u64)
    } else {
        format!("{key}")
    }
}

// ----------------------------------------------------------------------------
// Sub-step / step
// ----------------------------------------------------------------------------

/// One driver invocation inside a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubStepResult {
    pub req: Value,
    pub res: Value,
    pub name: String,
    /// Classification key rendered from the response contract (`groupby`).
    pub code: String,
    pub success: bool,
    #[serde(with = "micros")]
    pub elapse: Duration,
}

/// One execution of a unit's step sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Wire name kept from the original format.
    #[serde(rename = "step")]
    pub sub_steps: Vec<SubStepResult>,
    pub code: String,
    pub success: bool,
    #[serde(with = "micros")]
    pub elapse: Duration,
    #[serde(rename = "isErr")]
    pub is_err: bool,
    pub err: String,
}

impl Default for StepResult {
    fn default() -> Self {
        Self::new()
    }
}

impl StepResult {
    pub fn new() -> Self {
        Self {
            sub_steps: Vec::new(),
            code: String::new(),
            success: true,
            elapse: Duration::ZERO,
            is_err: false,
            err: String::new(),
        }
    }

    /// Appends a sub-step in spec order. The step fails as soon as any
    /// sub-step fails; the code records the first failing sub-step.
    pub fn add_sub_step_result(&mut self, result: SubStepResult) {
        self.elapse += result.elapse;
        if !result.success && self.success {
            self.success = false;
            self.code = format!("{}.{}", result.name, result.code);
        }
        self.sub_steps.push(result);
    }

    /// Marks the step as errored out inside sub-step `name`.
    pub fn add_err_result(&mut self, name: &str, err: impl Into<String>) {
        self.is_err = true;
        self.err = err.into();
        self.success = false;
        self.code = format!("{name}.ERROR");
    }
}

// ----------------------------------------------------------------------------
// Unit stage
// ----------------------------------------------------------------------------

/// A time- or count-windowed slice of a unit's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitStageResult {
    pub time: DateTime<Utc>,
    pub success: u64,
    pub total: u64,
    pub qps: f64,
    pub rate: f64,
    #[serde(rename = "resTime", with = "micros")]
    pub res_time: Duration,
    #[serde(with = "micros")]
    pub elapse: Duration,
}

impl Default for UnitStageResult {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitStageResult {
    pub fn new() -> Self {
        Self {
            time: Utc::now(),
            success: 0,
            total: 0,
            qps: 0.0,
            rate: 0.0,
            res_time: Duration::ZERO,
            elapse: Duration::ZERO,
        }
    }

    pub fn add_step_result(&mut self, result: &StepResult) {
        self.total += 1;
        if result.success {
            self.success += 1;
            self.elapse += result.elapse;
        }
    }

    pub fn summary(&mut self) {
        let seconds = (Utc::now() - self.time)
            .num_microseconds()
            .unwrap_or(0)
            .max(0) as f64
            / 1_000_000.0;
        if seconds > 0.0 {
            self.qps = self.success as f64 / seconds;
        }
        if self.success != 0 {
            self.res_time = self.elapse / self.success as u32;
        }
        if self.total != 0 {
            self.rate = self.success as f64 / self.total as f64;
        }
    }
}

// ----------------------------------------------------------------------------
// Unit
// ----------------------------------------------------------------------------

/// Aggregated outcome of one unit: totals, per-code counters, staged time
/// series and quantile estimates over a bounded sample of steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitResult {
    pub name: String,
    pub parallel: u64,
    pub limit: u64,
    pub success: u64,
    pub total: u64,
    pub qps: f64,
    /// Failure codes counted during the run; `"OK"` is stamped with the
    /// success count at finalize.
    pub code: BTreeMap<String, u64>,
    #[serde(with = "micros")]
    pub elapse: Duration,
    pub rate: f64,
    #[serde(rename = "resTime", with = "micros")]
    pub res_time: Duration,
    #[serde(rename = "startTime")]
    pub start_time: DateTime<Utc>,
    #[serde(rename = "endTime")]
    pub end_time: DateTime<Utc>,
    #[serde(rename = "isErr")]
    pub is_err: bool,
    pub err: String,
    pub stages: Vec<UnitStageResult>,
    #[serde(rename = "stageMilliseconds")]
    pub stage_milliseconds: u64,
    #[serde(rename = "stageTimes")]
    pub stage_times: u64,
    #[serde(with = "micros_map")]
    pub quantile: BTreeMap<String, Duration>,

    #[serde(skip)]
    pub quantile_keys: Vec<f64>,
    #[serde(skip)]
    pub max_step_size: usize,
    #[serde(skip)]
    pub sample_steps: Vec<StepResult>,
    #[serde(skip)]
    current_stage: UnitStageResult,
}

impl UnitResult {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        parallel: u64,
        limit: u64,
        stage_seconds: u64,
        stage_times: u64,
        quantile_keys: Option<Vec<f64>>,
        max_step_size: usize,
    ) -> Self {
        let mut stage_milliseconds = stage_seconds * 1000 / STAGE_NUMBER;
        if stage_milliseconds < MIN_STAGE_MILLISECONDS {
            stage_milliseconds = MIN_STAGE_MILLISECONDS;
        }
        let now = Utc::now();
        Self {
            name: name.into(),
            parallel,
            limit,
            success: 0,
            total: 0,
            qps: 0.0,
            code: BTreeMap::new(),
            elapse: Duration::ZERO,
            rate: 0.0,
            res_time: Duration::ZERO,
            start_time: now,
            end_time: now,
            is_err: false,
            err: String::new(),
            stages: Vec::new(),
            stage_milliseconds,
            stage_times: stage_times / STAGE_NUMBER,
            quantile: BTreeMap::new(),
            quantile_keys: quantile_keys.unwrap_or_else(default_quantile_keys),
            max_step_size,
            sample_steps: Vec::new(),
            current_stage: UnitStageResult::new(),
        }
    }

    pub fn with_err(name: impl Into<String>, parallel: u64, limit: u64, err: String) -> Self {
        let mut unit = Self::new(name, parallel, limit, 0, 0, None, 0);
        unit.is_err = true;
        unit.err = err;
        unit
    }

    /// Folds one step result into the running totals, the open stage and the
    /// bounded sample buffer.
    pub fn add_step_result(&mut self, result: StepResult) {
        self.total += 1;
        if result.success {
            self.success += 1;
            self.elapse += result.elapse;
        } else {
            *self.code.entry(result.code.clone()).or_insert(0) += 1;
        }

        self.current_stage.add_step_result(&result);
        let stage_age_ms = (Utc::now() - self.current_stage.time)
            .num_milliseconds()
            .max(0) as u64;
        if self.stage_milliseconds != 0 && stage_age_ms >= self.stage_milliseconds {
            self.rotate_stage();
        }
        if self.stage_times != 0 && self.current_stage.total >= self.stage_times {
            self.rotate_stage();
        }

        if self.max_step_size == 0 || self.sample_steps.len() < self.max_step_size {
            self.sample_steps.push(result);
        } else {
            // Bounded retention: overwrite a uniformly chosen slot. Newer
            // results displace older ones more often than true reservoir
            // sampling would; callers must not assume a uniform sample.
            let idx = rand::thread_rng().gen_range(0..self.sample_steps.len());
            self.sample_steps[idx] = result;
        }
    }

    fn rotate_stage(&mut self) {
        let mut stage = std::mem::take(&mut self.current_stage);
        stage.summary();
        self.stages.push(stage);
    }

    /// Finalizes the unit: totals, quantiles over the retained sample sorted
    /// by elapse, the `"OK"` code entry and the open stage.
    pub fn summary(&mut self) {
        self.end_time = Utc::now();
        let total_seconds = (self.end_time - self.start_time)
            .num_microseconds()
            .unwrap_or(0)
            .max(0) as f64
            / 1_000_000.0;
        if total_seconds > 0.0 {
            self.qps = self.success as f64 / total_seconds;
        }
        if self.success != 0 {
            self.res_time = self.elapse / self.success as u32;
        }
        if self.total != 0 {
            self.rate = self.success as f64 / self.total as f64;
        }
        self.code.insert("OK".to_string(), self.success);

        if !self.sample_steps.is_empty() {
            self.sample_steps.sort_by_key(|s| s.elapse);
            let len = self.sample_steps.len();
            for key in self.quantile_keys.clone() {
                let idx = ((len as f64 * key / 100.0).floor() as usize).min(len - 1);
                self.quantile
                    .insert(quantile_key(key), self.sample_steps[idx].elapse);
            }
        }

        self.rotate_stage();
    }

    pub fn set_err(&mut self, err: impl Into<String>) {
        self.is_err = true;
        self.err = err.into();
    }
}

// ----------------------------------------------------------------------------
// Monitor series
// ----------------------------------------------------------------------------

/// One sampled metric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub time: DateTime<Utc>,
    pub value: f64,
}

/// Per-monitor dimension units and time series attached to a group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorStats {
    #[serde(default)]
    pub unit: BTreeMap<String, String>,
    #[serde(default)]
    pub stat: BTreeMap<String, Vec<MetricPoint>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

// ----------------------------------------------------------------------------
// Group / plan / test
// ----------------------------------------------------------------------------

/// Outcome of one `group` entry: its units in spec order plus monitor data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitGroup {
    pub idx: usize,
    pub seconds: u64,
    pub times: u64,
    /// Quantile keys that applied to every unit of the group.
    pub quantile: Vec<f64>,
    pub units: Vec<UnitResult>,
    #[serde(default)]
    pub monitors: BTreeMap<String, MonitorStats>,
}

impl UnitGroup {
    pub fn new(idx: usize, seconds: u64, times: u64, quantile: Option<Vec<f64>>) -> Self {
        Self {
            idx,
            seconds,
            times,
            quantile: quantile.unwrap_or_else(default_quantile_keys),
            units: Vec::new(),
            monitors: BTreeMap::new(),
        }
    }

    pub fn add_unit_result(&mut self, unit: UnitResult) {
        self.units.push(unit);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanResult {
    pub id: String,
    pub name: String,
    #[serde(rename = "isErr")]
    pub is_err: bool,
    pub err: String,
    #[serde(rename = "unitGroups")]
    pub unit_groups: Vec<UnitGroup>,
}

impl PlanResult {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_err: false,
            err: String::new(),
            unit_groups: Vec::new(),
        }
    }

    pub fn add_unit_group(&mut self, group: UnitGroup) {
        self.unit_groups.push(group);
    }

    pub fn set_err(&mut self, err: impl Into<String>) {
        self.is_err = true;
        self.err = err.into();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    /// Run-wide id shared by every test node of one invocation.
    pub id: String,
    pub directory: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "isErr")]
    pub is_err: bool,
    pub err: String,
    pub plans: Vec<PlanResult>,
    #[serde(rename = "subTests")]
    pub sub_tests: Vec<TestResult>,
}

impl TestResult {
    pub fn new(
        id: impl Into<String>,
        directory: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            directory: directory.into(),
            name: name.into(),
            description: description.into(),
            is_err: false,
            err: String::new(),
            plans: Vec::new(),
            sub_tests: Vec::new(),
        }
    }

    pub fn add_plan_result(&mut self, plan: PlanResult) {
        self.plans.push(plan);
    }

    pub fn add_sub_test_result(&mut self, sub_test: TestResult) {
        self.sub_tests.push(sub_test);
    }

    pub fn set_err(&mut self, err: impl Into<String>) {
        self.is_err = true;
        self.err = err.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok_step(millis: u64) -> StepResult {
        let mut step = StepResult::new();
        step.add_sub_step_result(SubStepResult {
            req: json!({"n": 1}),
            res: json!({"code": "OK"}),
            name: "step-0".to_string(),
            code: "OK".to_string(),
            success: true,
            elapse: Duration::from_millis(millis),
        });
        step
    }

    fn failed_step(code: &str) -> StepResult {
        let mut step = StepResult::new();
        step.add_sub_step_result(SubStepResult {
            req: json!({}),
            res: json!({"code": code}),
            name: "step-0".to_string(),
            code: code.to_string(),
            success: false,
            elapse: Duration::from_millis(1),
        });
        step
    }

    #[test]
    fn test_step_elapse_is_sum_of_sub_steps() {
        let mut step = StepResult::new();
        for millis in [10, 20, 30] {
            step.add_sub_step_result(SubStepResult {
                req: json!({}),
                res: json!({}),
                name: "s".to_string(),
                code: "OK".to_string(),
                success: true,
                elapse: Duration::from_millis(millis),
            });
        }
        assert_eq!(step.elapse, Duration::from_millis(60));
        assert!(step.success);
    }

    #[test]
    fn test_step_code_names_first_failing_sub_step() {
        let mut step = StepResult::new();
        step.add_sub_step_result(SubStepResult {
            req: json!({}),
            res: json!({}),
            name: "login".to_string(),
            code: "TIMEOUT".to_string(),
            success: false,
            elapse: Duration::ZERO,
        });
        step.add_sub_step_result(SubStepResult {
            req: json!({}),
            res: json!({}),
            name: "query".to_string(),
            code: "ERR".to_string(),
            success: false,
            elapse: Duration::ZERO,
        });
        assert!(!step.success);
        assert_eq!(step.code, "login.TIMEOUT");
    }

    #[test]
    fn test_step_err_result() {
        let mut step = StepResult::new();
        step.add_err_result("step-2", "connection refused");
        assert!(step.is_err);
        assert!(!step.success);
        assert_eq!(step.code, "step-2.ERROR");
    }

    #[test]
    fn test_unit_consistency_before_and_after_finalize() {
        let mut unit = UnitResult::new("u", 4, 0, 0, 1000, None, 0);
        for _ in 0..90 {
            unit.add_step_result(ok_step(5));
        }
        for _ in 0..10 {
            unit.add_step_result(failed_step("ERR"));
        }
        // Before finalize: success + sum(non-OK codes) == total.
        let failures: u64 = unit.code.values().sum();
        assert_eq!(unit.success + failures, unit.total);

        unit.summary();
        assert_eq!(unit.code["OK"], 90);
        assert_eq!(unit.code["step-0.ERR"], 10);
        assert_eq!(unit.total, 100);
        assert!((unit.rate - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_unit_rate_zero_when_empty() {
        let mut unit = UnitResult::new("empty", 1, 0, 0, 0, None, 0);
        unit.summary();
        assert_eq!(unit.total, 0);
        assert_eq!(unit.rate, 0.0);
        assert_eq!(unit.res_time, Duration::ZERO);
        assert!(unit.quantile.is_empty());
        assert_eq!(unit.code["OK"], 0);
    }

    #[test]
    fn test_stage_partitioning_sums_to_unit_totals() {
        // stage_times = 1000 / 100 = 10 → a stage closes every 10 steps.
        let mut unit = UnitResult::new("u", 1, 0, 0, 1000, None, 0);
        for i in 0..95 {
            if i % 10 == 0 {
                unit.add_step_result(failed_step("ERR"));
            } else {
                unit.add_step_result(ok_step(1));
            }
        }
        unit.summary();
        let stage_total: u64 = unit.stages.iter().map(|s| s.total).sum();
        let stage_success: u64 = unit.stages.iter().map(|s| s.success).sum();
        assert_eq!(stage_total, unit.total);
        assert_eq!(stage_success, unit.success);
        assert!(unit.stages.len() >= 9);
    }

    #[test]
    fn test_stage_window_derivation() {
        let unit = UnitResult::new("u", 1, 0, 60, 0, None, 0);
        assert_eq!(unit.stage_milliseconds, 600);
        let unit = UnitResult::new("u", 1, 0, 1, 0, None, 0);
        assert_eq!(unit.stage_milliseconds, 100);
        let unit = UnitResult::new("u", 1, 0, 0, 5000, None, 0);
        assert_eq!(unit.stage_milliseconds, 100);
        assert_eq!(unit.stage_times, 50);
    }

    #[test]
    fn test_quantile_monotonic() {
        let mut unit = UnitResult::new("u", 1, 0, 0, 0, Some(vec![50.0, 95.0, 99.0]), 0);
        for millis in (1..=100).rev() {
            unit.add_step_result(ok_step(millis));
        }
        unit.summary();
        let q50 = unit.quantile["50"];
        let q95 = unit.quantile["95"];
        let q99 = unit.quantile["99"];
        assert!(q50 <= q95 && q95 <= q99);
        assert_eq!(q50, Duration::from_millis(51));
        assert_eq!(q95, Duration::from_millis(96));
    }

    #[test]
    fn test_sample_retention_is_bounded() {
        let mut unit = UnitResult::new("u", 1, 0, 0, 0, None, 16);
        for _ in 0..1000 {
            unit.add_step_result(ok_step(1));
        }
        assert_eq!(unit.sample_steps.len(), 16);
        assert_eq!(unit.total, 1000);
    }

    #[test]
    fn test_quantile_key_formatting() {
        assert_eq!(quantile_key(80.0), "80");
        assert_eq!(quantile_key(99.9), "99.9");
    }

    #[test]
    fn test_wire_keys() {
        let mut unit = UnitResult::new("u", 2, 10, 0, 100, None, 0);
        unit.add_step_result(ok_step(3));
        unit.summary();
        let value = serde_json::to_value(&unit).unwrap();
        for key in [
            "name",
            "parallel",
            "limit",
            "success",
            "total",
            "qps",
            "code",
            "elapse",
            "rate",
            "resTime",
            "startTime",
            "endTime",
            "isErr",
            "err",
            "stages",
            "stageMilliseconds",
            "stageTimes",
            "quantile",
        ] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
        assert!(value.get("sampleSteps").is_none());
        assert!(value.get("maxStepSize").is_none());
    }

    #[test]
    fn test_round_trip_test_result() {
        let mut unit = UnitResult::new("u", 2, 0, 1, 0, Some(vec![50.0, 99.9]), 0);
        unit.add_step_result(ok_step(2));
        unit.add_step_result(failed_step("ERR"));
        unit.summary();

        let mut group = UnitGroup::new(0, 1, 0, Some(vec![50.0, 99.9]));
        group.add_unit_result(unit);
        group.monitors.insert(
            "system".to_string(),
            MonitorStats {
                unit: [("CPU".to_string(), "percent".to_string())].into(),
                stat: [(
                    "CPU".to_string(),
                    vec![MetricPoint {
                        time: Utc::now(),
                        value: 42.5,
                    }],
                )]
                .into(),
                err: None,
            },
        );

        let mut plan = PlanResult::new("plan-0", "smoke");
        plan.add_unit_group(group);

        let mut root = TestResult::new("tid", "/tmp/root", "root", "top level");
        root.add_plan_result(plan);
        let mut child = TestResult::new("tid", "/tmp/root/a", "a", "");
        child.set_err("boom");
        root.add_sub_test_result(child);

        let json = serde_json::to_string(&root).unwrap();
        let back: TestResult = serde_json::from_str(&json).unwrap();
        let again = serde_json::to_string(&back).unwrap();
        assert_eq!(json, again);
        assert_eq!(back.sub_tests[0].err, "boom");
        assert_eq!(back.plans[0].unit_groups[0].units[0].total, 2);
    }
}
