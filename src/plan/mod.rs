//! # Plan runner
//!
//! Executes one plan: its groups run sequentially and in order; inside a
//! group every unit gets its own worker pool and aggregator, all running in
//! parallel, with monitors sampling the environment from just before the
//! first worker spawns until the last aggregator joins.
//!
//! Group-level `parallel`/`limit` apply to every unit when scalar and
//! positionally when given as vectors; a vector whose length does not match
//! the unit count fails the group outright. A group failure lands on the
//! plan's `err`; the remaining groups still run. Unit failures never abort
//! their group — they are recorded inside the UnitResult.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::{ComponentSpec, PlanSpec};
use crate::context::{RuntimeConstant, RuntimeContext};
use crate::errors::{BenchError, RegistryKind};
use crate::monitor::Monitor;
use crate::result::{MonitorStats, PlanResult, UnitGroup, UnitResult};
use crate::template::Bindings;
use crate::unit::{run_unit, UnitRunConfig};

/// Runs every group of the plan and returns the collected PlanResult.
pub async fn run_plan(
    constant: Arc<RuntimeConstant>,
    rctx: &RuntimeContext,
    id: String,
    plan: PlanSpec,
) -> PlanResult {
    let name = plan.name.clone().unwrap_or_else(|| id.clone());
    let mut plan_result = PlanResult::new(id.clone(), name);

    let plan_value = serde_json::to_value(&plan).unwrap_or(Value::Null);
    constant.hooks.plan_start(&plan_value);

    if let Err(e) = crate::config::validate_plan(&id, &plan) {
        plan_result.set_err(e.to_string());
        constant.hooks.plan_end(&plan_result);
        return plan_result;
    }

    for (idx, group) in plan.group.iter().enumerate() {
        info!(plan = %plan_result.id, group = idx, "group started");
        match run_group(&constant, rctx, &plan, idx).await {
            Ok(unit_group) => plan_result.add_unit_group(unit_group),
            Err(e) => {
                warn!(plan = %plan_result.id, group = idx, error = %e, "group setup failed");
                if !plan_result.is_err {
                    plan_result.set_err(format!("group {idx}: {e}"));
                }
            }
        }
    }

    constant.hooks.plan_end(&plan_result);
    plan_result
}

async fn run_group(
    constant: &Arc<RuntimeConstant>,
    rctx: &RuntimeContext,
    plan: &PlanSpec,
    idx: usize,
) -> Result<UnitGroup, BenchError> {
    let group = &plan.group[idx];
    let units = &plan.unit;
    let parallel = group.parallel.resolve(units.len(), "parallel", idx)?;
    let limit = group.limit.resolve(units.len(), "limit", idx)?;

    let mut unit_group = UnitGroup::new(idx, group.seconds, group.times, group.quantile.clone());

    let monitors = build_monitors(constant, rctx, plan, group.seconds)?;
    for (_, monitor) in &monitors {
        monitor.collect();
    }
    let start_ts = Utc::now();

    // One pool per unit, joined positionally so group.units keeps spec order.
    let mut handles = Vec::with_capacity(units.len());
    for (uidx, unit) in units.iter().enumerate() {
        let unit = Arc::new(unit.clone());
        let cfg = UnitRunConfig {
            parallel: parallel[uidx],
            limit: limit[uidx],
            seconds: group.seconds,
            times: group.times,
            quantile: group.quantile.clone(),
            max_step_size: group.max_step_size,
        };
        let unit_value = serde_json::to_value(unit.as_ref()).unwrap_or(Value::Null);
        constant.hooks.unit_start(&unit_value);
        handles.push((
            unit.name.clone(),
            cfg.clone(),
            tokio::spawn(run_unit(
                Arc::clone(constant),
                rctx.clone(),
                unit,
                cfg,
            )),
        ));
    }

    for (unit_name, cfg, handle) in handles {
        let unit_result = match handle.await {
            Ok(result) => result,
            Err(e) => UnitResult::with_err(
                unit_name,
                cfg.parallel,
                cfg.limit,
                format!("unit task failed: {e}"),
            ),
        };
        constant.hooks.unit_end(&unit_result);
        unit_group.add_unit_result(unit_result);
    }
    let end_ts = Utc::now();

    for (name, monitor) in monitors {
        let mut stats = MonitorStats {
            unit: monitor.unit(),
            ..Default::default()
        };
        match monitor.stat(start_ts, end_ts).await {
            Ok(series) => stats.stat = series,
            Err(e) => stats.err = Some(format!("{e:#}")),
        }
        unit_group.monitors.insert(name, stats);
    }

    Ok(unit_group)
}

/// Instantiates the plan's monitors with their args rendered against the
/// current variables and `x`. The group's wall bound is handed to the
/// monitor as `seconds` so samplers can derive their cadence.
fn build_monitors(
    constant: &Arc<RuntimeConstant>,
    rctx: &RuntimeContext,
    plan: &PlanSpec,
    group_seconds: u64,
) -> Result<Vec<(String, Arc<dyn Monitor>)>, BenchError> {
    let mut bindings = Bindings::new();
    bindings.insert("var".to_string(), rctx.var_value());
    bindings.insert("x".to_string(), constant.x.clone());

    let mut monitors = Vec::new();
    for (name, decl) in &plan.monitor {
        let rendered = constant.renderer.render(decl, &bindings)?;
        let spec: ComponentSpec =
            serde_json::from_value(rendered).map_err(|e| BenchError::Build {
                kind: RegistryKind::Monitor,
                name: name.clone(),
                detail: e.to_string(),
            })?;
        let ctor = constant.monitor_map.get(&spec.type_name).ok_or_else(|| {
            BenchError::UnknownType {
                kind: RegistryKind::Monitor,
                name: spec.type_name.clone(),
            }
        })?;
        let mut args = spec.args;
        if args.is_null() {
            args = Value::Object(Default::default());
        }
        if let Value::Object(map) = &mut args {
            map.entry("seconds".to_string())
                .or_insert_with(|| Value::from(group_seconds));
        }
        let monitor = ctor(&args).map_err(|e| BenchError::Build {
            kind: RegistryKind::Monitor,
            name: name.clone(),
            detail: format!("{e:#}"),
        })?;
        monitors.push((name.clone(), monitor));
    }
    Ok(monitors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::sleep::SleepDriver;
    use crate::hook::HookBus;
    use crate::template::Engine;
    use serde_json::json;

    fn constant() -> Arc<RuntimeConstant> {
        Arc::new(RuntimeConstant {
            test_id: "test".to_string(),
            driver_map: crate::driver::default_driver_map(),
            seed_map: crate::seed::default_seed_map(),
            monitor_map: crate::monitor::default_monitor_map(),
            x: Value::Null,
            plan_root: ".".into(),
            renderer: Arc::new(Engine::default()),
            hooks: Arc::new(HookBus::default()),
        })
    }

    fn sleep_rctx() -> RuntimeContext {
        let mut rctx = RuntimeContext::default();
        rctx.drivers.insert(
            "snooze".to_string(),
            Arc::new(SleepDriver::new(&Value::Null).unwrap()),
        );
        rctx
    }

    fn plan(yaml: &str) -> PlanSpec {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_groups_run_sequentially_in_order() {
        let spec = plan(
            r##"
name: two-groups
group:
  - times: 20
  - times: 40
unit:
  - name: only
    step:
      - ctx: snooze
        req: {milliseconds: 0}
        res: {groupby: "#res.code", success: "OK"}
"##,
        );
        let result = run_plan(constant(), &sleep_rctx(), "two-groups".into(), spec).await;
        assert!(!result.is_err, "err: {}", result.err);
        assert_eq!(result.unit_groups.len(), 2);
        assert_eq!(result.unit_groups[0].idx, 0);
        assert_eq!(result.unit_groups[1].idx, 1);
        assert_eq!(result.unit_groups[0].units[0].total, 20);
        assert_eq!(result.unit_groups[1].units[0].total, 40);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_positional_overrides_per_unit() {
        let spec = plan(
            r##"
name: vectors
group:
  - times: 30
    parallel: [1, 3]
unit:
  - name: first
    step:
      - ctx: snooze
        req: {milliseconds: 0}
        res: {groupby: "#res.code", success: "OK"}
  - name: second
    step:
      - ctx: snooze
        req: {milliseconds: 0}
        res: {groupby: "#res.code", success: "OK"}
"##,
        );
        let result = run_plan(constant(), &sleep_rctx(), "vectors".into(), spec).await;
        assert!(!result.is_err);
        let group = &result.unit_groups[0];
        assert_eq!(group.units[0].name, "first");
        assert_eq!(group.units[0].parallel, 1);
        assert_eq!(group.units[1].name, "second");
        assert_eq!(group.units[1].parallel, 3);
        assert_eq!(group.units[0].total, 30);
        assert_eq!(group.units[1].total, 30);
    }

    #[tokio::test]
    async fn test_vector_mismatch_fails_plan_not_panics() {
        let spec = plan(
            r##"
name: bad
group:
  - times: 10
    parallel: [1, 2, 3]
unit:
  - name: only
    step:
      - ctx: snooze
        req: {milliseconds: 0}
        res: {groupby: "#res.code", success: "OK"}
"##,
        );
        let result = run_plan(constant(), &sleep_rctx(), "bad".into(), spec).await;
        assert!(result.is_err);
        assert!(result.err.contains("parallel"));
        assert!(result.unit_groups.is_empty());
    }

    #[tokio::test]
    async fn test_unit_failure_does_not_abort_group() {
        let spec = plan(
            r##"
name: half-broken
group:
  - times: 5
unit:
  - name: broken
    step:
      - ctx: missing-driver
        req: {}
        res: {groupby: "#res.code", success: "OK"}
  - name: healthy
    step:
      - ctx: snooze
        req: {milliseconds: 0}
        res: {groupby: "#res.code", success: "OK"}
"##,
        );
        let result = run_plan(constant(), &sleep_rctx(), "half-broken".into(), spec).await;
        assert!(!result.is_err, "group must survive unit failures");
        let group = &result.unit_groups[0];
        assert_eq!(group.units[0].success, 0);
        assert_eq!(group.units[0].total, 5);
        assert_eq!(group.units[1].success, 5);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_monitor_series_attached_to_group() {
        let spec = plan(
            r##"
name: monitored
group:
  - times: 50
unit:
  - name: only
    step:
      - ctx: snooze
        req: {milliseconds: 10}
        res: {groupby: "#res.code", success: "OK"}
monitor:
  host: {type: system, args: {metrics: [Mem]}}
"##,
        );
        let result = run_plan(constant(), &sleep_rctx(), "monitored".into(), spec).await;
        assert!(!result.is_err, "err: {}", result.err);
        let stats = &result.unit_groups[0].monitors["host"];
        assert_eq!(stats.unit["Mem"], "byte");
        assert!(stats.err.is_none());
    }

    #[tokio::test]
    async fn test_unknown_monitor_type_fails_group() {
        let spec = plan(
            r##"
name: bad-monitor
group:
  - times: 1
unit:
  - name: only
    step:
      - ctx: snooze
        req: {milliseconds: 0}
        res: {groupby: "#res.code", success: "OK"}
monitor:
  host: {type: nonexistent}
"##,
        );
        let result = run_plan(constant(), &sleep_rctx(), "bad-monitor".into(), spec).await;
        assert!(result.is_err);
        assert!(result.err.contains("nonexistent"));
    }

    #[tokio::test]
    async fn test_monitor_args_are_rendered() {
        let spec = plan(
            r##"
name: rendered-monitor
group:
  - times: 1
unit:
  - name: only
    step:
      - ctx: snooze
        req: {milliseconds: 0}
        res: {groupby: "#res.code", success: "OK"}
monitor:
  host:
    type: system
    args:
      metrics: ["#var.metric"]
"##,
        );
        let constant = constant();
        let mut rctx = sleep_rctx();
        rctx.var_info
            .insert("metric".to_string(), json!("CPU"));
        let result = run_plan(constant, &rctx, "rendered-monitor".into(), spec).await;
        assert!(!result.is_err, "err: {}", result.err);
        let stats = &result.unit_groups[0].monitors["host"];
        assert_eq!(stats.unit["CPU"], "percent");
    }
}
