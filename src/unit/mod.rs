//! # Unit engine
//!
//! Runs one unit: `parallel` worker tasks iterate the unit's step sequence
//! under the shared stopping predicate, optionally throttled by a token
//! bucket, and feed step results through a bounded channel into one
//! aggregator task.
//!
//! ```text
//! worker 0 ─┐
//! worker 1 ─┤  mpsc(capacity = parallel)   ┌────────────┐
//!   ...     ├────────────────────────────▶ │ aggregator │ ─▶ UnitResult
//! worker N ─┘                              └────────────┘
//! ```
//!
//! The channel capacity equals `parallel`, so the aggregator paces the
//! workers: when it falls behind, sends block instead of buffering without
//! bound. The aggregator drains until every worker has dropped its sender,
//! then finalizes the summary.
//!
//! ## One step iteration
//!
//! 1. draw one value per seed binding (`seed.<local> = seeds[name].pick()`)
//! 2. for each step spec: render `req` with `{seed, var, x}`, call the
//!    driver, render the response contract with `{res, seed, var, x}`, and
//!    classify — `code = groupby`, success iff `groupby == success`
//! 3. any failure inside a sub-step becomes an error sub-step and aborts
//!    the remaining sub-steps of this iteration only

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::config::UnitSpec;
use crate::context::{RuntimeConstant, RuntimeContext};
use crate::limit::RateLimit;
use crate::result::{StepResult, SubStepResult, UnitResult};
use crate::stop::Stop;
use crate::template::Bindings;

/// Group-level knobs resolved for one unit.
#[derive(Debug, Clone)]
pub struct UnitRunConfig {
    pub parallel: u64,
    pub limit: u64,
    pub seconds: u64,
    pub times: u64,
    pub quantile: Option<Vec<f64>>,
    pub max_step_size: usize,
}

/// Runs the unit to completion and returns its finalized result.
pub async fn run_unit(
    constant: Arc<RuntimeConstant>,
    rctx: RuntimeContext,
    unit: Arc<UnitSpec>,
    cfg: UnitRunConfig,
) -> UnitResult {
    let result = UnitResult::new(
        unit.name.clone(),
        cfg.parallel,
        cfg.limit,
        cfg.seconds,
        cfg.times,
        cfg.quantile.clone(),
        cfg.max_step_size,
    );

    let stop = Arc::new(Stop::new(cfg.seconds, cfg.times));
    stop.start();
    let limiter = Arc::new(RateLimit::new(cfg.limit));
    let parallel = cfg.parallel.max(1) as usize;
    let (tx, mut rx) = mpsc::channel::<StepResult>(parallel);

    let aggregator = tokio::spawn(async move {
        let mut result = result;
        while let Some(step) = rx.recv().await {
            result.add_step_result(step);
        }
        result.summary();
        result
    });

    let step_info = Arc::new(serde_json::to_value(unit.as_ref()).unwrap_or(Value::Null));
    let mut workers = JoinSet::new();
    for worker_idx in 0..parallel {
        let constant = Arc::clone(&constant);
        let rctx = rctx.clone();
        let unit = Arc::clone(&unit);
        let step_info = Arc::clone(&step_info);
        let stop = Arc::clone(&stop);
        let limiter = Arc::clone(&limiter);
        let tx = tx.clone();
        workers.spawn(async move {
            debug!(unit = %unit.name, worker_idx, "worker started");
            loop {
                // Cheap read first so a stopped unit never sleeps on tokens.
                if !stop.is_running() {
                    break;
                }
                limiter.acquire().await;
                if !stop.next() {
                    break;
                }
                constant.hooks.step_start(&step_info);
                let step = exec_step(&constant, &rctx, &unit).await;
                constant.hooks.step_end(&step);
                if tx.send(step).await.is_err() {
                    break;
                }
            }
            debug!(unit = %unit.name, worker_idx, "worker finished");
        });
    }
    drop(tx);

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            error!(unit = %unit.name, error = %e, "worker task failed");
        }
    }
    debug!(unit = %unit.name, iterations = stop.iterations(), "workers joined");

    match aggregator.await {
        Ok(result) => result,
        Err(e) => UnitResult::with_err(
            unit.name.clone(),
            cfg.parallel,
            cfg.limit,
            format!("aggregator task failed: {e}"),
        ),
    }
}

/// Executes the unit's step sequence once.
pub async fn exec_step(
    constant: &RuntimeConstant,
    rctx: &RuntimeContext,
    unit: &UnitSpec,
) -> StepResult {
    let mut step_result = StepResult::new();

    let mut seed_ns = Map::new();
    for (local, target) in &unit.seed {
        let name = target.as_str().unwrap_or_default();
        match rctx.seeds.get(name) {
            Some(seed) => {
                seed_ns.insert(local.clone(), seed.pick());
            }
            None => {
                step_result.add_err_result(local, format!("unknown seed instance {name:?}"));
                return step_result;
            }
        }
    }

    let mut bindings = Bindings::new();
    bindings.insert("var".to_string(), rctx.var_value());
    bindings.insert("x".to_string(), constant.x.clone());
    bindings.insert("seed".to_string(), Value::Object(seed_ns));

    for (idx, spec) in unit.step.iter().enumerate() {
        let default_name = spec
            .name
            .clone()
            .unwrap_or_else(|| format!("step-{idx}"));
        match run_sub_step(constant, rctx, spec, &bindings, &default_name).await {
            Ok(sub) => step_result.add_sub_step_result(sub),
            Err((name, err)) => {
                step_result.add_err_result(&name, err);
                break;
            }
        }
    }
    step_result
}

async fn run_sub_step(
    constant: &RuntimeConstant,
    rctx: &RuntimeContext,
    spec: &crate::config::StepSpec,
    bindings: &Bindings,
    default_name: &str,
) -> Result<SubStepResult, (String, String)> {
    let fail = |name: &str, err: String| (name.to_string(), err);

    let req = constant
        .renderer
        .render(&spec.req, bindings)
        .map_err(|e| fail(default_name, e.to_string()))?;

    let driver = rctx
        .drivers
        .get(&spec.ctx)
        .ok_or_else(|| fail(default_name, format!("unknown driver instance {:?}", spec.ctx)))?;
    let name = driver
        .name(&req)
        .unwrap_or_else(|| default_name.to_string());

    let t0 = Instant::now();
    let res = driver
        .call(&req)
        .await
        .map_err(|e| fail(&name, format!("{e:#}")))?;
    let elapse = t0.elapsed();

    let mut res_bindings = bindings.clone();
    res_bindings.insert("res".to_string(), res.clone());
    let groupby = constant
        .renderer
        .render(&spec.res.groupby, &res_bindings)
        .map_err(|e| fail(&name, e.to_string()))?;
    let expected = constant
        .renderer
        .render(&spec.res.success, &res_bindings)
        .map_err(|e| fail(&name, e.to_string()))?;

    let code = match &groupby {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let success = groupby == expected;

    Ok(SubStepResult {
        req,
        res,
        name,
        code,
        success,
        elapse,
    })
}
