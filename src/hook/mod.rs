//! # Hook bus
//!
//! Lifecycle observers notified on every `{test, plan, unit, step} ×
//! {start, end}` edge, plus a final `on_exit` with the root result. Start
//! edges receive the spec object being entered (as a `Value`); end edges
//! receive the finished result.
//!
//! Hooks run synchronously on the calling task, in registration order.
//! Step edges fire from unit workers, so hooks are `Send + Sync` and keep
//! any state behind interior mutability. A panicking hook is caught and
//! logged; it never aborts the run.

pub mod debug;
pub mod step;

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tracing::warn;

use crate::i18n::I18n;
use crate::result::{PlanResult, StepResult, TestResult, UnitResult};

#[allow(unused_variables)]
pub trait Hook: Send + Sync {
    fn on_test_start(&self, info: &Value) {}
    fn on_test_end(&self, res: &TestResult) {}
    fn on_plan_start(&self, info: &Value) {}
    fn on_plan_end(&self, res: &PlanResult) {}
    fn on_unit_start(&self, info: &Value) {}
    fn on_unit_end(&self, res: &UnitResult) {}
    fn on_step_start(&self, info: &Value) {}
    fn on_step_end(&self, res: &StepResult) {}
    fn on_exit(&self, res: &TestResult) {}
}

/// Constructor registered under a hook name; receives raw args and the
/// resolved label table.
pub type HookCtor = fn(&Value, &I18n) -> Result<Arc<dyn Hook>>;

pub type HookMap = HashMap<String, HookCtor>;

pub fn default_hook_map() -> HookMap {
    let mut map: HookMap = HashMap::new();
    map.insert("debug".to_string(), |args, i18n| {
        Ok(Arc::new(debug::DebugHook::new(args, i18n.clone())) as Arc<dyn Hook>)
    });
    map.insert("step".to_string(), |_args, _i18n| {
        Ok(Arc::new(step::StepHook::new()) as Arc<dyn Hook>)
    });
    map
}

/// Fan-out over the registered hooks with panic isolation.
#[derive(Default)]
pub struct HookBus {
    hooks: Vec<Arc<dyn Hook>>,
}

macro_rules! dispatch {
    ($bus:expr, $method:ident, $arg:expr) => {
        for hook in &$bus.hooks {
            if catch_unwind(AssertUnwindSafe(|| hook.$method($arg))).is_err() {
                warn!(edge = stringify!($method), "hook panicked; continuing");
            }
        }
    };
}

impl HookBus {
    pub fn new(hooks: Vec<Arc<dyn Hook>>) -> Self {
        Self { hooks }
    }

    pub fn test_start(&self, info: &Value) {
        dispatch!(self, on_test_start, info);
    }

    pub fn test_end(&self, res: &TestResult) {
        dispatch!(self, on_test_end, res);
    }

    pub fn plan_start(&self, info: &Value) {
        dispatch!(self, on_plan_start, info);
    }

    pub fn plan_end(&self, res: &PlanResult) {
        dispatch!(self, on_plan_end, res);
    }

    pub fn unit_start(&self, info: &Value) {
        dispatch!(self, on_unit_start, info);
    }

    pub fn unit_end(&self, res: &UnitResult) {
        dispatch!(self, on_unit_end, res);
    }

    pub fn step_start(&self, info: &Value) {
        dispatch!(self, on_step_start, info);
    }

    pub fn step_end(&self, res: &StepResult) {
        dispatch!(self, on_step_end, res);
    }

    pub fn exit(&self, res: &TestResult) {
        dispatch!(self, on_exit, res);
    }
}
