// Module: Context
// Run-wide constants and the per-directory runtime state the walker hands
// down the tree.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::driver::{Driver, DriverMap};
use crate::hook::HookBus;
use crate::monitor::MonitorMap;
use crate::seed::{Seed, SeedMap};
use crate::template::Render;

/// Everything that is fixed for the whole run: the run id, the closed
/// component registries, the extension namespace `x`, the plan sub-root and
/// the shared renderer/hook bus.
pub struct RuntimeConstant {
    pub test_id: String,
    pub driver_map: DriverMap,
    pub seed_map: SeedMap,
    pub monitor_map: MonitorMap,
    /// Opaque user namespace bound as `x` in every render.
    pub x: Value,
    /// Only directories under this root have their plans executed.
    pub plan_root: PathBuf,
    pub renderer: Arc<dyn Render>,
    pub hooks: Arc<HookBus>,
}

/// Per-directory state: instantiated driver and seed tables plus the
/// rendered variable map. Children get a copy to extend; the parent's copy
/// is never touched again.
#[derive(Clone, Default)]
pub struct RuntimeContext {
    pub drivers: HashMap<String, Arc<dyn Driver>>,
    pub seeds: HashMap<String, Arc<dyn Seed>>,
    pub var_info: Map<String, Value>,
}

impl RuntimeContext {
    /// The variable map as the `var` binding for template renders.
    pub fn var_value(&self) -> Value {
        Value::Object(self.var_info.clone())
    }
}
