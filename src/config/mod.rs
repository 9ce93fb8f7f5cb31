//! # Configuration model
//!
//! Serde structures for everything the walker reads off disk:
//!
//! - `ctx.yaml` — per-directory overlay: name, description, variables,
//!   driver/seed declarations and inline plans
//! - `var.yaml` — extra variables merged on top of `ctx.yaml`'s `var`
//! - any other `*.yaml` under the plan sub-root — one plan spec or a list
//! - the optional customize file — key prefixes for the template engine,
//!   loading-file names and reporter settings
//!
//! ## Plan spec shape
//!
//! ```yaml
//! name: search-bench
//! group:
//!   - seconds: 60
//!     parallel: [4, 8]        # scalar broadcasts, vector is positional
//!     limit: 0
//!     quantile: [50, 95, 99]
//!     maxStepSize: 10000
//! unit:
//!   - name: query
//!     seed: {user: users}
//!     step:
//!       - ctx: api
//!         req: {method: GET, path: "/search?q=${seed.user.query}"}
//!         res: {groupby: "#str(res.status)", success: "200"}
//! monitor:
//!   system: {type: system, args: {metrics: [CPU, Mem]}}
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::BenchError;
use crate::result::DEFAULT_MAX_STEP_SIZE;

// ----------------------------------------------------------------------------
// Customize file
// ----------------------------------------------------------------------------

fn default_eval() -> String {
    "#".to_string()
}
fn default_exec() -> String {
    "%".to_string()
}
fn default_loop() -> String {
    "!".to_string()
}
fn default_shell() -> String {
    "$".to_string()
}

/// Template-engine prefixes; configurable so a tree whose literals collide
/// with a prefix can move it elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPrefix {
    #[serde(default = "default_eval")]
    pub eval: String,
    #[serde(default = "default_exec")]
    pub exec: String,
    #[serde(default = "default_loop", rename = "loop")]
    pub loop_: String,
    #[serde(default = "default_shell")]
    pub shell: String,
}

impl Default for KeyPrefix {
    fn default() -> Self {
        Self {
            eval: default_eval(),
            exec: default_exec(),
            loop_: default_loop(),
            shell: default_shell(),
        }
    }
}

fn default_ctx_file() -> String {
    "ctx.yaml".to_string()
}
fn default_var_file() -> String {
    "var.yaml".to_string()
}
fn default_description_file() -> String {
    "README.md".to_string()
}

/// Names of the per-directory files the walker consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadingFiles {
    #[serde(default = "default_ctx_file")]
    pub ctx: String,
    #[serde(default = "default_var_file")]
    pub var: String,
    #[serde(default = "default_description_file")]
    pub description: String,
}

impl Default for LoadingFiles {
    fn default() -> Self {
        Self {
            ctx: default_ctx_file(),
            var: default_var_file(),
            description: default_description_file(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FrameworkSection {
    #[serde(default, rename = "keyPrefix")]
    key_prefix: KeyPrefix,
    #[serde(default, rename = "loadingFiles")]
    loading_files: LoadingFiles,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CustomizeFile {
    #[serde(default)]
    framework: FrameworkSection,
    #[serde(default)]
    reporter: Map<String, Value>,
}

/// Effective customization after merging the optional file with defaults.
#[derive(Debug, Clone, Default)]
pub struct Customize {
    pub key_prefix: KeyPrefix,
    pub loading_files: LoadingFiles,
    /// Raw per-reporter settings (`{reporter-name → args}`).
    pub reporter: Map<String, Value>,
}

impl Customize {
    pub fn load(path: Option<&Path>) -> Result<Self, BenchError> {
        let file = match path {
            Some(path) => load_yaml::<CustomizeFile>(path)?,
            None => CustomizeFile::default(),
        };
        Ok(Self {
            key_prefix: file.framework.key_prefix,
            loading_files: file.framework.loading_files,
            reporter: file.reporter,
        })
    }
}

// ----------------------------------------------------------------------------
// Directory overlays
// ----------------------------------------------------------------------------

/// A `{type, args}` declaration instantiating a driver, seed or monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSpec {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub args: Value,
}

/// Parsed `ctx.yaml`. Missing files yield the defaults with `name` set to
/// the directory basename.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CtxFile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub var: Map<String, Value>,
    #[serde(default)]
    pub ctx: Map<String, Value>,
    #[serde(default)]
    pub seed: Map<String, Value>,
    #[serde(default)]
    pub plan: Vec<PlanSpec>,
}

// ----------------------------------------------------------------------------
// Plan spec
// ----------------------------------------------------------------------------

/// `parallel`/`limit` accept a scalar (broadcast to every unit) or a vector
/// (positional, must match the unit count exactly).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarOrVec {
    Scalar(u64),
    Vec(Vec<u64>),
}

impl ScalarOrVec {
    /// Resolves to one value per unit. A vector of the wrong length is a
    /// hard error, never a silent zip-truncation.
    pub fn resolve(
        &self,
        units: usize,
        field: &'static str,
        group_idx: usize,
    ) -> Result<Vec<u64>, BenchError> {
        match self {
            ScalarOrVec::Scalar(v) => Ok(vec![*v; units]),
            ScalarOrVec::Vec(vs) => {
                if vs.len() != units {
                    return Err(BenchError::GroupShape {
                        idx: group_idx,
                        field,
                        got: vs.len(),
                        units,
                    });
                }
                Ok(vs.clone())
            }
        }
    }
}

fn default_parallel() -> ScalarOrVec {
    ScalarOrVec::Scalar(1)
}
fn default_limit() -> ScalarOrVec {
    ScalarOrVec::Scalar(0)
}
fn default_max_step_size() -> usize {
    DEFAULT_MAX_STEP_SIZE
}

/// One `group` entry: stopping bounds and sizing shared by all units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSpec {
    #[serde(default)]
    pub seconds: u64,
    #[serde(default)]
    pub times: u64,
    #[serde(default = "default_parallel")]
    pub parallel: ScalarOrVec,
    #[serde(default = "default_limit")]
    pub limit: ScalarOrVec,
    #[serde(default)]
    pub quantile: Option<Vec<f64>>,
    #[serde(default = "default_max_step_size", rename = "maxStepSize")]
    pub max_step_size: usize,
}

/// One workload definition: its seed bindings and step sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitSpec {
    pub name: String,
    /// `{local name → seed instance name}`; one value drawn per iteration.
    #[serde(default)]
    pub seed: Map<String, Value>,
    pub step: Vec<StepSpec>,
}

/// Contract classifying a driver response: `groupby` renders the observed
/// code, `success` the expected one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResContract {
    pub groupby: Value,
    pub success: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    #[serde(default)]
    pub name: Option<String>,
    /// Name of the driver instance this step goes through.
    pub ctx: String,
    pub req: Value,
    pub res: ResContract,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub group: Vec<GroupSpec>,
    #[serde(default)]
    pub unit: Vec<UnitSpec>,
    #[serde(default)]
    pub monitor: Map<String, Value>,
}

/// A plan file holds one plan object or a list of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PlanFile {
    Many(Vec<PlanSpec>),
    One(Box<PlanSpec>),
}

impl PlanFile {
    pub fn into_plans(self) -> Vec<PlanSpec> {
        match self {
            PlanFile::Many(plans) => plans,
            PlanFile::One(plan) => vec![*plan],
        }
    }
}

// ----------------------------------------------------------------------------
// Loading / validation
// ----------------------------------------------------------------------------

pub fn load_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, BenchError> {
    let content = std::fs::read_to_string(path).map_err(|e| BenchError::Config {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    serde_yaml::from_str(&content).map_err(|e| BenchError::Config {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

/// Loads a directory's `ctx.yaml`; a missing file is an empty overlay named
/// after the directory.
pub fn load_ctx(dir: &Path, file_name: &str) -> Result<CtxFile, BenchError> {
    let basename = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let path = dir.join(file_name);
    let mut ctx = if path.is_file() {
        load_yaml::<CtxFile>(&path)?
    } else {
        CtxFile::default()
    };
    if ctx.name.is_none() {
        ctx.name = Some(basename);
    }
    Ok(ctx)
}

pub fn load_var(dir: &Path, file_name: &str) -> Result<Map<String, Value>, BenchError> {
    let path = dir.join(file_name);
    if !path.is_file() {
        return Ok(Map::new());
    }
    load_yaml::<Map<String, Value>>(&path)
}

pub fn load_description(dir: &Path, file_name: &str) -> String {
    std::fs::read_to_string(dir.join(file_name)).unwrap_or_default()
}

/// Deep merge: `src` wins over `dst`, nested maps merge key-wise.
pub fn deep_merge(dst: &mut Map<String, Value>, src: &Map<String, Value>) {
    for (key, value) in src {
        match (dst.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            _ => {
                dst.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Derives a plan id from the file stem and the plan's index within the
/// file. A hyphen-free stem keeps its bare name for the first plan.
pub fn plan_id(stem: &str, idx: usize) -> String {
    if idx == 0 && !stem.contains('-') {
        stem.to_string()
    } else {
        format!("{stem}-{idx}")
    }
}

/// File stem without the final extension.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Pre-run shape checks; anything caught here lands on `PlanResult.err`
/// before a single worker spawns.
pub fn validate_plan(id: &str, plan: &PlanSpec) -> Result<(), BenchError> {
    let shape_err = |detail: String| BenchError::PlanShape {
        id: id.to_string(),
        detail,
    };
    if plan.group.is_empty() {
        return Err(shape_err("plan has no groups".to_string()));
    }
    if plan.unit.is_empty() {
        return Err(shape_err("plan has no units".to_string()));
    }
    for (idx, group) in plan.group.iter().enumerate() {
        if group.seconds == 0 && group.times == 0 {
            return Err(shape_err(format!(
                "group {idx} sets neither `seconds` nor `times`"
            )));
        }
        group.parallel.resolve(plan.unit.len(), "parallel", idx)?;
        group.limit.resolve(plan.unit.len(), "limit", idx)?;
    }
    for unit in &plan.unit {
        if unit.step.is_empty() {
            return Err(shape_err(format!("unit {:?} has no steps", unit.name)));
        }
        for (sidx, step) in unit.step.iter().enumerate() {
            if step.ctx.is_empty() {
                return Err(shape_err(format!(
                    "unit {:?} step {sidx} names no driver",
                    unit.name
                )));
            }
        }
        for (local, target) in &unit.seed {
            if !target.is_string() {
                return Err(shape_err(format!(
                    "unit {:?} seed binding {local:?} must name a seed instance",
                    unit.name
                )));
            }
        }
    }
    Ok(())
}

/// Lists the plan files of a directory: every `*.yaml`/`*.yml` except the
/// reserved overlay files, sorted by name for deterministic ids.
pub fn plan_files(dir: &Path, loading: &LoadingFiles) -> Result<Vec<PathBuf>, BenchError> {
    let reserved = [&loading.ctx, &loading.var, &loading.description];
    let entries = std::fs::read_dir(dir).map_err(|e| BenchError::Config {
        path: dir.to_path_buf(),
        detail: e.to_string(),
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml")
                )
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|name| !reserved.iter().any(|r| r.as_str() == name))
                    .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_plan() -> PlanSpec {
        serde_yaml::from_str(
            r##"
name: smoke
group:
  - seconds: 1
    parallel: [2, 4]
    limit: [0, 100]
unit:
  - name: ping
    step:
      - ctx: api
        req: {path: "/ping"}
        res: {groupby: "#res.code", success: "OK"}
  - name: pong
    step:
      - ctx: api
        req: {path: "/pong"}
        res: {groupby: "#res.code", success: "OK"}
"##,
        )
        .unwrap()
    }

    #[test]
    fn test_plan_spec_parses() {
        let plan = sample_plan();
        assert_eq!(plan.name.as_deref(), Some("smoke"));
        assert_eq!(plan.group.len(), 1);
        assert_eq!(plan.unit.len(), 2);
        assert_eq!(plan.unit[0].step[0].ctx, "api");
        assert!(validate_plan("smoke", &plan).is_ok());
    }

    #[test]
    fn test_group_defaults() {
        let group: GroupSpec = serde_yaml::from_str("times: 100").unwrap();
        assert_eq!(group.seconds, 0);
        assert_eq!(group.times, 100);
        assert!(matches!(group.parallel, ScalarOrVec::Scalar(1)));
        assert!(matches!(group.limit, ScalarOrVec::Scalar(0)));
        assert_eq!(group.max_step_size, DEFAULT_MAX_STEP_SIZE);
        assert!(group.quantile.is_none());
    }

    #[test]
    fn test_scalar_broadcasts_vector_is_positional() {
        let scalar = ScalarOrVec::Scalar(8);
        assert_eq!(scalar.resolve(3, "parallel", 0).unwrap(), vec![8, 8, 8]);

        let vector = ScalarOrVec::Vec(vec![1, 2, 3]);
        assert_eq!(vector.resolve(3, "parallel", 0).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_vector_length_mismatch_is_hard_error() {
        let vector = ScalarOrVec::Vec(vec![1, 2]);
        let err = vector.resolve(3, "limit", 4).unwrap_err();
        assert!(matches!(
            err,
            BenchError::GroupShape {
                idx: 4,
                field: "limit",
                got: 2,
                units: 3
            }
        ));
    }

    #[test]
    fn test_validate_rejects_unbounded_group() {
        let mut plan = sample_plan();
        plan.group[0].seconds = 0;
        plan.group[0].times = 0;
        assert!(validate_plan("smoke", &plan).is_err());
    }

    #[test]
    fn test_plan_id_derivation() {
        assert_eq!(plan_id("bench", 0), "bench");
        assert_eq!(plan_id("bench", 1), "bench-1");
        assert_eq!(plan_id("bench-load", 0), "bench-load-0");
        assert_eq!(plan_id("bench-load", 2), "bench-load-2");
    }

    #[test]
    fn test_plan_file_single_or_list() {
        let one: PlanFile = serde_yaml::from_str("name: single\ngroup: []\nunit: []").unwrap();
        assert_eq!(one.into_plans().len(), 1);

        let many: PlanFile =
            serde_yaml::from_str("- name: a\n- name: b").unwrap();
        let plans = many.into_plans();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[1].name.as_deref(), Some("b"));
    }

    #[test]
    fn test_deep_merge_later_wins_nested() {
        let mut dst = json!({"a": 1, "nested": {"x": 1, "y": 2}})
            .as_object()
            .cloned()
            .unwrap();
        let src = json!({"b": 3, "nested": {"y": 9, "z": 4}})
            .as_object()
            .cloned()
            .unwrap();
        deep_merge(&mut dst, &src);
        assert_eq!(
            Value::Object(dst),
            json!({"a": 1, "b": 3, "nested": {"x": 1, "y": 9, "z": 4}})
        );
    }

    #[test]
    fn test_customize_defaults() {
        let customize = Customize::load(None).unwrap();
        assert_eq!(customize.key_prefix.eval, "#");
        assert_eq!(customize.key_prefix.loop_, "!");
        assert_eq!(customize.loading_files.ctx, "ctx.yaml");
        assert_eq!(customize.loading_files.description, "README.md");
    }

    #[test]
    fn test_load_ctx_missing_file_defaults_to_basename() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("checkout");
        std::fs::create_dir(&sub).unwrap();
        let ctx = load_ctx(&sub, "ctx.yaml").unwrap();
        assert_eq!(ctx.name.as_deref(), Some("checkout"));
        assert!(ctx.var.is_empty());
        assert!(ctx.plan.is_empty());
    }

    #[test]
    fn test_plan_files_excludes_reserved_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["zeta.yaml", "alpha.yaml", "ctx.yaml", "var.yaml", "notes.txt"] {
            std::fs::write(dir.path().join(name), "{}").unwrap();
        }
        let files = plan_files(dir.path(), &LoadingFiles::default()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["alpha.yaml", "zeta.yaml"]);
    }
}
