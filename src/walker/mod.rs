//! # Test tree walker
//!
//! Depth-first traversal of the test directory tree. Each directory is a
//! scope: it deep-merges its variables over the parent's, extends copies of
//! the parent's driver and seed tables, and — when it sits under the plan
//! sub-root — runs every plan it declares (inline in `ctx.yaml` or as
//! standalone `*.yaml` files) before recursing into its sub-directories in
//! sorted order.
//!
//! Any failure while entering a directory (unreadable config, bad template,
//! unknown component type) is recorded on that directory's TestResult and
//! prunes the subtree; sibling directories are unaffected.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{
    self, ComponentSpec, Customize, PlanFile,
};
use crate::context::{RuntimeConstant, RuntimeContext};
use crate::driver::DriverMap;
use crate::errors::{BenchError, RegistryKind};
use crate::hook::{Hook, HookBus};
use crate::monitor::MonitorMap;
use crate::plan::run_plan;
use crate::result::TestResult;
use crate::seed::SeedMap;
use crate::template::{Bindings, Engine, Render};

pub struct Framework {
    customize: Customize,
    constant: Arc<RuntimeConstant>,
    test_dir: PathBuf,
}

/// Assembles a Framework: registries are open here and closed at `build`.
pub struct FrameworkBuilder {
    test_dir: PathBuf,
    plan_dir: Option<PathBuf>,
    customize_file: Option<PathBuf>,
    x_file: Option<PathBuf>,
    hooks: Vec<Arc<dyn Hook>>,
    driver_map: DriverMap,
    seed_map: SeedMap,
    monitor_map: MonitorMap,
}

impl FrameworkBuilder {
    pub fn new(test_dir: impl Into<PathBuf>) -> Self {
        Self {
            test_dir: test_dir.into(),
            plan_dir: None,
            customize_file: None,
            x_file: None,
            hooks: Vec::new(),
            driver_map: crate::driver::default_driver_map(),
            seed_map: crate::seed::default_seed_map(),
            monitor_map: crate::monitor::default_monitor_map(),
        }
    }

    /// Restricts plan execution to directories under this sub-root.
    pub fn plan_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.plan_dir = dir;
        self
    }

    pub fn customize_file(mut self, path: Option<PathBuf>) -> Self {
        self.customize_file = path;
        self
    }

    /// YAML file loaded once into the `x` namespace.
    pub fn x_file(mut self, path: Option<PathBuf>) -> Self {
        self.x_file = path;
        self
    }

    pub fn hook(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn driver(mut self, name: impl Into<String>, ctor: crate::driver::DriverCtor) -> Self {
        self.driver_map.insert(name.into(), ctor);
        self
    }

    pub fn seed(mut self, name: impl Into<String>, ctor: crate::seed::SeedCtor) -> Self {
        self.seed_map.insert(name.into(), ctor);
        self
    }

    pub fn monitor(mut self, name: impl Into<String>, ctor: crate::monitor::MonitorCtor) -> Self {
        self.monitor_map.insert(name.into(), ctor);
        self
    }

    pub fn build(self) -> Result<Framework, BenchError> {
        let customize = Customize::load(self.customize_file.as_deref())?;

        let test_dir = self.test_dir.canonicalize().map_err(|e| BenchError::Config {
            path: self.test_dir.clone(),
            detail: e.to_string(),
        })?;
        let plan_root = match &self.plan_dir {
            Some(dir) => dir.canonicalize().map_err(|e| BenchError::Config {
                path: dir.clone(),
                detail: e.to_string(),
            })?,
            None => test_dir.clone(),
        };

        let x = match &self.x_file {
            Some(path) => config::load_yaml::<Value>(path)?,
            None => Value::Null,
        };

        let renderer: Arc<dyn Render> = Arc::new(Engine::new(
            customize.key_prefix.eval.as_str(),
            customize.key_prefix.exec.as_str(),
            customize.key_prefix.loop_.as_str(),
            customize.key_prefix.shell.as_str(),
        ));

        let constant = Arc::new(RuntimeConstant {
            test_id: Uuid::new_v4().simple().to_string(),
            driver_map: self.driver_map,
            seed_map: self.seed_map,
            monitor_map: self.monitor_map,
            x,
            plan_root,
            renderer,
            hooks: Arc::new(HookBus::new(self.hooks)),
        });

        Ok(Framework {
            customize,
            constant,
            test_dir,
        })
    }
}

/// Re-hydrates a serialized TestResult for re-rendering.
pub fn load_result(json: &str) -> Result<TestResult, BenchError> {
    serde_json::from_str(json).map_err(|e| BenchError::Config {
        path: PathBuf::from("<json result>"),
        detail: e.to_string(),
    })
}

impl Framework {
    /// Walks the whole tree and returns the root TestResult.
    pub async fn run(&self) -> TestResult {
        info!(directory = %self.test_dir.display(), "run started");
        let root = self
            .run_test(self.test_dir.clone(), RuntimeContext::default())
            .await;
        self.constant.hooks.exit(&root);
        info!(directory = %self.test_dir.display(), is_err = root.is_err, "run finished");
        root
    }

    fn run_test(
        &self,
        dir: PathBuf,
        parent: RuntimeContext,
    ) -> Pin<Box<dyn Future<Output = TestResult> + Send + '_>> {
        Box::pin(async move {
            let (mut test_result, rctx) = match self.enter(&dir, &parent).await {
                Ok(entered) => entered,
                Err(e) => {
                    warn!(directory = %dir.display(), error = %e, "directory setup failed");
                    let name = dir
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    let mut failed = TestResult::new(
                        self.constant.test_id.clone(),
                        dir.display().to_string(),
                        name,
                        "",
                    );
                    failed.set_err(format!("{e:#}"));
                    return failed;
                }
            };

            // An error recorded while entering (e.g. a broken plan file)
            // prunes the subtree like a setup failure does.
            if !test_result.is_err {
                for sub_dir in self.sub_directories(&dir) {
                    let child = self.run_test(sub_dir, rctx.clone()).await;
                    test_result.add_sub_test_result(child);
                }
            }

            self.constant.hooks.test_end(&test_result);
            test_result
        })
    }

    /// Children in sorted order, so reruns present the same sub-test
    /// ordering.
    fn sub_directories(&self, dir: &Path) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok().map(|e| e.path()))
                    .filter(|path| path.is_dir())
                    .collect()
            })
            .unwrap_or_default();
        dirs.sort();
        dirs
    }

    /// Steps 1–6 of entering a directory: overlays, variables, component
    /// tables, the TestResult and this directory's plans.
    async fn enter(
        &self,
        dir: &Path,
        parent: &RuntimeContext,
    ) -> anyhow::Result<(TestResult, RuntimeContext)> {
        let files = &self.customize.loading_files;
        let ctx_file = config::load_ctx(dir, &files.ctx)?;
        let name = ctx_file.name.clone().unwrap_or_default();
        let readme = config::load_description(dir, &files.description);
        let description = format!("{}{}", readme, ctx_file.description);

        // parent ⊕ ctx.var ⊕ var.yaml, later wins, then rendered.
        let mut var_info = parent.var_info.clone();
        config::deep_merge(&mut var_info, &ctx_file.var);
        let var_overlay = config::load_var(dir, &files.var)?;
        config::deep_merge(&mut var_info, &var_overlay);

        let mut bindings = Bindings::new();
        bindings.insert("var".to_string(), Value::Object(var_info.clone()));
        bindings.insert("x".to_string(), self.constant.x.clone());
        let rendered_vars = self
            .constant
            .renderer
            .render(&Value::Object(var_info), &bindings)?;

        let mut rctx = parent.clone();
        rctx.var_info = rendered_vars.as_object().cloned().unwrap_or_default();

        let mut bindings = Bindings::new();
        bindings.insert("var".to_string(), rctx.var_value());
        bindings.insert("x".to_string(), self.constant.x.clone());

        for (instance, decl) in &ctx_file.ctx {
            let spec = self.component_spec(RegistryKind::Driver, instance, decl, &bindings)?;
            let ctor = self
                .constant
                .driver_map
                .get(&spec.type_name)
                .ok_or_else(|| BenchError::UnknownType {
                    kind: RegistryKind::Driver,
                    name: spec.type_name.clone(),
                })?;
            let driver = ctor(&spec.args).map_err(|e| BenchError::Build {
                kind: RegistryKind::Driver,
                name: instance.clone(),
                detail: format!("{e:#}"),
            })?;
            rctx.drivers.insert(instance.clone(), driver);
        }

        for (instance, decl) in &ctx_file.seed {
            let spec = self.component_spec(RegistryKind::Seed, instance, decl, &bindings)?;
            let ctor = self
                .constant
                .seed_map
                .get(&spec.type_name)
                .ok_or_else(|| BenchError::UnknownType {
                    kind: RegistryKind::Seed,
                    name: spec.type_name.clone(),
                })?;
            let seed = ctor(&spec.args).map_err(|e| BenchError::Build {
                kind: RegistryKind::Seed,
                name: instance.clone(),
                detail: format!("{e:#}"),
            })?;
            rctx.seeds.insert(instance.clone(), seed);
        }

        let mut test_result = TestResult::new(
            self.constant.test_id.clone(),
            dir.display().to_string(),
            name.clone(),
            description,
        );
        self.constant.hooks.test_start(&json!({
            "name": name,
            "directory": dir.display().to_string(),
        }));

        // From here on the start hook has fired, so failures land on the
        // TestResult instead of unwinding past the matching end hook.
        if dir.starts_with(&self.constant.plan_root) {
            if let Err(e) = self
                .run_directory_plans(dir, &ctx_file.plan, &rctx, &mut test_result)
                .await
            {
                test_result.set_err(format!("{e:#}"));
            }
        }

        Ok((test_result, rctx))
    }

    async fn run_directory_plans(
        &self,
        dir: &Path,
        inline: &[config::PlanSpec],
        rctx: &RuntimeContext,
        test_result: &mut TestResult,
    ) -> anyhow::Result<()> {
        // Inline plans are named after the ctx file.
        let ctx_stem = config::file_stem(Path::new(&self.customize.loading_files.ctx));
        for (idx, plan) in inline.iter().enumerate() {
            let id = config::plan_id(&ctx_stem, idx);
            let plan_result =
                run_plan(Arc::clone(&self.constant), rctx, id, plan.clone()).await;
            test_result.add_plan_result(plan_result);
        }

        for path in config::plan_files(dir, &self.customize.loading_files)? {
            let stem = config::file_stem(&path);
            let plans = config::load_yaml::<PlanFile>(&path)?.into_plans();
            for (idx, plan) in plans.into_iter().enumerate() {
                let id = config::plan_id(&stem, idx);
                let plan_result = run_plan(Arc::clone(&self.constant), rctx, id, plan).await;
                test_result.add_plan_result(plan_result);
            }
        }
        Ok(())
    }

    /// Renders a `{type, args}` declaration against the current bindings.
    fn component_spec(
        &self,
        kind: RegistryKind,
        instance: &str,
        decl: &Value,
        bindings: &Bindings,
    ) -> Result<ComponentSpec, BenchError> {
        let rendered = self.constant.renderer.render(decl, bindings)?;
        serde_json::from_value(rendered).map_err(|e| BenchError::Build {
            kind,
            name: instance.to_string(),
            detail: e.to_string(),
        })
    }
}
