//! # loadbench
//!
//! Declarative load/benchmark harness. A test is a directory tree: each
//! directory contributes variables, driver and seed instances, and — under
//! the plan sub-root — benchmark plans. Plans run unit groups of parallel
//! workers under wall-time/iteration stopping rules while monitors sample
//! the environment; results aggregate into a tree a reporter renders.
//!
//! ```bash
//! # Run a tree and print the text report
//! loadbench run --test-dir ./bench
//!
//! # Run only the plans under one subtree, dump JSON
//! loadbench run --test-dir ./bench --plan-dir ./bench/search --reporter json -o result.json
//!
//! # Re-render a previous JSON dump
//! loadbench format --file result.json --reporter text --lang zh
//! ```

mod config;
mod context;
mod driver;
mod errors;
mod hook;
mod i18n;
mod limit;
mod monitor;
mod plan;
mod report;
mod result;
mod seed;
mod stop;
mod telemetry;
mod template;
mod unit;
mod walker;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{error, Level};

use crate::hook::Hook;
use crate::i18n::I18n;
use crate::report::Reporter;
use crate::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};
use crate::walker::FrameworkBuilder;

#[derive(Parser)]
#[command(name = "loadbench")]
#[command(about = "Declarative load/benchmark harness", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk a test directory tree, execute its plans and print the report.
    Run {
        /// Root of the test tree.
        #[arg(short, long)]
        test_dir: PathBuf,

        /// Only run plans in directories under this sub-root.
        #[arg(long)]
        plan_dir: Option<PathBuf>,

        /// Customize file (key prefixes, loading-file names, reporter args).
        #[arg(long)]
        customize: Option<PathBuf>,

        /// Reporter rendering the result: text or json.
        #[arg(short, long, default_value = "text")]
        reporter: String,

        /// YAML file bound as the `x` namespace in every template render.
        #[arg(long)]
        x: Option<PathBuf>,

        /// Lifecycle hooks to attach (comma separated): debug, step.
        #[arg(long, value_delimiter = ',')]
        hook: Vec<String>,

        /// Report language (en, zh); defaults to $LANG.
        #[arg(long)]
        lang: Option<String>,

        /// Write the rendering here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only errors on stderr.
        #[arg(long, short = 's', default_value = "false")]
        silent: bool,

        /// Debug-level logs.
        #[arg(long, short = 'v', default_value = "false")]
        verbose: bool,

        /// Export harness traces over OTLP.
        #[arg(long, default_value = "false")]
        otel: bool,

        /// OTLP collector endpoint; defaults to
        /// $OTEL_EXPORTER_OTLP_ENDPOINT or http://localhost:4317.
        #[arg(long)]
        otel_endpoint: Option<String>,
    },

    /// Re-render a previously serialized result.
    Format {
        /// JSON result produced by `run --reporter json`.
        #[arg(short, long)]
        file: PathBuf,

        #[arg(short, long, default_value = "text")]
        reporter: String,

        #[arg(long)]
        lang: Option<String>,

        #[arg(long)]
        customize: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Run {
            test_dir,
            plan_dir,
            customize,
            reporter,
            x,
            hook,
            lang,
            output,
            silent,
            verbose,
            otel,
            otel_endpoint,
        } => {
            let mut telemetry_config = TelemetryConfig::from_env();
            telemetry_config.log_level = if silent {
                Level::ERROR
            } else if verbose {
                Level::DEBUG
            } else {
                Level::INFO
            };
            if otel {
                if let Some(endpoint) = otel_endpoint {
                    telemetry_config.otlp_endpoint = Some(endpoint);
                } else if telemetry_config.otlp_endpoint.is_none() {
                    telemetry_config.otlp_endpoint = Some("http://localhost:4317".to_string());
                }
            } else {
                telemetry_config.otlp_endpoint = None;
            }
            if let Err(e) = init_telemetry(telemetry_config) {
                if !silent {
                    eprintln!("warning: failed to initialize telemetry: {e}");
                }
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                    .try_init();
            }

            let code = run_command(
                test_dir, plan_dir, customize, &reporter, x, &hook, lang, output,
            )
            .await;
            shutdown_telemetry();
            code
        }
        Commands::Format {
            file,
            reporter,
            lang,
            customize,
        } => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .try_init();
            format_command(&file, &reporter, lang, customize)
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_command(
    test_dir: PathBuf,
    plan_dir: Option<PathBuf>,
    customize: Option<PathBuf>,
    reporter_name: &str,
    x: Option<PathBuf>,
    hook_names: &[String],
    lang: Option<String>,
    output: Option<PathBuf>,
) -> i32 {
    let (reporter, i18n) = match build_reporter(customize.as_deref(), reporter_name, lang.as_deref())
    {
        Ok(built) => built,
        Err(e) => {
            error!(error = %e, "reporter setup failed");
            return 1;
        }
    };

    let hooks = match build_hooks(hook_names, &i18n) {
        Ok(hooks) => hooks,
        Err(e) => {
            error!(error = %e, "hook setup failed");
            return 1;
        }
    };

    let mut builder = FrameworkBuilder::new(test_dir)
        .plan_dir(plan_dir)
        .customize_file(customize)
        .x_file(x);
    for hook in hooks {
        builder = builder.hook(hook);
    }
    let framework = match builder.build() {
        Ok(framework) => framework,
        Err(e) => {
            error!(error = %e, "framework setup failed");
            return 1;
        }
    };

    let result = framework.run().await;
    let rendering = reporter.report(&result);

    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, rendering) {
                error!(path = %path.display(), error = %e, "failed to write report");
                return 1;
            }
        }
        None => println!("{rendering}"),
    }
    0
}

fn format_command(
    file: &std::path::Path,
    reporter_name: &str,
    lang: Option<String>,
    customize: Option<PathBuf>,
) -> i32 {
    let (reporter, _) = match build_reporter(customize.as_deref(), reporter_name, lang.as_deref())
    {
        Ok(built) => built,
        Err(e) => {
            error!(error = %e, "reporter setup failed");
            return 1;
        }
    };
    let json = match std::fs::read_to_string(file) {
        Ok(json) => json,
        Err(e) => {
            error!(path = %file.display(), error = %e, "failed to read result file");
            return 1;
        }
    };
    match walker::load_result(&json) {
        Ok(result) => {
            println!("{}", reporter.report(&result));
            0
        }
        Err(e) => {
            error!(error = %e, "failed to parse result file");
            1
        }
    }
}

/// Builds the reporter from its customize section, resolving the label
/// language from the CLI, the customize file, then `$LANG`.
fn build_reporter(
    customize: Option<&std::path::Path>,
    name: &str,
    lang: Option<&str>,
) -> anyhow::Result<(Arc<dyn Reporter>, I18n)> {
    let customize = config::Customize::load(customize)?;
    let args = customize
        .reporter
        .get(name)
        .cloned()
        .unwrap_or(Value::Null);
    let lang = lang
        .map(|l| l.to_string())
        .or_else(|| {
            args.get("lang")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
        });
    let overrides = args.get("i18n").and_then(|v| v.as_object()).cloned();
    let i18n = I18n::new(lang.as_deref(), overrides.as_ref());

    let map = report::default_reporter_map();
    let ctor = map.get(name).ok_or_else(|| {
        errors::BenchError::UnknownType {
            kind: errors::RegistryKind::Reporter,
            name: name.to_string(),
        }
    })?;
    let reporter = ctor(&args, &i18n)?;
    Ok((reporter, i18n))
}

fn build_hooks(names: &[String], i18n: &I18n) -> anyhow::Result<Vec<Arc<dyn Hook>>> {
    let map = hook::default_hook_map();
    let mut hooks = Vec::with_capacity(names.len());
    for name in names {
        let ctor = map.get(name.as_str()).ok_or_else(|| {
            errors::BenchError::UnknownType {
                kind: errors::RegistryKind::Hook,
                name: name.clone(),
            }
        })?;
        hooks.push(ctor(&Value::Null, i18n)?);
    }
    Ok(hooks)
}
