//! # Structured framework errors
//!
//! Setup-shaped failures get a typed variant here so callers can tell a
//! broken config apart from a broken benchmark target. Everything that
//! happens *inside* a running unit (driver I/O, contract rendering against a
//! live response) flows through `anyhow::Error` into the result tree
//! instead: those failures are data, not control flow.
//!
//! | Variant        | Raised by                       | Lands on          |
//! |----------------|---------------------------------|-------------------|
//! | `Config`       | YAML loading / parsing          | `TestResult.err`  |
//! | `Render`       | template engine                 | nearest result    |
//! | `UnknownType`  | registry lookup                 | `TestResult.err`  |
//! | `Build`        | driver/seed/monitor constructor | `TestResult.err`  |
//! | `GroupShape`   | parallel/limit vector mismatch  | `PlanResult.err`  |
//! | `PlanShape`    | plan pre-run validation         | `PlanResult.err`  |

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Which registry a failed lookup went against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    Driver,
    Seed,
    Monitor,
    Reporter,
    Hook,
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RegistryKind::Driver => "driver",
            RegistryKind::Seed => "seed",
            RegistryKind::Monitor => "monitor",
            RegistryKind::Reporter => "reporter",
            RegistryKind::Hook => "hook",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("config file {path:?}: {detail}")]
    Config { path: PathBuf, detail: String },

    #[error("render of {input:?} failed: {detail}")]
    Render { input: String, detail: String },

    #[error("unknown {kind} type {name:?}")]
    UnknownType { kind: RegistryKind, name: String },

    #[error("{kind} {name:?} construction failed: {detail}")]
    Build {
        kind: RegistryKind,
        name: String,
        detail: String,
    },

    #[error("group {idx}: `{field}` has {got} entries for {units} units")]
    GroupShape {
        idx: usize,
        field: &'static str,
        got: usize,
        units: usize,
    },

    #[error("plan {id:?}: {detail}")]
    PlanShape { id: String, detail: String },
}

impl BenchError {
    pub fn render(input: impl Into<String>, detail: impl Into<String>) -> Self {
        BenchError::Render {
            input: input.into(),
            detail: detail.into(),
        }
    }
}
