//! # Seeds
//!
//! A seed is a data source handing one value to each step iteration. Units
//! bind local names to seed instances (`seed: {user: users}`); every
//! iteration draws `seed.user = seeds["users"].pick()` before rendering the
//! request.
//!
//! `pick` is called concurrently from all workers of a unit, so
//! implementations hold immutable data and draw through the thread-local
//! RNG.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use rand::Rng;
use serde_json::Value;

/// Plug-in contract: produce one value per call.
pub trait Seed: Send + Sync {
    fn pick(&self) -> Value;
}

/// Constructor registered under a seed type name.
pub type SeedCtor = fn(&Value) -> Result<Arc<dyn Seed>>;

/// Seed registry keyed by type name; closed once the run starts.
pub type SeedMap = HashMap<String, SeedCtor>;

pub fn default_seed_map() -> SeedMap {
    let mut map: SeedMap = HashMap::new();
    map.insert("list".to_string(), |args| {
        Ok(Arc::new(ListSeed::new(args)?) as Arc<dyn Seed>)
    });
    map.insert("file".to_string(), |args| {
        Ok(Arc::new(FileSeed::new(args)?) as Arc<dyn Seed>)
    });
    map
}

/// Inline list of values; uniform random choice.
pub struct ListSeed {
    values: Vec<Value>,
}

impl ListSeed {
    pub fn new(args: &Value) -> Result<Self> {
        let values = match args {
            Value::Array(items) => items.clone(),
            other => bail!("list seed args must be a list, got {other}"),
        };
        if values.is_empty() {
            bail!("list seed needs at least one value");
        }
        Ok(Self { values })
    }
}

impl Seed for ListSeed {
    fn pick(&self) -> Value {
        let idx = rand::thread_rng().gen_range(0..self.values.len());
        self.values[idx].clone()
    }
}

/// JSON-lines file loaded once at construction; uniform random choice.
pub struct FileSeed {
    values: Vec<Value>,
}

impl FileSeed {
    pub fn new(args: &Value) -> Result<Self> {
        let path = args
            .get("name")
            .and_then(|v| v.as_str())
            .context("file seed args need a `name` path")?;
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading seed file {path:?}"))?;
        let mut values = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(line)
                .with_context(|| format!("seed file {path:?} line {}", lineno + 1))?;
            values.push(value);
        }
        if values.is_empty() {
            bail!("seed file {path:?} has no values");
        }
        Ok(Self { values })
    }
}

impl Seed for FileSeed {
    fn pick(&self) -> Value {
        let idx = rand::thread_rng().gen_range(0..self.values.len());
        self.values[idx].clone()
    }
}
