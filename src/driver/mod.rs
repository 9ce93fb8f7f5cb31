// Module: Driver
// Plug-in transports the step executor sends requests through.

pub mod http;
pub mod shell;
pub mod sleep;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Contract for a pluggable transport (HTTP, shell, ...).
///
/// `call` is the only operation allowed to block on I/O; it may fail, and
/// failures become error sub-steps on the result tree. `name` lets a driver
/// override the display name of the sub-step built from a request;
/// returning `None` keeps the step spec's default.
#[async_trait]
pub trait Driver: Send + Sync {
    fn name(&self, _req: &Value) -> Option<String> {
        None
    }

    async fn call(&self, req: &Value) -> Result<Value>;
}

/// Constructor registered under a driver type name; receives the rendered
/// `args` block from the directory's `ctx.yaml`.
pub type DriverCtor = fn(&Value) -> Result<Arc<dyn Driver>>;

/// Driver registry keyed by type name; closed once the run starts.
pub type DriverMap = HashMap<String, DriverCtor>;

pub fn default_driver_map() -> DriverMap {
    let mut map: DriverMap = HashMap::new();
    map.insert("http".to_string(), |args| {
        Ok(Arc::new(http::HttpDriver::new(args)?) as Arc<dyn Driver>)
    });
    map.insert("shell".to_string(), |args| {
        Ok(Arc::new(shell::ShellDriver::new(args)?) as Arc<dyn Driver>)
    });
    map.insert("sleep".to_string(), |args| {
        Ok(Arc::new(sleep::SleepDriver::new(args)?) as Arc<dyn Driver>)
    });
    map
}

/// Pulls the per-request display-name override shared by the built-in
/// drivers: a string `name` field on the request object.
pub(crate) fn request_name(req: &Value) -> Option<String> {
    req.get("name")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_contains_builtins() {
        let map = default_driver_map();
        for name in ["http", "shell", "sleep"] {
            assert!(map.contains_key(name), "missing driver {name}");
        }
    }

    #[test]
    fn test_request_name_override() {
        assert_eq!(
            request_name(&serde_json::json!({"name": "login"})),
            Some("login".to_string())
        );
        assert_eq!(request_name(&serde_json::json!({"path": "/x"})), None);
    }
}
