// Module: Shell driver
// Runs one command per call through `sh -c` and captures its output.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;

use super::{request_name, Driver};

pub struct ShellDriver {
    shell: String,
}

impl ShellDriver {
    pub fn new(args: &Value) -> Result<Self> {
        let shell = args
            .get("shell")
            .and_then(|v| v.as_str())
            .unwrap_or("sh")
            .to_string();
        Ok(Self { shell })
    }
}

#[async_trait]
impl Driver for ShellDriver {
    fn name(&self, req: &Value) -> Option<String> {
        request_name(req)
    }

    /// Request is the command string itself, or `{command, env?}`.
    /// Response: `{code, stdout, stderr}` — a non-zero exit is data for the
    /// classification contract, not a driver failure.
    async fn call(&self, req: &Value) -> Result<Value> {
        let command = match req {
            Value::String(s) => s.as_str(),
            Value::Object(map) => map
                .get("command")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow!("shell request needs a `command`"))?,
            other => return Err(anyhow!("shell request must be a string or object, got {other}")),
        };

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(command);
        if let Some(env) = req.get("env").and_then(|v| v.as_object()) {
            for (key, value) in env {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                cmd.env(key, text);
            }
        }

        let output = cmd
            .output()
            .await
            .with_context(|| format!("spawning {:?}", self.shell))?;

        Ok(json!({
            "code": output.status.code().unwrap_or(-1),
            "stdout": String::from_utf8_lossy(&output.stdout).trim_end_matches('\n'),
            "stderr": String::from_utf8_lossy(&output.stderr).trim_end_matches('\n'),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shell_captures_stdout_and_code() {
        let driver = ShellDriver::new(&json!({})).unwrap();
        let res = driver.call(&json!("echo hello")).await.unwrap();
        assert_eq!(res["code"], json!(0));
        assert_eq!(res["stdout"], json!("hello"));
    }

    #[tokio::test]
    async fn test_shell_nonzero_exit_is_data() {
        let driver = ShellDriver::new(&json!({})).unwrap();
        let res = driver.call(&json!("exit 3")).await.unwrap();
        assert_eq!(res["code"], json!(3));
    }

    #[tokio::test]
    async fn test_shell_env_and_object_request() {
        let driver = ShellDriver::new(&json!({})).unwrap();
        let res = driver
            .call(&json!({"command": "printf %s \"$GREETING\"", "env": {"GREETING": "hi"}}))
            .await
            .unwrap();
        assert_eq!(res["stdout"], json!("hi"));
    }
}
