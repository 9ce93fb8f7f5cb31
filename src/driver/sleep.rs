// Module: Sleep driver
// Waits for the requested duration; the workload used by examples and the
// harness's own end-to-end tests.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{request_name, Driver};

pub struct SleepDriver;

impl SleepDriver {
    pub fn new(_args: &Value) -> Result<Self> {
        Ok(Self)
    }
}

#[async_trait]
impl Driver for SleepDriver {
    fn name(&self, req: &Value) -> Option<String> {
        request_name(req)
    }

    /// Request: `{milliseconds}` or a bare number. Response:
    /// `{code: "OK", milliseconds}`.
    async fn call(&self, req: &Value) -> Result<Value> {
        let millis = match req {
            Value::Number(n) => n.as_u64().unwrap_or(0),
            other => other
                .get("milliseconds")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
        };
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
        Ok(json!({"code": "OK", "milliseconds": millis}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_sleep_waits_and_reports_ok() {
        let driver = SleepDriver::new(&json!({})).unwrap();
        let t0 = Instant::now();
        let res = driver.call(&json!({"milliseconds": 30})).await.unwrap();
        assert!(t0.elapsed() >= Duration::from_millis(30));
        assert_eq!(res["code"], json!("OK"));
    }

    #[tokio::test]
    async fn test_sleep_accepts_bare_number() {
        let driver = SleepDriver::new(&json!({})).unwrap();
        let res = driver.call(&json!(0)).await.unwrap();
        assert_eq!(res["milliseconds"], json!(0));
    }
}
