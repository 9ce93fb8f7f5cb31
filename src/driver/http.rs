//! # HTTP driver
//!
//! Sends one HTTP request per `call` and shapes the response for the
//! classification contract.
//!
//! ## Request
//!
//! ```json
//! {
//!   "method": "POST",
//!   "path": "/v1/search",
//!   "headers": {"Authorization": "Bearer ${var.token}"},
//!   "params": {"q": "rust"},
//!   "body": {"size": 10},
//!   "timeoutMilliseconds": 2000
//! }
//! ```
//!
//! `path` joins the driver's `baseUrl`; a full `url` wins over both. The
//! driver-level args carry `{baseUrl, headers, timeoutMilliseconds}`
//! defaults applied to every request.
//!
//! ## Response
//!
//! `{status, headers, body}` — the body parsed as JSON when possible,
//! otherwise the raw text. Contracts typically classify on
//! `#str(res.status)` or a code field inside `res.body`.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Map, Value};

use super::{request_name, Driver};

pub struct HttpDriver {
    client: Client,
    base_url: String,
    headers: Map<String, Value>,
    timeout: Option<Duration>,
}

impl HttpDriver {
    pub fn new(args: &Value) -> Result<Self> {
        let base_url = args
            .get("baseUrl")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim_end_matches('/')
            .to_string();
        let headers = args
            .get("headers")
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();
        let timeout = args
            .get("timeoutMilliseconds")
            .and_then(|v| v.as_u64())
            .map(Duration::from_millis);
        let client = Client::builder()
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            base_url,
            headers,
            timeout,
        })
    }

    fn build_url(&self, req: &Value) -> Result<String> {
        let mut url = if let Some(full) = req.get("url").and_then(|v| v.as_str()) {
            full.to_string()
        } else if let Some(path) = req.get("path").and_then(|v| v.as_str()) {
            if path.starts_with("http") {
                path.to_string()
            } else {
                format!("{}{}", self.base_url, path)
            }
        } else {
            return Err(anyhow!("http request needs a `url` or `path`"));
        };

        if let Some(params) = req.get("params").and_then(|v| v.as_object()) {
            let mut parts: Vec<String> = Vec::with_capacity(params.len());
            for (key, value) in params {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                parts.push(format!(
                    "{}={}",
                    urlencoding::encode(key),
                    urlencoding::encode(&text)
                ));
            }
            if !parts.is_empty() {
                let separator = if url.contains('?') { "&" } else { "?" };
                url = format!("{}{}{}", url, separator, parts.join("&"));
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl Driver for HttpDriver {
    fn name(&self, req: &Value) -> Option<String> {
        request_name(req)
    }

    async fn call(&self, req: &Value) -> Result<Value> {
        let method_str = req
            .get("method")
            .and_then(|v| v.as_str())
            .unwrap_or("GET");
        let method = Method::from_bytes(method_str.as_bytes())
            .map_err(|e| anyhow!("invalid HTTP method {method_str:?}: {e}"))?;
        let url = self.build_url(req)?;

        let mut builder = self.client.request(method, &url);

        for (key, value) in &self.headers {
            if let Some(text) = value.as_str() {
                builder = builder.header(key, text);
            }
        }
        if let Some(headers) = req.get("headers").and_then(|v| v.as_object()) {
            for (key, value) in headers {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                builder = builder.header(key, text);
            }
        }

        if let Some(body) = req.get("body") {
            if !body.is_null() {
                builder = match body {
                    Value::String(text) => builder.body(text.clone()),
                    other => builder.json(other),
                };
            }
        }

        let timeout = req
            .get("timeoutMilliseconds")
            .and_then(|v| v.as_u64())
            .map(Duration::from_millis)
            .or(self.timeout);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("{method_str} {url}"))?;

        let status = response.status().as_u16();
        let mut headers = Map::new();
        for (name, value) in response.headers() {
            headers.insert(
                name.as_str().to_string(),
                Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()),
            );
        }
        let text = response.text().await.context("reading response body")?;
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        Ok(json!({
            "status": status,
            "headers": headers,
            "body": body,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver(args: Value) -> HttpDriver {
        HttpDriver::new(&args).unwrap()
    }

    #[test]
    fn test_build_url_joins_base() {
        let d = driver(json!({"baseUrl": "http://localhost:8080/"}));
        let url = d.build_url(&json!({"path": "/ping"})).unwrap();
        assert_eq!(url, "http://localhost:8080/ping");
    }

    #[test]
    fn test_build_url_full_url_wins() {
        let d = driver(json!({"baseUrl": "http://localhost"}));
        let url = d
            .build_url(&json!({"url": "https://example.com/x", "path": "/ignored"}))
            .unwrap();
        assert_eq!(url, "https://example.com/x");
    }

    #[test]
    fn test_build_url_encodes_params() {
        let d = driver(json!({}));
        let url = d
            .build_url(&json!({
                "path": "http://h/search",
                "params": {"q": "a b", "n": 10}
            }))
            .unwrap();
        assert!(url.starts_with("http://h/search?"));
        assert!(url.contains("q=a%20b"));
        assert!(url.contains("n=10"));
    }

    #[test]
    fn test_build_url_requires_target() {
        let d = driver(json!({}));
        assert!(d.build_url(&json!({"method": "GET"})).is_err());
    }
}
