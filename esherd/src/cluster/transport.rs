//! HTTP transport to the Elasticsearch REST API

use crate::error::{Error, Result};
use crate::telemetry;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

/// Issues JSON requests against the cluster.
///
/// `path` is relative to the cluster root and may carry a query string.
/// An empty response body is returned as `Value::Null`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value>;
}

/// reqwest-backed transport that fails over across cluster URLs in order
pub struct HttpTransport {
    client: Client,
    urls: Vec<String>,
}

impl HttpTransport {
    pub fn new(urls: &[String], timeout: Duration) -> Result<Self> {
        if urls.is_empty() {
            return Err(Error::Config("at least one Elasticsearch URL is required".into()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            urls: urls
                .iter()
                .map(|u| u.trim_end_matches('/').to_string())
                .collect(),
        })
    }

    async fn send_one(
        &self,
        base: &str,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = format!("{}/{}", base, path.trim_start_matches('/'));
        let mut request = match method {
            Method::Get => self.client.get(&url),
            Method::Put => self.client.put(&url),
            Method::Post => self.client.post(&url),
            Method::Delete => self.client.delete(&url),
        };
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Remote {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let start = Instant::now();
        let mut last_err = None;

        for base in &self.urls {
            match self.send_one(base, method, path, body).await {
                Ok(value) => {
                    debug!(method = method.as_str(), path, "elasticsearch request ok");
                    telemetry::record_es_request(method.as_str(), "ok", start.elapsed());
                    return Ok(value);
                }
                // Client errors are the same on every node
                Err(Error::Remote { status, body }) if status < 500 => {
                    telemetry::record_es_request(method.as_str(), "error", start.elapsed());
                    return Err(Error::Remote { status, body });
                }
                Err(e) => {
                    warn!(url = %base, path, error = %e, "elasticsearch request failed");
                    last_err = Some(e);
                }
            }
        }

        telemetry::record_es_request(method.as_str(), "error", start.elapsed());
        Err(last_err.unwrap_or_else(|| Error::Config("no Elasticsearch URL configured".into())))
    }
}
