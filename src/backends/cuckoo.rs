//! Cuckoo Sandbox REST API client.
//!
//! This module provides a `SandboxApi` implementation over the Cuckoo
//! REST API.
//!
//! # Requirements
//!
//! - A reachable Cuckoo API (`cuckoo api`)
//! - The API bearer token
//!
//! # API Usage
//!
//! | Operation | Endpoint |
//! |---|---|
//! | lookup by hash | `GET /files/view/sha256/{hash}` |
//! | submit | `POST /tasks/create/file` (multipart) |
//! | task status | `GET /tasks/view/{id}` |
//! | report score | `GET /tasks/report/{id}` |
//!
//! Cuckoo answers "unknown sample" and "report not ready" with a JSON body
//! and HTTP 404, so bodies are parsed regardless of status. Only the
//! authentication and rate-limit statuses are turned into errors directly.

use crate::core::{Fingerprint, SandboxApi, SandboxError, Score, TaskId, TaskStatus};

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;

const CREATE_PATH: &str = "/tasks/create/file";
const HASH_PATH: &str = "/files/view/sha256/";
const REPORT_PATH: &str = "/tasks/report/";
const VIEW_PATH: &str = "/tasks/view/";

/// Cuckoo client configuration.
#[derive(Debug, Clone)]
pub struct CuckooConfig {
    /// Base URL of the API, e.g. `http://cuckoo.local:8090`.
    pub base_url: String,

    /// Bearer token (kept secret).
    pub api_token: SecretString,

    /// Per-request timeout.
    pub timeout: Duration,
}

impl CuckooConfig {
    /// Creates a new configuration.
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: SecretString::new(api_token.into().into()),
            timeout: Duration::from_secs(60),
        }
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Cuckoo REST API client.
///
/// Endpoint URLs are derived once from the base URL when the client is
/// built.
///
/// # Example
///
/// ```rust,ignore
/// use sandbridge::backends::{CuckooClient, CuckooConfig};
///
/// let config = CuckooConfig::new("http://cuckoo.local:8090", "token");
/// let client = CuckooClient::new(config)?;
/// ```
#[derive(Debug)]
pub struct CuckooClient {
    config: CuckooConfig,
    client: reqwest::Client,
    create_url: String,
    hash_url: String,
    report_url: String,
    view_url: String,
}

impl CuckooClient {
    /// Creates a new client with the given configuration.
    pub fn new(config: CuckooConfig) -> Result<Self, SandboxError> {
        let base = config.base_url.trim().trim_end_matches('/').to_string();
        if base.is_empty() {
            return Err(SandboxError::configuration("sandbox base URL is empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                SandboxError::configuration(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            create_url: format!("{}{}", base, CREATE_PATH),
            hash_url: format!("{}{}", base, HASH_PATH),
            report_url: format!("{}{}", base, REPORT_PATH),
            view_url: format!("{}{}", base, VIEW_PATH),
            config,
            client,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CuckooConfig {
        &self.config
    }

    async fn get_json(&self, url: String, endpoint: &str) -> Result<Value, SandboxError> {
        tracing::trace!(endpoint = %endpoint, "GET");
        let response = self
            .client
            .get(url)
            .bearer_auth(self.config.api_token.expose_secret())
            .send()
            .await
            .map_err(|e| SandboxError::transport(endpoint, e.to_string()))?;

        read_json(response, endpoint).await
    }
}

async fn read_json(response: reqwest::Response, endpoint: &str) -> Result<Value, SandboxError> {
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(SandboxError::AuthenticationFailed {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        });
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(SandboxError::RateLimited {
            endpoint: endpoint.to_string(),
            retry_after,
        });
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| SandboxError::transport(endpoint, e.to_string()))?;

    serde_json::from_slice(&body).map_err(|e| {
        SandboxError::malformed(endpoint, format!("HTTP {} with non-JSON body: {}", status, e))
    })
}

/// Interprets a `/files/view/sha256/{hash}` body.
fn parse_lookup(body: &Value) -> Result<Option<TaskId>, String> {
    let object = body.as_object().ok_or("expected a JSON object")?;

    let Some(sample) = object.get("sample") else {
        return Ok(None);
    };

    sample
        .get("tasks")
        .and_then(Value::as_array)
        .and_then(|tasks| tasks.first())
        .and_then(TaskId::from_json)
        .map(Some)
        .ok_or_else(|| "sample record has no task list".to_string())
}

/// Interprets a `/tasks/create/file` body.
fn parse_submit(body: &Value) -> Result<TaskId, String> {
    let object = body.as_object().ok_or("expected a JSON object")?;

    object
        .get("task_id")
        .and_then(TaskId::from_json)
        .or_else(|| {
            object
                .get("task_ids")
                .and_then(Value::as_array)
                .and_then(|ids| ids.first())
                .and_then(TaskId::from_json)
        })
        .ok_or_else(|| "response has no task_id".to_string())
}

/// Interprets a `/tasks/view/{id}` body.
fn parse_status(body: &Value) -> Result<TaskStatus, String> {
    body.get("task")
        .and_then(|t| t.get("status"))
        .and_then(Value::as_str)
        .map(TaskStatus::parse)
        .ok_or_else(|| "response has no task.status".to_string())
}

/// Interprets a `/tasks/report/{id}` body.
fn parse_score(body: &Value) -> Result<Option<Score>, String> {
    if !body.is_object() {
        return Err("expected a JSON object".to_string());
    }

    match body.get("info").and_then(|info| info.get("score")) {
        None | Some(Value::Null) => Ok(None),
        Some(raw) => raw
            .as_f64()
            .and_then(Score::new)
            .map(Some)
            .ok_or_else(|| format!("info.score is not a non-negative number: {}", raw)),
    }
}

#[async_trait]
impl SandboxApi for CuckooClient {
    fn name(&self) -> &str {
        "cuckoo"
    }

    async fn lookup_by_hash(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<TaskId>, SandboxError> {
        let endpoint = format!("{}{}", HASH_PATH, fingerprint.as_str());
        let body = self
            .get_json(format!("{}{}", self.hash_url, fingerprint.as_str()), &endpoint)
            .await?;

        parse_lookup(&body).map_err(|details| SandboxError::malformed(&endpoint, details))
    }

    async fn submit(&self, path: &Path, file_name: &str) -> Result<TaskId, SandboxError> {
        let open_error = |e: std::io::Error| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SandboxError::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                SandboxError::Io(e)
            }
        };
        let file = tokio::fs::File::open(path).await.map_err(open_error)?;
        let size = file.metadata().await.map_err(open_error)?.len();

        tracing::debug!(
            sandbox = self.name(),
            file_name = %file_name,
            size,
            "Submitting file to cuckoo"
        );

        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let part = reqwest::multipart::Part::stream_with_length(body, size)
            .file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&self.create_url)
            .bearer_auth(self.config.api_token.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| SandboxError::transport(CREATE_PATH, e.to_string()))?;

        let body = read_json(response, CREATE_PATH).await?;
        parse_submit(&body).map_err(|details| SandboxError::malformed(CREATE_PATH, details))
    }

    async fn task_status(&self, task_id: &TaskId) -> Result<TaskStatus, SandboxError> {
        let endpoint = format!("{}{}", VIEW_PATH, task_id);
        let body = self
            .get_json(format!("{}{}", self.view_url, task_id), &endpoint)
            .await?;

        parse_status(&body).map_err(|details| SandboxError::malformed(&endpoint, details))
    }

    async fn fetch_score(&self, task_id: &TaskId) -> Result<Option<Score>, SandboxError> {
        let endpoint = format!("{}{}", REPORT_PATH, task_id);
        let body = self
            .get_json(format!("{}{}", self.report_url, task_id), &endpoint)
            .await?;

        parse_score(&body).map_err(|details| SandboxError::malformed(&endpoint, details))
    }
}
