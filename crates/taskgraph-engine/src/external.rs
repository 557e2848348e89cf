use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use taskgraph_core::error::{Result, TaskgraphError};
use taskgraph_core::types::{HttpMethod, HttpRequest};
use taskgraph_integrations::{interpret_response, Integrations};

/// Typed config of an external step, one variant per integration type.
#[derive(Debug, Clone, PartialEq)]
pub enum ExternalConfig {
    Http(HttpCall),
    File(FileCall),
    Database(DatabaseCall),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpCall {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperation {
    Read,
    Write,
    Append,
}

impl FileOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Append => "append",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileCall {
    pub operation: FileOperation,
    pub path: String,
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseCall {
    pub operation: String,
    pub query: String,
}

// Raw shapes as they appear in workflow definitions.

#[derive(Deserialize)]
struct RawExternal {
    integration_type: String,
}

#[derive(Deserialize)]
struct RawHttp {
    #[serde(default = "default_method")]
    method: String,
    url: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default = "default_timeout")]
    timeout: u64,
}

fn default_method() -> String {
    "GET".into()
}

fn default_timeout() -> u64 {
    30
}

#[derive(Deserialize)]
struct RawFile {
    operation: String,
    path: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct RawDatabase {
    #[serde(default = "default_db_operation")]
    operation: String,
    #[serde(default)]
    query: String,
}

fn default_db_operation() -> String {
    "query".into()
}

impl ExternalConfig {
    /// Parse and validate the `config` object of an external step.
    pub fn from_value(step_id: &str, config: Value) -> Result<Self> {
        let invalid = |e: serde_json::Error| TaskgraphError::InvalidStepConfig {
            step: step_id.to_string(),
            message: e.to_string(),
        };

        let raw: RawExternal = serde_json::from_value(config.clone()).map_err(invalid)?;
        match raw.integration_type.as_str() {
            "http" => {
                let http: RawHttp = serde_json::from_value(config).map_err(invalid)?;
                Ok(Self::Http(HttpCall {
                    method: http.method.parse()?,
                    url: http.url,
                    headers: http.headers,
                    body: http.body,
                    timeout_secs: http.timeout,
                }))
            }
            "file" => {
                let file: RawFile = serde_json::from_value(config).map_err(invalid)?;
                let operation = match file.operation.as_str() {
                    "read" => FileOperation::Read,
                    "write" => FileOperation::Write,
                    "append" => FileOperation::Append,
                    other => {
                        return Err(TaskgraphError::UnsupportedOperation(format!(
                            "file operation {}",
                            other
                        )))
                    }
                };
                if operation != FileOperation::Read && file.content.is_none() {
                    return Err(TaskgraphError::InvalidStepConfig {
                        step: step_id.to_string(),
                        message: format!("file {} requires content", operation.as_str()),
                    });
                }
                Ok(Self::File(FileCall {
                    operation,
                    path: file.path,
                    content: file.content,
                }))
            }
            "database" => {
                let db: RawDatabase = serde_json::from_value(config).map_err(invalid)?;
                Ok(Self::Database(DatabaseCall {
                    operation: db.operation,
                    query: db.query,
                }))
            }
            other => Err(TaskgraphError::UnsupportedIntegrationType(other.to_string())),
        }
    }

    pub fn integration_type(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::File(_) => "file",
            Self::Database(_) => "database",
        }
    }
}

/// Workflow-level configuration values read by integration handlers.
///
/// Recognised keys: `working_dir` (base for relative file paths) and
/// `http_headers` (default headers, overridden per step).
#[derive(Debug, Clone, Default)]
pub struct Globals(HashMap<String, Value>);

impl Globals {
    pub fn new(values: HashMap<String, Value>) -> Self {
        Self(values)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn working_dir(&self) -> Option<PathBuf> {
        self.0
            .get("working_dir")
            .and_then(Value::as_str)
            .map(PathBuf::from)
    }

    pub fn http_headers(&self) -> BTreeMap<String, String> {
        self.0
            .get("http_headers")
            .and_then(Value::as_object)
            .map(|headers| {
                headers
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = PathBuf::from(path);
        match self.working_dir() {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        }
    }
}

/// Run an external step against the registered integrations.
pub async fn execute_external(
    integrations: &Integrations,
    config: &ExternalConfig,
    globals: &Globals,
) -> Result<Value> {
    match config {
        ExternalConfig::Http(call) => {
            let client = integrations.http()?;

            let mut headers = globals.http_headers();
            headers.extend(call.headers.clone());

            let body = match &call.body {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) => Some(s.clone()),
                Some(other) => {
                    if !headers.keys().any(|k| k.eq_ignore_ascii_case("content-type")) {
                        headers.insert("Content-Type".into(), "application/json".into());
                    }
                    Some(other.to_string())
                }
            };

            let response = client
                .call(HttpRequest {
                    method: call.method,
                    url: call.url.clone(),
                    headers,
                    body,
                    timeout_secs: call.timeout_secs,
                })
                .await?;
            debug!(url = %call.url, status = response.status_code, "HTTP integration responded");
            interpret_response(response)
        }
        ExternalConfig::File(call) => {
            let store = integrations.files()?;
            let path = globals.resolve(&call.path);
            let content = call.content.clone().unwrap_or_default();

            let mut result = match call.operation {
                FileOperation::Read => {
                    let content = store.read(path).await?;
                    serde_json::json!({ "content": content })
                }
                FileOperation::Write => {
                    serde_json::json!({ "bytes_written": store.write(path, content).await? })
                }
                FileOperation::Append => {
                    serde_json::json!({ "bytes_written": store.append(path, content).await? })
                }
            };
            result["operation"] = Value::String(call.operation.as_str().to_string());
            result["path"] = Value::String(call.path.clone());
            Ok(result)
        }
        ExternalConfig::Database(call) => {
            integrations
                .database()?
                .exec(call.operation.clone(), call.query.clone())
                .await
        }
    }
}
