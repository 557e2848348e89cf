use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use futures::future::BoxFuture;

use taskgraph_core::error::{Result, TaskgraphError};
use taskgraph_core::traits::{FileStore, HttpClient};
use taskgraph_core::types::{HttpRequest, HttpResponse};

/// HTTP client replaying canned responses and recording requests.
///
/// Responses are served in order; the last one repeats. With none
/// configured every call answers `200` with an empty body.
#[derive(Default)]
pub struct MockHttpClient {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_json(self, status_code: u16, body: serde_json::Value) -> Self {
        self.push(HttpResponse {
            status_code,
            content_type: Some("application/json".into()),
            body: body.to_string(),
        })
    }

    pub fn respond_text(self, status_code: u16, body: &str) -> Self {
        self.push(HttpResponse {
            status_code,
            content_type: Some("text/plain".into()),
            body: body.to_string(),
        })
    }

    fn push(self, response: HttpResponse) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
        self
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_response(&self) -> HttpResponse {
        let mut responses = self.responses.lock().unwrap_or_else(PoisonError::into_inner);
        if responses.len() > 1 {
            if let Some(response) = responses.pop_front() {
                return response;
            }
        }
        responses.front().cloned().unwrap_or(HttpResponse {
            status_code: 200,
            content_type: None,
            body: String::new(),
        })
    }
}

impl HttpClient for MockHttpClient {
    fn call(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>> {
        Box::pin(async move {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(request);
            Ok(self.next_response())
        })
    }
}

/// In-memory `FileStore` keyed by the resolved path.
#[derive(Default)]
pub struct MemoryFileStore {
    files: Mutex<HashMap<PathBuf, String>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert(&self, path: &str, content: &str) {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(PathBuf::from(path), content.to_string());
    }

    pub fn get(&self, path: &str) -> Option<String> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&PathBuf::from(path))
            .cloned()
    }
}

impl FileStore for MemoryFileStore {
    fn read(&self, path: PathBuf) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            self.files
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&path)
                .cloned()
                .ok_or_else(|| TaskgraphError::IntegrationFailure {
                    integration: "file".into(),
                    message: format!("{}: not found", path.display()),
                })
        })
    }

    fn write(&self, path: PathBuf, content: String) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move {
            let written = content.len();
            self.files
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(path, content);
            Ok(written)
        })
    }

    fn append(&self, path: PathBuf, content: String) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move {
            let written = content.len();
            self.files
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(path)
                .or_default()
                .push_str(&content);
            Ok(written)
        })
    }
}
