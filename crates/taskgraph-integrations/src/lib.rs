pub mod database;
pub mod file;
pub mod http;

use std::path::PathBuf;
use std::sync::Arc;

use taskgraph_core::config::HttpConfig;
use taskgraph_core::error::{Result, TaskgraphError};
use taskgraph_core::traits::{DatabaseClient, FileStore, HttpClient};

pub use database::PassthroughDatabase;
pub use file::LocalFileStore;
pub use http::{interpret_response, ReqwestHttpClient};

/// The integration handlers available to external steps.
///
/// A handler left unset makes steps of that integration type fail with
/// `UnsupportedIntegrationType`.
#[derive(Clone, Default)]
pub struct Integrations {
    http: Option<Arc<dyn HttpClient>>,
    files: Option<Arc<dyn FileStore>>,
    database: Option<Arc<dyn DatabaseClient>>,
}

impl Integrations {
    /// An empty set; every external step fails until handlers are added.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set with all built-in handlers registered.
    pub fn with_builtins(
        http_config: &HttpConfig,
        working_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        Ok(Self::new()
            .with_http(Arc::new(ReqwestHttpClient::new(http_config)?))
            .with_files(Arc::new(LocalFileStore::new(working_dir)))
            .with_database(Arc::new(PassthroughDatabase)))
    }

    pub fn with_http(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http = Some(client);
        self
    }

    pub fn with_files(mut self, store: Arc<dyn FileStore>) -> Self {
        self.files = Some(store);
        self
    }

    pub fn with_database(mut self, database: Arc<dyn DatabaseClient>) -> Self {
        self.database = Some(database);
        self
    }

    pub fn http(&self) -> Result<&Arc<dyn HttpClient>> {
        self.http
            .as_ref()
            .ok_or_else(|| TaskgraphError::UnsupportedIntegrationType("http".into()))
    }

    pub fn files(&self) -> Result<&Arc<dyn FileStore>> {
        self.files
            .as_ref()
            .ok_or_else(|| TaskgraphError::UnsupportedIntegrationType("file".into()))
    }

    pub fn database(&self) -> Result<&Arc<dyn DatabaseClient>> {
        self.database
            .as_ref()
            .ok_or_else(|| TaskgraphError::UnsupportedIntegrationType("database".into()))
    }

    /// Names of the registered integration types.
    pub fn list(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.http.is_some() {
            names.push("http");
        }
        if self.files.is_some() {
            names.push("file");
        }
        if self.database.is_some() {
            names.push("database");
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_rejects_every_type() {
        let integrations = Integrations::new();
        assert!(matches!(
            integrations.http(),
            Err(TaskgraphError::UnsupportedIntegrationType(t)) if t == "http"
        ));
        assert!(matches!(
            integrations.files(),
            Err(TaskgraphError::UnsupportedIntegrationType(t)) if t == "file"
        ));
        assert!(matches!(
            integrations.database(),
            Err(TaskgraphError::UnsupportedIntegrationType(t)) if t == "database"
        ));
        assert!(integrations.list().is_empty());
    }

    #[test]
    fn builtins_register_all_types() {
        let integrations =
            Integrations::with_builtins(&HttpConfig::default(), std::env::temp_dir()).unwrap();
        assert_eq!(integrations.list(), vec!["http", "file", "database"]);
    }
}
