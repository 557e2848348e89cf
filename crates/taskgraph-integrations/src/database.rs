use futures::future::BoxFuture;
use tracing::warn;

use taskgraph_core::error::Result;
use taskgraph_core::traits::DatabaseClient;

/// Placeholder database handler.
///
/// Echoes the requested operation and query back without executing
/// anything. Supply a real `DatabaseClient` to run queries.
pub struct PassthroughDatabase;

impl DatabaseClient for PassthroughDatabase {
    fn exec(&self, operation: String, query: String) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            warn!(operation = %operation, "Database integration has no driver, query not executed");
            Ok(serde_json::json!({
                "operation": operation,
                "query": query,
                "status": "not_executed",
            }))
        })
    }
}
