//! Vector index port.
//!
//! The contract a vector database client must honor. Implementations own
//! their retry policy and normalize transport failures into
//! [`KnowledgeError::IndexUnavailable`](crate::domain::errors::KnowledgeError)
//! or `Timeout` before returning.

use async_trait::async_trait;

use crate::domain::errors::KnowledgeResult;
use crate::domain::models::{CollectionSpec, IndexPoint, ScoredPoint, SearchQuery};

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Backend name for logs and health output.
    fn name(&self) -> &str;

    /// Collection this client reads and writes.
    fn collection(&self) -> &str;

    /// Create the collection if absent.
    ///
    /// No-op when it exists with the same vector size; `SchemaConflict` when
    /// the size differs.
    async fn ensure_collection(&self, spec: &CollectionSpec) -> KnowledgeResult<()>;

    /// Drop a collection. Missing collections are not an error.
    async fn delete_collection(&self, name: &str) -> KnowledgeResult<()>;

    /// Insert or overwrite a point.
    async fn upsert(&self, point: IndexPoint) -> KnowledgeResult<()> {
        self.upsert_batch(vec![point]).await
    }

    /// Insert or overwrite several points in one request.
    async fn upsert_batch(&self, points: Vec<IndexPoint>) -> KnowledgeResult<()>;

    /// Remove a point. Missing ids are a no-op.
    async fn delete(&self, id: &str) -> KnowledgeResult<()>;

    /// Fetch a point with its vector and payload.
    async fn get(&self, id: &str) -> KnowledgeResult<Option<IndexPoint>>;

    /// Similarity search ordered by descending score.
    async fn search(&self, query: &SearchQuery) -> KnowledgeResult<Vec<ScoredPoint>>;

    /// Cheap reachability probe.
    async fn health(&self) -> KnowledgeResult<()>;
}
