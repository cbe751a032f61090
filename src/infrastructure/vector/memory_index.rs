//! In-process vector index
//!
//! Exact scoring over every stored point. Used for tests and for ephemeral
//! deployments (`backend: memory`). An availability switch simulates outages.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::errors::{KnowledgeError, KnowledgeResult};
use crate::domain::models::{CollectionSpec, IndexPoint, ScoredPoint, SearchQuery};
use crate::domain::ports::VectorIndex;

struct StoredCollection {
    spec: CollectionSpec,
    /// Insertion order; overwrites keep their original slot
    points: Vec<IndexPoint>,
}

impl StoredCollection {
    fn position(&self, id: &str) -> Option<usize> {
        self.points.iter().position(|p| p.id == id)
    }
}

/// Vector index held entirely in memory.
pub struct InMemoryVectorIndex {
    collection: String,
    collections: RwLock<HashMap<String, StoredCollection>>,
    available: AtomicBool,
}

impl InMemoryVectorIndex {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            collections: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the index going away or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Number of points in the active collection.
    pub async fn len(&self) -> usize {
        self.collections
            .read()
            .await
            .get(&self.collection)
            .map_or(0, |c| c.points.len())
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_available(&self, operation: &str) -> KnowledgeResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(KnowledgeError::IndexUnavailable(format!(
                "{operation}: in-memory index is offline"
            )))
        }
    }

    fn missing_collection(&self) -> KnowledgeError {
        KnowledgeError::CollectionMissing(self.collection.clone())
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn name(&self) -> &str {
        "memory"
    }

    fn collection(&self) -> &str {
        &self.collection
    }

    async fn ensure_collection(&self, spec: &CollectionSpec) -> KnowledgeResult<()> {
        self.check_available("ensure_collection")?;

        let mut collections = self.collections.write().await;
        if let Some(existing) = collections.get(&spec.name) {
            if existing.spec.vector_size != spec.vector_size {
                return Err(KnowledgeError::SchemaConflict {
                    collection: spec.name.clone(),
                    expected: existing.spec.vector_size,
                    actual: spec.vector_size,
                });
            }
            return Ok(());
        }

        debug!(collection = %spec.name, vector_size = spec.vector_size, "Created in-memory collection");
        collections.insert(
            spec.name.clone(),
            StoredCollection {
                spec: spec.clone(),
                points: Vec::new(),
            },
        );
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> KnowledgeResult<()> {
        self.check_available("delete_collection")?;
        self.collections.write().await.remove(name);
        Ok(())
    }

    async fn upsert_batch(&self, points: Vec<IndexPoint>) -> KnowledgeResult<()> {
        self.check_available("upsert")?;

        let mut collections = self.collections.write().await;
        let stored = collections
            .get_mut(&self.collection)
            .ok_or_else(|| self.missing_collection())?;

        let expected = stored.spec.vector_size;
        if let Some(bad) = points.iter().find(|p| p.vector.len() != expected) {
            return Err(KnowledgeError::SchemaConflict {
                collection: self.collection.clone(),
                expected,
                actual: bad.vector.len(),
            });
        }

        for point in points {
            match stored.position(&point.id) {
                Some(idx) => stored.points[idx] = point,
                None => stored.points.push(point),
            }
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> KnowledgeResult<()> {
        self.check_available("delete")?;

        let mut collections = self.collections.write().await;
        if let Some(stored) = collections.get_mut(&self.collection) {
            if let Some(idx) = stored.position(id) {
                stored.points.remove(idx);
            }
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> KnowledgeResult<Option<IndexPoint>> {
        self.check_available("get")?;

        let collections = self.collections.read().await;
        Ok(collections
            .get(&self.collection)
            .and_then(|stored| stored.points.iter().find(|p| p.id == id).cloned()))
    }

    async fn search(&self, query: &SearchQuery) -> KnowledgeResult<Vec<ScoredPoint>> {
        self.check_available("search")?;

        let collections = self.collections.read().await;
        let stored = collections
            .get(&self.collection)
            .ok_or_else(|| self.missing_collection())?;

        if query.vector.len() != stored.spec.vector_size {
            return Err(KnowledgeError::SchemaConflict {
                collection: self.collection.clone(),
                expected: stored.spec.vector_size,
                actual: query.vector.len(),
            });
        }

        let distance = stored.spec.distance;
        let mut hits: Vec<ScoredPoint> = stored
            .points
            .iter()
            .filter(|p| query.filter.as_ref().map_or(true, |f| f.matches(&p.payload)))
            .map(|p| ScoredPoint {
                id: p.id.clone(),
                score: distance.score(&query.vector, &p.vector),
                payload: p.payload.clone(),
            })
            .filter(|hit| query.score_threshold.map_or(true, |t| hit.score >= t))
            .collect();

        // stable: equal scores keep insertion order
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(query.limit);
        Ok(hits)
    }

    async fn health(&self) -> KnowledgeResult<()> {
        self.check_available("health")
    }
}
