//! Knowledge base service
//!
//! Semantic search over stored patterns. Orchestrates an embedding provider
//! and a vector index and owns no storage of its own: every pattern lives in
//! the index, with its text and timestamps carried in the point payload.
//!
//! Reads degrade, writes fail loudly. While the index is unavailable
//! `search` returns an empty response flagged `degraded`, and `add`,
//! `update` and `delete` return `WriteUnavailable`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{KnowledgeError, KnowledgeResult};
use crate::domain::models::{
    payload_text, split_payload, validate_metadata, CollectionSpec, Filter, KnowledgeBaseConfig,
    Metadata, Pattern, ScoredPoint, SearchQuery, SearchResponse, SearchResult,
};
use crate::domain::ports::{EmbeddingProvider, VectorIndex};
use crate::infrastructure::cache::{query_fingerprint, CacheManager, KeyedLocks};

/// Default TTL of the query result cache.
pub const DEFAULT_QUERY_TTL: Duration = Duration::from_secs(60);

/// Shared flag recording whether the vector index is usable.
///
/// Set by the lifecycle layer after `ensure_collection` and refreshed by
/// [`KnowledgeBase::probe_index`].
#[derive(Debug, Clone)]
pub struct IndexAvailability(Arc<AtomicBool>);

impl IndexAvailability {
    pub fn new(available: bool) -> Self {
        Self(Arc::new(AtomicBool::new(available)))
    }

    pub fn is_available(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self, available: bool) {
        let previous = self.0.swap(available, Ordering::AcqRel);
        if previous != available {
            if available {
                info!("Vector index marked available");
            } else {
                warn!("Vector index marked unavailable, running degraded");
            }
        }
    }
}

impl Default for IndexAvailability {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Fields to change on [`KnowledgeBase::update`]. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct PatternUpdate {
    pub text: Option<String>,
    /// Replaces the whole metadata map.
    pub metadata: Option<Metadata>,
}

/// Semantic search request. Unset fields fall back to configuration.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    pub filter: Option<Filter>,
    pub limit: Option<usize>,
    pub min_score: Option<f32>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }
}

pub struct KnowledgeBase {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    config: KnowledgeBaseConfig,
    /// Recreated on recovery if the index lost it or never had it
    collection: Option<CollectionSpec>,
    availability: IndexAvailability,
    query_cache: Arc<CacheManager>,
    /// Bumped after every write; results computed across a bump are not cached
    generation: AtomicU64,
    write_locks: KeyedLocks,
}

impl KnowledgeBase {
    /// Create a knowledge base with no query cache and the index assumed
    /// available.
    ///
    /// # Arguments
    /// * `embedder` - Provider used for pattern text and queries
    /// * `index` - Vector index holding the patterns
    /// * `config` - Search defaults
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        config: KnowledgeBaseConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            config,
            collection: None,
            availability: IndexAvailability::default(),
            query_cache: Arc::new(CacheManager::disabled()),
            generation: AtomicU64::new(0),
            write_locks: KeyedLocks::new(),
        }
    }

    /// Cache search results in `cache`. The cache is cleared on every write,
    /// so it should not be shared with other data.
    pub fn with_query_cache(mut self, cache: Arc<CacheManager>) -> Self {
        self.query_cache = cache;
        self
    }

    pub fn with_availability(mut self, availability: IndexAvailability) -> Self {
        self.availability = availability;
        self
    }

    /// Collection to re-ensure when the index comes back.
    pub fn with_collection(mut self, spec: CollectionSpec) -> Self {
        self.collection = Some(spec);
        self
    }

    pub fn availability(&self) -> &IndexAvailability {
        &self.availability
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Store a new pattern and return its id.
    #[instrument(skip(self, text, metadata), fields(text_len = text.len()))]
    pub async fn add(&self, text: &str, metadata: Metadata) -> KnowledgeResult<String> {
        validate_text(text)?;
        validate_metadata(&metadata)?;
        self.ensure_writable("add")?;

        let embedding = self.embedder.embed(text).await?;
        let pattern = Pattern::new(text, embedding, metadata);

        let _guard = self.write_locks.lock(&pattern.id).await;
        self.index
            .upsert(pattern.to_point())
            .await
            .map_err(|e| self.write_error("add", e))?;
        self.invalidate_queries().await;

        info!(pattern_id = %pattern.id, "Pattern added");
        Ok(pattern.id)
    }

    /// Semantic search with the configured defaults.
    pub async fn search(
        &self,
        query: &str,
        filter: Option<Filter>,
        limit: Option<usize>,
        min_score: Option<f32>,
    ) -> KnowledgeResult<SearchResponse> {
        self.search_with(SearchRequest {
            query: query.to_string(),
            filter,
            limit,
            min_score,
        })
        .await
    }

    /// Semantic search.
    ///
    /// Results keep the index's order; the score floor only drops hits.
    /// `Timeout` propagates. `IndexUnavailable` or a missing collection yields
    /// a degraded response.
    #[instrument(skip(self, request), fields(limit, cached = false))]
    pub async fn search_with(&self, request: SearchRequest) -> KnowledgeResult<SearchResponse> {
        validate_text(&request.query)?;
        if let Some(filter) = &request.filter {
            filter.validate()?;
        }
        let limit = request.limit.unwrap_or(self.config.default_limit);
        if limit == 0 {
            return Err(KnowledgeError::ValidationFailed(
                "limit must be greater than 0".to_string(),
            ));
        }
        let min_score = request.min_score.or(self.config.min_score);
        tracing::Span::current().record("limit", limit);

        if !self.availability.is_available() {
            debug!("Index unavailable, returning degraded response");
            return Ok(SearchResponse::degraded());
        }

        let key = query_fingerprint(&request.query, request.filter.as_ref(), limit, min_score);
        let generation = self.generation.load(Ordering::Acquire);
        if let Some(results) = self.query_cache.get_json::<Vec<SearchResult>>(&key).await {
            tracing::Span::current().record("cached", true);
            return Ok(SearchResponse::new(results));
        }

        let vector = self.embedder.embed(&request.query).await?;
        let query = SearchQuery::new(vector, limit)
            .with_filter(request.filter)
            .with_score_threshold(min_score);

        let points = match self.index.search(&query).await {
            Ok(points) => points,
            Err(err) if err.is_index_unavailable() => {
                self.observe_index_error(&err);
                warn!(error = %err, "Search degraded");
                return Ok(SearchResponse::degraded());
            }
            Err(err) => return Err(err),
        };

        let results: Vec<SearchResult> = points
            .into_iter()
            .filter(|p| min_score.map_or(true, |floor| p.score >= floor))
            .take(limit)
            .map(to_search_result)
            .collect();

        self.cache_results(&key, generation, &results).await;
        debug!(hits = results.len(), "Search finished");
        Ok(SearchResponse::new(results))
    }

    /// Change a pattern's text and/or metadata. The embedding is recomputed
    /// only when the text changes.
    #[instrument(skip(self, changes))]
    pub async fn update(&self, pattern_id: &str, changes: PatternUpdate) -> KnowledgeResult<Pattern> {
        if let Some(text) = &changes.text {
            validate_text(text)?;
        }
        if let Some(metadata) = &changes.metadata {
            validate_metadata(metadata)?;
        }
        self.ensure_writable("update")?;

        let _guard = self.write_locks.lock(pattern_id).await;
        let mut pattern = self
            .fetch(pattern_id)
            .await
            .map_err(|e| self.write_error("update", e))?
            .ok_or_else(|| KnowledgeError::PatternNotFound(pattern_id.to_string()))?;

        if let Some(text) = changes.text {
            if text != pattern.text {
                pattern.embedding = self.embedder.embed(&text).await?;
                pattern.text = text;
            }
        }
        if let Some(metadata) = changes.metadata {
            pattern.metadata = metadata;
        }
        pattern.updated_at = Utc::now();

        self.index
            .upsert(pattern.to_point())
            .await
            .map_err(|e| self.write_error("update", e))?;
        self.invalidate_queries().await;

        info!(pattern_id, "Pattern updated");
        Ok(pattern)
    }

    /// Remove a pattern. Unknown ids are a no-op.
    #[instrument(skip(self))]
    pub async fn delete(&self, pattern_id: &str) -> KnowledgeResult<()> {
        self.ensure_writable("delete")?;

        let _guard = self.write_locks.lock(pattern_id).await;
        self.index
            .delete(pattern_id)
            .await
            .map_err(|e| self.write_error("delete", e))?;
        self.invalidate_queries().await;

        info!(pattern_id, "Pattern deleted");
        Ok(())
    }

    /// Fetch a stored pattern.
    pub async fn get(&self, pattern_id: &str) -> KnowledgeResult<Option<Pattern>> {
        if !self.availability.is_available() {
            return Err(KnowledgeError::IndexUnavailable(
                "vector index is marked unavailable".to_string(),
            ));
        }
        self.fetch(pattern_id).await
    }

    /// Check index reachability and update the availability flag.
    ///
    /// When a collection is configured it is ensured before the index is
    /// marked available, so an index that was down at startup gets its
    /// collection on recovery.
    pub async fn probe_index(&self) -> bool {
        let healthy = match self.check_index().await {
            Ok(()) => true,
            Err(err) => {
                debug!(error = %err, "Index probe failed");
                false
            }
        };
        self.availability.set(healthy);
        healthy
    }

    async fn check_index(&self) -> KnowledgeResult<()> {
        self.index.health().await?;
        if let Some(spec) = &self.collection {
            self.index.ensure_collection(spec).await?;
        }
        Ok(())
    }

    /// Drop availability when the collection vanished so the next probe
    /// recreates it.
    fn observe_index_error(&self, err: &KnowledgeError) {
        if let KnowledgeError::CollectionMissing(name) = err {
            warn!(collection = %name, "Collection missing from vector index");
            self.availability.set(false);
        }
    }

    fn write_error(&self, operation: &str, err: KnowledgeError) -> KnowledgeError {
        self.observe_index_error(&err);
        if err.is_index_unavailable() {
            KnowledgeError::WriteUnavailable(format!("{operation}: {err}"))
        } else {
            err
        }
    }

    async fn fetch(&self, pattern_id: &str) -> KnowledgeResult<Option<Pattern>> {
        self.index
            .get(pattern_id)
            .await?
            .map(Pattern::from_point)
            .transpose()
    }

    fn ensure_writable(&self, operation: &str) -> KnowledgeResult<()> {
        if self.availability.is_available() {
            Ok(())
        } else {
            Err(KnowledgeError::WriteUnavailable(format!(
                "{operation}: vector index is marked unavailable"
            )))
        }
    }

    async fn invalidate_queries(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.query_cache.clear().await;
    }

    async fn cache_results(&self, key: &str, generation: u64, results: &[SearchResult]) {
        if self.generation.load(Ordering::Acquire) != generation {
            return;
        }
        self.query_cache.put_json(key, &results, None).await;
        // a write may have cleared the cache between the check and the put
        if self.generation.load(Ordering::Acquire) != generation {
            self.query_cache.invalidate(key).await;
        }
    }
}

fn validate_text(text: &str) -> KnowledgeResult<()> {
    if text.trim().is_empty() {
        return Err(KnowledgeError::ValidationFailed(
            "text cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn to_search_result(point: ScoredPoint) -> SearchResult {
    let text = payload_text(&point.payload).map(ToString::to_string);
    let (payload, _reserved) = split_payload(point.payload);
    SearchResult {
        pattern_id: point.id,
        score: point.score,
        payload,
        text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{CollectionSpec, Distance, EmbeddingModel, MetadataValue};
    use crate::infrastructure::vector::{InMemoryVectorIndex, LocalEmbeddingService};

    async fn setup() -> (Arc<InMemoryVectorIndex>, KnowledgeBase) {
        let embedder = Arc::new(LocalEmbeddingService::new(EmbeddingModel::LocalMiniLM).unwrap());
        let index = Arc::new(InMemoryVectorIndex::new("patterns"));
        index
            .ensure_collection(&CollectionSpec::new("patterns", 384, Distance::Cosine))
            .await
            .unwrap();
        let kb = KnowledgeBase::new(embedder, index.clone(), KnowledgeBaseConfig::default())
            .with_query_cache(Arc::new(CacheManager::memory_only(100, DEFAULT_QUERY_TTL)));
        (index, kb)
    }

    fn meta(pairs: &[(&str, &str)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), MetadataValue::from(*v)))
            .collect()
    }

    #[tokio::test]
    async fn test_add_then_search_same_text() {
        let (_, kb) = setup().await;
        let id = kb.add("async retry pattern", Metadata::new()).await.unwrap();

        let response = kb.search("async retry pattern", None, Some(5), None).await.unwrap();
        assert!(!response.degraded);
        assert_eq!(response.results[0].pattern_id, id);
        assert!(response.results[0].score > 0.99);
        assert_eq!(response.results[0].text.as_deref(), Some("async retry pattern"));
    }

    #[tokio::test]
    async fn test_payload_excludes_reserved_keys() {
        let (_, kb) = setup().await;
        kb.add("connection pooling", meta(&[("lang", "rust")])).await.unwrap();

        let response = kb.search("connection pooling", None, None, None).await.unwrap();
        let payload = &response.results[0].payload;
        assert_eq!(payload.len(), 1);
        assert_eq!(payload["lang"], MetadataValue::from("rust"));
    }

    #[tokio::test]
    async fn test_writes_invalidate_cached_queries() {
        let (_, kb) = setup().await;
        kb.add("circuit breaker", Metadata::new()).await.unwrap();
        let first = kb.search("circuit breaker", None, Some(5), None).await.unwrap();
        assert_eq!(first.len(), 1);

        let second_id = kb.add("circuit breaker pattern", Metadata::new()).await.unwrap();
        let second = kb.search("circuit breaker", None, Some(5), None).await.unwrap();
        assert_eq!(second.len(), 2);
        assert!(second.contains(&second_id));
    }

    #[tokio::test]
    async fn test_min_score_floor_drops_results() {
        let (_, kb) = setup().await;
        kb.add("exponential backoff", Metadata::new()).await.unwrap();
        kb.add("zebra giraffe savanna", Metadata::new()).await.unwrap();

        let response = kb
            .search("exponential backoff", None, Some(10), Some(0.99))
            .await
            .unwrap();
        assert_eq!(response.len(), 1);
    }

    #[tokio::test]
    async fn test_filter_restricts_results() {
        let (_, kb) = setup().await;
        kb.add("retry loop", meta(&[("lang", "python")])).await.unwrap();
        let rust = kb.add("retry loop", meta(&[("lang", "rust")])).await.unwrap();

        let response = kb
            .search("retry loop", Some(Filter::eq("lang", "rust")), Some(5), None)
            .await
            .unwrap();
        assert_eq!(response.len(), 1);
        assert_eq!(response.results[0].pattern_id, rust);
    }

    #[tokio::test]
    async fn test_invalid_input_rejected() {
        let (_, kb) = setup().await;
        assert!(matches!(
            kb.add("   ", Metadata::new()).await,
            Err(KnowledgeError::ValidationFailed(_))
        ));
        assert!(matches!(
            kb.add("x", meta(&[("_kb_text", "spoof")])).await,
            Err(KnowledgeError::ValidationFailed(_))
        ));
        assert!(matches!(
            kb.search("q", Some(Filter::any(vec![])), None, None).await,
            Err(KnowledgeError::InvalidFilter(_))
        ));
        assert!(matches!(
            kb.search("q", None, Some(0), None).await,
            Err(KnowledgeError::ValidationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_update_recomputes_embedding_on_text_change() {
        let (index, kb) = setup().await;
        let id = kb.add("original text", meta(&[("v", "1")])).await.unwrap();
        let before = index.get(&id).await.unwrap().unwrap().vector;

        let same_text = kb
            .update(&id, PatternUpdate { text: None, metadata: Some(meta(&[("v", "2")])) })
            .await
            .unwrap();
        assert_eq!(same_text.embedding, before);
        assert_eq!(same_text.metadata["v"], MetadataValue::from("2"));

        let changed = kb
            .update(
                &id,
                PatternUpdate {
                    text: Some("completely different words".to_string()),
                    metadata: None,
                },
            )
            .await
            .unwrap();
        assert_ne!(changed.embedding, before);
        assert!(changed.updated_at >= changed.created_at);
        assert_eq!(kb.get(&id).await.unwrap().unwrap().text, "completely different words");
    }

    #[tokio::test]
    async fn test_update_unknown_id() {
        let (_, kb) = setup().await;
        assert!(matches!(
            kb.update("missing", PatternUpdate::default()).await,
            Err(KnowledgeError::PatternNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_, kb) = setup().await;
        let id = kb.add("to be removed", Metadata::new()).await.unwrap();
        kb.delete(&id).await.unwrap();
        kb.delete(&id).await.unwrap();
        assert!(kb.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_outage_degrades_reads_and_rejects_writes() {
        let (index, kb) = setup().await;
        let id = kb.add("stable pattern", Metadata::new()).await.unwrap();
        index.set_available(false);

        let response = kb.search("stable pattern", None, None, None).await.unwrap();
        assert!(response.degraded);
        assert!(response.is_empty());
        assert!(matches!(
            kb.add("new pattern", Metadata::new()).await,
            Err(KnowledgeError::WriteUnavailable(_))
        ));
        assert!(matches!(
            kb.delete(&id).await,
            Err(KnowledgeError::WriteUnavailable(_))
        ));

        assert!(!kb.probe_index().await);
        assert!(matches!(
            kb.update(&id, PatternUpdate::default()).await,
            Err(KnowledgeError::WriteUnavailable(_))
        ));

        index.set_available(true);
        assert!(kb.probe_index().await);
        assert!(kb.search("stable pattern", None, None, None).await.unwrap().contains(&id));
    }

    #[tokio::test]
    async fn test_recovery_recreates_dropped_collection() {
        let (index, kb) = setup().await;
        let kb = kb.with_collection(CollectionSpec::new("patterns", 384, Distance::Cosine));
        index.delete_collection("patterns").await.unwrap();

        let response = kb.search("anything", None, None, None).await.unwrap();
        assert!(response.degraded);
        assert!(!kb.availability().is_available());

        assert!(kb.probe_index().await);
        let id = kb.add("recovered pattern", Metadata::new()).await.unwrap();
        assert!(kb.search("recovered pattern", None, None, None).await.unwrap().contains(&id));
    }
}
