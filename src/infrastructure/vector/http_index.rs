//! Qdrant-style REST vector index client
//!
//! One pooled `reqwest::Client` per index. Every round trip goes through the
//! retry policy, and transport failures are normalized into the domain error
//! taxonomy before they leave this module.
//!
//! Two request shapes exist for similarity search. Servers from 1.10 on
//! accept `POST points/query` with a `query` field; older ones only know
//! `POST points/search` with a `vector` field. The shape is decided once per
//! client and cached.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{KnowledgeError, KnowledgeResult};
use crate::domain::models::{
    CollectionSpec, DialectSetting, Distance, Filter, IndexPoint, Metadata, MetadataValue,
    ScoredPoint, SearchQuery, VectorIndexConfig,
};
use crate::domain::ports::VectorIndex;
use crate::infrastructure::vector::errors::IndexRequestError;
use crate::infrastructure::vector::retry::RetryPolicy;

/// Request shape used for similarity search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDialect {
    /// `POST /collections/{c}/points/query` with `query`
    Query,
    /// `POST /collections/{c}/points/search` with `vector`
    Search,
}

impl SearchDialect {
    const UNKNOWN: u8 = 0;

    /// Dialect for an advertised server version such as `"1.9.2"`.
    pub fn for_version(version: &str) -> Option<Self> {
        let mut parts = version.trim_start_matches('v').split('.');
        let major: u32 = parts.next()?.parse().ok()?;
        let minor: u32 = parts.next().and_then(|m| m.parse().ok()).unwrap_or(0);

        if (major, minor) >= (1, 10) {
            Some(Self::Query)
        } else {
            Some(Self::Search)
        }
    }

    fn path(self) -> &'static str {
        match self {
            Self::Query => "points/query",
            Self::Search => "points/search",
        }
    }

    fn vector_field(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Search => "vector",
        }
    }

    const fn as_u8(self) -> u8 {
        match self {
            Self::Query => 1,
            Self::Search => 2,
        }
    }

    const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Query),
            2 => Some(Self::Search),
            _ => None,
        }
    }
}

impl std::fmt::Display for SearchDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Query => write!(f, "query"),
            Self::Search => write!(f, "search"),
        }
    }
}

/// Vector index backed by a Qdrant-compatible REST server.
pub struct HttpVectorIndex {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    request_timeout: Duration,
    retry: RetryPolicy,
    dialect_setting: DialectSetting,
    /// Cached dialect decision, 0 while undecided
    dialect: AtomicU8,
    /// Serializes the one-time server probe
    probe_lock: Mutex<()>,
    /// Vector size per collection, described on demand
    collection_sizes: RwLock<HashMap<String, usize>>,
}

impl HttpVectorIndex {
    /// Create a client from configuration. No network traffic happens here.
    pub fn new(config: &VectorIndexConfig) -> KnowledgeResult<Self> {
        let request_timeout = Duration::from_millis(config.request_timeout_ms);

        let mut headers = HeaderMap::new();
        if let Some(api_key) = config.api_key.as_deref().filter(|k| !k.is_empty()) {
            let value = HeaderValue::from_str(api_key).map_err(|e| {
                KnowledgeError::Configuration(format!("invalid vector index api key: {e}"))
            })?;
            headers.insert("api-key", value);
        }

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| {
                KnowledgeError::Configuration(format!("failed to build HTTP client: {e}"))
            })?;

        let dialect = match config.search_dialect {
            DialectSetting::Auto => SearchDialect::UNKNOWN,
            DialectSetting::Query => SearchDialect::Query.as_u8(),
            DialectSetting::Search => SearchDialect::Search.as_u8(),
        };

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            request_timeout,
            retry: RetryPolicy::from(&config.retry),
            dialect_setting: config.search_dialect,
            dialect: AtomicU8::new(dialect),
            probe_lock: Mutex::new(()),
            collection_sizes: RwLock::new(HashMap::new()),
        })
    }

    /// Replace the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Dialect decided so far, if any.
    pub fn current_dialect(&self) -> Option<SearchDialect> {
        SearchDialect::from_u8(self.dialect.load(Ordering::Acquire))
    }

    fn store_dialect(&self, dialect: SearchDialect) {
        self.dialect.store(dialect.as_u8(), Ordering::Release);
    }

    async fn send_once(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, IndexRequestError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IndexRequestError::status(status, body));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Send with retries; the transport error is returned for classification.
    async fn call(
        &self,
        operation: &str,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, IndexRequestError> {
        self.retry
            .execute(operation, || {
                self.send_once(method.clone(), path, body.as_ref())
            })
            .await
    }

    fn normalize(&self, operation: &str, err: IndexRequestError) -> KnowledgeError {
        err.into_knowledge_error(operation, self.request_timeout)
    }

    fn points_path(&self, suffix: &str) -> String {
        format!("/collections/{}/{}", self.collection, suffix)
    }

    /// Server version advertised on `GET /`.
    async fn server_version(&self) -> Result<Option<String>, IndexRequestError> {
        let body = self.send_once(Method::GET, "/", None).await?;
        Ok(body
            .get("version")
            .and_then(Value::as_str)
            .map(ToString::to_string))
    }

    async fn resolve_dialect(&self) -> SearchDialect {
        if let Some(dialect) = self.current_dialect() {
            return dialect;
        }

        let _guard = self.probe_lock.lock().await;
        if let Some(dialect) = self.current_dialect() {
            return dialect;
        }

        let dialect = match self.server_version().await {
            Ok(Some(version)) => {
                let dialect = SearchDialect::for_version(&version).unwrap_or(SearchDialect::Query);
                info!(%version, %dialect, "Selected search dialect from server version");
                dialect
            }
            Ok(None) => SearchDialect::Query,
            Err(err) => {
                debug!(error = %err, "Version probe failed, trying query dialect first");
                SearchDialect::Query
            }
        };

        self.store_dialect(dialect);
        dialect
    }

    /// Vector size of a collection, or `None` if it does not exist.
    async fn describe_collection(&self, name: &str) -> KnowledgeResult<Option<usize>> {
        let path = format!("/collections/{name}");
        let body = match self.call("describe_collection", Method::GET, &path, None).await {
            Ok(body) => body,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(self.normalize("describe_collection", err)),
        };

        let size = body
            .pointer("/result/config/params/vectors/size")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                KnowledgeError::IndexRejected(format!(
                    "collection '{name}' has no single unnamed vector configuration"
                ))
            })?;
        let size = usize::try_from(size).map_err(|_| {
            KnowledgeError::IndexRejected(format!("collection '{name}' reports vector size {size}"))
        })?;

        self.collection_sizes
            .write()
            .await
            .insert(name.to_string(), size);
        Ok(Some(size))
    }

    async fn collection_size(&self) -> KnowledgeResult<usize> {
        if let Some(size) = self.collection_sizes.read().await.get(&self.collection) {
            return Ok(*size);
        }

        self.describe_collection(&self.collection)
            .await?
            .ok_or_else(|| KnowledgeError::CollectionMissing(self.collection.clone()))
    }

    fn search_body(dialect: SearchDialect, query: &SearchQuery) -> Value {
        let mut body = json!({
            "limit": query.limit,
            "with_payload": true,
        });
        body[dialect.vector_field()] = json!(query.vector);
        if let Some(filter) = &query.filter {
            body["filter"] = to_index_filter(filter);
        }
        if let Some(threshold) = query.score_threshold {
            body["score_threshold"] = json!(threshold);
        }
        body
    }

    async fn search_with(
        &self,
        dialect: SearchDialect,
        query: &SearchQuery,
    ) -> Result<Vec<ScoredPoint>, IndexRequestError> {
        let path = self.points_path(dialect.path());
        let body = Self::search_body(dialect, query);
        let response = self.call("search", Method::POST, &path, Some(body)).await?;
        parse_scored_points(response)
    }
}

#[async_trait]
impl VectorIndex for HttpVectorIndex {
    fn name(&self) -> &str {
        "http"
    }

    fn collection(&self) -> &str {
        &self.collection
    }

    #[instrument(skip(self), fields(collection = %spec.name, vector_size = spec.vector_size))]
    async fn ensure_collection(&self, spec: &CollectionSpec) -> KnowledgeResult<()> {
        if let Some(existing) = self.describe_collection(&spec.name).await? {
            if existing != spec.vector_size {
                return Err(KnowledgeError::SchemaConflict {
                    collection: spec.name.clone(),
                    expected: existing,
                    actual: spec.vector_size,
                });
            }
            debug!("Collection already exists with matching vector size");
            return Ok(());
        }

        let path = format!("/collections/{}", spec.name);
        let body = json!({
            "vectors": {
                "size": spec.vector_size,
                "distance": distance_name(spec.distance),
            }
        });

        match self.call("create_collection", Method::PUT, &path, Some(body)).await {
            Ok(_) => {}
            // lost a creation race; re-check the winner's schema below
            Err(IndexRequestError::Status { status, .. })
                if status == reqwest::StatusCode::CONFLICT => {}
            Err(err) => return Err(self.normalize("create_collection", err)),
        }

        match self.describe_collection(&spec.name).await? {
            Some(size) if size != spec.vector_size => Err(KnowledgeError::SchemaConflict {
                collection: spec.name.clone(),
                expected: size,
                actual: spec.vector_size,
            }),
            _ => {
                info!("Created collection");
                Ok(())
            }
        }
    }

    async fn delete_collection(&self, name: &str) -> KnowledgeResult<()> {
        let path = format!("/collections/{name}");
        match self.call("delete_collection", Method::DELETE, &path, None).await {
            Ok(_) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(self.normalize("delete_collection", err)),
        }
        self.collection_sizes.write().await.remove(name);
        Ok(())
    }

    async fn upsert_batch(&self, points: Vec<IndexPoint>) -> KnowledgeResult<()> {
        if points.is_empty() {
            return Ok(());
        }

        let expected = self.collection_size().await?;
        if let Some(bad) = points.iter().find(|p| p.vector.len() != expected) {
            return Err(KnowledgeError::SchemaConflict {
                collection: self.collection.clone(),
                expected,
                actual: bad.vector.len(),
            });
        }

        let count = points.len();
        let body = json!({
            "points": points
                .into_iter()
                .map(|p| json!({"id": p.id, "vector": p.vector, "payload": p.payload}))
                .collect::<Vec<_>>(),
        });

        self.call(
            "upsert",
            Method::PUT,
            &self.points_path("points?wait=true"),
            Some(body),
        )
        .await
        .map_err(|err| self.normalize("upsert", err))?;

        debug!(collection = %self.collection, count, "Upserted points");
        Ok(())
    }

    async fn delete(&self, id: &str) -> KnowledgeResult<()> {
        let body = json!({ "points": [id] });
        match self
            .call(
                "delete",
                Method::POST,
                &self.points_path("points/delete?wait=true"),
                Some(body),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(self.normalize("delete", err)),
        }
    }

    async fn get(&self, id: &str) -> KnowledgeResult<Option<IndexPoint>> {
        let path = self.points_path(&format!("points/{id}"));
        let body = match self.call("get", Method::GET, &path, None).await {
            Ok(body) => body,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(self.normalize("get", err)),
        };

        let Some(result) = body.get("result").filter(|r| !r.is_null()) else {
            return Ok(None);
        };

        let vector = result
            .get("vector")
            .cloned()
            .map(serde_json::from_value::<Vec<f32>>)
            .transpose()?
            .unwrap_or_default();

        Ok(Some(IndexPoint {
            id: point_id(result.get("id")).unwrap_or_else(|| id.to_string()),
            vector,
            payload: payload_from_json(result.get("payload")),
        }))
    }

    #[instrument(skip(self, query), fields(collection = %self.collection, limit = query.limit))]
    async fn search(&self, query: &SearchQuery) -> KnowledgeResult<Vec<ScoredPoint>> {
        let dialect = self.resolve_dialect().await;

        match self.search_with(dialect, query).await {
            Ok(points) => Ok(points),
            Err(err)
                if dialect == SearchDialect::Query
                    && self.dialect_setting == DialectSetting::Auto
                    && err.is_unknown_parameter() =>
            {
                warn!(error = %err, "Server rejected query dialect, falling back to search");
                self.store_dialect(SearchDialect::Search);
                self.search_with(SearchDialect::Search, query)
                    .await
                    .map_err(|err| self.normalize("search", err))
            }
            Err(err) => Err(self.normalize("search", err)),
        }
    }

    async fn health(&self) -> KnowledgeResult<()> {
        self.send_once(Method::GET, "/", None)
            .await
            .map(|_| ())
            .map_err(|err| self.normalize("health", err))
    }
}

fn distance_name(distance: Distance) -> &'static str {
    match distance {
        Distance::Cosine => "Cosine",
        Distance::Dot => "Dot",
        Distance::Euclid => "Euclid",
    }
}

/// Translate a domain filter into the index's `must`/`should`/`must_not`
/// filter object.
pub fn to_index_filter(filter: &Filter) -> Value {
    match filter {
        Filter::All(filters) => json!({ "must": filters.iter().map(to_index_filter).collect::<Vec<_>>() }),
        Filter::Any(filters) => json!({ "should": filters.iter().map(to_index_filter).collect::<Vec<_>>() }),
        Filter::Not(inner) => json!({ "must_not": [to_index_filter(inner)] }),
        leaf => json!({ "must": [condition(leaf)] }),
    }
}

fn condition(filter: &Filter) -> Value {
    match filter {
        Filter::Eq { field, value } => match value {
            MetadataValue::Null => json!({ "is_null": { "key": field } }),
            // match only supports keywords, integers and booleans
            MetadataValue::Float(v) => json!({ "key": field, "range": { "gte": v, "lte": v } }),
            other => json!({ "key": field, "match": { "value": other } }),
        },
        Filter::Range { field, bounds } => json!({ "key": field, "range": bounds }),
        nested => to_index_filter(nested),
    }
}

fn point_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Decode a payload leniently; values outside the metadata model are dropped.
fn payload_from_json(value: Option<&Value>) -> Metadata {
    let Some(Value::Object(map)) = value else {
        return Metadata::new();
    };

    map.iter()
        .filter_map(|(key, value)| match serde_json::from_value(value.clone()) {
            Ok(parsed) => Some((key.clone(), parsed)),
            Err(_) => {
                debug!(field = %key, "Skipping payload value outside the metadata model");
                None
            }
        })
        .collect()
}

/// Accepts both `{"result": [...]}` and `{"result": {"points": [...]}}`.
fn parse_scored_points(body: Value) -> Result<Vec<ScoredPoint>, IndexRequestError> {
    let hits = match body.get("result") {
        Some(Value::Array(hits)) => hits,
        Some(Value::Object(result)) => match result.get("points") {
            Some(Value::Array(hits)) => hits,
            _ => return Err(IndexRequestError::Decode("search result has no points".to_string())),
        },
        _ => return Err(IndexRequestError::Decode("search response has no result".to_string())),
    };

    hits.iter()
        .map(|hit| {
            let id = point_id(hit.get("id"))
                .ok_or_else(|| IndexRequestError::Decode("search hit has no id".to_string()))?;
            let score = hit
                .get("score")
                .and_then(Value::as_f64)
                .ok_or_else(|| IndexRequestError::Decode(format!("search hit {id} has no score")))?;
            Ok(ScoredPoint {
                id,
                score: score as f32,
                payload: payload_from_json(hit.get("payload")),
            })
        })
        .collect()
}
