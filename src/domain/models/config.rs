use serde::{Deserialize, Serialize};

use super::{Distance, EmbeddingModel};

/// Main configuration structure for patternbase
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Vector index configuration
    #[serde(default)]
    pub vector_index: VectorIndexConfig,

    /// Two-tier cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Knowledge base defaults
    #[serde(default)]
    pub knowledge_base: KnowledgeBaseConfig,

    /// Component lifecycle configuration
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files (stdout only when unset)
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Which embedding provider backs the knowledge base
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    #[default]
    Local,
    Openai,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProviderKind,

    /// Local model selection
    #[serde(default)]
    pub model: EmbeddingModel,

    /// Directory holding the local model artifact (built-in model when unset)
    #[serde(default)]
    pub model_dir: Option<String>,

    /// Upper bound for a single model load attempt
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,

    /// Extra load attempts on transient I/O failures
    #[serde(default = "default_load_retries")]
    pub load_retries: u32,

    /// OpenAI-compatible endpoint settings
    #[serde(default)]
    pub openai: OpenAiSettings,
}

const fn default_load_timeout_ms() -> u64 {
    30_000
}

const fn default_load_retries() -> u32 {
    2
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            model: EmbeddingModel::default(),
            model_dir: None,
            load_timeout_ms: default_load_timeout_ms(),
            load_retries: default_load_retries(),
            openai: OpenAiSettings::default(),
        }
    }
}

/// OpenAI-compatible embedding endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OpenAiSettings {
    /// Falls back to `OPENAI_API_KEY`
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    #[serde(default = "default_openai_model")]
    pub model: String,

    #[serde(default = "default_openai_dimension")]
    pub dimension: usize,

    #[serde(default = "default_openai_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_openai_batch")]
    pub max_batch_size: usize,
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "text-embedding-3-small".to_string()
}

const fn default_openai_dimension() -> usize {
    1536
}

const fn default_openai_timeout_secs() -> u64 {
    30
}

const fn default_openai_batch() -> usize {
    2048
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            dimension: default_openai_dimension(),
            timeout_secs: default_openai_timeout_secs(),
            max_batch_size: default_openai_batch(),
        }
    }
}

/// Vector index backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexBackend {
    /// Remote Qdrant-style REST server
    #[default]
    Http,
    /// In-process index (tests, ephemeral use)
    Memory,
}

/// How the search request shape is chosen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialectSetting {
    /// Probe the server on first use
    #[default]
    Auto,
    /// Always use the `points/query` shape
    Query,
    /// Always use the legacy `points/search` shape
    Search,
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct VectorIndexConfig {
    #[serde(default)]
    pub backend: IndexBackend,

    #[serde(default = "default_index_url")]
    pub url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default)]
    pub distance: Distance,

    /// Per-request timeout
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// When false, startup continues in degraded mode if the index is down
    #[serde(default)]
    pub critical: bool,

    #[serde(default)]
    pub search_dialect: DialectSetting,

    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_index_url() -> String {
    "http://localhost:6333".to_string()
}

fn default_collection() -> String {
    "patterns".to_string()
}

const fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::default(),
            url: default_index_url(),
            api_key: None,
            collection: default_collection(),
            distance: Distance::default(),
            request_timeout_ms: default_request_timeout_ms(),
            critical: false,
            search_dialect: DialectSetting::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Total time budget across all attempts
    #[serde(default = "default_max_elapsed_ms")]
    pub max_elapsed_ms: u64,

    /// Randomization factor applied to each delay (0.0 disables jitter)
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    200
}

const fn default_max_backoff_ms() -> u64 {
    5_000
}

const fn default_max_elapsed_ms() -> u64 {
    30_000
}

const fn default_jitter() -> f64 {
    0.2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_elapsed_ms: default_max_elapsed_ms(),
            jitter: default_jitter(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CacheConfig {
    /// Disabled cache: every get misses, every put is a no-op
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Disk tier directory (memory-only when unset)
    #[serde(default)]
    pub directory: Option<String>,

    /// Maximum entries held in the memory tier
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: u64,

    /// Embedding entry TTL
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Query result TTL
    #[serde(default = "default_query_ttl_secs")]
    pub query_ttl_secs: u64,

    /// Soft cap for the disk tier
    #[serde(default)]
    pub max_disk_bytes: Option<u64>,

    /// Background compaction period (0 disables the task)
    #[serde(default = "default_compaction_interval_secs")]
    pub compaction_interval_secs: u64,
}

const fn default_true() -> bool {
    true
}

const fn default_memory_capacity() -> u64 {
    10_000
}

const fn default_ttl_secs() -> u64 {
    7 * 24 * 3600
}

const fn default_query_ttl_secs() -> u64 {
    60
}

const fn default_compaction_interval_secs() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            directory: None,
            memory_capacity: default_memory_capacity(),
            ttl_secs: default_ttl_secs(),
            query_ttl_secs: default_query_ttl_secs(),
            max_disk_bytes: None,
            compaction_interval_secs: default_compaction_interval_secs(),
        }
    }
}

/// Knowledge base defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct KnowledgeBaseConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Score floor applied when the caller gives none
    #[serde(default)]
    pub min_score: Option<f32>,
}

const fn default_limit() -> usize {
    10
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            min_score: None,
        }
    }
}

/// Component lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LifecycleConfig {
    /// Upper bound for one component initialization attempt
    #[serde(default = "default_init_timeout_ms")]
    pub init_timeout_ms: u64,

    /// Extra attempts for retryable initialization failures
    #[serde(default = "default_init_retries")]
    pub init_retries: u32,

    /// Pause between initialization attempts
    #[serde(default = "default_init_backoff_ms")]
    pub init_backoff_ms: u64,
}

const fn default_init_timeout_ms() -> u64 {
    60_000
}

const fn default_init_retries() -> u32 {
    1
}

const fn default_init_backoff_ms() -> u64 {
    500
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            init_timeout_ms: default_init_timeout_ms(),
            init_retries: default_init_retries(),
            init_backoff_ms: default_init_backoff_ms(),
        }
    }
}
