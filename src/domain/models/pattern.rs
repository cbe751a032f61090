//! Pattern domain model
//!
//! A pattern is a unit of reusable knowledge: source text, its embedding and
//! a schema-free metadata map. Patterns are persisted only in the vector
//! index; the text and timestamps travel in the point payload under reserved
//! keys so the knowledge base owns no storage of its own.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::{KnowledgeError, KnowledgeResult};
use crate::domain::models::IndexPoint;

/// Prefix reserved for keys the knowledge base writes into point payloads.
pub const RESERVED_PREFIX: &str = "_kb_";

const TEXT_KEY: &str = "_kb_text";
const CREATED_AT_KEY: &str = "_kb_created_at";
const UPDATED_AT_KEY: &str = "_kb_updated_at";

/// A metadata value: scalar or array of values.
///
/// Serialized as plain JSON (untagged) so payloads stay readable by any
/// client of the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<MetadataValue>),
}

impl MetadataValue {
    /// Numeric view of the value, if it is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Scalar equality, treating `Int(3)` and `Float(3.0)` as equal.
    pub fn scalar_eq(&self, other: &Self) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl<T: Into<Self>> From<Vec<T>> for MetadataValue {
    fn from(values: Vec<T>) -> Self {
        Self::Array(values.into_iter().map(Into::into).collect())
    }
}

/// Schema-free metadata map. Ordered so payload serialization is stable.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Reject user metadata that collides with reserved payload keys.
pub fn validate_metadata(metadata: &Metadata) -> KnowledgeResult<()> {
    for key in metadata.keys() {
        if key.is_empty() {
            return Err(KnowledgeError::ValidationFailed(
                "metadata keys cannot be empty".to_string(),
            ));
        }
        if key.starts_with(RESERVED_PREFIX) {
            return Err(KnowledgeError::ValidationFailed(format!(
                "metadata key '{key}' uses reserved prefix '{RESERVED_PREFIX}'"
            )));
        }
    }
    Ok(())
}

/// A stored knowledge unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pattern {
    /// Create a new pattern with a fresh id.
    pub fn new(text: impl Into<String>, embedding: Vec<f32>, metadata: Metadata) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            embedding,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// Payload written to the index: user metadata plus reserved fields.
    pub fn to_payload(&self) -> Metadata {
        let mut payload = self.metadata.clone();
        payload.insert(TEXT_KEY.to_string(), self.text.clone().into());
        payload.insert(
            CREATED_AT_KEY.to_string(),
            self.created_at.to_rfc3339().into(),
        );
        payload.insert(
            UPDATED_AT_KEY.to_string(),
            self.updated_at.to_rfc3339().into(),
        );
        payload
    }

    pub fn to_point(&self) -> IndexPoint {
        IndexPoint {
            id: self.id.clone(),
            vector: self.embedding.clone(),
            payload: self.to_payload(),
        }
    }

    /// Rebuild a pattern from a stored index point.
    pub fn from_point(point: IndexPoint) -> KnowledgeResult<Self> {
        let IndexPoint {
            id,
            vector,
            payload,
        } = point;
        let (metadata, reserved) = split_payload(payload);

        let text = reserved
            .get(TEXT_KEY)
            .and_then(MetadataValue::as_str)
            .ok_or_else(|| {
                KnowledgeError::Serialization(format!("point {id} has no pattern text"))
            })?
            .to_string();
        let created_at = parse_timestamp(&reserved, CREATED_AT_KEY, &id)?;
        let updated_at = parse_timestamp(&reserved, UPDATED_AT_KEY, &id)?;

        Ok(Self {
            id,
            text,
            embedding: vector,
            metadata,
            created_at,
            updated_at,
        })
    }
}

/// Split a payload into (user metadata, reserved fields).
pub fn split_payload(payload: Metadata) -> (Metadata, Metadata) {
    payload
        .into_iter()
        .partition(|(key, _)| !key.starts_with(RESERVED_PREFIX))
}

/// Pattern text carried by a payload, if any.
pub fn payload_text(payload: &Metadata) -> Option<&str> {
    payload.get(TEXT_KEY).and_then(MetadataValue::as_str)
}

fn parse_timestamp(reserved: &Metadata, key: &str, id: &str) -> KnowledgeResult<DateTime<Utc>> {
    let raw = reserved
        .get(key)
        .and_then(MetadataValue::as_str)
        .ok_or_else(|| KnowledgeError::Serialization(format!("point {id} is missing {key}")))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| KnowledgeError::Serialization(format!("point {id} has invalid {key}: {e}")))
}
