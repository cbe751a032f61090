//! Vector index domain models
//!
//! Framework-agnostic shapes exchanged with a vector index: collection
//! parameters, stored points and scored hits.

use serde::{Deserialize, Serialize};

use crate::domain::models::{Filter, Metadata};

/// Similarity metric of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    /// Cosine similarity in [-1, 1]
    #[default]
    Cosine,
    /// Raw dot product
    Dot,
    /// Negated euclidean distance (higher is closer)
    Euclid,
}

impl Distance {
    /// Score two vectors of equal length. Higher is more similar.
    pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if mag_a == 0.0 || mag_b == 0.0 {
                    return 0.0;
                }
                dot / (mag_a * mag_b)
            }
            Self::Dot => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            Self::Euclid => -a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
        }
    }
}

impl std::fmt::Display for Distance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cosine => write!(f, "cosine"),
            Self::Dot => write!(f, "dot"),
            Self::Euclid => write!(f, "euclid"),
        }
    }
}

/// Parameters of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSpec {
    pub name: String,
    pub vector_size: usize,
    #[serde(default)]
    pub distance: Distance,
}

impl CollectionSpec {
    pub fn new(name: impl Into<String>, vector_size: usize, distance: Distance) -> Self {
        Self {
            name: name.into(),
            vector_size,
            distance,
        }
    }
}

/// A point stored in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexPoint {
    pub id: String,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub payload: Metadata,
}

/// A search hit returned by the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub payload: Metadata,
}

/// Similarity search request.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub vector: Vec<f32>,
    pub filter: Option<Filter>,
    pub limit: usize,
    pub score_threshold: Option<f32>,
}

impl SearchQuery {
    pub fn new(vector: Vec<f32>, limit: usize) -> Self {
        Self {
            vector,
            filter: None,
            limit,
            score_threshold: None,
        }
    }

    pub fn with_filter(mut self, filter: Option<Filter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_score_threshold(mut self, threshold: Option<f32>) -> Self {
        self.score_threshold = threshold;
        self
    }
}
