//! Search domain models
//!
//! Metadata filters form a small boolean algebra of equality and range
//! predicates over named payload fields. Metadata itself is schema-free;
//! filters are validated here, at the predicate boundary, and nowhere else.

use serde::{Deserialize, Serialize};

use crate::domain::errors::{KnowledgeError, KnowledgeResult};
use crate::domain::models::{Metadata, MetadataValue};

/// Deepest filter nesting accepted by [`Filter::validate`].
pub const MAX_FILTER_DEPTH: usize = 8;

/// Numeric range bounds. At least one bound must be set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeBounds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<f64>,
}

impl RangeBounds {
    pub fn with_gt(mut self, value: f64) -> Self {
        self.gt = Some(value);
        self
    }

    pub fn with_gte(mut self, value: f64) -> Self {
        self.gte = Some(value);
        self
    }

    pub fn with_lt(mut self, value: f64) -> Self {
        self.lt = Some(value);
        self
    }

    pub fn with_lte(mut self, value: f64) -> Self {
        self.lte = Some(value);
        self
    }

    fn is_empty(&self) -> bool {
        self.gt.is_none() && self.gte.is_none() && self.lt.is_none() && self.lte.is_none()
    }

    fn bounds(&self) -> [Option<f64>; 4] {
        [self.gt, self.gte, self.lt, self.lte]
    }

    fn contains(&self, value: f64) -> bool {
        self.gt.map_or(true, |b| value > b)
            && self.gte.map_or(true, |b| value >= b)
            && self.lt.map_or(true, |b| value < b)
            && self.lte.map_or(true, |b| value <= b)
    }
}

/// Metadata filter expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    /// Every sub-filter must match.
    All(Vec<Filter>),
    /// At least one sub-filter must match.
    Any(Vec<Filter>),
    /// The sub-filter must not match.
    Not(Box<Filter>),
    /// Field equals the value (or, for array fields, contains it).
    Eq { field: String, value: MetadataValue },
    /// Field is numeric and within the bounds.
    Range { field: String, bounds: RangeBounds },
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn range(field: impl Into<String>, bounds: RangeBounds) -> Self {
        Self::Range {
            field: field.into(),
            bounds,
        }
    }

    pub fn all(filters: Vec<Self>) -> Self {
        Self::All(filters)
    }

    pub fn any(filters: Vec<Self>) -> Self {
        Self::Any(filters)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: Self) -> Self {
        Self::Not(Box::new(filter))
    }

    /// Check the filter is well-formed.
    pub fn validate(&self) -> KnowledgeResult<()> {
        self.validate_at(1)
    }

    fn validate_at(&self, depth: usize) -> KnowledgeResult<()> {
        if depth > MAX_FILTER_DEPTH {
            return Err(KnowledgeError::InvalidFilter(format!(
                "filter nesting exceeds {MAX_FILTER_DEPTH} levels"
            )));
        }

        match self {
            Self::All(filters) => filters.iter().try_for_each(|f| f.validate_at(depth + 1)),
            Self::Any(filters) => {
                if filters.is_empty() {
                    return Err(KnowledgeError::InvalidFilter(
                        "'any' requires at least one condition".to_string(),
                    ));
                }
                filters.iter().try_for_each(|f| f.validate_at(depth + 1))
            }
            Self::Not(filter) => filter.validate_at(depth + 1),
            Self::Eq { field, value } => {
                validate_field(field)?;
                // null is allowed and matches keys explicitly set to null
                if matches!(value, MetadataValue::Array(_)) {
                    return Err(KnowledgeError::InvalidFilter(format!(
                        "equality on '{field}' requires a scalar or null value"
                    )));
                }
                Ok(())
            }
            Self::Range { field, bounds } => {
                validate_field(field)?;
                if bounds.is_empty() {
                    return Err(KnowledgeError::InvalidFilter(format!(
                        "range on '{field}' has no bounds"
                    )));
                }
                if bounds.bounds().iter().flatten().any(|b| !b.is_finite()) {
                    return Err(KnowledgeError::InvalidFilter(format!(
                        "range on '{field}' has a non-finite bound"
                    )));
                }
                let lower = bounds.gt.or(bounds.gte);
                let upper = bounds.lt.or(bounds.lte);
                if let (Some(lo), Some(hi)) = (lower, upper) {
                    if lo > hi {
                        return Err(KnowledgeError::InvalidFilter(format!(
                            "range on '{field}' is empty ({lo} > {hi})"
                        )));
                    }
                }
                Ok(())
            }
        }
    }

    /// Evaluate the filter against a payload.
    pub fn matches(&self, payload: &Metadata) -> bool {
        match self {
            Self::All(filters) => filters.iter().all(|f| f.matches(payload)),
            Self::Any(filters) => filters.iter().any(|f| f.matches(payload)),
            Self::Not(filter) => !filter.matches(payload),
            Self::Eq { field, value } => match payload.get(field) {
                Some(MetadataValue::Array(items)) => items.iter().any(|item| item.scalar_eq(value)),
                Some(actual) => actual.scalar_eq(value),
                None => false,
            },
            Self::Range { field, bounds } => match payload.get(field) {
                Some(MetadataValue::Array(items)) => items
                    .iter()
                    .filter_map(MetadataValue::as_f64)
                    .any(|v| bounds.contains(v)),
                Some(actual) => actual.as_f64().is_some_and(|v| bounds.contains(v)),
                None => false,
            },
        }
    }
}

fn validate_field(field: &str) -> KnowledgeResult<()> {
    if field.trim().is_empty() {
        return Err(KnowledgeError::InvalidFilter(
            "field name cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// A single ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub pattern_id: String,
    /// Similarity score, higher is better.
    pub score: f32,
    /// Metadata snapshot at search time.
    #[serde(default)]
    pub payload: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Results of a knowledge base search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Hits ordered by descending score.
    pub results: Vec<SearchResult>,
    /// True when the index was unavailable and no search was performed.
    #[serde(default)]
    pub degraded: bool,
}

impl SearchResponse {
    pub fn new(results: Vec<SearchResult>) -> Self {
        Self {
            results,
            degraded: false,
        }
    }

    /// Empty response flagged as degraded.
    pub fn degraded() -> Self {
        Self {
            results: Vec::new(),
            degraded: true,
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn contains(&self, pattern_id: &str) -> bool {
        self.results.iter().any(|r| r.pattern_id == pattern_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> Metadata {
        Metadata::from([
            ("type".to_string(), "pattern".into()),
            ("lang".to_string(), "python".into()),
            ("stars".to_string(), MetadataValue::Int(42)),
            ("tags".to_string(), vec!["retry", "async"].into()),
        ])
    }

    #[test]
    fn test_eq_matches_scalar_and_array_membership() {
        assert!(Filter::eq("lang", "python").matches(&payload()));
        assert!(!Filter::eq("lang", "rust").matches(&payload()));
        assert!(Filter::eq("tags", "retry").matches(&payload()));
        assert!(!Filter::eq("missing", "x").matches(&payload()));
    }

    #[test]
    fn test_null_equality_matches_explicit_null_only() {
        let filter = Filter::eq("reviewed", MetadataValue::Null);
        assert!(filter.validate().is_ok());

        let mut with_null = payload();
        with_null.insert("reviewed".to_string(), MetadataValue::Null);
        assert!(filter.matches(&with_null));
        assert!(!filter.matches(&payload()));
    }

    #[test]
    fn test_range_and_boolean_combinators() {
        let filter = Filter::all(vec![
            Filter::eq("type", "pattern"),
            Filter::range("stars", RangeBounds::default().with_gte(10.0).with_lt(100.0)),
            Filter::not(Filter::eq("lang", "go")),
        ]);
        assert!(filter.validate().is_ok());
        assert!(filter.matches(&payload()));

        let miss = Filter::any(vec![
            Filter::range("stars", RangeBounds::default().with_gt(42.0)),
            Filter::eq("lang", "rust"),
        ]);
        assert!(!miss.matches(&payload()));
    }

    #[test]
    fn test_invalid_filters_rejected() {
        assert!(Filter::range("stars", RangeBounds::default()).validate().is_err());
        assert!(Filter::range("stars", RangeBounds::default().with_gt(5.0).with_lt(1.0))
            .validate()
            .is_err());
        assert!(Filter::eq("", "x").validate().is_err());
        assert!(Filter::eq("tags", vec!["a"]).validate().is_err());
        assert!(Filter::any(vec![]).validate().is_err());
        assert!(Filter::range("x", RangeBounds::default().with_lt(f64::NAN))
            .validate()
            .is_err());
    }

    #[test]
    fn test_depth_limit() {
        let mut filter = Filter::eq("a", "b");
        for _ in 0..MAX_FILTER_DEPTH {
            filter = Filter::not(filter);
        }
        assert!(matches!(
            filter.validate(),
            Err(KnowledgeError::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_filter_json_shape() {
        let filter = Filter::all(vec![Filter::eq("lang", "python")]);
        let json = serde_json::to_value(&filter).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"all": [{"eq": {"field": "lang", "value": "python"}}]})
        );
    }
}
