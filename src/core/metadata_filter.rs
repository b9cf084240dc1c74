// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Metadata filtering for query results
//!
//! Filters are evaluated against a document's flat key-value metadata after
//! nearest-neighbour retrieval. Exact match is the basic predicate; the
//! `where` JSON syntax adds negation, set membership, numeric comparison and
//! boolean combinators.

use crate::core::types::{Metadata, MetadataValue};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use thiserror::Error;

/// Errors that can occur during filter parsing
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Invalid filter syntax: {0}")]
    InvalidSyntax(String),

    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("Type mismatch for '{field}': expected {expected}")]
    TypeMismatch { field: String, expected: String },
}

/// Numeric comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            Comparison::Gt => ordering == Ordering::Greater,
            Comparison::Gte => ordering != Ordering::Less,
            Comparison::Lt => ordering == Ordering::Less,
            Comparison::Lte => ordering != Ordering::Greater,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetadataFilter {
    /// Exact match: `{ "field": "value" }` or `{ "field": { "$eq": "value" } }`
    Equals { field: String, value: MetadataValue },

    /// `{ "field": { "$ne": "value" } }`; documents without the field match.
    NotEquals { field: String, value: MetadataValue },

    /// `{ "field": { "$in": ["a", "b"] } }`
    In {
        field: String,
        values: Vec<MetadataValue>,
    },

    /// `{ "field": { "$nin": ["a", "b"] } }`; documents without the field match.
    NotIn {
        field: String,
        values: Vec<MetadataValue>,
    },

    /// `{ "year": { "$gte": 2020 } }`, numeric fields only
    Compare {
        field: String,
        op: Comparison,
        value: MetadataValue,
    },

    And { filters: Vec<MetadataFilter> },

    Or { filters: Vec<MetadataFilter> },
}

impl MetadataFilter {
    pub fn equals(field: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        MetadataFilter::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Exact-match conjunction over every pair in `metadata`.
    pub fn all_of(metadata: &Metadata) -> Self {
        MetadataFilter::And {
            filters: metadata
                .iter()
                .map(|(field, value)| MetadataFilter::equals(field.clone(), value.clone()))
                .collect(),
        }
    }

    /// Parse a `where` clause.
    ///
    /// ```
    /// use serde_json::json;
    /// use vector_collections::core::metadata_filter::MetadataFilter;
    ///
    /// let filter = MetadataFilter::from_json(&json!({
    ///     "$and": [
    ///         {"category": "science"},
    ///         {"year": {"$gte": 2020}}
    ///     ]
    /// })).unwrap();
    /// assert!(matches!(filter, MetadataFilter::And { .. }));
    /// ```
    pub fn from_json(value: &JsonValue) -> Result<Self, FilterError> {
        let map = match value {
            JsonValue::Object(map) => map,
            _ => {
                return Err(FilterError::InvalidSyntax(
                    "Filter must be a JSON object".to_string(),
                ))
            }
        };

        if map.is_empty() {
            return Err(FilterError::InvalidSyntax("Filter is empty".to_string()));
        }

        for combinator in ["$and", "$or"] {
            if let Some(inner) = map.get(combinator) {
                if map.len() != 1 {
                    return Err(FilterError::InvalidSyntax(format!(
                        "{} cannot be combined with other keys",
                        combinator
                    )));
                }
                let filters = Self::parse_list(combinator, inner)?;
                return Ok(if combinator == "$and" {
                    MetadataFilter::And { filters }
                } else {
                    MetadataFilter::Or { filters }
                });
            }
        }

        let mut filters = Vec::with_capacity(map.len());
        for (field, field_value) in map {
            if field.starts_with('$') {
                return Err(FilterError::UnsupportedOperator(field.clone()));
            }
            filters.push(Self::parse_field_filter(field, field_value)?);
        }

        if filters.len() == 1 {
            Ok(filters.remove(0))
        } else {
            Ok(MetadataFilter::And { filters })
        }
    }

    fn parse_list(combinator: &str, value: &JsonValue) -> Result<Vec<Self>, FilterError> {
        match value {
            JsonValue::Array(items) if !items.is_empty() => {
                items.iter().map(Self::from_json).collect()
            }
            _ => Err(FilterError::InvalidSyntax(format!(
                "{} must be a non-empty array",
                combinator
            ))),
        }
    }

    fn parse_field_filter(field: &str, value: &JsonValue) -> Result<Self, FilterError> {
        let ops = match value {
            JsonValue::Object(ops) => ops,
            _ => {
                return Ok(MetadataFilter::Equals {
                    field: field.to_string(),
                    value: scalar(field, value)?,
                })
            }
        };

        if ops.is_empty() {
            return Err(FilterError::InvalidSyntax(format!(
                "Empty object for field '{}' - must specify a value or operator",
                field
            )));
        }

        let mut filters = Vec::with_capacity(ops.len());
        for (op, operand) in ops {
            let field = field.to_string();
            let filter = match op.as_str() {
                "$eq" => MetadataFilter::Equals {
                    value: scalar(&field, operand)?,
                    field,
                },
                "$ne" => MetadataFilter::NotEquals {
                    value: scalar(&field, operand)?,
                    field,
                },
                "$in" => MetadataFilter::In {
                    values: scalar_list(&field, operand)?,
                    field,
                },
                "$nin" => MetadataFilter::NotIn {
                    values: scalar_list(&field, operand)?,
                    field,
                },
                "$gt" | "$gte" | "$lt" | "$lte" => {
                    let value = scalar(&field, operand)?;
                    if value.as_f64().is_none() {
                        return Err(FilterError::TypeMismatch {
                            field,
                            expected: "number".to_string(),
                        });
                    }
                    let op = match op.as_str() {
                        "$gt" => Comparison::Gt,
                        "$gte" => Comparison::Gte,
                        "$lt" => Comparison::Lt,
                        _ => Comparison::Lte,
                    };
                    MetadataFilter::Compare { field, op, value }
                }
                other if other.starts_with('$') => {
                    return Err(FilterError::UnsupportedOperator(other.to_string()))
                }
                _ => {
                    return Err(FilterError::InvalidSyntax(format!(
                        "Nested objects are not supported for field '{}'",
                        field
                    )))
                }
            };
            filters.push(filter);
        }

        if filters.len() == 1 {
            Ok(filters.remove(0))
        } else {
            Ok(MetadataFilter::And { filters })
        }
    }

    /// Check if metadata matches this filter
    pub fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            MetadataFilter::Equals { field, value } => metadata
                .get(field)
                .map_or(false, |actual| actual.loose_eq(value)),

            MetadataFilter::NotEquals { field, value } => metadata
                .get(field)
                .map_or(true, |actual| !actual.loose_eq(value)),

            MetadataFilter::In { field, values } => metadata
                .get(field)
                .map_or(false, |actual| values.iter().any(|v| actual.loose_eq(v))),

            MetadataFilter::NotIn { field, values } => metadata
                .get(field)
                .map_or(true, |actual| !values.iter().any(|v| actual.loose_eq(v))),

            MetadataFilter::Compare { field, op, value } => metadata
                .get(field)
                .and_then(|actual| actual.numeric_cmp(value))
                .map_or(false, |ordering| op.accepts(ordering)),

            // Empty AND matches everything (vacuous truth)
            MetadataFilter::And { filters } => filters.iter().all(|f| f.matches(metadata)),

            MetadataFilter::Or { filters } => filters.iter().any(|f| f.matches(metadata)),
        }
    }
}

fn scalar(field: &str, value: &JsonValue) -> Result<MetadataValue, FilterError> {
    MetadataValue::from_json(value).ok_or_else(|| FilterError::TypeMismatch {
        field: field.to_string(),
        expected: "string, number or boolean".to_string(),
    })
}

fn scalar_list(field: &str, value: &JsonValue) -> Result<Vec<MetadataValue>, FilterError> {
    match value {
        JsonValue::Array(items) => items.iter().map(|item| scalar(field, item)).collect(),
        _ => Err(FilterError::InvalidSyntax(format!(
            "Operand for '{}' must be an array",
            field
        ))),
    }
}
