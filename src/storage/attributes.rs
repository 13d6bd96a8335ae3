//! Pool capability attributes and the predicates storage classes
//! evaluate over them.
//!
//! A pool advertises a flat map of attribute values (protocol, media,
//! IOPS, snapshot support, ...). A storage class holds a map of
//! matchers over the same keys: required values, forbidden values, and
//! numeric ranges.

use serde::{Deserialize, Serialize};

// =============================================================================
// Attribute Values
// =============================================================================

/// A single pool capability value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Boolean(bool),
    Number(i64),
    Text(String),
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeValue::Boolean(b) => write!(f, "{}", b),
            AttributeValue::Number(n) => write!(f, "{}", n),
            AttributeValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Boolean(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Number(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::Text(v.to_string())
    }
}

// =============================================================================
// Attribute Matchers
// =============================================================================

/// Numeric range matcher; bounds are inclusive and each is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RangeMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
}

/// Forbidden-value matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotMatch {
    pub not: AttributeValue,
}

/// One storage-class requirement over a single pool attribute.
///
/// In JSON a bare value means equality, `{"not": v}` forbids a value,
/// and `{"min": a, "max": b}` bounds a numeric attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeMatch {
    Range(RangeMatch),
    Not(NotMatch),
    Equals(AttributeValue),
}

impl AttributeMatch {
    /// Evaluate this matcher against an advertised pool value.
    ///
    /// `Equals` and `Range` require the attribute to be present; `Not`
    /// passes when the attribute is absent.
    pub fn matches(&self, value: Option<&AttributeValue>) -> bool {
        match self {
            AttributeMatch::Equals(expected) => value == Some(expected),
            AttributeMatch::Not(forbidden) => value != Some(&forbidden.not),
            AttributeMatch::Range(range) => match value {
                Some(AttributeValue::Number(n)) => {
                    range.min.map_or(true, |min| *n >= min)
                        && range.max.map_or(true, |max| *n <= max)
                }
                _ => false,
            },
        }
    }
}
