//! Search-domain predicate expressions
//!
//! The upstream's search predicates are flat lists mixing prefix boolean
//! operators (`"&"`, `"|"`, `"!"`) with three-element leaves
//! `[field, operator, value]`. This module gives that wire shape a typed
//! representation so the optimizer can reorder leaves without touching
//! operator positions.

use std::fmt::{self, Display, Formatter};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::errors::DomainError;

/// Prefix boolean operator in a search domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

impl LogicalOp {
    /// Wire representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOp::And => "&",
            LogicalOp::Or => "|",
            LogicalOp::Not => "!",
        }
    }

    /// Parse from the wire representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "&" => Some(LogicalOp::And),
            "|" => Some(LogicalOp::Or),
            "!" => Some(LogicalOp::Not),
            _ => None,
        }
    }
}

impl Display for LogicalOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One element of a search domain: an operator or a comparison leaf
#[derive(Debug, Clone, PartialEq)]
pub enum DomainTerm {
    /// A prefix boolean operator applying to the terms that follow
    Operator(LogicalOp),
    /// A `[field, operator, value]` comparison
    Leaf {
        field: String,
        operator: String,
        value: Value,
    },
}

impl DomainTerm {
    /// Convenience constructor for a comparison leaf
    pub fn leaf(field: impl Into<String>, operator: impl Into<String>, value: Value) -> Self {
        DomainTerm::Leaf {
            field: field.into(),
            operator: operator.into(),
            value,
        }
    }

    /// The field a leaf compares on, `None` for operators
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            DomainTerm::Leaf { field, .. } => Some(field),
            DomainTerm::Operator(_) => None,
        }
    }
}

/// A full search predicate: a flat term list in the upstream's wire order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchDomain(pub Vec<DomainTerm>);

impl SearchDomain {
    /// An empty domain (matches every record)
    #[must_use]
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Append a leaf term
    pub fn push_leaf(&mut self, field: impl Into<String>, operator: impl Into<String>, value: Value) {
        self.0.push(DomainTerm::leaf(field, operator, value));
    }

    /// Parse a domain from its JSON wire form
    ///
    /// Accepts a JSON array whose elements are either operator strings or
    /// arrays of at least three elements. Anything else is rejected.
    pub fn from_json(value: &Value) -> Result<Self, DomainError> {
        let items = value
            .as_array()
            .ok_or_else(|| DomainError::InvalidDomain("domain must be an array".into()))?;

        let mut terms = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::String(s) => {
                    let op = LogicalOp::parse(s).ok_or_else(|| {
                        DomainError::InvalidDomain(format!("unknown operator '{s}'"))
                    })?;
                    terms.push(DomainTerm::Operator(op));
                }
                Value::Array(parts) if parts.len() >= 3 => {
                    let field = parts[0]
                        .as_str()
                        .ok_or_else(|| {
                            DomainError::InvalidDomain("leaf field must be a string".into())
                        })?
                        .to_string();
                    let operator = parts[1]
                        .as_str()
                        .ok_or_else(|| {
                            DomainError::InvalidDomain("leaf operator must be a string".into())
                        })?
                        .to_string();
                    terms.push(DomainTerm::Leaf {
                        field,
                        operator,
                        value: parts[2].clone(),
                    });
                }
                other => {
                    return Err(DomainError::InvalidDomain(format!(
                        "unsupported domain term: {other}"
                    )));
                }
            }
        }
        Ok(Self(terms))
    }

    /// Render the domain back into its JSON wire form
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Array(
            self.0
                .iter()
                .map(|term| match term {
                    DomainTerm::Operator(op) => Value::String(op.as_str().to_string()),
                    DomainTerm::Leaf {
                        field,
                        operator,
                        value,
                    } => Value::Array(vec![
                        Value::String(field.clone()),
                        Value::String(operator.clone()),
                        value.clone(),
                    ]),
                })
                .collect(),
        )
    }
}

impl Serialize for SearchDomain {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SearchDomain {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        SearchDomain::from_json(&value).map_err(D::Error::custom)
    }
}
