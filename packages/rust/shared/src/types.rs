//! Core domain types for the milestone graph.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CitegraphError, Result};

// ---------------------------------------------------------------------------
// Parents
// ---------------------------------------------------------------------------

/// The declared parents of a node.
///
/// Absent/null and single-string values are normalized into [`Parents::Ids`].
/// Any other shape is kept verbatim in [`Parents::Other`] so it round-trips
/// through the artifact untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Parents {
    /// A list of parent identifiers.
    Ids(Vec<String>),
    /// A value of unsupported shape (number, object, mixed list, ...).
    Other(Value),
}

impl Default for Parents {
    fn default() -> Self {
        Self::Ids(Vec::new())
    }
}

impl Parents {
    /// Normalize a raw `parents` metadata value.
    pub fn normalize(raw: Option<Value>) -> Self {
        match raw {
            None | Some(Value::Null) => Self::Ids(Vec::new()),
            Some(Value::String(id)) => Self::Ids(vec![id]),
            Some(Value::Array(items)) if items.iter().all(Value::is_string) => Self::Ids(
                items
                    .into_iter()
                    .filter_map(|v| match v {
                        Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
            ),
            Some(other) => Self::Other(other),
        }
    }

    /// Parent identifiers usable for linking, in declaration order.
    ///
    /// For an unsupported list shape only its string elements are returned.
    pub fn ids(&self) -> Vec<&str> {
        match self {
            Self::Ids(ids) => ids.iter().map(String::as_str).collect(),
            Self::Other(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            Self::Other(_) => Vec::new(),
        }
    }

    /// Entries that cannot name a parent, rendered as JSON text.
    ///
    /// For an unsupported list these are its non-string elements; any other
    /// unsupported value counts as a single entry.
    pub fn unlinkable(&self) -> Vec<String> {
        match self {
            Self::Ids(_) => Vec::new(),
            Self::Other(Value::Array(items)) => items
                .iter()
                .filter(|v| !v.is_string())
                .map(Value::to_string)
                .collect(),
            Self::Other(other) => vec![other.to_string()],
        }
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A milestone node: fixed core fields plus the verbatim remainder of its metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    /// Unique, immutable identifier.
    pub id: String,
    /// Publication year; absent sorts as 0.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i64>,
    /// Citation count; `None` means unknown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citations: Option<u64>,
    /// Declared parent identifiers.
    pub parents: Parents,
    /// Every other metadata field, preserved as-is.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Node {
    /// Create a bare node with no year, citations, or parents.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            year: None,
            citations: None,
            parents: Parents::default(),
            extra: BTreeMap::new(),
        }
    }

    /// Build a node from a metadata map (front matter or a stored artifact node).
    ///
    /// `id` must be a non-empty string. `year` is taken when it is an integer;
    /// any other `year` value stays in [`Node::extra`]. `citations` is taken when
    /// it is a non-negative integer and otherwise treated as unknown.
    pub fn from_metadata(mut metadata: Map<String, Value>) -> Result<Self> {
        let id = match metadata.remove("id") {
            Some(Value::String(id)) if !id.trim().is_empty() => id,
            Some(Value::String(_)) => {
                return Err(CitegraphError::validation("empty `id` in metadata"));
            }
            None | Some(Value::Null) => {
                return Err(CitegraphError::validation("missing `id` in metadata"));
            }
            Some(other) => {
                return Err(CitegraphError::validation(format!(
                    "`id` must be a string, got {other}"
                )));
            }
        };

        let year = match metadata.remove("year") {
            Some(Value::Number(n)) if n.as_i64().is_some() => n.as_i64(),
            Some(other) => {
                metadata.insert("year".into(), other);
                None
            }
            None => None,
        };

        let citations = match metadata.remove("citations") {
            Some(Value::Number(n)) if n.as_u64().is_some() => n.as_u64(),
            None | Some(Value::Null) => None,
            Some(other) => {
                tracing::debug!(%id, value = %other, "discarding non-integer citation count");
                None
            }
        };

        let parents = Parents::normalize(metadata.remove("parents"));

        Ok(Self {
            id,
            year,
            citations,
            parents,
            extra: metadata.into_iter().collect(),
        })
    }

    /// Sort key for the artifact's node order.
    pub fn sort_year(&self) -> i64 {
        self.year.unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Link / Artifact
// ---------------------------------------------------------------------------

/// A directed edge from a parent node to a child node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    /// Parent identifier.
    pub source: String,
    /// Child identifier.
    pub target: String,
}

impl Link {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// The persisted graph: `{ "nodes": [...], "links": [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Artifact {
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
}
