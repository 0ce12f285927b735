//! Keyword and registered URL catalog models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A keyword tracked by the daily job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub id: i32,
    pub product_name: String,
    pub keyword: String,
    /// Free-text priority tag, carried through to the report untouched.
    pub priority: String,
    pub created_at: DateTime<Utc>,
}

/// A URL the operator expects to see exposed for a keyword.
///
/// Linked to its keyword by text, not by id; many URLs may share a keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredUrl {
    pub id: i32,
    pub url: String,
    pub product_name: String,
    pub conversion_keyword: String,
    pub content_type: String,
    pub keyword: String,
    pub created_at: DateTime<Utc>,
}

/// One row of a keyword catalog upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeywordEntry {
    #[serde(default)]
    pub product_name: String,
    pub keyword: String,
    #[serde(default)]
    pub priority: String,
}

/// One row of a URL catalog upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegisteredUrlEntry {
    pub url: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub conversion_keyword: String,
    #[serde(default)]
    pub content_type: String,
    pub keyword: String,
}
