//! Database schema records (RFC 7047 §3.2)

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Schema for one database, as returned by `get_schema`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSchema {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cksum: Option<String>,
    pub tables: HashMap<String, TableSchema>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: HashMap<String, ColumnSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexes: Option<Vec<Vec<String>>>,
    #[serde(rename = "isRoot", skip_serializing_if = "Option::is_none")]
    pub is_root: Option<bool>,
    #[serde(rename = "maxRows", skip_serializing_if = "Option::is_none")]
    pub max_rows: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// An atomic type name or a full `<type>` object; left as a raw tree
    /// since clients rarely need to interpret it
    #[serde(rename = "type")]
    pub column_type: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ephemeral: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mutable: Option<bool>,
}
