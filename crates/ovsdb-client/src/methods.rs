//! Method parameter and result records (RFC 7047 §4.1)

use crate::operation::Row;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Monitor requests for one `monitor` call: table name to request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonitorRequests(pub HashMap<String, MonitorRequest>);

impl MonitorRequests {
    /// Monitor one table with the given request
    pub fn table(mut self, name: impl Into<String>, request: MonitorRequest) -> Self {
        self.0.insert(name.into(), request);
        self
    }
}

/// Per-table monitor request. Empty columns means all columns; an absent
/// select means all transition kinds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<MonitorSelect>,
}

/// Which transitions the server reports for a monitored table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorSelect {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modify: Option<bool>,
}

/// Updates delivered by the `monitor` reply and `update` notifications:
/// table name to per-row updates
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableUpdates(pub HashMap<String, TableUpdate>);

/// Row uuid to row update for a single table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableUpdate(pub HashMap<String, RowUpdate>);

/// One row transition. `old` absent means insert, `new` absent means
/// delete, both present means modify.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RowUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Row>,
    #[serde(rename = "new", skip_serializing_if = "Option::is_none")]
    pub new_row: Option<Row>,
}

/// Result of `lock` and `steal`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockResult {
    pub locked: bool,
}
