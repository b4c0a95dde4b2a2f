//! Transaction operations and their array notations (RFC 7047 §5)

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A database row: column name to value tree
pub type Row = serde_json::Map<String, Value>;

/// `<condition>`: a `[column, function, value]` test on a column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition(pub String, pub Function, pub Value);

impl Condition {
    pub fn new(column: impl Into<String>, function: Function, value: impl Into<Value>) -> Self {
        Self(column.into(), function, value.into())
    }

    /// Equality test, the common case for `where` clauses
    pub fn equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Function::Equals, value)
    }
}

/// `<function>` of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Function {
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessThanOrEquals,
    #[serde(rename = "==")]
    Equals,
    #[serde(rename = "!=")]
    NotEquals,
    #[serde(rename = ">=")]
    GreaterThanOrEquals,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "includes")]
    Includes,
    #[serde(rename = "excludes")]
    Excludes,
}

/// `<mutation>`: a `[column, mutator, value]` in-place change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation(pub String, pub Mutator, pub Value);

impl Mutation {
    pub fn new(column: impl Into<String>, mutator: Mutator, value: impl Into<Value>) -> Self {
        Self(column.into(), mutator, value.into())
    }
}

/// `<mutator>` of a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mutator {
    #[serde(rename = "+=")]
    Sum,
    #[serde(rename = "-=")]
    Difference,
    #[serde(rename = "*=")]
    Product,
    #[serde(rename = "/=")]
    Quotient,
    #[serde(rename = "%=")]
    Remainder,
    #[serde(rename = "insert")]
    Insert,
    #[serde(rename = "delete")]
    Delete,
}

/// One operation inside a `transact` call, tagged by its `op` field
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Operation {
    Insert {
        table: String,
        row: Row,
        #[serde(rename = "uuid-name", skip_serializing_if = "Option::is_none")]
        uuid_name: Option<String>,
    },
    Select {
        table: String,
        #[serde(rename = "where")]
        clauses: Vec<Condition>,
        #[serde(skip_serializing_if = "Option::is_none")]
        columns: Option<Vec<String>>,
    },
    Update {
        table: String,
        #[serde(rename = "where")]
        clauses: Vec<Condition>,
        row: Row,
    },
    Mutate {
        table: String,
        #[serde(rename = "where")]
        clauses: Vec<Condition>,
        mutations: Vec<Mutation>,
    },
    Delete {
        table: String,
        #[serde(rename = "where")]
        clauses: Vec<Condition>,
    },
    Wait {
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
        table: String,
        #[serde(rename = "where")]
        clauses: Vec<Condition>,
        columns: Vec<String>,
        until: String,
        rows: Vec<Row>,
    },
    Commit {
        durable: bool,
    },
    Abort,
    Comment {
        comment: String,
    },
    Assert {
        lock: String,
    },
}

impl Operation {
    pub fn insert(table: impl Into<String>, row: Row) -> Self {
        Self::Insert {
            table: table.into(),
            row,
            uuid_name: None,
        }
    }

    /// Insert with a named uuid other operations in the transaction can
    /// reference
    pub fn insert_named(table: impl Into<String>, row: Row, uuid_name: impl Into<String>) -> Self {
        Self::Insert {
            table: table.into(),
            row,
            uuid_name: Some(uuid_name.into()),
        }
    }

    pub fn select(table: impl Into<String>, clauses: Vec<Condition>) -> Self {
        Self::Select {
            table: table.into(),
            clauses,
            columns: None,
        }
    }

    pub fn update(table: impl Into<String>, clauses: Vec<Condition>, row: Row) -> Self {
        Self::Update {
            table: table.into(),
            clauses,
            row,
        }
    }

    pub fn mutate(
        table: impl Into<String>,
        clauses: Vec<Condition>,
        mutations: Vec<Mutation>,
    ) -> Self {
        Self::Mutate {
            table: table.into(),
            clauses,
            mutations,
        }
    }

    pub fn delete(table: impl Into<String>, clauses: Vec<Condition>) -> Self {
        Self::Delete {
            table: table.into(),
            clauses,
        }
    }

    pub fn commit(durable: bool) -> Self {
        Self::Commit { durable }
    }

    pub fn comment(comment: impl Into<String>) -> Self {
        Self::Comment {
            comment: comment.into(),
        }
    }

    /// Assert that this client holds the named lock
    pub fn assert_lock(lock: impl Into<String>) -> Self {
        Self::Assert { lock: lock.into() }
    }
}

/// Per-operation result in a `transact` reply. The fields present depend
/// on the operation kind; a failed operation carries `error`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    /// A `["uuid", "<uuid>"]` pair for inserts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Row>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
