//! Core types shared across vwfeed: columns, tables, namespace groupings
//! and engine execution results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a source column, as far as feature encoding cares.
///
/// Anything the encoder has no rule for is kept verbatim in `Other` so the
/// failure can name the exact catalog type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ColumnType {
    Double,
    Integer,
    Boolean,
    Text,
    Other(String),
}

impl ColumnType {
    /// Map a catalog type string (`double`, `bigint`, `varchar(32)`, ...) to a `ColumnType`.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let lower = trimmed.to_ascii_lowercase();
        let base = lower.split('(').next().unwrap_or_default().trim();
        match base {
            "double" | "float" | "decimal" => ColumnType::Double,
            "bigint" | "int" | "integer" | "smallint" | "tinyint" => ColumnType::Integer,
            "boolean" => ColumnType::Boolean,
            "string" | "varchar" | "char" => ColumnType::Text,
            _ => ColumnType::Other(trimmed.to_string()),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Double => write!(f, "double"),
            ColumnType::Integer => write!(f, "bigint"),
            ColumnType::Boolean => write!(f, "boolean"),
            ColumnType::Text => write!(f, "string"),
            ColumnType::Other(raw) => write!(f, "{raw}"),
        }
    }
}

impl From<String> for ColumnType {
    fn from(raw: String) -> Self {
        ColumnType::parse(&raw)
    }
}

impl From<ColumnType> for String {
    fn from(ty: ColumnType) -> Self {
        ty.to_string()
    }
}

/// A column of a source table as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: ColumnType,
    #[serde(default)]
    pub comment: String,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            data_type,
            comment: String::new(),
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }
}

/// A database-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub db: String,
    pub name: String,
}

impl TableRef {
    pub fn new(db: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.db, self.name)
    }
}

/// One named feature group and its columns, in schema order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub name: String,
    pub columns: Vec<Column>,
}

/// Ordered mapping from namespace name to its columns.
///
/// Namespaces keep the order in which they were first seen, and columns keep
/// insertion order within their namespace. Both orders flow into the
/// generated query text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespaceMap {
    namespaces: Vec<Namespace>,
}

impl NamespaceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `column` to `namespace`, creating the namespace at the end if new.
    pub fn push(&mut self, namespace: &str, column: Column) {
        match self.namespaces.iter_mut().find(|ns| ns.name == namespace) {
            Some(ns) => ns.columns.push(column),
            None => self.namespaces.push(Namespace {
                name: namespace.to_string(),
                columns: vec![column],
            }),
        }
    }

    pub fn get(&self, namespace: &str) -> Option<&[Column]> {
        self.namespaces
            .iter()
            .find(|ns| ns.name == namespace)
            .map(|ns| ns.columns.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Namespace> {
        self.namespaces.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.namespaces.iter().map(|ns| ns.name.as_str()).collect()
    }

    /// Number of namespaces.
    pub fn len(&self) -> usize {
        self.namespaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }

    /// Total number of columns across all namespaces.
    pub fn column_count(&self) -> usize {
        self.namespaces.iter().map(|ns| ns.columns.len()).sum()
    }

    /// Namespace holding the column called `column`, if any.
    pub fn namespace_of(&self, column: &str) -> Option<&str> {
        self.namespaces
            .iter()
            .find(|ns| ns.columns.iter().any(|c| c.name == column))
            .map(|ns| ns.name.as_str())
    }
}

/// Outcome of one engine invocation: exit code plus merged stdout/stderr lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub output: Vec<String>,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Captured output joined back into a single string.
    pub fn output_text(&self) -> String {
        self.output.join("\n")
    }
}
