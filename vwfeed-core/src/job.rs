//! Job specification: which table to convert, where to put it, and how to
//! treat its columns.
//!
//! A `JobSpec` is validated when it is built and is immutable afterwards.

use crate::error::ConfigError;
use crate::grouper::is_valid_namespace;
use crate::types::TableRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Database the destination table is created in unless configured otherwise.
pub const DEFAULT_DESTINATION_DB: &str = "tmp";

/// Session settings emitted ahead of the materialization insert.
pub fn default_hints() -> Vec<(String, String)> {
    vec![
        ("hive.exec.compress.output".to_string(), "false".to_string()),
        ("mapred.reduce.tasks".to_string(), "10".to_string()),
    ]
}

/// A validated conversion job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub source: TableRef,
    pub destination: TableRef,
    pub label_column: String,
    pub tag_column: String,
    pub limit: Option<u64>,
    pub filter: Option<String>,
    pub excludes: BTreeSet<String>,
    pub namespaces: BTreeMap<String, String>,
    pub hints: Vec<(String, String)>,
}

impl JobSpec {
    /// Start building a job. `source` must be `db.table`; `destination` is a
    /// bare table name.
    pub fn builder(
        source: impl Into<String>,
        destination: impl Into<String>,
        label_column: impl Into<String>,
        tag_column: impl Into<String>,
    ) -> JobSpecBuilder {
        JobSpecBuilder {
            source: source.into(),
            destination: destination.into(),
            label_column: label_column.into(),
            tag_column: tag_column.into(),
            destination_db: DEFAULT_DESTINATION_DB.to_string(),
            limit: None,
            filter: None,
            excludes: BTreeSet::new(),
            namespaces: BTreeMap::new(),
            hints: default_hints(),
        }
    }
}

/// Builder for [`JobSpec`]. All validation happens in [`JobSpecBuilder::build`].
#[derive(Debug, Clone)]
pub struct JobSpecBuilder {
    source: String,
    destination: String,
    label_column: String,
    tag_column: String,
    destination_db: String,
    limit: Option<u64>,
    filter: Option<String>,
    excludes: BTreeSet<String>,
    namespaces: BTreeMap<String, String>,
    hints: Vec<(String, String)>,
}

impl JobSpecBuilder {
    pub fn destination_db(mut self, db: impl Into<String>) -> Self {
        self.destination_db = db.into();
        self
    }

    pub fn limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    /// Extra predicate ANDed into the WHERE clause.
    pub fn filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter.filter(|f| !f.trim().is_empty());
        self
    }

    pub fn exclude(mut self, column: impl Into<String>) -> Self {
        self.excludes.insert(column.into());
        self
    }

    pub fn excludes<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excludes.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Force `column` into `namespace`, overriding the naming convention.
    pub fn namespace(mut self, column: impl Into<String>, namespace: impl Into<String>) -> Self {
        self.namespaces.insert(column.into(), namespace.into());
        self
    }

    pub fn namespaces<I, K, V>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.namespaces
            .extend(overrides.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn hints(mut self, hints: Vec<(String, String)>) -> Self {
        self.hints = hints;
        self
    }

    pub fn build(self) -> Result<JobSpec, ConfigError> {
        let source = parse_source(&self.source)?;
        let destination = parse_destination(&self.destination, &self.destination_db)?;

        let label_column = required("label_column", self.label_column)?;
        let tag_column = required("tag_column", self.tag_column)?;
        if label_column == tag_column {
            return Err(ConfigError::Invalid {
                message: format!(
                    "label and tag must be different columns, both are '{label_column}'"
                ),
            });
        }

        for (column, namespace) in &self.namespaces {
            if !is_valid_namespace(namespace) {
                return Err(ConfigError::Invalid {
                    message: format!(
                        "namespace '{namespace}' for column '{column}' is not a valid identifier"
                    ),
                });
            }
        }

        Ok(JobSpec {
            source,
            destination,
            label_column,
            tag_column,
            limit: self.limit,
            filter: self.filter,
            excludes: self.excludes,
            namespaces: self.namespaces,
            hints: self.hints,
        })
    }
}

fn parse_source(raw: &str) -> Result<TableRef, ConfigError> {
    let parts: Vec<&str> = raw.trim().split('.').collect();
    match parts.as_slice() {
        [db, name] if !db.is_empty() && !name.is_empty() => Ok(TableRef::new(*db, *name)),
        _ => Err(ConfigError::SourceNotQualified {
            value: raw.to_string(),
        }),
    }
}

fn parse_destination(raw: &str, db: &str) -> Result<TableRef, ConfigError> {
    let name = raw.trim();
    if name.contains('.') {
        return Err(ConfigError::DestinationQualified {
            value: raw.to_string(),
        });
    }
    if name.is_empty() {
        return Err(ConfigError::MissingField {
            field: "destination".into(),
        });
    }
    if db.trim().is_empty() {
        return Err(ConfigError::MissingField {
            field: "destination_db".into(),
        });
    }
    Ok(TableRef::new(db.trim(), name))
}

fn required(field: &str, value: String) -> Result<String, ConfigError> {
    let value = value.trim().to_string();
    if value.is_empty() {
        Err(ConfigError::MissingField {
            field: field.to_string(),
        })
    } else {
        Ok(value)
    }
}
