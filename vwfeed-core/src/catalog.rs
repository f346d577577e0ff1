//! Schema/catalog lookups.
//!
//! The pipeline only needs two things from a catalog: the column list of the
//! source table and the storage location of the destination. [`Catalog`] is
//! the seam; [`EngineCatalog`] asks the query engine with `DESCRIBE`, and
//! [`StaticCatalog`] serves schemas from memory or a schema file.

use crate::error::SchemaError;
use crate::executor::{ExecOptions, QueryEngine};
use crate::types::{Column, ColumnType, TableRef};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait Catalog: Send + Sync {
    /// Columns of `table`, in declaration order.
    async fn columns(&self, table: &TableRef) -> Result<Vec<Column>, SchemaError>;

    /// Where the data of `table` is stored.
    async fn storage_location(&self, table: &TableRef) -> Result<String, SchemaError>;
}

// --- Engine-backed catalog ---

/// Catalog that runs `DESCRIBE` statements through a [`QueryEngine`].
pub struct EngineCatalog {
    engine: Arc<dyn QueryEngine>,
    options: ExecOptions,
}

impl EngineCatalog {
    pub fn new(engine: Arc<dyn QueryEngine>, options: ExecOptions) -> Self {
        Self {
            engine,
            options: options.quiet(),
        }
    }

    async fn describe(
        &self,
        table: &TableRef,
        formatted: bool,
    ) -> Result<Vec<String>, SchemaError> {
        let statement = if formatted {
            format!("DESCRIBE FORMATTED {table};")
        } else {
            format!("DESCRIBE {table};")
        };
        debug!(statement = %statement, "Querying catalog");

        let result = self
            .engine
            .execute(&statement, &self.options)
            .await
            .map_err(|e| lookup_failed(table, e.to_string()))?;

        if !result.success() {
            let tail: Vec<&str> = result
                .output
                .iter()
                .rev()
                .take(5)
                .rev()
                .map(String::as_str)
                .collect();
            if tail.iter().any(|l| l.contains("Table not found")) {
                return Err(SchemaError::TableNotFound {
                    db: table.db.clone(),
                    table: table.name.clone(),
                });
            }
            return Err(lookup_failed(
                table,
                format!("engine exited with status {}: {}", result.exit_code, tail.join(" | ")),
            ));
        }
        Ok(result.output)
    }
}

fn lookup_failed(table: &TableRef, message: String) -> SchemaError {
    SchemaError::LookupFailed {
        db: table.db.clone(),
        table: table.name.clone(),
        message,
    }
}

#[async_trait]
impl Catalog for EngineCatalog {
    async fn columns(&self, table: &TableRef) -> Result<Vec<Column>, SchemaError> {
        let output = self.describe(table, false).await?;
        let columns = parse_describe(&output);
        if columns.is_empty() {
            return Err(SchemaError::NoColumns {
                db: table.db.clone(),
                table: table.name.clone(),
            });
        }
        Ok(columns)
    }

    async fn storage_location(&self, table: &TableRef) -> Result<String, SchemaError> {
        let output = self.describe(table, true).await?;
        parse_location(&output).ok_or_else(|| SchemaError::NoLocation {
            db: table.db.clone(),
            table: table.name.clone(),
        })
    }
}

/// Parse tab-separated `DESCRIBE` output into columns.
///
/// Lines without a tab (status lines, logging) are ignored. Parsing stops at
/// the first blank row or `#` section header, which is where the partition
/// section repeats columns already listed.
pub fn parse_describe(lines: &[String]) -> Vec<Column> {
    let mut columns = Vec::new();
    for line in lines {
        if !line.contains('\t') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
        let name = fields[0];
        if name.is_empty() || name.starts_with('#') {
            if columns.is_empty() {
                continue;
            }
            break;
        }
        if name == "col_name" {
            continue;
        }
        let data_type = fields.get(1).copied().unwrap_or_default();
        let comment = fields.get(2).copied().unwrap_or_default();
        columns.push(Column::new(name, ColumnType::parse(data_type)).with_comment(comment));
    }
    columns
}

/// Pull the `Location:` row out of `DESCRIBE FORMATTED` output.
pub fn parse_location(lines: &[String]) -> Option<String> {
    lines.iter().find_map(|line| {
        let mut fields = line.split('\t').map(str::trim);
        match (fields.next(), fields.next()) {
            (Some("Location:"), Some(location)) if !location.is_empty() => {
                Some(location.to_string())
            }
            _ => None,
        }
    })
}

// --- Static catalog ---

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableEntry {
    db: String,
    name: String,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    columns: Vec<Column>,
}

/// On-disk schema file: a warehouse root plus a list of tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SchemaFile {
    #[serde(default)]
    warehouse_root: Option<String>,
    #[serde(default)]
    tables: Vec<TableEntry>,
}

/// In-memory catalog, optionally loaded from a TOML or JSON schema file.
///
/// Tables without an explicit location resolve under `warehouse_root` as
/// `<root>/<db>.db/<table>`.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    warehouse_root: Option<String>,
    tables: HashMap<TableRef, (Vec<Column>, Option<String>)>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_warehouse_root(mut self, root: impl Into<String>) -> Self {
        self.warehouse_root = Some(root.into());
        self
    }

    pub fn with_table(
        mut self,
        table: TableRef,
        columns: Vec<Column>,
        location: Option<String>,
    ) -> Self {
        self.tables.insert(table, (columns, location));
        self
    }

    /// Load a schema file. `.json` files are parsed as JSON, anything else as TOML.
    pub fn from_file(path: &Path) -> Result<Self, SchemaError> {
        let file_err = |message: String| SchemaError::SchemaFile {
            path: path.to_path_buf(),
            message,
        };
        let text = std::fs::read_to_string(path).map_err(|e| file_err(e.to_string()))?;
        let file: SchemaFile = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&text).map_err(|e| file_err(e.to_string()))?
        } else {
            toml::from_str(&text).map_err(|e| file_err(e.to_string()))?
        };

        let mut catalog = Self {
            warehouse_root: file.warehouse_root,
            tables: HashMap::new(),
        };
        for entry in file.tables {
            catalog
                .tables
                .insert(TableRef::new(entry.db, entry.name), (entry.columns, entry.location));
        }
        debug!(path = %path.display(), tables = catalog.tables.len(), "Loaded schema file");
        Ok(catalog)
    }
}

#[async_trait]
impl Catalog for StaticCatalog {
    async fn columns(&self, table: &TableRef) -> Result<Vec<Column>, SchemaError> {
        match self.tables.get(table) {
            Some((columns, _)) if columns.is_empty() => Err(SchemaError::NoColumns {
                db: table.db.clone(),
                table: table.name.clone(),
            }),
            Some((columns, _)) => Ok(columns.clone()),
            None => Err(SchemaError::TableNotFound {
                db: table.db.clone(),
                table: table.name.clone(),
            }),
        }
    }

    async fn storage_location(&self, table: &TableRef) -> Result<String, SchemaError> {
        if let Some((_, Some(location))) = self.tables.get(table) {
            return Ok(location.clone());
        }
        self.warehouse_root
            .as_ref()
            .map(|root| format!("{}/{}.db/{}", root.trim_end_matches('/'), table.db, table.name))
            .ok_or_else(|| SchemaError::NoLocation {
                db: table.db.clone(),
                table: table.name.clone(),
            })
    }
}
