//! Query assembly: the extraction `SELECT`, the materialization insert that
//! wraps it, and the DDL that (re)creates the destination table.
//!
//! Every function here is a pure string builder. Identical inputs give
//! byte-identical output.

use crate::encoder::quote_ident;
use crate::error::EncodeError;
use crate::features::{feature_parts, ARG_SEPARATOR};
use crate::job::JobSpec;
use crate::types::{NamespaceMap, TableRef};

/// Importance weight given to every example.
pub const EXAMPLE_WEIGHT: &str = "1.0";

/// Name of the single column of the destination table.
pub const OUTPUT_COLUMN: &str = "input_line";

pub fn qualified(table: &TableRef) -> String {
    format!("{}.{}", quote_ident(&table.db), quote_ident(&table.name))
}

/// One trainer input line per source row with a non-null label.
pub fn build_extraction_query(
    job: &JobSpec,
    namespaces: &NamespaceMap,
) -> Result<String, EncodeError> {
    let label = quote_ident(&job.label_column);
    let tag = quote_ident(&job.tag_column);

    let mut args = vec![
        format!("PRINTF('%.4f', COALESCE(CAST({label} AS DOUBLE), 0.0))"),
        format!("' {EXAMPLE_WEIGHT} '"),
        format!("COALESCE(CAST({tag} AS STRING), '')"),
    ];
    args.extend(feature_parts(namespaces)?);

    let mut sql = format!(
        "SELECT CONCAT(\n      {args}\n)\nFROM {source}\nWHERE {label} IS NOT NULL",
        args = args.join(ARG_SEPARATOR),
        source = qualified(&job.source),
    );
    if let Some(filter) = &job.filter {
        sql.push_str(&format!("\n    AND ({filter})"));
    }
    if let Some(limit) = job.limit {
        sql.push_str(&format!("\nLIMIT {limit}"));
    }
    Ok(sql)
}

/// Wrap `extraction` in an overwrite of the destination table, preceded by
/// the job's session settings.
pub fn build_materialization_query(job: &JobSpec, extraction: &str) -> String {
    let mut sql = String::new();
    for (key, value) in &job.hints {
        sql.push_str(&format!("SET {key}={value};\n"));
    }
    sql.push_str(&format!(
        "INSERT OVERWRITE TABLE {}\n{extraction}\n;\n",
        qualified(&job.destination)
    ));
    sql
}

/// Drop and recreate the destination as a single-column text table.
pub fn build_destination_ddl(job: &JobSpec) -> String {
    let table = qualified(&job.destination);
    format!(
        "DROP TABLE IF EXISTS {table};\n\
         CREATE EXTERNAL TABLE {table} (\n    \
         {OUTPUT_COLUMN}    STRING\n\
         )\n\
         STORED AS TEXTFILE\n\
         ;\n"
    )
}
