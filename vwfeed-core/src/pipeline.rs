//! End-to-end conversion run.
//!
//! `schema -> group -> assemble -> create destination -> materialize ->
//! locate`. Catalog and engine are injected, so a run touches nothing but
//! the collaborators it was given.
//!
//! Errors (schema, configuration, encoding, artifact/spawn) abort the run.
//! A non-zero engine exit does not: it is recorded in the [`RunReport`], the
//! remaining stages still run, and the report's status is failed. Neither
//! does a destination whose location cannot be resolved afterwards.

use crate::catalog::Catalog;
use crate::error::{Result, SchemaError};
use crate::executor::{ExecOptions, QueryEngine};
use crate::grouper::group_for_job;
use crate::job::JobSpec;
use crate::query::{build_destination_ddl, build_extraction_query, build_materialization_query};
use crate::types::{Column, ExecutionResult, NamespaceMap, TableRef};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Everything generated for a job, before anything is executed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPlan {
    pub source: TableRef,
    pub destination: TableRef,
    pub namespaces: NamespaceMap,
    pub ddl: String,
    pub extraction: String,
    pub materialization: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    CreateDestination,
    Materialize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::CreateDestination => write!(f, "create destination"),
            Stage::Materialize => write!(f, "materialize"),
        }
    }
}

/// One executed statement and what the engine said about it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub query: String,
    pub result: ExecutionResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed {
        stage: Stage,
        exit_code: i32,
        output: Vec<String>,
    },
    /// Every stage succeeded but the destination's location could not be
    /// resolved.
    Unlocated { message: String },
}

/// Outcome of [`Pipeline::run`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub plan: QueryPlan,
    pub stages: Vec<StageReport>,
    /// Storage location of the destination, when it could be resolved.
    pub location: Option<String>,
    pub status: RunStatus,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        matches!(self.status, RunStatus::Succeeded)
    }
}

pub struct Pipeline {
    catalog: Arc<dyn Catalog>,
    engine: Arc<dyn QueryEngine>,
    options: ExecOptions,
}

impl Pipeline {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        engine: Arc<dyn QueryEngine>,
        options: ExecOptions,
    ) -> Self {
        Self {
            catalog,
            engine,
            options,
        }
    }

    /// Fetch the schema and generate every query for `job` without running any.
    pub async fn plan(&self, job: &JobSpec) -> Result<QueryPlan> {
        let columns = self.catalog.columns(&job.source).await?;
        info!(table = %job.source, columns = columns.len(), "Fetched source schema");
        ensure_present(&columns, &job.source, &job.label_column)?;
        ensure_present(&columns, &job.source, &job.tag_column)?;

        let namespaces = group_for_job(&columns, job);
        info!(
            namespaces = ?namespaces.names(),
            features = namespaces.column_count(),
            "Grouped feature columns"
        );

        let extraction = build_extraction_query(job, &namespaces)?;
        let materialization = build_materialization_query(job, &extraction);
        let ddl = build_destination_ddl(job);

        Ok(QueryPlan {
            source: job.source.clone(),
            destination: job.destination.clone(),
            namespaces,
            ddl,
            extraction,
            materialization,
        })
    }

    /// Plan, then execute the destination DDL and the materialization query.
    pub async fn run(&self, job: &JobSpec) -> Result<RunReport> {
        let plan = self.plan(job).await?;

        let mut stages = Vec::with_capacity(2);
        stages.push(self.execute_stage(Stage::CreateDestination, &plan.ddl).await?);
        stages.push(self.execute_stage(Stage::Materialize, &plan.materialization).await?);

        let status = stages
            .iter()
            .find(|s| !s.result.success())
            .map(|s| RunStatus::Failed {
                stage: s.stage,
                exit_code: s.result.exit_code,
                output: s.result.output.clone(),
            })
            .unwrap_or(RunStatus::Succeeded);

        let lookup = self.catalog.storage_location(&plan.destination).await;
        let (location, status) = match lookup {
            Ok(location) => {
                info!(table = %plan.destination, location = %location, "Output written");
                (Some(location), status)
            }
            Err(e) => {
                warn!(
                    table = %plan.destination,
                    error = %e,
                    "Could not resolve destination location"
                );
                let status = match status {
                    RunStatus::Succeeded => RunStatus::Unlocated {
                        message: e.to_string(),
                    },
                    failed => failed,
                };
                (None, status)
            }
        };

        Ok(RunReport {
            plan,
            stages,
            location,
            status,
        })
    }

    async fn execute_stage(&self, stage: Stage, query: &str) -> Result<StageReport> {
        info!(stage = %stage, "Running stage");
        let result = self.engine.execute(query, &self.options).await?;
        if result.success() {
            info!(stage = %stage, "Stage finished");
        } else {
            error!(
                stage = %stage,
                exit_code = result.exit_code,
                output = %result.output_text(),
                "Stage failed"
            );
        }
        Ok(StageReport {
            stage,
            query: query.to_string(),
            result,
        })
    }
}

fn ensure_present(
    columns: &[Column],
    table: &TableRef,
    column: &str,
) -> std::result::Result<(), SchemaError> {
    if columns.iter().any(|c| c.name == column) {
        Ok(())
    } else {
        Err(SchemaError::MissingColumn {
            db: table.db.clone(),
            table: table.name.clone(),
            column: column.to_string(),
        })
    }
}
