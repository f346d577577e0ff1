//! # vwfeed Core
//!
//! Turns a warehouse table into Vowpal Wabbit training input. Provides the
//! namespace grouper, the per-type feature encoder, query assembly, engine
//! execution, catalog lookups, configuration and the pipeline that ties
//! them together.

pub mod catalog;
pub mod config;
pub mod encoder;
pub mod error;
pub mod executor;
pub mod features;
pub mod grouper;
pub mod job;
pub mod pipeline;
pub mod preview;
pub mod query;
pub mod types;

// Re-export commonly used types at the crate root.
pub use catalog::{Catalog, EngineCatalog, StaticCatalog};
pub use config::{load_config, EngineConfig, QueryConfig, VwFeedConfig};
pub use error::{Result, VwFeedError};
pub use executor::{EngineCli, ExecOptions, QueryEngine};
pub use job::JobSpec;
pub use pipeline::{Pipeline, QueryPlan, RunReport, RunStatus, Stage};
pub use types::{Column, ColumnType, ExecutionResult, NamespaceMap, TableRef};
