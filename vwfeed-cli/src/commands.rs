//! CLI subcommand handlers.

use crate::{Commands, ConfigAction, JobArgs};
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use vwfeed_core::catalog::{Catalog, EngineCatalog, StaticCatalog};
use vwfeed_core::config::workspace_config_path;
use vwfeed_core::preview::{render_row, Row};
use vwfeed_core::{
    EngineCli, ExecOptions, JobSpec, Pipeline, QueryPlan, RunStatus, VwFeedConfig,
};

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    config: VwFeedConfig,
    workspace: &Path,
) -> anyhow::Result<()> {
    match command {
        Commands::Run { job } => handle_run(&job, config).await,
        Commands::Plan { job, json } => handle_plan(&job, config, json).await,
        Commands::Preview { job, rows } => handle_preview(&job, config, &rows).await,
        Commands::Config { action } => handle_config(action, &config, workspace),
    }
}

/// Fold per-invocation flags into the loaded configuration.
fn apply_overrides(args: &JobArgs, mut config: VwFeedConfig) -> VwFeedConfig {
    config.engine.conf.extend(args.engine_conf.iter().cloned());
    if let Some(timeout) = args.timeout {
        config.engine.timeout_secs = Some(timeout);
    }
    if let Some(schema_file) = &args.schema_file {
        config.catalog.schema_file = Some(schema_file.clone());
    }
    config
}

fn build_job(args: &JobArgs, config: &VwFeedConfig) -> anyhow::Result<JobSpec> {
    let job = JobSpec::builder(&args.src, &args.dst, &args.label, &args.tag)
        .destination_db(&config.query.destination_db)
        .hints(config.query.hints.clone())
        .limit(args.limit)
        .filter(args.filter.clone())
        .excludes(args.excludes.iter().cloned())
        .namespaces(args.namespaces.iter().cloned())
        .build()?;
    Ok(job)
}

fn build_pipeline(
    config: &VwFeedConfig,
    cancel: Option<CancellationToken>,
) -> anyhow::Result<Pipeline> {
    let engine = Arc::new(EngineCli::from_config(&config.engine));
    let mut options = ExecOptions::from_config(&config.engine);
    options.cancel = cancel;

    let catalog: Arc<dyn Catalog> = match &config.catalog.schema_file {
        Some(path) => Arc::new(StaticCatalog::from_file(path)?),
        None => Arc::new(EngineCatalog::new(engine.clone(), options.clone())),
    };
    Ok(Pipeline::new(catalog, engine, options))
}

async fn handle_run(args: &JobArgs, config: VwFeedConfig) -> anyhow::Result<()> {
    let config = apply_overrides(args, config);
    let job = build_job(args, &config)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping engine");
            on_interrupt.cancel();
        }
    });

    let pipeline = build_pipeline(&config, Some(cancel))?;
    let report = pipeline.run(&job).await?;

    match &report.status {
        RunStatus::Succeeded => {
            match &report.location {
                Some(location) => println!("Wrote {} to {}", job.destination, location),
                None => println!("Wrote {}", job.destination),
            }
            Ok(())
        }
        RunStatus::Failed {
            stage,
            exit_code,
            output,
        } => {
            eprintln!("Stage '{}' failed with exit code {}", stage, exit_code);
            for line in output.iter().rev().take(20).rev() {
                eprintln!("  {}", line);
            }
            anyhow::bail!("conversion of {} failed", job.source)
        }
        RunStatus::Unlocated { message } => {
            anyhow::bail!("wrote {} but could not locate it: {}", job.destination, message)
        }
    }
}

async fn handle_plan(args: &JobArgs, config: VwFeedConfig, json: bool) -> anyhow::Result<()> {
    let config = apply_overrides(args, config);
    let job = build_job(args, &config)?;
    let plan = build_pipeline(&config, None)?.plan(&job).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print!("{}", render_plan(&plan));
    }
    Ok(())
}

/// Human-readable plan: namespace summary followed by both statements.
fn render_plan(plan: &QueryPlan) -> String {
    let summary: Vec<String> = plan
        .namespaces
        .iter()
        .map(|ns| format!("{}({})", ns.name, ns.columns.len()))
        .collect();
    format!(
        "-- source: {}\n-- namespaces: {}\n\n-- destination\n{}\n-- materialization\n{}",
        plan.source,
        summary.join(", "),
        plan.ddl,
        plan.materialization
    )
}

async fn handle_preview(args: &JobArgs, config: VwFeedConfig, rows: &Path) -> anyhow::Result<()> {
    let config = apply_overrides(args, config);
    let job = build_job(args, &config)?;
    let plan = build_pipeline(&config, None)?.plan(&job).await?;

    let text = std::fs::read_to_string(rows)
        .with_context(|| format!("Failed to read rows from {}", rows.display()))?;
    for line in preview_lines(&job, &plan, &text)? {
        println!("{}", line);
    }
    Ok(())
}

fn preview_lines(job: &JobSpec, plan: &QueryPlan, text: &str) -> anyhow::Result<Vec<String>> {
    let mut lines = Vec::new();
    for (n, raw) in text.lines().enumerate() {
        if raw.trim().is_empty() {
            continue;
        }
        let row: Row = serde_json::from_str(raw)
            .with_context(|| format!("Row {} is not a JSON object", n + 1))?;
        if let Some(line) = render_row(job, &plan.namespaces, &row)? {
            lines.push(line);
        }
    }
    Ok(lines)
}

fn handle_config(
    action: ConfigAction,
    config: &VwFeedConfig,
    workspace: &Path,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            if let Some(dir) = config_path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            let toml_str = toml::to_string_pretty(&VwFeedConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            print!("{}", toml::to_string_pretty(config)?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use vwfeed_core::grouper::group_for_job;
    use vwfeed_core::{Column, ColumnType};

    fn job_args() -> JobArgs {
        JobArgs {
            src: "sales.orders".into(),
            dst: "orders_vw".into(),
            label: "converted".into(),
            tag: "order_id".into(),
            limit: None,
            filter: None,
            excludes: vec![],
            namespaces: vec![],
            engine_conf: vec![("mapred.job.queue.name".into(), "ml".into())],
            schema_file: Some(PathBuf::from("schema.toml")),
            timeout: Some(60),
        }
    }

    fn orders_plan(job: &JobSpec) -> QueryPlan {
        let columns = vec![
            Column::new("converted", ColumnType::Integer),
            Column::new("order_id", ColumnType::Text),
            Column::new("amount", ColumnType::Double),
            Column::new("is_rush", ColumnType::Boolean),
            Column::new("region__geo__code", ColumnType::Text),
        ];
        QueryPlan {
            source: job.source.clone(),
            destination: job.destination.clone(),
            namespaces: group_for_job(&columns, job),
            ddl: "DDL;\n".into(),
            extraction: "SELECT 1".into(),
            materialization: "INSERT;\n".into(),
        }
    }

    #[test]
    fn test_apply_overrides() {
        let config = apply_overrides(&job_args(), VwFeedConfig::default());
        assert_eq!(config.engine.conf["mapred.job.queue.name"], "ml");
        assert_eq!(config.engine.timeout_secs, Some(60));
        assert_eq!(config.catalog.schema_file, Some(PathBuf::from("schema.toml")));
    }

    #[test]
    fn test_build_job_uses_configured_destination_db() {
        let mut config = VwFeedConfig::default();
        config.query.destination_db = "scratch".into();
        let job = build_job(&job_args(), &config).unwrap();
        assert_eq!(job.destination.to_string(), "scratch.orders_vw");
    }

    #[test]
    fn test_build_job_rejects_unqualified_source() {
        let mut args = job_args();
        args.src = "orders".into();
        let err = build_job(&args, &VwFeedConfig::default()).unwrap_err();
        assert!(err.to_string().contains("db.table"));
    }

    #[test]
    fn test_render_plan() {
        let job = build_job(&job_args(), &VwFeedConfig::default()).unwrap();
        let text = render_plan(&orders_plan(&job));
        assert_eq!(
            text,
            "-- source: sales.orders\n-- namespaces: other(2), geo(1)\n\n-- destination\nDDL;\n\n-- materialization\nINSERT;\n"
        );
    }

    #[test]
    fn test_preview_lines() {
        let job = build_job(&job_args(), &VwFeedConfig::default()).unwrap();
        let plan = orders_plan(&job);
        let rows = r#"{"converted": 1, "order_id": "o-1", "amount": 0.0, "is_rush": true, "region__geo__code": "EU;1"}

{"converted": null, "order_id": "o-2"}
{"converted": 0, "order_id": "o-3", "amount": 12.5}
"#;
        let lines = preview_lines(&job, &plan, rows).unwrap();
        assert_eq!(
            lines,
            vec![
                "1.0000 1.0 o-1|other is_rush:1 |geo EU1 ".to_string(),
                "0.0000 1.0 o-3|other amount:12.50 |geo ".to_string(),
            ]
        );
    }

    #[test]
    fn test_preview_rejects_non_object_rows() {
        let job = build_job(&job_args(), &VwFeedConfig::default()).unwrap();
        let plan = orders_plan(&job);
        assert!(preview_lines(&job, &plan, "[1, 2]\n").is_err());
    }

    #[test]
    fn test_config_init_writes_defaults_once() {
        let dir = TempDir::new().unwrap();
        handle_config(ConfigAction::Init, &VwFeedConfig::default(), dir.path()).unwrap();
        let path = workspace_config_path(dir.path());
        let written = std::fs::read_to_string(&path).unwrap();
        let parsed: VwFeedConfig = toml::from_str(&written).unwrap();
        assert_eq!(parsed, VwFeedConfig::default());

        std::fs::write(&path, "# edited\n").unwrap();
        handle_config(ConfigAction::Init, &VwFeedConfig::default(), dir.path()).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# edited\n");
    }
}
