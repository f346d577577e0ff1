//! End-to-end pipeline tests against a fake engine.
//!
//! The engine binary is `sh` running a small script that records every
//! query file it is handed and answers like the real CLI would.

#![cfg(unix)]

use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use vwfeed_core::catalog::{Catalog, EngineCatalog, StaticCatalog};
use vwfeed_core::{
    EngineCli, ExecOptions, JobSpec, Pipeline, RunStatus, Stage, TableRef, VwFeedError,
};

const ORDERS_MATERIALIZATION: &str = include_str!("fixtures/orders_materialization.hql");

struct FakeEngine {
    _dir: TempDir,
    scratch: PathBuf,
    record: PathBuf,
    engine: EngineCli,
}

/// Build a fake engine whose behaviour is the shell snippet `body`, run
/// with `$script` bound to the query file path.
fn fake_engine(body: &str) -> FakeEngine {
    let dir = TempDir::new().unwrap();
    let scratch = dir.path().join("scratch");
    std::fs::create_dir_all(&scratch).unwrap();
    let record = dir.path().join("record.log");
    let script_path = dir.path().join("fake-engine.sh");
    let script = format!(
        "for script; do :; done\ncat \"$script\" >> '{record}'\necho '-- end --' >> '{record}'\n{body}\n",
        record = record.display(),
    );
    std::fs::write(&script_path, script).unwrap();

    let engine = EngineCli::new("sh")
        .with_extra_args(vec![script_path.display().to_string()])
        .with_temp_dir(&scratch);

    FakeEngine {
        _dir: dir,
        scratch,
        record,
        engine,
    }
}

fn is_empty_dir(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

fn orders_catalog() -> Arc<StaticCatalog> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/orders_schema.toml");
    Arc::new(StaticCatalog::from_file(&path).unwrap())
}

fn orders_job() -> JobSpec {
    JobSpec::builder("sales.orders", "orders_vw", "converted", "order_id")
        .build()
        .unwrap()
}

#[tokio::test]
async fn plan_matches_golden_materialization() {
    let fake = fake_engine("echo OK");
    let pipeline = Pipeline::new(
        orders_catalog(),
        Arc::new(fake.engine.clone()),
        ExecOptions::default(),
    );

    let plan = pipeline.plan(&orders_job()).await.unwrap();

    assert_eq!(plan.materialization, ORDERS_MATERIALIZATION);
    assert_eq!(plan.namespaces.names(), vec!["other", "geo"]);
    let other: Vec<_> = plan
        .namespaces
        .get("other")
        .unwrap()
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(other, vec!["amount", "is_rush"]);
}

#[tokio::test]
async fn run_executes_ddl_then_insert_and_cleans_up() {
    let fake = fake_engine("echo OK");
    let pipeline = Pipeline::new(
        orders_catalog(),
        Arc::new(fake.engine.clone()),
        ExecOptions::default(),
    );

    let report = pipeline.run(&orders_job()).await.unwrap();

    assert!(report.is_success());
    assert_eq!(
        report.location.as_deref(),
        Some("hdfs:///user/hive/warehouse/tmp.db/orders_vw")
    );
    assert_eq!(report.stages.len(), 2);
    assert_eq!(report.stages[0].stage, Stage::CreateDestination);
    assert_eq!(report.stages[0].result.output, vec!["OK".to_string()]);

    let record = std::fs::read_to_string(&fake.record).unwrap();
    let ddl_at = record.find("DROP TABLE IF EXISTS tmp.orders_vw;").unwrap();
    let insert_at = record.find("INSERT OVERWRITE TABLE tmp.orders_vw").unwrap();
    assert!(ddl_at < insert_at);
    assert!(record.contains(ORDERS_MATERIALIZATION));
    assert!(is_empty_dir(&fake.scratch));
}

#[tokio::test]
async fn run_surfaces_engine_failure() {
    let fake = fake_engine(
        "if grep -q 'INSERT OVERWRITE' \"$script\"; then echo 'syntax error at line 4'; exit 2; fi\necho OK",
    );
    let pipeline = Pipeline::new(
        orders_catalog(),
        Arc::new(fake.engine.clone()),
        ExecOptions::default(),
    );

    let report = pipeline.run(&orders_job()).await.unwrap();

    assert!(!report.is_success());
    assert_eq!(
        report.status,
        RunStatus::Failed {
            stage: Stage::Materialize,
            exit_code: 2,
            output: vec!["syntax error at line 4".to_string()],
        }
    );
    assert_eq!(report.stages[1].result.exit_code, 2);
    assert!(is_empty_dir(&fake.scratch));
}

#[tokio::test]
async fn schema_prefix_is_written_to_query_file() {
    let fake = fake_engine("echo OK");
    let mut options = ExecOptions::default();
    options.schema = Some("sales".to_string());
    let pipeline = Pipeline::new(orders_catalog(), Arc::new(fake.engine.clone()), options);

    pipeline.run(&orders_job()).await.unwrap();

    let record = std::fs::read_to_string(&fake.record).unwrap();
    assert!(record.starts_with("USE sales;\nDROP TABLE IF EXISTS tmp.orders_vw;"));
}

#[tokio::test]
async fn unsupported_column_aborts_before_engine_runs() {
    let dir = TempDir::new().unwrap();
    let schema = dir.path().join("schema.toml");
    std::fs::write(
        &schema,
        r#"
[[tables]]
db = "sales"
name = "orders"
columns = [
    { name = "converted", type = "int" },
    { name = "order_id", type = "string" },
    { name = "payload", type = "struct<a:int,b:string>" },
]
"#,
    )
    .unwrap();
    let catalog = Arc::new(StaticCatalog::from_file(&schema).unwrap());
    let fake = fake_engine("echo OK");
    let pipeline = Pipeline::new(catalog, Arc::new(fake.engine.clone()), ExecOptions::default());

    let err = pipeline.run(&orders_job()).await.unwrap_err();

    assert!(matches!(err, VwFeedError::Encode(_)));
    assert!(err.to_string().contains("payload"));
    assert!(!fake.record.exists());
}

#[tokio::test]
async fn engine_catalog_reads_describe_output() {
    let fake = fake_engine(
        "case \"$(cat \"$script\")\" in\n\
         'DESCRIBE FORMATTED'*) printf 'Location:           \\thdfs:///wh/tmp.db/orders_vw\\t\\n' ;;\n\
         *) printf 'amount\\tdouble\\t\\nis_rush\\tboolean\\t\\n' ;;\n\
         esac\necho OK",
    );
    let catalog = EngineCatalog::new(Arc::new(fake.engine.clone()), ExecOptions::default());

    let columns = catalog
        .columns(&TableRef::new("sales", "orders"))
        .await
        .unwrap();
    let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["amount", "is_rush"]);

    let location = catalog
        .storage_location(&TableRef::new("tmp", "orders_vw"))
        .await
        .unwrap();
    assert_eq!(location, "hdfs:///wh/tmp.db/orders_vw");
}
