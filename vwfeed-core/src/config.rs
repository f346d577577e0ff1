//! Configuration system for vwfeed.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> explicit file -> environment. Configuration is
//! read from `~/.config/vwfeed/config.toml` and/or `.vwfeed/config.toml` in
//! the workspace directory.

use crate::job::{default_hints, DEFAULT_DESTINATION_DB};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VwFeedConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// How to invoke the query engine CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine executable.
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Arguments placed right after the executable.
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Flag preceding each `key=value` engine setting.
    #[serde(default = "default_conf_flag")]
    pub conf_flag: String,
    /// Flag preceding the query file path.
    #[serde(default = "default_file_flag")]
    pub file_flag: String,
    /// Database selected before each query.
    #[serde(default)]
    pub schema: Option<String>,
    /// Engine settings passed on the command line.
    #[serde(default)]
    pub conf: BTreeMap<String, String>,
    /// Where query files are written (system temp dir if unset).
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    /// Log every line of engine output.
    #[serde(default = "default_true")]
    pub verbose: bool,
    /// Kill the engine after this many seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            extra_args: Vec::new(),
            conf_flag: default_conf_flag(),
            file_flag: default_file_flag(),
            schema: None,
            conf: BTreeMap::new(),
            temp_dir: None,
            verbose: true,
            timeout_secs: None,
        }
    }
}

fn default_binary() -> String {
    "hive".to_string()
}

fn default_conf_flag() -> String {
    "-hiveconf".to_string()
}

fn default_file_flag() -> String {
    "-f".to_string()
}

fn default_true() -> bool {
    true
}

/// Query generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Database the destination table is created in.
    #[serde(default = "default_destination_db")]
    pub destination_db: String,
    /// `SET key=value;` statements emitted before the insert.
    #[serde(default = "default_hints")]
    pub hints: Vec<(String, String)>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            destination_db: default_destination_db(),
            hints: default_hints(),
        }
    }
}

fn default_destination_db() -> String {
    DEFAULT_DESTINATION_DB.to_string()
}

/// Where table schemas come from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Static schema file; the engine is asked directly when unset.
    #[serde(default)]
    pub schema_file: Option<PathBuf>,
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "vwfeed", "vwfeed")
}

/// User-level config file location, if a home directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    project_dirs().map(|d| d.config_dir().join("config.toml"))
}

pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".vwfeed").join("config.toml")
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `VWFEED_`, `__` for nesting)
/// 2. Explicit config file (`--config`)
/// 3. Workspace-local config (`.vwfeed/config.toml`)
/// 4. User config (`~/.config/vwfeed/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<VwFeedConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(VwFeedConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = explicit {
        figment = figment.merge(Toml::file(path));
    }

    // VWFEED_ENGINE__BINARY, VWFEED_QUERY__DESTINATION_DB, ...
    figment = figment.merge(Env::prefixed("VWFEED_").split("__"));

    figment.extract().map_err(Box::new)
}
