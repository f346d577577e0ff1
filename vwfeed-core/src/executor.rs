//! Query execution through the engine command-line client.
//!
//! The query text is written to a temporary file, the engine is spawned with
//! that file as its script argument, and its output is streamed line by
//! line into a single buffer (and into the log when verbose) until the
//! process exits. stdout and stderr share one pipe, so the buffer holds
//! lines in the order the engine wrote them. The temporary file is removed on every path out of
//! [`EngineCli::execute`], including spawn failures, timeouts and
//! cancellation.
//!
//! A non-zero exit is reported through [`ExecutionResult`], not as an error.

use crate::config::EngineConfig;
use crate::error::ExecutionError;
use crate::types::ExecutionResult;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::{PipeReader, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Per-invocation options.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Database selected with `USE` before the query runs.
    pub schema: Option<String>,
    /// Forward every engine output line to the log.
    pub verbose: bool,
    /// Engine settings passed as `<conf_flag> key=value`.
    pub conf: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            schema: None,
            verbose: true,
            conf: BTreeMap::new(),
            timeout: None,
            cancel: None,
        }
    }
}

impl ExecOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            schema: config.schema.clone(),
            verbose: config.verbose,
            conf: config.conf.clone(),
            timeout: config.timeout_secs.map(Duration::from_secs),
            cancel: None,
        }
    }

    pub fn quiet(mut self) -> Self {
        self.verbose = false;
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Anything that can run a query text and report how it went.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    async fn execute(
        &self,
        query: &str,
        options: &ExecOptions,
    ) -> Result<ExecutionResult, ExecutionError>;
}

/// Runs queries by invoking an engine CLI (`hive` by default) on a script file.
#[derive(Debug, Clone)]
pub struct EngineCli {
    binary: String,
    extra_args: Vec<String>,
    conf_flag: String,
    file_flag: String,
    temp_dir: PathBuf,
}

impl EngineCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            extra_args: Vec::new(),
            conf_flag: "-hiveconf".to_string(),
            file_flag: "-f".to_string(),
            temp_dir: std::env::temp_dir(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            extra_args: config.extra_args.clone(),
            conf_flag: config.conf_flag.clone(),
            file_flag: config.file_flag.clone(),
            temp_dir: config.temp_dir.clone().unwrap_or_else(std::env::temp_dir),
        }
    }

    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Directory for query files; also the engine's working directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Query text as written to the script file.
    pub fn render_script(query: &str, schema: Option<&str>) -> String {
        match schema {
            Some(schema) => format!("USE {schema};\n{query}"),
            None => query.to_string(),
        }
    }

    /// Arguments after the binary: extra args, one flag pair per conf entry,
    /// then the script file flag.
    pub fn command_args(&self, conf: &BTreeMap<String, String>, script: &Path) -> Vec<String> {
        let mut args = self.extra_args.clone();
        for (key, value) in conf {
            args.push(self.conf_flag.clone());
            args.push(format!("{key}={value}"));
        }
        args.push(self.file_flag.clone());
        args.push(script.display().to_string());
        args
    }

    fn write_script(&self, script: &str) -> Result<NamedTempFile, ExecutionError> {
        let artifact_err = |source| ExecutionError::ArtifactIo {
            dir: self.temp_dir.clone(),
            source,
        };
        let mut file = tempfile::Builder::new()
            .prefix("vwfeed-")
            .suffix(".hql")
            .tempfile_in(&self.temp_dir)
            .map_err(artifact_err)?;
        file.write_all(script.as_bytes()).map_err(artifact_err)?;
        file.flush().map_err(artifact_err)?;
        Ok(file)
    }

    async fn run(
        &self,
        query: &str,
        options: &ExecOptions,
    ) -> Result<ExecutionResult, ExecutionError> {
        let script = Self::render_script(query, options.schema.as_deref());

        // Dropping `artifact` deletes the file, whichever way we leave.
        let artifact = self.write_script(&script)?;
        let args = self.command_args(&options.conf, artifact.path());
        debug!(path = %artifact.path().display(), "Query file written");

        if options.verbose {
            info!(command = %format!("{} {}", self.binary, args.join(" ")), "Running engine");
        }

        let (reader, stdout_writer) = std::io::pipe().map_err(ExecutionError::Pipe)?;
        let stderr_writer = stdout_writer.try_clone().map_err(ExecutionError::Pipe)?;

        let (tx, rx) = mpsc::unbounded_channel();
        spawn_reader(reader, tx).map_err(ExecutionError::Pipe)?;

        // The builder owns the parent's write ends and drops them at the end
        // of the statement, so the reader sees EOF once the engine exits.
        let mut child = Command::new(&self.binary)
            .args(&args)
            .current_dir(&self.temp_dir)
            .stdin(Stdio::null())
            .stdout(stdout_writer)
            .stderr(stderr_writer)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecutionError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        let outcome = tokio::select! {
            res = drain(&mut child, rx, options.verbose) => res,
            _ = deadline(options.timeout) => Err(ExecutionError::Timeout {
                timeout: options.timeout.unwrap_or_default(),
            }),
            _ = cancelled(options.cancel.as_ref()) => Err(ExecutionError::Cancelled),
        };

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Stopping engine process");
                if let Err(kill_err) = child.kill().await {
                    warn!(error = %kill_err, "Failed to kill engine process");
                }
                return Err(e);
            }
        };

        if !result.success() {
            error!(
                exit_code = result.exit_code,
                query = %script,
                output = %result.output_text(),
                "Engine exited with non-zero status"
            );
        }

        if let Err(e) = artifact.close() {
            warn!(error = %e, "Failed to remove query file");
        }
        Ok(result)
    }
}

#[async_trait]
impl QueryEngine for EngineCli {
    async fn execute(
        &self,
        query: &str,
        options: &ExecOptions,
    ) -> Result<ExecutionResult, ExecutionError> {
        self.run(query, options).await
    }
}

/// Start forwarding lines from the read end of the engine's output pipe.
#[cfg(unix)]
fn spawn_reader(reader: PipeReader, tx: mpsc::UnboundedSender<String>) -> std::io::Result<()> {
    use std::os::fd::OwnedFd;
    use tokio::net::unix::pipe::Receiver;

    let receiver = Receiver::from_owned_fd(OwnedFd::from(reader))?;
    tokio::spawn(forward_lines(receiver, tx));
    Ok(())
}

#[cfg(not(unix))]
fn spawn_reader(reader: PipeReader, tx: mpsc::UnboundedSender<String>) -> std::io::Result<()> {
    use std::io::BufRead;

    tokio::task::spawn_blocking(move || {
        let mut reader = std::io::BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if tx.send(decode_line(&buf)).is_err() {
                        break;
                    }
                }
            }
        }
    });
    Ok(())
}

/// Decode lossily and drop the line terminator.
fn decode_line(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf)
        .trim_end_matches(['\n', '\r'])
        .to_string()
}

/// Send each line of `reader` to `tx`.
#[cfg_attr(not(unix), allow(dead_code))]
async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if tx.send(decode_line(&buf)).is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(error = %e, "Engine output stream closed");
                break;
            }
        }
    }
}

/// Collect output until the pipe closes, then wait for the exit status.
async fn drain(
    child: &mut tokio::process::Child,
    mut rx: mpsc::UnboundedReceiver<String>,
    verbose: bool,
) -> Result<ExecutionResult, ExecutionError> {
    let mut output = Vec::new();
    while let Some(line) = rx.recv().await {
        if verbose {
            info!(target: "vwfeed::engine", "{line}");
        }
        output.push(line);
    }
    let status = child.wait().await.map_err(ExecutionError::Wait)?;
    Ok(ExecutionResult {
        exit_code: status.code().unwrap_or(-1),
        output,
    })
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}
