//! Shell script handler
//!
//! The script doubles as its own port declaration: invoked with no
//! arguments it must print one line of the form `in1,...,inN;out1,...,outM`,
//! which becomes the port spec. Invoked for execution it receives a single
//! extra argument holding the comma-joined input paths, a semicolon, and the
//! comma-joined output paths.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error};

use crate::handlers::{Handler, HandlerError, HandlerKind, ParamMap, PortSpec};

const DEFAULT_SCRIPT: &str = "./template.bash";

/// Runs the bash script named by the `filename` parameter.
#[derive(Debug)]
pub struct BashHandler {
    spec: PortSpec,
    params: ParamMap,
}

impl BashHandler {
    pub fn new() -> Self {
        let mut params = ParamMap::new();
        params.insert("filename".to_string(), DEFAULT_SCRIPT.to_string());
        Self {
            spec: PortSpec::default(),
            params,
        }
    }

    fn script(&self) -> String {
        self.params.get("filename").cloned().unwrap_or_default()
    }
}

impl Default for BashHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a probe line `in1,...,inN;out1,...,outM`. Empty segments are
/// permitted and declare zero ports; the semicolon is mandatory.
fn parse_port_spec_line(line: &str) -> Option<PortSpec> {
    let (inputs, outputs) = line.trim().split_once(';')?;
    Some(PortSpec {
        inputs: split_names(inputs),
        outputs: split_names(outputs),
    })
}

fn split_names(segment: &str) -> Vec<String> {
    segment
        .split(',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(",")
}

fn log_stderr(stderr: &[u8]) {
    for line in String::from_utf8_lossy(stderr).lines() {
        error!("bash: {line}");
    }
}

#[async_trait]
impl Handler for BashHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Bash
    }

    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn params(&self) -> &ParamMap {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamMap {
        &mut self.params
    }

    /// Probes the script for its port spec. Failures are logged and leave
    /// the spec empty; the node still exists.
    async fn init(&mut self) {
        let script = self.script();
        if !Path::new(&script).is_file() {
            error!("Could not find script {script:?}");
            return;
        }

        let output = match Command::new("bash")
            .arg(&script)
            .kill_on_drop(true)
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                error!("Failed to probe script {script:?}: {e}");
                return;
            }
        };
        log_stderr(&output.stderr);

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout.lines().next().unwrap_or("");
        match parse_port_spec_line(line) {
            Some(spec) => {
                debug!(?spec, "Probed port spec from {script:?}");
                self.spec = spec;
            }
            None => {
                error!(
                    "Failed to get port specs from {script:?}. Make sure the script echoes \
                     a line of the form in1,...,inN;out1,...,outM when executed without arguments"
                );
                self.spec = PortSpec::default();
            }
        }
    }

    async fn run(&self, inputs: &[PathBuf], outputs: &[PathBuf]) -> Result<(), HandlerError> {
        let script = self.script();
        let arg = format!("{};{}", join_paths(inputs), join_paths(outputs));
        debug!("Bash cmd: bash {script} {arg}");

        let output = Command::new("bash")
            .arg(&script)
            .arg(&arg)
            .kill_on_drop(true)
            .output()
            .await?;

        log_stderr(&output.stderr);
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!("bash: {line}");
        }

        if !output.status.success() {
            return Err(HandlerError::Script {
                script,
                code: output.status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }
}
