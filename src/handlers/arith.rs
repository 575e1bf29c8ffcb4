//! Numeric addition handler

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::handlers::{Handler, HandlerError, HandlerKind, ParamMap, PortSpec};

/// Parses each input file as an `f64`, sums them, and writes the sum as
/// decimal text to its output.
#[derive(Debug)]
pub struct AddHandler {
    spec: PortSpec,
    params: ParamMap,
}

impl AddHandler {
    pub fn new() -> Self {
        Self {
            spec: PortSpec::new(&["summand1", "summand2"], &["sum"]),
            params: ParamMap::new(),
        }
    }
}

impl Default for AddHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Formats an integral finite value with a trailing `.0` (`7.0`, not `7`),
/// so downstream text consumers see an unambiguous float.
pub(crate) fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

#[async_trait]
impl Handler for AddHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Add
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

    async fn run(&self, inputs: &[PathBuf], outputs: &[PathBuf]) -> Result<(), HandlerError> {
        let mut sum = 0.0f64;
        for path in inputs {
            let raw = tokio::fs::read(path).await?;
            let text = String::from_utf8_lossy(&raw);
            let value: f64 =
                text.trim()
                    .parse()
                    .map_err(|_| HandlerError::NotANumber {
                        path: path.display().to_string(),
                        text: text.trim().to_string(),
                    })?;
            debug!(" + {value}");
            sum += value;
        }
        debug!(" = {sum}");

        if let Some(out) = outputs.first() {
            tokio::fs::write(out, format_float(sum).as_bytes()).await?;
        }
        Ok(())
    }
}
