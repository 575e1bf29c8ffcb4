//! Printing handler

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::handlers::{Handler, HandlerError, HandlerKind, ParamMap, PortSpec};

/// Logs the contents of its input at info level. An empty input file is
/// reported as a warning and stops the print.
#[derive(Debug)]
pub struct PrintHandler {
    spec: PortSpec,
    params: ParamMap,
}

impl PrintHandler {
    pub fn new() -> Self {
        Self {
            spec: PortSpec::new(&["in"], &[]),
            params: ParamMap::new(),
        }
    }
}

impl Default for PrintHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for PrintHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Print
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

    async fn run(&self, inputs: &[PathBuf], _outputs: &[PathBuf]) -> Result<(), HandlerError> {
        for path in inputs {
            let raw = tokio::fs::read(path).await?;
            if raw.is_empty() {
                warn!("Printer: file {} is empty", path.display());
                break;
            }
            info!("Printer: {} ({:?})", String::from_utf8_lossy(&raw), raw);
        }
        Ok(())
    }
}
