//! Matlab handler stub
//!
//! The tag is recognized so graphs referencing it still load and route, but
//! running it only reports that nothing is implemented.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::error;

use crate::handlers::{Handler, HandlerError, HandlerKind, ParamMap, PortSpec};

#[derive(Debug)]
pub struct MatlabHandler {
    spec: PortSpec,
    params: ParamMap,
}

impl MatlabHandler {
    pub fn new() -> Self {
        error!("The matlab handler is not implemented yet. Do not use it");
        Self {
            spec: PortSpec::default(),
            params: ParamMap::new(),
        }
    }
}

impl Default for MatlabHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for MatlabHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Matlab
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

    async fn run(&self, _inputs: &[PathBuf], _outputs: &[PathBuf]) -> Result<(), HandlerError> {
        error!("The matlab handler is not implemented yet. Do not use it");
        Ok(())
    }
}
