//! Constant-emission handler

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::handlers::{Handler, HandlerError, HandlerKind, ParamMap, PortSpec};

/// Writes its `value` parameter to every output.
#[derive(Debug)]
pub struct ConstHandler {
    spec: PortSpec,
    params: ParamMap,
}

impl ConstHandler {
    pub fn new() -> Self {
        let mut params = ParamMap::new();
        params.insert("value".to_string(), "text".to_string());
        Self {
            spec: PortSpec::new(&[], &["out"]),
            params,
        }
    }
}

impl Default for ConstHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for ConstHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Const
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

    async fn run(&self, _inputs: &[PathBuf], outputs: &[PathBuf]) -> Result<(), HandlerError> {
        let value = self.params.get("value").cloned().unwrap_or_default();
        for out in outputs {
            debug!(path = %out.display(), "Writing constant: {value:?}");
            tokio::fs::write(out, value.as_bytes()).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_const_writes_value_to_every_output() {
        let dir = TempDir::new().unwrap();
        let out1 = dir.path().join("out1");
        let out2 = dir.path().join("out2");

        let mut handler = ConstHandler::new();
        handler.params_mut().insert("value".into(), "3".into());
        handler
            .run(&[], &[out1.clone(), out2.clone()])
            .await
            .unwrap();

        assert_eq!(std::fs::read(&out1).unwrap(), b"3");
        assert_eq!(std::fs::read(&out2).unwrap(), b"3");
    }

    #[test]
    fn test_default_value() {
        let handler = ConstHandler::new();
        assert_eq!(handler.params().get("value").map(String::as_str), Some("text"));
    }
}
