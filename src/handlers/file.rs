//! File read/write handlers bridging the graph to named files on disk

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

use crate::handlers::{Handler, HandlerError, HandlerKind, ParamMap, PortSpec};

const DEFAULT_FILENAME: &str = "./file.txt";

/// Copies the bytes of the file named by the `filename` parameter to its
/// output. A read failure is logged and leaves the output untouched; the
/// node itself does not fail.
#[derive(Debug)]
pub struct FileReadHandler {
    spec: PortSpec,
    params: ParamMap,
}

impl FileReadHandler {
    pub fn new() -> Self {
        let mut params = ParamMap::new();
        params.insert("filename".to_string(), DEFAULT_FILENAME.to_string());
        Self {
            spec: PortSpec::new(&[], &["out"]),
            params,
        }
    }
}

impl Default for FileReadHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for FileReadHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::FileRead
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
        let filename = self.params.get("filename").cloned().unwrap_or_default();
        debug!("Reading file {filename:?}");

        let data = match tokio::fs::read(&filename).await {
            Ok(data) => data,
            Err(e) => {
                error!("Failed to read file {filename:?}: {e}");
                return Ok(());
            }
        };

        if let Some(out) = outputs.first() {
            tokio::fs::write(out, &data).await?;
        }
        Ok(())
    }
}

/// Copies its input's bytes into the file named by the `filename` parameter,
/// appending or truncating per the `append` parameter.
#[derive(Debug)]
pub struct FileWriteHandler {
    spec: PortSpec,
    params: ParamMap,
}

impl FileWriteHandler {
    pub fn new() -> Self {
        let mut params = ParamMap::new();
        params.insert("filename".to_string(), DEFAULT_FILENAME.to_string());
        params.insert("append".to_string(), "true".to_string());
        Self {
            spec: PortSpec::new(&["in"], &[]),
            params,
        }
    }

    fn append(&self) -> bool {
        self.params
            .get("append")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(true)
    }
}

impl Default for FileWriteHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for FileWriteHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::FileWrite
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
        let filename = self.params.get("filename").cloned().unwrap_or_default();
        debug!("Writing file {filename:?} (append: {})", self.append());

        let Some(input) = inputs.first() else {
            return Ok(());
        };
        let data = tokio::fs::read(input).await?;

        let mut options = tokio::fs::OpenOptions::new();
        options.create(true).write(true);
        if self.append() {
            options.append(true);
        } else {
            options.truncate(true);
        }
        let mut sink = options.open(&filename).await?;
        sink.write_all(&data).await?;
        sink.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fileread_copies_file_to_output() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.txt");
        let out = dir.path().join("out");
        std::fs::write(&source, "payload").unwrap();

        let mut handler = FileReadHandler::new();
        handler
            .params_mut()
            .insert("filename".into(), source.display().to_string());
        handler.run(&[], &[out.clone()]).await.unwrap();

        assert_eq!(std::fs::read(&out).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_fileread_missing_file_does_not_fail() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");

        let mut handler = FileReadHandler::new();
        handler
            .params_mut()
            .insert("filename".into(), "/nonexistent/file.txt".into());
        handler.run(&[], &[out.clone()]).await.unwrap();

        // Output was never written
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_filewrite_append_and_truncate() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in");
        let sink = dir.path().join("sink.txt");
        std::fs::write(&input, "abc").unwrap();

        let mut handler = FileWriteHandler::new();
        handler
            .params_mut()
            .insert("filename".into(), sink.display().to_string());

        handler.run(&[input.clone()], &[]).await.unwrap();
        handler.run(&[input.clone()], &[]).await.unwrap();
        assert_eq!(std::fs::read(&sink).unwrap(), b"abcabc");

        handler.params_mut().insert("append".into(), "false".into());
        handler.run(&[input], &[]).await.unwrap();
        assert_eq!(std::fs::read(&sink).unwrap(), b"abc");
    }
}
