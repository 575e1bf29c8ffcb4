//! Handler contract and the closed set of built-in handlers
//!
//! A handler is the pluggable unit of work a node wraps: it declares its
//! ports, carries its own parameters, and reads/writes the backing files the
//! engine hands it. Handlers are routed by string type tag; unknown tags are
//! a configuration error at node-creation time, never a panic.

pub mod arith;
pub mod constant;
pub mod file;
pub mod matlab;
pub mod printer;
pub mod shell;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::error::PipeGraphError;

pub use arith::AddHandler;
pub use constant::ConstHandler;
pub use file::{FileReadHandler, FileWriteHandler};
pub use matlab::MatlabHandler;
pub use printer::PrintHandler;
pub use shell::BashHandler;

/// Ordered input and output port names a handler declares.
///
/// Run-time path ordering follows this declaration, not any map insertion
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortSpec {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl PortSpec {
    pub fn new(inputs: &[&str], outputs: &[&str]) -> Self {
        Self {
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Handler parameters. Ordered so saved documents are deterministic.
pub type ParamMap = BTreeMap<String, String>;

/// Errors raised by a handler's `run`. Caught at the node boundary and
/// converted into a per-node failure result.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Input '{path}' does not hold a number: {text:?}")]
    NotANumber { path: String, text: String },

    #[error("Script '{script}' exited with code {code}")]
    Script { script: String, code: i32 },
}

/// Type tag routing node creation to a built-in handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    NoOp,
    Const,
    Add,
    Print,
    FileRead,
    FileWrite,
    Bash,
    Matlab,
}

impl HandlerKind {
    pub fn as_tag(&self) -> &'static str {
        match self {
            HandlerKind::NoOp => "",
            HandlerKind::Const => "const",
            HandlerKind::Add => "add",
            HandlerKind::Print => "print",
            HandlerKind::FileRead => "fileread",
            HandlerKind::FileWrite => "filewrite",
            HandlerKind::Bash => "bash",
            HandlerKind::Matlab => "matlab",
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

impl FromStr for HandlerKind {
    type Err = PipeGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(HandlerKind::NoOp),
            "const" => Ok(HandlerKind::Const),
            "add" => Ok(HandlerKind::Add),
            "print" => Ok(HandlerKind::Print),
            "fileread" => Ok(HandlerKind::FileRead),
            "filewrite" => Ok(HandlerKind::FileWrite),
            "bash" => Ok(HandlerKind::Bash),
            "matlab" => Ok(HandlerKind::Matlab),
            other => Err(PipeGraphError::UnknownHandler {
                tag: other.to_string(),
            }),
        }
    }
}

/// The contract every handler implements.
#[async_trait]
pub trait Handler: Send + Sync {
    /// The type tag this handler answers to.
    fn kind(&self) -> HandlerKind;

    /// Declared ports, in order.
    fn port_spec(&self) -> &PortSpec;

    fn params(&self) -> &ParamMap;

    fn params_mut(&mut self) -> &mut ParamMap;

    /// Whether re-execution is unnecessary. No built-in handler tracks this
    /// yet, so every run recomputes.
    fn is_up_to_date(&self) -> bool {
        false
    }

    /// Post-construction hook. The shell handler probes its script here;
    /// probe failures are logged, never raised.
    async fn init(&mut self) {}

    /// Read the input paths, write the output paths.
    async fn run(&self, inputs: &[PathBuf], outputs: &[PathBuf]) -> Result<(), HandlerError>;
}

/// The `""` tag: a placeholder with one input and one output that does
/// nothing when run.
#[derive(Debug)]
pub struct NoOpHandler {
    spec: PortSpec,
    params: ParamMap,
}

impl NoOpHandler {
    pub fn new() -> Self {
        Self {
            spec: PortSpec::new(&["in"], &["out"]),
            params: ParamMap::new(),
        }
    }
}

impl Default for NoOpHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for NoOpHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::NoOp
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
        debug!("Executing no-op handler");
        Ok(())
    }
}

/// Closed sum type over the built-in handlers.
///
/// Tag validation happens when parsing [`HandlerKind`], so construction
/// itself cannot fail.
#[derive(Debug)]
pub enum BuiltinHandler {
    NoOp(NoOpHandler),
    Const(ConstHandler),
    Add(AddHandler),
    Print(PrintHandler),
    FileRead(FileReadHandler),
    FileWrite(FileWriteHandler),
    Bash(BashHandler),
    Matlab(MatlabHandler),
}

impl BuiltinHandler {
    pub fn new(kind: HandlerKind) -> Self {
        match kind {
            HandlerKind::NoOp => BuiltinHandler::NoOp(NoOpHandler::new()),
            HandlerKind::Const => BuiltinHandler::Const(ConstHandler::new()),
            HandlerKind::Add => BuiltinHandler::Add(AddHandler::new()),
            HandlerKind::Print => BuiltinHandler::Print(PrintHandler::new()),
            HandlerKind::FileRead => BuiltinHandler::FileRead(FileReadHandler::new()),
            HandlerKind::FileWrite => BuiltinHandler::FileWrite(FileWriteHandler::new()),
            HandlerKind::Bash => BuiltinHandler::Bash(BashHandler::new()),
            HandlerKind::Matlab => BuiltinHandler::Matlab(MatlabHandler::new()),
        }
    }

    fn inner(&self) -> &dyn Handler {
        match self {
            BuiltinHandler::NoOp(h) => h,
            BuiltinHandler::Const(h) => h,
            BuiltinHandler::Add(h) => h,
            BuiltinHandler::Print(h) => h,
            BuiltinHandler::FileRead(h) => h,
            BuiltinHandler::FileWrite(h) => h,
            BuiltinHandler::Bash(h) => h,
            BuiltinHandler::Matlab(h) => h,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Handler {
        match self {
            BuiltinHandler::NoOp(h) => h,
            BuiltinHandler::Const(h) => h,
            BuiltinHandler::Add(h) => h,
            BuiltinHandler::Print(h) => h,
            BuiltinHandler::FileRead(h) => h,
            BuiltinHandler::FileWrite(h) => h,
            BuiltinHandler::Bash(h) => h,
            BuiltinHandler::Matlab(h) => h,
        }
    }
}

#[async_trait]
impl Handler for BuiltinHandler {
    fn kind(&self) -> HandlerKind {
        self.inner().kind()
    }

    fn port_spec(&self) -> &PortSpec {
        self.inner().port_spec()
    }

    fn params(&self) -> &ParamMap {
        self.inner().params()
    }

    fn params_mut(&mut self) -> &mut ParamMap {
        self.inner_mut().params_mut()
    }

    fn is_up_to_date(&self) -> bool {
        self.inner().is_up_to_date()
    }

    async fn init(&mut self) {
        self.inner_mut().init().await
    }

    async fn run(&self, inputs: &[PathBuf], outputs: &[PathBuf]) -> Result<(), HandlerError> {
        self.inner().run(inputs, outputs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tag_round_trip() {
        for kind in [
            HandlerKind::NoOp,
            HandlerKind::Const,
            HandlerKind::Add,
            HandlerKind::Print,
            HandlerKind::FileRead,
            HandlerKind::FileWrite,
            HandlerKind::Bash,
            HandlerKind::Matlab,
        ] {
            let parsed: HandlerKind = kind.as_tag().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn test_unknown_tag_is_config_error() {
        let result = "matplotlib".parse::<HandlerKind>();
        assert!(matches!(
            result,
            Err(PipeGraphError::UnknownHandler { ref tag }) if tag == "matplotlib"
        ));
    }

    #[test]
    fn test_builtin_handler_matches_kind() {
        let handler = BuiltinHandler::new(HandlerKind::Add);
        assert_eq!(handler.kind(), HandlerKind::Add);
        assert_eq!(
            handler.port_spec(),
            &PortSpec::new(&["summand1", "summand2"], &["sum"])
        );
    }

    #[test]
    fn test_handlers_never_up_to_date() {
        for kind in [HandlerKind::NoOp, HandlerKind::Const, HandlerKind::Bash] {
            assert!(!BuiltinHandler::new(kind).is_up_to_date());
        }
    }

    #[tokio::test]
    async fn test_noop_run() {
        let handler = NoOpHandler::new();
        handler.run(&[], &[]).await.unwrap();
    }
}
