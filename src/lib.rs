//! Pipegraph - file-backed dataflow pipeline graph engine

pub mod cli;
pub mod dag;
pub mod error;
pub mod graph;
pub mod handlers;
pub mod logging;
pub mod node;
pub mod persist;
pub mod port;
pub mod report;
