#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

#[cfg(test)]
use tempfile as _;

// Used by the binary only
use dotenvy as _;
use tokio as _;
use tokio_util as _;
use tracing as _;
use tracing_subscriber as _;

pub mod config;
pub mod parser;

pub use config::{FileConfig, ResolvedConfig, load_file};
pub use parser::Cli;
