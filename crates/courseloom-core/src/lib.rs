//! Courseloom Core — error taxonomy and processing configuration.

pub mod config;
pub mod error;

pub use config::{ProcessingConfig, ProcessingOverrides};
pub use error::{Error, Result};
