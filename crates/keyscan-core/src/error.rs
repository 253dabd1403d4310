//! Error types

use keyscan_crypto::{DeriveError, HashError};
use thiserror::Error;

use crate::event::WorkerId;

/// Malformed or contradictory scan input. Fatal: no worker is started.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("target hash is required")]
    MissingTarget,
    #[error("invalid target '{0}': expected 40 hex digits or a P2PKH address")]
    InvalidTarget(String),
    #[error("{field} is not a valid hex number: '{value}'")]
    InvalidHex { field: &'static str, value: String },
    #[error("{field} is not a valid decimal number: '{value}'")]
    InvalidDecimal { field: &'static str, value: String },
    #[error("range start must be less than range end")]
    EmptyRange,
    #[error("range end does not fit in 256 bits")]
    RangeTooLarge,
    #[error("step values must be greater than zero")]
    ZeroStep,
    #[error("min step must not exceed max step")]
    StepOrder,
    #[error("threshold must be a decimal percentage in [0, 100], got '{0}'")]
    InvalidThreshold(String),
    #[error("worker count must be at least 1")]
    NoWorkers,
    #[error("report interval must be at least 1")]
    ZeroReportInterval,
    #[error("channel capacity must be at least 1")]
    ZeroChannelCapacity,
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error(transparent)]
    InvalidScalar(#[from] DeriveError),

    #[error(transparent)]
    InvalidInput(#[from] HashError),

    #[error("worker {worker} failed: {message}")]
    WorkerFailure { worker: WorkerId, message: String },
}

pub type Result<T> = std::result::Result<T, ScanError>;
