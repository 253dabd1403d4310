//! KeyScan Core Engine
//!
//! Stochastic keyspace scanning: a range of private scalars is walked in
//! random steps by one or more worker threads, each candidate's compressed
//! public key is hashed (SHA-256, RIPEMD-160) and compared with a target.

mod config;
mod coordinator;
mod error;
mod event;
mod range;
mod scanner;
mod stats;
mod step;

pub use config::{parse_target, ScanConfig, ScanOptions, ScanPlan};
pub use coordinator::{Coordinator, ScanSummary};
pub use error::{ConfigError, Result, ScanError};
pub use event::{
    CandidateError, FinishReason, FoundKey, ProgressReport, ScanEvent, WorkerEvent, WorkerId,
};
pub use range::{KeyRange, Percent};
pub use scanner::{RangeScanner, WorkerReport, WorkerState};
pub use stats::{format_duration, format_keys, format_rate, CancelToken, ScanStats};
pub use step::{StepBound, StepGenerator};

// Re-exports for convenience
pub use keyscan_crypto::{Hash160, KeyDeriver, Secp256k1};
pub use num_bigint::BigUint;
