//! Events flowing from workers to the coordinator and on to the caller

use keyscan_crypto::{scalar_hex, Hash160};
use num_bigint::BigUint;
use serde::{Serialize, Serializer};

/// Index of a worker inside one scan
pub type WorkerId = usize;

/// Periodic throughput report from one worker.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport {
    pub worker: WorkerId,
    /// Strictly increasing per worker, starting at 1
    pub sequence: u64,
    #[serde(serialize_with = "serialize_scalar")]
    pub position: BigUint,
    pub candidate_hex: String,
    pub digest_hex: String,
    /// Rate over the keys tested since the previous report
    pub keys_per_second: f64,
    /// Keys this worker has tested so far
    pub keys_tested: u64,
}

impl ProgressReport {
    /// Candidate without its leading zeros
    pub fn base_key(&self) -> &str {
        let trimmed = self.candidate_hex.trim_start_matches('0');
        if trimmed.is_empty() {
            "0"
        } else {
            trimmed
        }
    }
}

/// A key whose digest matched the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FoundKey {
    pub worker: WorkerId,
    #[serde(serialize_with = "serialize_scalar")]
    pub position: BigUint,
    pub private_key_hex: String,
    pub public_key_hex: String,
    pub digest: Hash160,
    /// Compressed-key WIF
    pub wif: String,
}

/// A candidate that could not be checked. The scan goes on.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateError {
    pub worker: WorkerId,
    #[serde(serialize_with = "serialize_scalar")]
    pub position: BigUint,
    pub message: String,
}

/// What a worker sends to the coordinator.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Progress(ProgressReport),
    Found(FoundKey),
    Error(CandidateError),
    Wrapped { worker: WorkerId, pass: u64 },
}

/// Why a scan stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Found,
    Exhausted,
    Cancelled,
    TimedOut,
}

/// What the coordinator reports to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    Progress(ProgressReport),
    Found(FoundKey),
    Error(CandidateError),
    Wrapped { worker: WorkerId, pass: u64 },
    Finished { matched: bool, reason: FinishReason },
}

fn serialize_scalar<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&scalar_hex(value))
}
