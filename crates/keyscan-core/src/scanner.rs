//! Randomized range scanner

use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Sender;
use keyscan_crypto::encoding::wif_encode;
use keyscan_crypto::{hash, scalar_hex, scalar_to_bytes, Hash160, KeyDeriver};
use num_bigint::BigUint;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::debug;

use crate::config::ScanOptions;
use crate::error::ScanError;
use crate::event::{CandidateError, FoundKey, ProgressReport, WorkerEvent, WorkerId};
use crate::range::KeyRange;
use crate::stats::ScanStats;
use crate::step::StepGenerator;

/// Worker lifecycle. Everything but `Running` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Running,
    Found,
    Exhausted,
    Cancelled,
    /// Panicked or never started; counts as exhausted
    Failed,
}

/// Final account of one worker.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerReport {
    pub worker: WorkerId,
    pub state: WorkerState,
    /// Loop iterations, skipped positions included
    pub iterations: u64,
    /// Candidates derived and hashed
    pub keys_tested: u64,
    /// Times the cursor wrapped back to the range start
    pub passes: u64,
}

impl WorkerReport {
    pub(crate) fn failed(worker: WorkerId) -> Self {
        Self::idle(worker, WorkerState::Failed)
    }

    /// A worker that was never started because its whole range sits below
    /// the validation threshold
    pub(crate) fn below_threshold(worker: WorkerId) -> Self {
        Self::idle(worker, WorkerState::Exhausted)
    }

    fn idle(worker: WorkerId, state: WorkerState) -> Self {
        Self {
            worker,
            state,
            iterations: 0,
            keys_tested: 0,
            passes: 0,
        }
    }
}

/// Per-worker mutable state.
#[derive(Debug)]
struct ScanCursor {
    position: BigUint,
    tested_since_report: u64,
    last_report: Instant,
    sequence: u64,
    passes: u64,
    iterations: u64,
    keys_tested: u64,
}

impl ScanCursor {
    fn new(start: &BigUint) -> Self {
        Self {
            position: start.clone(),
            tested_since_report: 0,
            last_report: Instant::now(),
            sequence: 0,
            passes: 0,
            iterations: 0,
            keys_tested: 0,
        }
    }
}

/// Outcome of checking one candidate
enum Checked {
    Match(FoundKey),
    Miss { candidate_hex: String, digest: Hash160 },
}

/// Walks one range in random steps, testing candidates against the target.
///
/// Each iteration checks the stop flag, derives and hashes the candidate
/// at the cursor (unless it sits below the validation threshold), then
/// moves the cursor forward by a random step. Past the range end the
/// cursor either wraps to the start or the worker stops as exhausted.
///
/// The validation threshold is a throughput heuristic. Keys below it are
/// never tested, so a scan with a threshold can miss a key that a scan
/// without one would find.
pub struct RangeScanner {
    worker: WorkerId,
    range: KeyRange,
    steps: StepGenerator,
    options: ScanOptions,
    deriver: Arc<dyn KeyDeriver>,
    stats: Arc<ScanStats>,
    rng: StdRng,
    cursor: ScanCursor,
}

impl RangeScanner {
    pub fn new(
        worker: WorkerId,
        range: KeyRange,
        options: ScanOptions,
        deriver: Arc<dyn KeyDeriver>,
        stats: Arc<ScanStats>,
        rng: StdRng,
    ) -> Self {
        let cursor = ScanCursor::new(range.start());
        Self {
            worker,
            steps: StepGenerator::new(&options.step),
            range,
            options,
            deriver,
            stats,
            rng,
            cursor,
        }
    }

    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    pub fn range(&self) -> &KeyRange {
        &self.range
    }

    /// Scan until a match, the end of the range, or cancellation
    pub fn run(mut self, events: &Sender<WorkerEvent>) -> WorkerReport {
        debug!(
            worker = self.worker,
            range = %self.range,
            deriver = self.deriver.name(),
            "Worker started"
        );

        let mut state = WorkerState::Running;
        while state == WorkerState::Running {
            state = self.iterate(events);
        }

        self.stats.add_keys(self.cursor.tested_since_report);
        debug!(
            worker = self.worker,
            ?state,
            iterations = self.cursor.iterations,
            keys_tested = self.cursor.keys_tested,
            "Worker stopped"
        );

        WorkerReport {
            worker: self.worker,
            state,
            iterations: self.cursor.iterations,
            keys_tested: self.cursor.keys_tested,
            passes: self.cursor.passes,
        }
    }

    fn iterate(&mut self, events: &Sender<WorkerEvent>) -> WorkerState {
        if !self.stats.is_running() {
            return WorkerState::Cancelled;
        }
        self.cursor.iterations += 1;

        let below_threshold = self
            .options
            .threshold
            .as_ref()
            .is_some_and(|threshold| self.cursor.position < *threshold);

        if !below_threshold {
            match self.check_candidate() {
                Ok(Checked::Match(key)) => {
                    self.emit(events, WorkerEvent::Found(key));
                    return WorkerState::Found;
                }
                Ok(Checked::Miss {
                    candidate_hex,
                    digest,
                }) => {
                    self.cursor.keys_tested += 1;
                    self.cursor.tested_since_report += 1;
                    if self.cursor.tested_since_report >= self.options.report_interval
                        && !self.report_progress(events, candidate_hex, digest)
                    {
                        return WorkerState::Cancelled;
                    }
                }
                Err(err) => {
                    let event = WorkerEvent::Error(CandidateError {
                        worker: self.worker,
                        position: self.cursor.position.clone(),
                        message: err.to_string(),
                    });
                    if !self.emit(events, event) {
                        return WorkerState::Cancelled;
                    }
                }
            }
        }

        self.advance(events)
    }

    fn check_candidate(&self) -> Result<Checked, ScanError> {
        let position = &self.cursor.position;
        let public_key = self.deriver.derive(position)?;
        let digest = hash::digest(&public_key)?;
        let candidate_hex = scalar_hex(position);

        if digest != self.options.target {
            return Ok(Checked::Miss {
                candidate_hex,
                digest,
            });
        }

        let wif = scalar_to_bytes(position)
            .map(|bytes| wif_encode(&bytes))
            .unwrap_or_default();
        Ok(Checked::Match(FoundKey {
            worker: self.worker,
            position: position.clone(),
            private_key_hex: candidate_hex,
            public_key_hex: hex::encode(public_key),
            digest,
            wif,
        }))
    }

    fn report_progress(
        &mut self,
        events: &Sender<WorkerEvent>,
        candidate_hex: String,
        digest: Hash160,
    ) -> bool {
        let tested = self.cursor.tested_since_report;
        let elapsed = self.cursor.last_report.elapsed().as_secs_f64();
        let keys_per_second = if elapsed > 0.0 {
            tested as f64 / elapsed
        } else {
            0.0
        };

        self.stats.add_keys(tested);
        self.cursor.sequence += 1;
        self.cursor.tested_since_report = 0;
        self.cursor.last_report = Instant::now();

        self.emit(
            events,
            WorkerEvent::Progress(ProgressReport {
                worker: self.worker,
                sequence: self.cursor.sequence,
                position: self.cursor.position.clone(),
                candidate_hex,
                digest_hex: digest.to_hex(),
                keys_per_second,
                keys_tested: self.cursor.keys_tested,
            }),
        )
    }

    fn advance(&mut self, events: &Sender<WorkerEvent>) -> WorkerState {
        let step = self.steps.next(&mut self.rng);
        self.cursor.position += step;

        if self.range.contains(&self.cursor.position) {
            return WorkerState::Running;
        }
        if !self.options.wraparound {
            return WorkerState::Exhausted;
        }

        self.cursor.position = self.range.start().clone();
        self.cursor.passes += 1;
        debug!(worker = self.worker, pass = self.cursor.passes, "Wrapped to range start");

        let event = WorkerEvent::Wrapped {
            worker: self.worker,
            pass: self.cursor.passes,
        };
        if self.emit(events, event) {
            WorkerState::Running
        } else {
            WorkerState::Cancelled
        }
    }

    /// Blocks while the channel is full. `false` once the coordinator is gone.
    fn emit(&self, events: &Sender<WorkerEvent>, event: WorkerEvent) -> bool {
        events.send(event).is_ok()
    }
}
