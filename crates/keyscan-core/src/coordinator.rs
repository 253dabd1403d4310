//! Scan coordinator: validation, worker lifecycle, event aggregation

use std::any::Any;
use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use keyscan_crypto::{KeyDeriver, Secp256k1};
use num_bigint::BigUint;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ScanConfig, ScanPlan};
use crate::error::{Result, ScanError};
use crate::event::{CandidateError, FinishReason, FoundKey, ScanEvent, WorkerEvent, WorkerId};
use crate::scanner::{RangeScanner, WorkerReport, WorkerState};
use crate::stats::{CancelToken, ScanStats};

/// Final result of a scan
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub matched: bool,
    pub reason: FinishReason,
    pub found: Option<FoundKey>,
    pub keys_tested: u64,
    pub elapsed_secs: f64,
    pub keys_per_second: f64,
    /// One entry per worker, ordered by id
    pub workers: Vec<WorkerReport>,
}

/// Runs a validated scan across one or more worker threads.
///
/// The range is split into one contiguous sub-range per worker. The first
/// `Found` cancels every other worker through the shared [`ScanStats`];
/// when all workers stop without one the scan finishes unmatched.
/// Progress, error and wrap events are handed to the caller's callback on
/// the calling thread.
pub struct Coordinator {
    plan: ScanPlan,
    deriver: Arc<dyn KeyDeriver>,
    stats: Arc<ScanStats>,
}

impl Coordinator {
    /// Validate `config`. Nothing is spawned on error.
    pub fn new(config: &ScanConfig) -> Result<Self> {
        Ok(Self::from_plan(config.validate()?))
    }

    pub fn from_plan(plan: ScanPlan) -> Self {
        Self {
            plan,
            deriver: Arc::new(Secp256k1),
            stats: ScanStats::new(),
        }
    }

    /// Replace the secp256k1 deriver
    pub fn with_deriver(mut self, deriver: Arc<dyn KeyDeriver>) -> Self {
        self.deriver = deriver;
        self
    }

    pub fn plan(&self) -> &ScanPlan {
        &self.plan
    }

    /// Shared stats, live while the scan runs
    pub fn stats(&self) -> Arc<ScanStats> {
        self.stats.clone()
    }

    /// Handle for cancelling the scan from another thread
    pub fn cancel_token(&self) -> CancelToken {
        CancelToken::new(self.stats.clone())
    }

    /// Run the scan to completion, reporting every event to `on_event`
    pub fn run<F>(self, mut on_event: F) -> ScanSummary
    where
        F: FnMut(&ScanEvent),
    {
        let plan = &self.plan;
        let ranges = plan.range.partition(plan.workers);
        if ranges.len() < plan.workers {
            warn!(
                requested = plan.workers,
                used = ranges.len(),
                "Range too small for the requested workers"
            );
        }
        info!(
            range = %plan.range,
            workers = ranges.len(),
            wraparound = plan.options.wraparound,
            threshold = ?plan.options.threshold,
            digest = %plan.options.target,
            "Starting scan"
        );

        self.stats.start();

        // Declared before the channel so that it drops after it: blocked
        // senders are released before the guard joins their threads.
        let mut pool = WorkerPool::new(self.stats.clone());
        let (tx, rx) = bounded::<WorkerEvent>(plan.channel_capacity);

        for (worker, range) in ranges.into_iter().enumerate() {
            if let Some(threshold) = &plan.options.threshold {
                if range.end() < threshold {
                    debug!(worker, range = %range, "Range below threshold, not started");
                    pool.skip(worker, WorkerReport::below_threshold(worker));
                    continue;
                }
            }

            let position = range.start().clone();
            let scanner = RangeScanner::new(
                worker,
                range,
                plan.options.clone(),
                self.deriver.clone(),
                self.stats.clone(),
                plan.rng_for(worker),
            );
            if let Err(err) = pool.spawn(scanner, tx.clone()) {
                warn!(worker, %err, "Worker did not start");
                on_event(&ScanEvent::Error(CandidateError {
                    worker,
                    position,
                    message: err.to_string(),
                }));
            }
        }
        drop(tx);

        // A limit too far out to represent is no limit
        let deadline = plan
            .max_time
            .and_then(|limit| Instant::now().checked_add(limit));
        let mut timed_out = false;
        let mut found: Option<FoundKey> = None;

        loop {
            let event = match deadline.filter(|_| !timed_out) {
                Some(deadline) => match rx.recv_deadline(deadline) {
                    Ok(event) => event,
                    Err(RecvTimeoutError::Timeout) => {
                        info!("Time limit reached, stopping workers");
                        timed_out = true;
                        self.stats.stop();
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match rx.recv() {
                    Ok(event) => event,
                    Err(_) => break,
                },
            };

            match event {
                WorkerEvent::Found(key) => {
                    if self.stats.is_found() {
                        debug!(worker = key.worker, "Ignoring later match");
                        continue;
                    }
                    self.stats.mark_found();
                    info!(
                        worker = key.worker,
                        private_key = %key.private_key_hex,
                        "Match found"
                    );
                    on_event(&ScanEvent::Found(key.clone()));
                    found = Some(key);
                }
                WorkerEvent::Progress(report) => on_event(&ScanEvent::Progress(report)),
                WorkerEvent::Error(err) => on_event(&ScanEvent::Error(err)),
                WorkerEvent::Wrapped { worker, pass } => {
                    on_event(&ScanEvent::Wrapped { worker, pass })
                }
            }
        }

        let workers = pool.join_all(|failure| {
            warn!(worker = failure.worker, message = %failure.message, "Worker failed");
            on_event(&ScanEvent::Error(failure));
        });

        let reason = if found.is_some() {
            FinishReason::Found
        } else if timed_out {
            FinishReason::TimedOut
        } else if workers.iter().any(|w| w.state == WorkerState::Cancelled) {
            FinishReason::Cancelled
        } else {
            FinishReason::Exhausted
        };
        let matched = found.is_some();
        on_event(&ScanEvent::Finished { matched, reason });

        let summary = ScanSummary {
            matched,
            reason,
            found,
            keys_tested: self.stats.total_keys(),
            elapsed_secs: self.stats.elapsed().as_secs_f64(),
            keys_per_second: self.stats.keys_per_second(),
            workers,
        };
        info!(
            ?reason,
            keys_tested = summary.keys_tested,
            elapsed_secs = summary.elapsed_secs,
            "Scan finished"
        );
        summary
    }
}

struct WorkerHandle {
    start: BigUint,
    thread: JoinHandle<WorkerReport>,
}

/// Owns the worker threads of one scan. Dropping it cancels and joins any
/// worker still attached.
struct WorkerPool {
    stats: Arc<ScanStats>,
    handles: BTreeMap<WorkerId, WorkerHandle>,
    reports: BTreeMap<WorkerId, WorkerReport>,
}

impl WorkerPool {
    fn new(stats: Arc<ScanStats>) -> Self {
        Self {
            stats,
            handles: BTreeMap::new(),
            reports: BTreeMap::new(),
        }
    }

    fn spawn(&mut self, scanner: RangeScanner, events: Sender<WorkerEvent>) -> Result<()> {
        let worker = scanner.worker();
        let start = scanner.range().start().clone();

        let spawned = thread::Builder::new()
            .name(format!("keyscan-worker-{worker}"))
            .spawn(move || scanner.run(&events));

        match spawned {
            Ok(thread) => {
                self.handles.insert(worker, WorkerHandle { start, thread });
                Ok(())
            }
            Err(err) => {
                self.reports.insert(worker, WorkerReport::failed(worker));
                Err(ScanError::WorkerFailure {
                    worker,
                    message: err.to_string(),
                })
            }
        }
    }

    /// Record a worker that is never spawned
    fn skip(&mut self, worker: WorkerId, report: WorkerReport) {
        self.reports.insert(worker, report);
    }

    /// Join every worker. Panicked workers are reported through
    /// `on_failure` and recorded as failed.
    fn join_all<F>(&mut self, mut on_failure: F) -> Vec<WorkerReport>
    where
        F: FnMut(CandidateError),
    {
        for (worker, handle) in mem::take(&mut self.handles) {
            let report = match handle.thread.join() {
                Ok(report) => report,
                Err(payload) => {
                    let err = ScanError::WorkerFailure {
                        worker,
                        message: panic_message(payload.as_ref()),
                    };
                    on_failure(CandidateError {
                        worker,
                        position: handle.start,
                        message: err.to_string(),
                    });
                    WorkerReport::failed(worker)
                }
            };
            self.reports.insert(worker, report);
        }
        mem::take(&mut self.reports).into_values().collect()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        self.stats.stop();
        for (worker, handle) in mem::take(&mut self.handles) {
            if handle.thread.join().is_err() {
                warn!(worker, "Worker panicked during shutdown");
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use keyscan_crypto::{CompressedPublicKey, DeriveError};
    use std::time::Duration;

    const KEY5_HASH: &str = "4747e8746cddb33b0f7f95a90f89f89fb387cbb6";
    const KEY600_HASH: &str = "eabc057e541066fe67b1d94557f4c7b8f9d583bf";
    const UNMATCHED: &str = "0000000000000000000000000000000000000000";

    fn config(target: &str, start: &str, end: &str) -> ScanConfig {
        ScanConfig {
            target: target.to_string(),
            range_start: start.to_string(),
            range_end: end.to_string(),
            min_step: "1".to_string(),
            max_step: "1".to_string(),
            seed: Some(11),
            ..Default::default()
        }
    }

    fn run_collect(coordinator: Coordinator) -> (ScanSummary, Vec<ScanEvent>) {
        let mut events = Vec::new();
        let summary = coordinator.run(|event| events.push(event.clone()));
        (summary, events)
    }

    #[test]
    fn test_sequential_scan_finds_key_five() {
        // 0x64 = 100
        let coordinator = Coordinator::new(&config(KEY5_HASH, "1", "64")).unwrap();
        let (summary, events) = run_collect(coordinator);

        assert!(summary.matched);
        assert_eq!(summary.reason, FinishReason::Found);
        let found = summary.found.unwrap();
        assert!(found.private_key_hex.ends_with("05"));
        assert_eq!(found.position, BigUint::from(5u32));
        assert_eq!(summary.workers.len(), 1);
        assert_eq!(summary.workers[0].state, WorkerState::Found);
        assert!(summary.workers[0].iterations <= 5);

        assert!(matches!(events.last(), Some(ScanEvent::Finished { matched: true, .. })));
        assert_eq!(
            events.iter().filter(|e| matches!(e, ScanEvent::Found(_))).count(),
            1
        );
    }

    #[test]
    fn test_exhausts_without_match() {
        let mut c = config(UNMATCHED, "1", "a");
        c.wraparound = false;
        c.report_interval = 1;
        let (summary, events) = run_collect(Coordinator::new(&c).unwrap());

        assert!(!summary.matched);
        assert_eq!(summary.reason, FinishReason::Exhausted);
        assert_eq!(summary.keys_tested, 10);
        assert_eq!(summary.workers[0].state, WorkerState::Exhausted);
        assert_eq!(summary.workers[0].iterations, 10);

        assert!(!events.iter().any(|e| matches!(e, ScanEvent::Found(_))));
        let positions: Vec<BigUint> = events
            .iter()
            .filter_map(|e| match e {
                ScanEvent::Progress(p) => Some(p.position.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(positions, (1u32..=10).map(BigUint::from).collect::<Vec<_>>());
        assert!(matches!(
            events.last(),
            Some(ScanEvent::Finished {
                matched: false,
                reason: FinishReason::Exhausted
            })
        ));
    }

    #[test]
    fn test_rejects_inverted_range_before_spawning() {
        let err = Coordinator::new(&config(KEY5_HASH, "64", "1")).err().unwrap();
        assert!(matches!(
            err,
            ScanError::Configuration(ConfigError::EmptyRange)
        ));
    }

    #[test]
    fn test_rejects_inverted_steps_before_spawning() {
        let mut c = config(KEY5_HASH, "1", "64");
        c.min_step = "10".to_string();
        c.max_step = "2".to_string();
        let err = Coordinator::new(&c).err().unwrap();
        assert!(matches!(err, ScanError::Configuration(ConfigError::StepOrder)));
    }

    #[test]
    fn test_four_workers_cancel_after_match() {
        // 0x3e8 = 1000; key 600 sits in the third quarter
        let mut c = config(KEY600_HASH, "1", "3e8");
        c.workers = 4;
        let (summary, events) = run_collect(Coordinator::new(&c).unwrap());

        assert!(summary.matched);
        let found = summary.found.unwrap();
        assert_eq!(found.position, BigUint::from(600u32));
        assert_eq!(found.worker, 2);

        assert_eq!(summary.workers.len(), 4);
        for report in &summary.workers {
            if report.worker == 2 {
                assert_eq!(report.state, WorkerState::Found);
            } else {
                // Wraparound is on, so only cancellation ends these
                assert_eq!(report.state, WorkerState::Cancelled, "worker {}", report.worker);
            }
        }
        assert_eq!(
            events.iter().filter(|e| matches!(e, ScanEvent::Found(_))).count(),
            1
        );
    }

    #[test]
    fn test_time_limit() {
        let mut c = config(UNMATCHED, "1", "ffffffffffff");
        c.max_step = "1000".to_string();
        c.max_time_secs = 1;
        let (summary, events) = run_collect(Coordinator::new(&c).unwrap());

        assert!(!summary.matched);
        assert_eq!(summary.reason, FinishReason::TimedOut);
        assert_eq!(summary.workers[0].state, WorkerState::Cancelled);
        assert!(matches!(
            events.last(),
            Some(ScanEvent::Finished {
                reason: FinishReason::TimedOut,
                ..
            })
        ));
    }

    #[test]
    fn test_unrepresentable_time_limit_means_unlimited() {
        let mut c = config(UNMATCHED, "1", "3e8");
        c.max_time_secs = u64::MAX;
        c.wraparound = false;
        let (summary, _) = run_collect(Coordinator::new(&c).unwrap());

        assert!(!summary.matched);
        assert_eq!(summary.reason, FinishReason::Exhausted);
        assert_eq!(summary.keys_tested, 1000);
    }

    #[test]
    fn test_ranges_below_threshold_are_not_started() {
        // threshold = 1 + 999 * 60 / 100 = 600; sub-ranges 1..=250 and
        // 251..=500 lie wholly below it
        let mut c = config(UNMATCHED, "1", "3e8");
        c.workers = 4;
        c.threshold_percent = Some("60".to_string());
        c.wraparound = false;
        let (summary, events) = run_collect(Coordinator::new(&c).unwrap());

        assert_eq!(summary.reason, FinishReason::Exhausted);
        assert_eq!(summary.workers.len(), 4);
        for report in &summary.workers[..2] {
            assert_eq!(report.state, WorkerState::Exhausted);
            assert_eq!(report.iterations, 0);
            assert_eq!(report.keys_tested, 0);
        }
        // 600..=750 and 751..=1000
        assert_eq!(summary.workers[2].keys_tested, 151);
        assert_eq!(summary.workers[3].keys_tested, 250);
        assert_eq!(summary.keys_tested, 401);
        assert!(!events
            .iter()
            .any(|e| matches!(e, ScanEvent::Error(err) if err.worker < 2)));
    }

    #[test]
    fn test_threshold_with_wraparound_does_not_spin_idle_workers() {
        let mut c = config(UNMATCHED, "1", "3e8");
        c.workers = 4;
        c.threshold_percent = Some("60".to_string());
        c.max_time_secs = 1;
        let (summary, events) = run_collect(Coordinator::new(&c).unwrap());

        assert_eq!(summary.reason, FinishReason::TimedOut);
        assert_eq!(summary.workers[0].iterations, 0);
        assert_eq!(summary.workers[1].iterations, 0);
        assert_eq!(summary.workers[0].passes, 0);
        assert_eq!(summary.workers[1].passes, 0);
        assert!(summary.workers[2].keys_tested > 0);
        assert!(summary.workers[3].keys_tested > 0);
        assert!(!events
            .iter()
            .any(|e| matches!(e, ScanEvent::Wrapped { worker, .. } if *worker < 2)));
    }

    #[test]
    fn test_external_cancel() {
        let mut c = config(UNMATCHED, "1", "ff");
        c.workers = 2;
        let coordinator = Coordinator::new(&c).unwrap();
        let token = coordinator.cancel_token();

        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            token.cancel();
        });
        let (summary, _) = run_collect(coordinator);
        stopper.join().unwrap();

        assert!(!summary.matched);
        assert_eq!(summary.reason, FinishReason::Cancelled);
        assert!(summary
            .workers
            .iter()
            .all(|w| w.state == WorkerState::Cancelled));
    }

    #[test]
    fn test_reduces_workers_for_tiny_ranges() {
        let mut c = config(UNMATCHED, "1", "6");
        c.workers = 8;
        c.wraparound = false;
        let (summary, _) = run_collect(Coordinator::new(&c).unwrap());

        assert_eq!(summary.workers.len(), 3);
        assert_eq!(summary.keys_tested, 6);
        assert_eq!(summary.reason, FinishReason::Exhausted);
    }

    struct PanicsOnThree;

    impl KeyDeriver for PanicsOnThree {
        fn name(&self) -> &'static str {
            "panics-on-three"
        }

        fn derive(&self, scalar: &BigUint) -> std::result::Result<CompressedPublicKey, DeriveError> {
            if *scalar == BigUint::from(3u32) {
                panic!("deriver exploded");
            }
            Secp256k1.derive(scalar)
        }
    }

    #[test]
    fn test_worker_failure_does_not_stop_others() {
        let mut c = config(UNMATCHED, "1", "14");
        c.workers = 2;
        c.wraparound = false;
        let coordinator = Coordinator::new(&c)
            .unwrap()
            .with_deriver(Arc::new(PanicsOnThree));
        let (summary, events) = run_collect(coordinator);

        assert!(!summary.matched);
        assert_eq!(summary.reason, FinishReason::Exhausted);
        assert_eq!(summary.workers[0].state, WorkerState::Failed);
        assert_eq!(summary.workers[1].state, WorkerState::Exhausted);
        assert_eq!(summary.workers[1].keys_tested, 10);

        let failure = events
            .iter()
            .find_map(|e| match e {
                ScanEvent::Error(err) if err.worker == 0 => Some(err.clone()),
                _ => None,
            })
            .unwrap();
        assert!(failure.message.contains("worker 0 failed"), "{}", failure.message);
        assert!(failure.message.contains("deriver exploded"), "{}", failure.message);
    }
}
