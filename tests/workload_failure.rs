#![cfg(not(loom))]

use core::sync::atomic::{AtomicUsize, Ordering};

use rmwcheck::workload::{self, ConcurrentWorkload};
use rmwcheck::{
    AtomicCell, CellKind, CounterCell, Experiment, HarnessError, Update, UpdateStrategy,
    WorkloadConfig,
};

/// Panics on the `fail_at`-th application overall.
struct PanicsAt {
    calls: AtomicUsize,
    fail_at: usize,
}

impl<C: AtomicCell> Update<C> for PanicsAt {
    fn apply(&self, cell: &C) -> u64 {
        if self.calls.fetch_add(1, Ordering::SeqCst) == self.fail_at {
            panic!("injected failure");
        }
        cell.fetch_step();
        0
    }
}

/// Counts how often it is applied without touching the cell.
struct Tally(AtomicUsize);

impl<C: AtomicCell> Update<C> for Tally {
    fn apply(&self, _cell: &C) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst);
        0
    }
}

#[test]
fn panicking_worker_fails_the_run() {
    let cell = CounterCell::new(0);
    let update = PanicsAt {
        calls: AtomicUsize::new(0),
        fail_at: 500,
    };

    let err = workload::run(&cell, &update, 4, 1_000).unwrap_err();
    match err {
        HarnessError::WorkerFailure { worker, reason } => {
            assert!(worker < 4);
            assert_eq!(reason, "injected failure");
        }
        other => panic!("expected WorkerFailure, got {other:?}"),
    }
}

#[test]
fn every_worker_applies_exactly_its_iterations() {
    let cell = CounterCell::new(0);
    let tally = Tally(AtomicUsize::new(0));
    let report = workload::run(&cell, &tally, 6, 1_234).unwrap();

    assert_eq!(report.total_operations, 6 * 1_234);
    assert_eq!(tally.0.load(Ordering::SeqCst), 6 * 1_234);
    assert_eq!(report.cas_retries, 0);
    assert_eq!(cell.load(), 0);
}

#[test]
fn invalid_configuration_spawns_nothing() {
    let cell = CounterCell::new(0);
    let tally = Tally(AtomicUsize::new(0));

    for (threads, iterations) in [(0, 10), (10, 0), (0, 0)] {
        let err = workload::run(&cell, &tally, threads, iterations).unwrap_err();
        assert!(matches!(err, HarnessError::InvalidConfiguration(_)), "{err}");
    }
    assert!(matches!(
        ConcurrentWorkload::new(WorkloadConfig::new(usize::MAX, usize::MAX)),
        Err(HarnessError::InvalidConfiguration(_))
    ));
    assert_eq!(tally.0.load(Ordering::SeqCst), 0);

    let err = Experiment::new(CellKind::Flag, UpdateStrategy::Fused, WorkloadConfig::new(0, 1))
        .run()
        .unwrap_err();
    assert!(matches!(err, HarnessError::InvalidConfiguration(_)));
}

#[test]
fn workload_can_be_rerun() {
    let w = ConcurrentWorkload::new(WorkloadConfig::new(2, 50)).unwrap();
    let cell = CounterCell::new(0);
    for round in 1..=3u64 {
        let report = w.run(&cell, &UpdateStrategy::CasRetry).unwrap();
        assert_eq!(report.total_operations, 100);
        assert_eq!(cell.load(), round * 100);
    }
}
