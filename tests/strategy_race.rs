//! Empirical behaviour of the three strategies under real contention.

#![cfg(not(loom))]

use core::num::NonZeroUsize;
use core::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use rmwcheck::experiment::run_on;
use rmwcheck::workload;
use rmwcheck::{
    AtomicCell, CellKind, CellValue, CounterCell, Experiment, FlagCell, UpdateStrategy,
    WorkloadConfig,
};

#[test]
fn fused_flag_ten_by_thousand_ends_false() {
    let outcome = Experiment::new(
        CellKind::Flag,
        UpdateStrategy::Fused,
        WorkloadConfig::new(10, 1_000),
    )
    .run()
    .unwrap();

    assert_eq!(outcome.report.total_operations, 10_000);
    assert_eq!(outcome.verification.expected, CellValue::Flag(false));
    assert_eq!(outcome.verification.observed, CellValue::Flag(false));
    assert!(outcome.verification.consistent);
}

#[test]
fn cas_counter_five_by_ten_thousand_is_exact() {
    let cell = CounterCell::new(0);
    let report = workload::run(&cell, &UpdateStrategy::CasRetry, 5, 10_000).unwrap();

    assert_eq!(report.total_operations, 50_000);
    assert_eq!(cell.load(), 50_000);
}

/// Lost updates need two workers inside `apply` at the same instant, which a
/// single CPU only produces through preemption between the load and the
/// store. On such machines the property is not observable and the test
/// returns early. The interleaving itself is proven deterministically by
/// `tests/loom_model.rs`.
#[test]
fn naive_counter_loses_updates_over_repeated_trials() {
    let cpus = thread::available_parallelism().map_or(1, NonZeroUsize::get);
    if cpus < 2 {
        eprintln!("{cpus} CPU available: naive lost updates cannot be observed empirically");
        return;
    }

    let summary = Experiment::new(
        CellKind::Counter,
        UpdateStrategy::Naive,
        WorkloadConfig::new(5, 10_000),
    )
    .trials(100)
    .unwrap();

    assert_eq!(summary.trials, 100);
    assert!(
        summary.races_detected >= 1,
        "naive load/store never lost an update in 100 trials"
    );
    let worst = summary.worst.expect("a race implies a worst run");
    assert!(worst.lost_updates().unwrap() > 0);
    match worst.observed {
        CellValue::Counter(observed) => assert!(observed < 50_000),
        CellValue::Flag(_) => unreachable!("counter experiment"),
    }
}

#[test]
fn linearizable_strategies_are_always_consistent() {
    let configs = [
        WorkloadConfig::new(1, 1),
        WorkloadConfig::new(2, 3),
        WorkloadConfig::new(7, 1_001),
        WorkloadConfig::new(16, 500),
    ];
    for strategy in [UpdateStrategy::CasRetry, UpdateStrategy::Fused] {
        for kind in CellKind::ALL {
            for config in configs {
                let summary = Experiment::new(kind, strategy, config).trials(5).unwrap();
                assert_eq!(
                    summary.races_detected, 0,
                    "{strategy} on {kind} with {config:?} lost an update"
                );
            }
        }
    }
}

#[test]
fn non_default_initial_values_verify() {
    for strategy in [UpdateStrategy::CasRetry, UpdateStrategy::Fused] {
        let outcome = Experiment::new(CellKind::Counter, strategy, WorkloadConfig::new(3, 333))
            .with_initial(CellValue::Counter(1_000))
            .run()
            .unwrap();
        assert_eq!(outcome.verification.observed, CellValue::Counter(1_999));
        assert!(outcome.verification.consistent);

        let outcome = Experiment::new(CellKind::Flag, strategy, WorkloadConfig::new(3, 333))
            .with_initial(CellValue::Flag(true))
            .run()
            .unwrap();
        // 999 toggles from true.
        assert_eq!(outcome.verification.observed, CellValue::Flag(false));
        assert!(outcome.verification.consistent);
    }
}

#[test]
fn run_on_borrowed_cell_verifies_relative_to_its_start() {
    let flag = FlagCell::new(true);
    let (report, verdict) =
        run_on(&flag, UpdateStrategy::Fused, WorkloadConfig::new(4, 250)).unwrap();
    assert_eq!(report.total_operations, 1_000);
    assert!(verdict.consistent);
    assert!(flag.load());
}

fn assert_monotonic(strategy: UpdateStrategy) {
    let cell = CounterCell::new(0);
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        let observer = s.spawn(|| {
            let mut last = 0;
            while !done.load(Ordering::Acquire) {
                let now = cell.load();
                assert!(now >= last, "{strategy}: counter went from {last} to {now}");
                last = now;
            }
        });

        workload::run(&cell, &strategy, 4, 20_000).unwrap();
        done.store(true, Ordering::Release);
        observer.join().unwrap();
    });

    assert_eq!(cell.load(), 80_000);
}

#[test]
fn cas_counter_never_decreases_mid_run() {
    assert_monotonic(UpdateStrategy::CasRetry);
}

#[test]
fn fused_counter_never_decreases_mid_run() {
    assert_monotonic(UpdateStrategy::Fused);
}
