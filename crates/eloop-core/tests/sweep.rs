use eloop::core::domain::{DomainSpec, SweepPoint};
use eloop::core::io::checkpoint::{CheckpointReader, Encoding};
use eloop::core::series::{ResultValue, SeriesSpec, SeriesTag};
use eloop::engine::config::{SweepConfig, SweepConfigBuilder};
use eloop::engine::error::{EngineError, SolverError};
use eloop::engine::progress::{Progress, ProgressReporter};
use eloop::engine::solver::Solver;
use eloop::workflows::sweep;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Scalar `x² + parameter` for every tag, with optional injected failures.
#[derive(Default)]
struct MockSolver {
    fail_construct_at: Option<usize>,
    fail_extract_at: Option<usize>,
    constructed: AtomicUsize,
    destroyed: AtomicUsize,
    extracted_tags: Mutex<HashSet<SeriesTag>>,
}

impl MockSolver {
    fn failing_construct(index: usize) -> Self {
        Self {
            fail_construct_at: Some(index),
            ..Self::default()
        }
    }

    fn failing_extract(index: usize) -> Self {
        Self {
            fail_extract_at: Some(index),
            ..Self::default()
        }
    }
}

impl Solver for MockSolver {
    type Handle = SweepPoint;

    fn construct(&self, point: SweepPoint, _: &SweepConfig) -> Result<SweepPoint, SolverError> {
        if self.fail_construct_at == Some(point.index) {
            return Err(SolverError::new("hamiltonian is singular"));
        }
        self.constructed.fetch_add(1, Ordering::SeqCst);
        Ok(point)
    }

    fn extract(
        &self,
        point: &mut SweepPoint,
        tag: &SeriesTag,
        parameter: u32,
    ) -> Result<ResultValue, SolverError> {
        if self.fail_extract_at == Some(point.index) {
            return Err(SolverError::new("self-energy did not converge"));
        }
        self.extracted_tags.lock().unwrap().insert(tag.clone());
        let x = point.coordinate;
        Ok(ResultValue::Scalar(x * x + parameter as f64))
    }

    fn destroy(&self, _: SweepPoint) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

fn config(points: usize, workers: usize, checkpoint: Option<(&Path, Encoding)>) -> SweepConfig {
    let mut builder = SweepConfigBuilder::new()
        .label("TEST")
        .domain(DomainSpec::Linear {
            start: 0.0,
            end: (points - 1) as f64,
            count: points,
        })
        .workers(workers)
        .series(SeriesSpec::new("T", 0));
    if let Some((path, encoding)) = checkpoint {
        builder = builder.checkpoint(path, encoding);
    }
    builder.build().unwrap()
}

#[test]
fn ten_points_over_three_workers_produce_one_ordered_block() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sweep.dat");
    let config = config(10, 3, Some((path.as_path(), Encoding::Text)));
    let solver = MockSolver::default();

    let report = sweep::run(&config, &solver, &ProgressReporter::new()).unwrap();

    let series = report.series.get(&SeriesTag::new("T")).unwrap();
    assert_eq!(series.len(), 10);
    let coords: Vec<f64> = series.records().iter().map(|r| r.coordinate).collect();
    assert_eq!(coords, (0..10).map(|i| i as f64).collect::<Vec<_>>());
    assert_eq!(report.blocks_written, 1);
    assert_eq!(report.checkpoint.as_deref(), Some(path.as_path()));

    let blocks = CheckpointReader::read_all(&path, Encoding::Text).unwrap();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].tag, SeriesTag::new("T"));
    assert_eq!(blocks[0].count(), 10);
    assert_eq!(blocks[0].records, series.records());
}

#[test]
fn repeated_runs_append_identical_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sweep.bin");
    let config = config(10, 3, Some((path.as_path(), Encoding::Binary)));

    sweep::run(&config, &MockSolver::default(), &ProgressReporter::new()).unwrap();
    let first_size = std::fs::metadata(&path).unwrap().len();
    sweep::run(&config, &MockSolver::default(), &ProgressReporter::new()).unwrap();

    let blocks = CheckpointReader::read_all(&path, Encoding::Binary).unwrap();
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0], blocks[1]);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 2 * first_size);
}

#[test]
fn disabled_series_is_never_computed_nor_written() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sweep.dat");
    let config = SweepConfigBuilder::new()
        .domain(DomainSpec::Stepped {
            start: -1.0,
            end: 1.0,
            step: 0.25,
        })
        .workers(2)
        .series(SeriesSpec::transmission(0))
        .series(SeriesSpec::current(0, 0).with_enabled(false))
        .checkpoint(&path, Encoding::Text)
        .build()
        .unwrap();
    let solver = MockSolver::default();

    let report = sweep::run(&config, &solver, &ProgressReporter::new()).unwrap();

    let extracted = solver.extracted_tags.lock().unwrap();
    assert!(extracted.contains(&SeriesTag::transmission()));
    assert!(!extracted.contains(&SeriesTag::current(0)));

    assert!(report.series.get(&SeriesTag::current(0)).unwrap().is_empty());
    let blocks = CheckpointReader::read_all(&path, Encoding::Text).unwrap();
    let tags: Vec<&SeriesTag> = blocks.iter().map(|b| &b.tag).collect();
    assert_eq!(tags, vec![&SeriesTag::transmission()]);
    assert_eq!(blocks[0].count(), 9);
}

#[test]
fn construction_failure_leaves_prior_blocks_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sweep.dat");
    let config = config(12, 4, Some((path.as_path(), Encoding::Text)));

    sweep::run(&config, &MockSolver::default(), &ProgressReporter::new()).unwrap();
    let before = std::fs::read(&path).unwrap();

    let failing = MockSolver::failing_construct(7);
    let err = sweep::run(&config, &failing, &ProgressReporter::new()).unwrap_err();
    assert!(
        matches!(err, EngineError::SolverConstruction { index: 7, .. }),
        "unexpected error: {err}"
    );

    assert_eq!(std::fs::read(&path).unwrap(), before);
}

#[test]
fn construction_failure_on_the_coordinator_is_reported() {
    let config = config(6, 3, None);
    let err = sweep::run(
        &config,
        &MockSolver::failing_construct(0),
        &ProgressReporter::new(),
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::SolverConstruction { index: 0, .. }));
}

#[test]
fn merged_results_do_not_depend_on_pool_size() {
    let reference = sweep::run(&config(17, 1, None), &MockSolver::default(), &ProgressReporter::new())
        .unwrap()
        .series;

    for workers in 2..=8 {
        let report = sweep::run(
            &config(17, workers, None),
            &MockSolver::default(),
            &ProgressReporter::new(),
        )
        .unwrap();
        assert_eq!(report.series, reference, "pool of {workers} diverged");
    }
}

#[test]
fn more_workers_than_points_still_merges() {
    let report = sweep::run(&config(2, 5, None), &MockSolver::default(), &ProgressReporter::new())
        .unwrap();
    assert_eq!(report.series.get(&SeriesTag::new("T")).unwrap().len(), 2);
}

#[test]
fn non_zero_coordinator_rank_owns_the_report() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sweep.dat");
    let config = SweepConfigBuilder::new()
        .domain(DomainSpec::Explicit(vec![0.1, 0.2, 0.4, 0.8, 1.6]))
        .workers(3)
        .coordinator_rank(2)
        .series(SeriesSpec::new("T", 1))
        .checkpoint(&path, Encoding::Text)
        .build()
        .unwrap();

    let report = sweep::run(&config, &MockSolver::default(), &ProgressReporter::new()).unwrap();
    assert_eq!(report.points, 5);
    assert_eq!(CheckpointReader::read_all(&path, Encoding::Text).unwrap().len(), 1);
}

#[test]
fn every_handle_is_released_once_per_point() {
    let solver = MockSolver::default();
    sweep::run(&config(25, 4, None), &solver, &ProgressReporter::new()).unwrap();
    assert_eq!(solver.constructed.load(Ordering::SeqCst), 25);
    assert_eq!(solver.destroyed.load(Ordering::SeqCst), 25);
}

#[test]
fn handles_are_released_when_extraction_fails() {
    let solver = MockSolver::failing_extract(5);
    let err = sweep::run(&config(10, 2, None), &solver, &ProgressReporter::new()).unwrap_err();
    assert!(matches!(err, EngineError::SolverCompute { index: 5, .. }));
    assert_eq!(
        solver.constructed.load(Ordering::SeqCst),
        solver.destroyed.load(Ordering::SeqCst)
    );
}

#[test]
fn progress_is_bracketed_by_start_and_finish_signals() {
    let events = Mutex::new(Vec::new());
    let reporter = ProgressReporter::with_callback(Box::new(|event| {
        events.lock().unwrap().push(event);
    }));

    sweep::run(&config(9, 3, None), &MockSolver::default(), &reporter).unwrap();
    assert_eq!(reporter.completed(), 9);
    drop(reporter);

    let events = events.into_inner().unwrap();
    assert_eq!(
        events.first(),
        Some(&Progress::PhaseStart {
            name: "TEST".to_string()
        })
    );
    assert_eq!(events[1], Progress::TaskStart { total_steps: 9 });
    let increments = events
        .iter()
        .filter(|e| matches!(e, Progress::TaskIncrement))
        .count();
    assert_eq!(increments, 9);
    assert_eq!(events[events.len() - 2], Progress::TaskFinish);
    assert_eq!(events.last(), Some(&Progress::PhaseFinish));
}

#[test]
fn invalid_domain_fails_before_any_compute() {
    let config = SweepConfig {
        domain: DomainSpec::Explicit(vec![1.0, 0.5]),
        ..config(3, 1, None)
    };
    let solver = MockSolver::default();
    let err = sweep::run(&config, &solver, &ProgressReporter::new()).unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
    assert_eq!(solver.constructed.load(Ordering::SeqCst), 0);
}

#[test]
fn unopenable_checkpoint_fails_the_sweep_after_compute() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(6, 2, Some((dir.path(), Encoding::Text)));
    let solver = MockSolver::default();

    let err = sweep::run(&config, &solver, &ProgressReporter::new()).unwrap_err();
    assert!(matches!(err, EngineError::Checkpoint(_)));
    assert_eq!(solver.constructed.load(Ordering::SeqCst), 6);
    assert_eq!(solver.destroyed.load(Ordering::SeqCst), 6);
}

#[test]
fn saving_reports_the_appended_blocks_before_finishing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sweep.bin");
    let events = Mutex::new(Vec::new());
    let reporter = ProgressReporter::with_callback(Box::new(|event| {
        events.lock().unwrap().push(event);
    }));

    sweep::run(
        &config(4, 2, Some((path.as_path(), Encoding::Binary))),
        &MockSolver::default(),
        &reporter,
    )
    .unwrap();
    drop(reporter);

    let events = events.into_inner().unwrap();
    let n = events.len();
    assert_eq!(events[n - 3], Progress::TaskFinish);
    let Progress::Message(message) = &events[n - 2] else {
        panic!("Expected a message after the checkpoint write, got {:?}", events[n - 2]);
    };
    assert!(message.starts_with("1 block(s) appended to"));
    assert!(message.contains("sweep.bin"));
    assert_eq!(events[n - 1], Progress::PhaseFinish);
}
