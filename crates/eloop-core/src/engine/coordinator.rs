use super::config::{ConfigError, SweepConfig};
use super::error::EngineError;
use super::gather;
use super::progress::{Progress, ProgressReporter};
use super::solver::{ScopedHandle, Solver};
use super::state::{SweepLifecycle, SweepState};
use super::transport::{Communicator, Role};
use crate::core::domain::PointDomain;
use crate::core::io::checkpoint::CheckpointWriter;
use crate::core::partition::{Partitioner, WorkerPartition};
use crate::core::series::{ResultRecord, SeriesSet};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, instrument, trace, warn};

/// What the coordinator rank hands back after a successful sweep.
#[derive(Debug, Clone)]
pub struct SweepReport {
    /// Every configured series; enabled ones hold exactly one record per sweep point.
    pub series: SeriesSet,
    pub points: usize,
    pub blocks_written: usize,
    pub checkpoint: Option<PathBuf>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub enum RankOutcome {
    Coordinator(SweepReport),
    Worker { rank: usize, points_computed: usize },
}

impl RankOutcome {
    pub fn into_report(self) -> Option<SweepReport> {
        match self {
            RankOutcome::Coordinator(report) => Some(report),
            RankOutcome::Worker { .. } => None,
        }
    }
}

/// Drives one rank through a sweep: barrier, local compute over its partition, gather, and
/// (on the coordinator only) merge and checkpoint.
pub struct SweepCoordinator<'a, S: Solver, C: Communicator> {
    config: &'a SweepConfig,
    domain: &'a PointDomain,
    partitioner: &'a Partitioner,
    partition: WorkerPartition,
    solver: &'a S,
    comm: C,
    reporter: &'a ProgressReporter<'a>,
    lifecycle: SweepLifecycle,
}

impl<'a, S: Solver, C: Communicator> SweepCoordinator<'a, S, C> {
    pub fn new(
        config: &'a SweepConfig,
        domain: &'a PointDomain,
        partitioner: &'a Partitioner,
        solver: &'a S,
        comm: C,
        reporter: &'a ProgressReporter<'a>,
    ) -> Result<Self, EngineError> {
        let partition = partitioner
            .partition(comm.rank())
            .map_err(ConfigError::from)?;
        let lifecycle = SweepLifecycle::new(partition.rank);
        Ok(Self {
            config,
            domain,
            partitioner,
            partition,
            solver,
            comm,
            reporter,
            lifecycle,
        })
    }

    #[inline]
    pub fn state(&self) -> SweepState {
        self.lifecycle.state()
    }

    #[inline]
    pub fn role(&self) -> Role {
        self.comm.role()
    }

    #[instrument(skip_all, name = "sweep_rank", fields(rank = self.comm.rank()))]
    pub fn run(mut self) -> Result<RankOutcome, EngineError> {
        match self.execute() {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.lifecycle.fail();
                Err(e)
            }
        }
    }

    fn execute(&mut self) -> Result<RankOutcome, EngineError> {
        let started = Instant::now();
        let role = self.role();

        self.lifecycle.advance(SweepState::Prepared)?;
        if role == Role::Coordinator {
            self.reporter.report(Progress::PhaseStart {
                name: self.config.label.clone(),
            });
            self.reporter.report(Progress::TaskStart {
                total_steps: self.domain.len() as u64,
            });
        }
        self.comm.barrier()?;

        self.lifecycle.advance(SweepState::LocalCompute)?;
        let mut local = self.compute_partition()?;

        self.lifecycle.advance(SweepState::Gathering)?;
        if role == Role::Worker {
            let sent = gather::submit(&self.comm, &mut local)?;
            self.lifecycle.advance(SweepState::Merged)?;
            self.lifecycle.advance(SweepState::Saved)?;
            self.lifecycle.advance(SweepState::Done)?;
            info!(rank = self.partition.rank, records = sent, "Worker finished.");
            return Ok(RankOutcome::Worker {
                rank: self.partition.rank,
                points_computed: self.partition.len(),
            });
        }

        let mut merged = SeriesSet::from_specs(&self.config.series, self.domain.len());
        gather::collect(
            &self.comm,
            self.partitioner,
            self.domain,
            &mut local,
            &mut merged,
        )?;
        self.reporter.report(Progress::TaskFinish);
        self.lifecycle.advance(SweepState::Merged)?;
        info!(
            points = self.domain.len(),
            series = merged.enabled().count(),
            "All ranks gathered and merged."
        );

        let (blocks_written, checkpoint) = match &self.config.checkpoint {
            Some(target) => {
                let mut writer = CheckpointWriter::open_append(&target.path, target.encoding)?;
                let written = writer.write_enabled(merged.enabled())?;
                self.reporter.report(Progress::Message(format!(
                    "{written} block(s) appended to {}",
                    target.path.display()
                )));
                (written, Some(target.path.clone()))
            }
            None => (0, None),
        };
        self.lifecycle.advance(SweepState::Saved)?;

        self.lifecycle.advance(SweepState::Done)?;
        self.reporter.report(Progress::PhaseFinish);

        Ok(RankOutcome::Coordinator(SweepReport {
            series: merged,
            points: self.domain.len(),
            blocks_written,
            checkpoint,
            elapsed: started.elapsed(),
        }))
    }

    /// Computes every point of this rank's partition in ascending index order.
    fn compute_partition(&self) -> Result<SeriesSet, EngineError> {
        let mut local = SeriesSet::from_specs(&self.config.series, self.partition.len());
        let enabled: Vec<_> = self.config.enabled_series().collect();

        info!(
            rank = self.partition.rank,
            start = self.partition.range.start,
            end = self.partition.range.end,
            series = enabled.len(),
            "Starting local compute."
        );
        if enabled.is_empty() {
            warn!(rank = self.partition.rank, "No series is enabled; skipping solver calls.");
        }

        for index in self.partition.indices() {
            let point = self.domain.point(index).ok_or_else(|| {
                EngineError::Internal(format!("index {index} lies outside the sweep domain"))
            })?;

            if !enabled.is_empty() {
                let mut handle = ScopedHandle::acquire(self.solver, point, self.config).map_err(
                    |source| EngineError::SolverConstruction {
                        index,
                        coordinate: point.coordinate,
                        source,
                    },
                )?;

                for spec in &enabled {
                    let value = handle.extract(&spec.tag, spec.parameter).map_err(|source| {
                        EngineError::SolverCompute {
                            tag: spec.tag.clone(),
                            index,
                            coordinate: point.coordinate,
                            source,
                        }
                    })?;
                    trace!(index, coordinate = point.coordinate, tag = %spec.tag, ?value, "Point computed.");
                    local.append(&spec.tag, ResultRecord::new(point.coordinate, value))?;
                }
                handle.release();
            }

            self.comm.heartbeat();
        }

        Ok(local)
    }
}
