use crate::engine::config::SweepConfig;
use crate::engine::coordinator::{RankOutcome, SweepCoordinator, SweepReport};
use crate::engine::error::EngineError;
use crate::engine::progress::ProgressReporter;
use crate::engine::solver::Solver;
use crate::engine::transport::LocalHub;
use std::any::Any;
use std::thread;
use tracing::{error, info, instrument};

/// Runs a sweep with `config.workers` ranks as scoped threads of this process.
///
/// Every fallible setup step (domain, partition, communicators) happens before any rank is
/// spawned, so a configuration error never leaves ranks waiting at the start barrier.
///
/// # Errors
///
/// Returns the root cause when any rank fails. Transport errors in one rank are usually
/// induced by another rank aborting, so a non-transport error always takes precedence.
#[instrument(skip_all, name = "sweep_workflow", fields(label = %config.label, workers = config.workers))]
pub fn run<S: Solver>(
    config: &SweepConfig,
    solver: &S,
    reporter: &ProgressReporter,
) -> Result<SweepReport, EngineError> {
    let domain = config.point_domain()?;
    let partitioner = config.partitioner(&domain)?;
    let (first, last) = domain.bounds();
    info!(
        points = domain.len(),
        first,
        last,
        series = config.enabled_series().count(),
        "Starting sweep."
    );

    let communicators = LocalHub::communicators(config.workers, config.coordinator_rank, reporter)?;
    let ranks = communicators
        .into_iter()
        .map(|comm| SweepCoordinator::new(config, &domain, &partitioner, solver, comm, reporter))
        .collect::<Result<Vec<_>, _>>()?;

    let results: Vec<Result<RankOutcome, EngineError>> = thread::scope(|scope| {
        let handles: Vec<_> = ranks
            .into_iter()
            .map(|rank| scope.spawn(move || rank.run()))
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(rank, handle)| {
                handle.join().unwrap_or_else(|payload| {
                    Err(EngineError::RankPanicked {
                        rank,
                        message: panic_message(payload.as_ref()),
                    })
                })
            })
            .collect()
    });

    let mut report = None;
    let mut failures = Vec::new();
    for (rank, result) in results.into_iter().enumerate() {
        match result {
            Ok(RankOutcome::Coordinator(r)) => report = Some(r),
            Ok(RankOutcome::Worker { .. }) => {}
            Err(e) => {
                error!(rank, error = %e, "Rank aborted.");
                failures.push(e);
            }
        }
    }

    if let Some(cause) = root_cause(failures) {
        return Err(cause);
    }
    let report = report.ok_or_else(|| {
        EngineError::Internal("coordinator rank finished without a report".to_string())
    })?;

    info!(
        points = report.points,
        blocks = report.blocks_written,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Sweep complete."
    );
    Ok(report)
}

fn root_cause(failures: Vec<EngineError>) -> Option<EngineError> {
    let position = failures
        .iter()
        .position(|e| !e.is_transport())
        .unwrap_or(0);
    failures.into_iter().nth(position)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_cause_prefers_non_transport_errors() {
        let failures = vec![
            EngineError::Transport {
                rank: 0,
                reason: "hung up".to_string(),
            },
            EngineError::Internal("boom".to_string()),
        ];
        assert!(matches!(root_cause(failures), Some(EngineError::Internal(_))));
    }

    #[test]
    fn root_cause_falls_back_to_the_first_error() {
        let failures = vec![
            EngineError::Transport {
                rank: 2,
                reason: "a".to_string(),
            },
            EngineError::Transport {
                rank: 0,
                reason: "b".to_string(),
            },
        ];
        assert!(matches!(
            root_cause(failures),
            Some(EngineError::Transport { rank: 2, .. })
        ));
        assert!(root_cause(Vec::new()).is_none());
    }

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        let text: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(text.as_ref()), "static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");
    }
}
