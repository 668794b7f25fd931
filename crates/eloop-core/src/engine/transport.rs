use super::config::ConfigError;
use super::error::EngineError;
use super::progress::{Progress, ProgressReporter};
use crate::core::series::{ResultRecord, SeriesTag};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Barrier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Coordinator,
    Worker,
}

/// One rank's local records of one series, as sent to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesBuffer {
    pub rank: usize,
    pub tag: SeriesTag,
    pub records: Vec<ResultRecord>,
}

/// Collective primitives a rank needs during a sweep.
///
/// Workers only `send`; the coordinator only `receive`s. Nothing here assumes the ranks
/// share an address space, so an implementation backed by sockets or RPC can stand in for
/// the in-process [`LocalHub`].
pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    fn coordinator(&self) -> usize;

    fn role(&self) -> Role {
        if self.rank() == self.coordinator() {
            Role::Coordinator
        } else {
            Role::Worker
        }
    }

    /// Blocks until every rank of the pool has called `barrier`.
    fn barrier(&self) -> Result<(), EngineError>;

    /// Delivers a buffer to the coordinator.
    fn send(&self, buffer: SeriesBuffer) -> Result<(), EngineError>;

    /// Blocks until the next buffer from any worker arrives.
    fn receive(&self) -> Result<SeriesBuffer, EngineError>;

    /// Signals that one more point has been computed somewhere in the pool.
    fn heartbeat(&self);
}

enum Link {
    Inbox(Receiver<SeriesBuffer>),
    Outbox(Sender<SeriesBuffer>),
}

/// Builds a pool of channel-connected communicators for ranks running as threads.
pub struct LocalHub;

impl LocalHub {
    /// Returns one communicator per rank, in rank order.
    ///
    /// Only workers hold a sender, so once every worker is gone the coordinator's
    /// `receive` fails with a transport error rather than waiting forever.
    pub fn communicators<'r>(
        size: usize,
        coordinator: usize,
        reporter: &'r ProgressReporter<'r>,
    ) -> Result<Vec<LocalCommunicator<'r>>, ConfigError> {
        if coordinator >= size {
            return Err(ConfigError::CoordinatorOutOfRange {
                rank: coordinator,
                workers: size,
            });
        }
        let barrier = Arc::new(Barrier::new(size));
        let (sender, receiver) = mpsc::channel();
        let mut inbox = Some(receiver);

        let communicators = (0..size)
            .map(|rank| {
                let link = match inbox.take_if(|_| rank == coordinator) {
                    Some(receiver) => Link::Inbox(receiver),
                    None => Link::Outbox(sender.clone()),
                };
                LocalCommunicator {
                    rank,
                    size,
                    coordinator,
                    barrier: Arc::clone(&barrier),
                    link,
                    reporter,
                }
            })
            .collect();
        Ok(communicators)
    }
}

pub struct LocalCommunicator<'r> {
    rank: usize,
    size: usize,
    coordinator: usize,
    barrier: Arc<Barrier>,
    link: Link,
    reporter: &'r ProgressReporter<'r>,
}

impl LocalCommunicator<'_> {
    fn transport_error(&self, reason: impl Into<String>) -> EngineError {
        EngineError::Transport {
            rank: self.rank,
            reason: reason.into(),
        }
    }
}

impl Communicator for LocalCommunicator<'_> {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn coordinator(&self) -> usize {
        self.coordinator
    }

    fn barrier(&self) -> Result<(), EngineError> {
        self.barrier.wait();
        Ok(())
    }

    fn send(&self, buffer: SeriesBuffer) -> Result<(), EngineError> {
        match &self.link {
            Link::Outbox(sender) => sender
                .send(buffer)
                .map_err(|_| self.transport_error("coordinator hung up before the gather finished")),
            Link::Inbox(_) => Err(self.transport_error("the coordinator does not send buffers")),
        }
    }

    fn receive(&self) -> Result<SeriesBuffer, EngineError> {
        match &self.link {
            Link::Inbox(receiver) => receiver
                .recv()
                .map_err(|_| self.transport_error("every worker disconnected before delivering its buffers")),
            Link::Outbox(_) => Err(self.transport_error("only the coordinator receives buffers")),
        }
    }

    fn heartbeat(&self) {
        self.reporter.report(Progress::TaskIncrement);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn buffer(rank: usize) -> SeriesBuffer {
        SeriesBuffer {
            rank,
            tag: SeriesTag::new("T"),
            records: Vec::new(),
        }
    }

    #[test]
    fn hub_assigns_roles_by_coordinator_rank() {
        let reporter = ProgressReporter::new();
        let comms = LocalHub::communicators(3, 1, &reporter).unwrap();
        let roles: Vec<Role> = comms.iter().map(|c| c.role()).collect();
        assert_eq!(roles, vec![Role::Worker, Role::Coordinator, Role::Worker]);
        assert!(comms.iter().all(|c| c.size() == 3 && c.coordinator() == 1));
    }

    #[test]
    fn hub_rejects_coordinator_outside_pool() {
        let reporter = ProgressReporter::new();
        assert!(matches!(
            LocalHub::communicators(2, 2, &reporter),
            Err(ConfigError::CoordinatorOutOfRange { rank: 2, workers: 2 })
        ));
    }

    #[test]
    fn workers_deliver_to_the_coordinator_across_threads() {
        let reporter = ProgressReporter::new();
        let mut comms = LocalHub::communicators(3, 0, &reporter).unwrap();
        let coordinator = comms.remove(0);

        let mut received = thread::scope(|scope| {
            for comm in comms {
                scope.spawn(move || {
                    comm.barrier().unwrap();
                    comm.heartbeat();
                    comm.send(buffer(comm.rank())).unwrap();
                });
            }
            coordinator.barrier().unwrap();
            vec![
                coordinator.receive().unwrap().rank,
                coordinator.receive().unwrap().rank,
            ]
        });
        received.sort_unstable();

        assert_eq!(received, vec![1, 2]);
        assert_eq!(reporter.completed(), 2);
    }

    #[test]
    fn coordinator_sees_a_transport_error_once_workers_are_gone() {
        let reporter = ProgressReporter::new();
        let mut comms = LocalHub::communicators(2, 0, &reporter).unwrap();
        let worker = comms.pop().unwrap();
        let coordinator = comms.pop().unwrap();
        drop(worker);

        let err = coordinator.receive().unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn roles_cannot_use_each_others_primitive() {
        let reporter = ProgressReporter::new();
        let comms = LocalHub::communicators(2, 0, &reporter).unwrap();
        assert!(comms[0].send(buffer(0)).unwrap_err().is_transport());
        assert!(comms[1].receive().unwrap_err().is_transport());
    }
}
