use super::error::EngineError;
use super::transport::{Communicator, SeriesBuffer};
use crate::core::domain::PointDomain;
use crate::core::partition::Partitioner;
use crate::core::series::{ConsistencyError, ResultRecord, SeriesSet, SeriesTag};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Sends every enabled local series to the coordinator, one message per series.
///
/// Returns the number of records sent.
pub fn submit<C: Communicator>(comm: &C, local: &mut SeriesSet) -> Result<usize, EngineError> {
    let mut sent = 0;
    for series in local.iter_mut().filter(|s| s.is_enabled()) {
        let buffer = SeriesBuffer {
            rank: comm.rank(),
            tag: series.tag().clone(),
            records: series.take_records(),
        };
        sent += buffer.records.len();
        debug!(rank = buffer.rank, tag = %buffer.tag, records = buffer.records.len(), "Sending series buffer.");
        comm.send(buffer)?;
    }
    Ok(sent)
}

/// Receives every worker's buffers, merges them with the coordinator's own, and verifies
/// the merged series against the domain.
///
/// `local` holds the coordinator's partition results and is drained; `merged` must have
/// been built for the full domain. Blocks until all `(P - 1) * S` incoming buffers arrive.
pub fn collect<C: Communicator>(
    comm: &C,
    partitioner: &Partitioner,
    domain: &PointDomain,
    local: &mut SeriesSet,
    merged: &mut SeriesSet,
) -> Result<(), EngineError> {
    let mut collector = Collector::new(partitioner, merged.enabled().map(|s| s.tag().clone()));

    for series in local.iter_mut().filter(|s| s.is_enabled()) {
        collector.accept(SeriesBuffer {
            rank: comm.rank(),
            tag: series.tag().clone(),
            records: series.take_records(),
        })?;
    }

    let incoming = comm.size().saturating_sub(1) * collector.series_count();
    debug!(rank = comm.rank(), incoming, "Waiting for worker buffers.");
    for _ in 0..incoming {
        let buffer = comm.receive()?;
        debug!(from = buffer.rank, tag = %buffer.tag, records = buffer.records.len(), "Received series buffer.");
        collector.accept(buffer)?;
    }

    collector.merge_into(merged, domain)?;
    Ok(())
}

/// Coordinator-side bookkeeping of received buffers.
///
/// Each buffer is checked against the sender's true partition length, so a short,
/// oversized, or repeated delivery is reported before any merge happens.
pub struct Collector<'a> {
    partitioner: &'a Partitioner,
    received: HashMap<SeriesTag, BTreeMap<usize, Vec<ResultRecord>>>,
}

impl<'a> Collector<'a> {
    pub fn new(partitioner: &'a Partitioner, tags: impl IntoIterator<Item = SeriesTag>) -> Self {
        Self {
            partitioner,
            received: tags.into_iter().map(|tag| (tag, BTreeMap::new())).collect(),
        }
    }

    pub fn series_count(&self) -> usize {
        self.received.len()
    }

    pub fn accept(&mut self, buffer: SeriesBuffer) -> Result<(), ConsistencyError> {
        let SeriesBuffer { rank, tag, records } = buffer;
        let partition = self
            .partitioner
            .partition(rank)
            .map_err(|_| ConsistencyError::UnknownRank {
                rank,
                pool_size: self.partitioner.pool_size(),
            })?;

        let Some(by_rank) = self.received.get_mut(&tag) else {
            return Err(ConsistencyError::UnknownSeries { tag, rank });
        };
        if by_rank.contains_key(&rank) {
            return Err(ConsistencyError::DuplicateBuffer { tag, rank });
        }
        if records.len() != partition.len() {
            return Err(ConsistencyError::BufferLengthMismatch {
                tag,
                rank,
                expected: partition.len(),
                found: records.len(),
            });
        }
        by_rank.insert(rank, records);
        Ok(())
    }

    /// The lowest-ranked undelivered buffer, by tag order, if any.
    fn first_missing(&self) -> Option<ConsistencyError> {
        let pool_size = self.partitioner.pool_size();
        let mut tags: Vec<&SeriesTag> = self.received.keys().collect();
        tags.sort();
        tags.into_iter().find_map(|tag| {
            let by_rank = &self.received[tag];
            (0..pool_size)
                .find(|rank| !by_rank.contains_key(rank))
                .map(|rank| ConsistencyError::MissingBuffer {
                    tag: tag.clone(),
                    rank,
                })
        })
    }

    /// Merges the received buffers into the matching enabled series of `merged`.
    ///
    /// Fails with `MissingBuffer` before merging anything if a rank has not delivered.
    pub fn merge_into(mut self, merged: &mut SeriesSet, domain: &PointDomain) -> Result<(), ConsistencyError> {
        if let Some(missing) = self.first_missing() {
            return Err(missing);
        }
        for series in merged.iter_mut().filter(|s| s.is_enabled()) {
            let buffers = self.received.remove(series.tag()).unwrap_or_default();
            series.merge(buffers.into_values(), domain)?;
            debug!(tag = %series.tag(), records = series.len(), "Series merged.");
        }
        Ok(())
    }
}
