use crate::core::domain::{DomainError, DomainSpec, PointDomain};
use crate::core::io::checkpoint::Encoding;
use crate::core::partition::{PartitionError, Partitioner};
use crate::core::series::{SeriesSpec, SeriesTag};
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

const DEFAULT_LABEL: &str = "SWEEP";

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid domain: {0}")]
    Domain(#[from] DomainError),

    #[error("Invalid partition: {0}")]
    Partition(#[from] PartitionError),

    #[error("Coordinator rank {rank} is outside the worker pool of size {workers}")]
    CoordinatorOutOfRange { rank: usize, workers: usize },

    #[error("Series tag '{0}' is configured more than once")]
    DuplicateSeries(SeriesTag),

    #[error("Series tags must not be empty")]
    EmptyTag,
}

/// Where and how merged series are appended.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointTarget {
    pub path: PathBuf,
    pub encoding: Encoding,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepConfig {
    /// Textual label reported with the progress start signal.
    pub label: String,
    pub domain: DomainSpec,
    pub workers: usize,
    pub coordinator_rank: usize,
    pub series: Vec<SeriesSpec>,
    pub checkpoint: Option<CheckpointTarget>,
}

impl SweepConfig {
    pub fn enabled_series(&self) -> impl Iterator<Item = &SeriesSpec> {
        self.series.iter().filter(|spec| spec.enabled)
    }

    pub fn point_domain(&self) -> Result<PointDomain, ConfigError> {
        Ok(PointDomain::from_spec(&self.domain)?)
    }

    pub fn partitioner(&self, domain: &PointDomain) -> Result<Partitioner, ConfigError> {
        Ok(Partitioner::new(domain.len(), self.workers)?)
    }
}

#[derive(Default)]
pub struct SweepConfigBuilder {
    label: Option<String>,
    domain: Option<DomainSpec>,
    workers: Option<usize>,
    coordinator_rank: Option<usize>,
    series: Vec<SeriesSpec>,
    checkpoint: Option<CheckpointTarget>,
}

impl SweepConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
    pub fn domain(mut self, domain: DomainSpec) -> Self {
        self.domain = Some(domain);
        self
    }
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }
    pub fn coordinator_rank(mut self, rank: usize) -> Self {
        self.coordinator_rank = Some(rank);
        self
    }
    pub fn series(mut self, spec: SeriesSpec) -> Self {
        self.series.push(spec);
        self
    }
    pub fn series_list(mut self, specs: impl IntoIterator<Item = SeriesSpec>) -> Self {
        self.series.extend(specs);
        self
    }
    pub fn checkpoint(mut self, path: impl Into<PathBuf>, encoding: Encoding) -> Self {
        self.checkpoint = Some(CheckpointTarget {
            path: path.into(),
            encoding,
        });
        self
    }

    pub fn build(self) -> Result<SweepConfig, ConfigError> {
        let domain = self.domain.ok_or(ConfigError::MissingParameter("domain"))?;
        let workers = self.workers.ok_or(ConfigError::MissingParameter("workers"))?;
        if workers == 0 {
            return Err(PartitionError::EmptyPool.into());
        }
        let coordinator_rank = self.coordinator_rank.unwrap_or(0);
        if coordinator_rank >= workers {
            return Err(ConfigError::CoordinatorOutOfRange {
                rank: coordinator_rank,
                workers,
            });
        }

        let mut seen = HashSet::new();
        for spec in &self.series {
            if spec.tag.as_str().is_empty() {
                return Err(ConfigError::EmptyTag);
            }
            if !seen.insert(&spec.tag) {
                return Err(ConfigError::DuplicateSeries(spec.tag.clone()));
            }
        }

        PointDomain::from_spec(&domain)?;

        Ok(SweepConfig {
            label: self.label.unwrap_or_else(|| DEFAULT_LABEL.to_string()),
            domain,
            workers,
            coordinator_rank,
            series: self.series,
            checkpoint: self.checkpoint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> SweepConfigBuilder {
        SweepConfigBuilder::new()
            .domain(DomainSpec::Linear {
                start: 0.0,
                end: 1.0,
                count: 5,
            })
            .workers(2)
    }

    #[test]
    fn build_applies_defaults() {
        let config = base().series(SeriesSpec::transmission(1)).build().unwrap();
        assert_eq!(config.label, "SWEEP");
        assert_eq!(config.coordinator_rank, 0);
        assert!(config.checkpoint.is_none());
        assert_eq!(config.point_domain().unwrap().len(), 5);
    }

    #[test]
    fn build_requires_domain_and_workers() {
        assert_eq!(
            SweepConfigBuilder::new().workers(1).build(),
            Err(ConfigError::MissingParameter("domain"))
        );
        assert_eq!(
            SweepConfigBuilder::new()
                .domain(DomainSpec::Explicit(vec![1.0]))
                .build(),
            Err(ConfigError::MissingParameter("workers"))
        );
    }

    #[test]
    fn build_rejects_zero_workers() {
        assert_eq!(
            base().workers(0).build(),
            Err(ConfigError::Partition(PartitionError::EmptyPool))
        );
    }

    #[test]
    fn build_rejects_coordinator_outside_pool() {
        assert_eq!(
            base().coordinator_rank(2).build(),
            Err(ConfigError::CoordinatorOutOfRange {
                rank: 2,
                workers: 2
            })
        );
    }

    #[test]
    fn build_rejects_duplicate_and_empty_tags() {
        let duplicate = base()
            .series(SeriesSpec::transmission(1))
            .series(SeriesSpec::transmission(2).with_enabled(false))
            .build();
        assert_eq!(
            duplicate,
            Err(ConfigError::DuplicateSeries(SeriesTag::transmission()))
        );
        assert_eq!(
            base().series(SeriesSpec::new("", 0)).build(),
            Err(ConfigError::EmptyTag)
        );
    }

    #[test]
    fn build_rejects_an_empty_domain() {
        let result = base()
            .domain(DomainSpec::Linear {
                start: 0.0,
                end: 1.0,
                count: 0,
            })
            .build();
        assert_eq!(result, Err(ConfigError::Domain(DomainError::Empty)));
    }

    #[test]
    fn enabled_series_filters_disabled_entries() {
        let config = base()
            .series_list([
                SeriesSpec::transmission(1),
                SeriesSpec::current(0, 1).with_enabled(false),
            ])
            .checkpoint("out.dat", Encoding::Binary)
            .build()
            .unwrap();
        let tags: Vec<&SeriesTag> = config.enabled_series().map(|s| &s.tag).collect();
        assert_eq!(tags, vec![&SeriesTag::transmission()]);
        assert_eq!(
            config.checkpoint.map(|c| c.encoding),
            Some(Encoding::Binary)
        );
    }
}
