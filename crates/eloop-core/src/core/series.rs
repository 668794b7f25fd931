use super::domain::PointDomain;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

const TRANSMISSION_TAG: &str = "TRANSMISSION";
const CURRENT_TAG_PREFIX: &str = "CURRENT";

/// Identifier of a result series, written verbatim into every checkpoint block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesTag(String);

impl SeriesTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn transmission() -> Self {
        Self(TRANSMISSION_TAG.to_string())
    }

    pub fn current(block: u32) -> Self {
        Self(format!("{CURRENT_TAG_PREFIX}{block}"))
    }

    /// The block number of a `CURRENT<block>` tag.
    pub fn current_block(&self) -> Option<u32> {
        self.0.strip_prefix(CURRENT_TAG_PREFIX)?.parse().ok()
    }

    pub fn is_transmission(&self) -> bool {
        self.0 == TRANSMISSION_TAG
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeriesTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SeriesTag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

/// Configuration of one result channel: its tag, whether it is computed in this run, and
/// the extraction parameter handed to the solver for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesSpec {
    pub tag: SeriesTag,
    pub enabled: bool,
    pub parameter: u32,
}

impl SeriesSpec {
    pub fn new(tag: impl Into<SeriesTag>, parameter: u32) -> Self {
        Self {
            tag: tag.into(),
            enabled: true,
            parameter,
        }
    }

    pub fn transmission(parameter: u32) -> Self {
        Self::new(SeriesTag::transmission(), parameter)
    }

    pub fn current(block: u32, parameter: u32) -> Self {
        Self::new(SeriesTag::current(block), parameter)
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueShape {
    Scalar,
    Vector(usize),
}

impl ValueShape {
    pub fn arity(self) -> usize {
        match self {
            ValueShape::Scalar => 1,
            ValueShape::Vector(n) => n,
        }
    }
}

impl fmt::Display for ValueShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueShape::Scalar => f.write_str("scalar"),
            ValueShape::Vector(n) => write!(f, "vector:{n}"),
        }
    }
}

impl FromStr for ValueShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "scalar" {
            return Ok(ValueShape::Scalar);
        }
        s.strip_prefix("vector:")
            .and_then(|n| n.parse().ok())
            .map(ValueShape::Vector)
            .ok_or_else(|| format!("unknown value shape '{s}'"))
    }
}

/// A solver result at one sweep point; the core only ever copies and serializes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResultValue {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl ResultValue {
    pub fn shape(&self) -> ValueShape {
        match self {
            ResultValue::Scalar(_) => ValueShape::Scalar,
            ResultValue::Vector(values) => ValueShape::Vector(values.len()),
        }
    }

    pub fn components(&self) -> &[f64] {
        match self {
            ResultValue::Scalar(value) => std::slice::from_ref(value),
            ResultValue::Vector(values) => values,
        }
    }

    /// Rebuilds a value of the given shape from its flat components.
    pub fn from_components(shape: ValueShape, components: Vec<f64>) -> Option<Self> {
        if components.len() != shape.arity() {
            return None;
        }
        match shape {
            ValueShape::Scalar => Some(ResultValue::Scalar(components[0])),
            ValueShape::Vector(_) => Some(ResultValue::Vector(components)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub coordinate: f64,
    pub value: ResultValue,
}

impl ResultRecord {
    pub fn new(coordinate: f64, value: ResultValue) -> Self {
        Self { coordinate, value }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SeriesError {
    #[error("Series '{tag}' expects {expected} values but received {found}")]
    ShapeMismatch {
        tag: SeriesTag,
        expected: ValueShape,
        found: ValueShape,
    },

    #[error("Series '{tag}' is disabled and cannot accept records")]
    Disabled { tag: SeriesTag },

    #[error("No series with tag '{tag}' is configured")]
    UnknownSeries { tag: SeriesTag },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConsistencyError {
    #[error("Series '{tag}' holds {found} records after merge, expected {expected}")]
    LengthMismatch {
        tag: SeriesTag,
        expected: usize,
        found: usize,
    },

    #[error("Series '{tag}' holds a duplicate record at coordinate {coordinate}")]
    DuplicateKey { tag: SeriesTag, coordinate: f64 },

    #[error("Series '{tag}' is missing the point at index {index} (coordinate {coordinate})")]
    MissingPoint {
        tag: SeriesTag,
        index: usize,
        coordinate: f64,
    },

    #[error("Series '{tag}' holds a record at coordinate {coordinate} that is not a sweep point")]
    UnexpectedPoint { tag: SeriesTag, coordinate: f64 },

    #[error("Series '{tag}' mixes value shapes ({first} and {other})")]
    MixedShapes {
        tag: SeriesTag,
        first: ValueShape,
        other: ValueShape,
    },

    #[error("Received a buffer for unknown series '{tag}' from rank {rank}")]
    UnknownSeries { tag: SeriesTag, rank: usize },

    #[error("Rank {rank} delivered more than one buffer for series '{tag}'")]
    DuplicateBuffer { tag: SeriesTag, rank: usize },

    #[error("Rank {rank} is not part of a pool of size {pool_size}")]
    UnknownRank { rank: usize, pool_size: usize },

    #[error("Rank {rank} never delivered a buffer for series '{tag}'")]
    MissingBuffer { tag: SeriesTag, rank: usize },

    #[error("Rank {rank} delivered {found} records for series '{tag}', its partition holds {expected}")]
    BufferLengthMismatch {
        tag: SeriesTag,
        rank: usize,
        expected: usize,
        found: usize,
    },
}

/// A named, independently toggled channel of results across the whole sweep.
///
/// During local compute a rank appends to a series sized for its own partition; after the
/// gather the coordinator merges every rank's buffer into a series sized for the full
/// domain and verifies that it holds exactly one record per sweep point.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSeries {
    tag: SeriesTag,
    enabled: bool,
    parameter: u32,
    records: Vec<ResultRecord>,
    expected_len: usize,
    shape: Option<ValueShape>,
}

impl ResultSeries {
    pub fn new(spec: &SeriesSpec, expected_len: usize) -> Self {
        Self {
            tag: spec.tag.clone(),
            enabled: spec.enabled,
            parameter: spec.parameter,
            records: Vec::with_capacity(if spec.enabled { expected_len } else { 0 }),
            expected_len,
            shape: None,
        }
    }

    #[inline]
    pub fn tag(&self) -> &SeriesTag {
        &self.tag
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    pub fn parameter(&self) -> u32 {
        self.parameter
    }

    #[inline]
    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn expected_len(&self) -> usize {
        self.expected_len
    }

    pub fn shape(&self) -> Option<ValueShape> {
        self.shape
    }

    pub fn take_records(&mut self) -> Vec<ResultRecord> {
        self.shape = None;
        std::mem::take(&mut self.records)
    }

    pub fn append(&mut self, record: ResultRecord) -> Result<(), SeriesError> {
        if !self.enabled {
            return Err(SeriesError::Disabled {
                tag: self.tag.clone(),
            });
        }
        let found = record.value.shape();
        match self.shape {
            Some(expected) if expected != found => {
                return Err(SeriesError::ShapeMismatch {
                    tag: self.tag.clone(),
                    expected,
                    found,
                });
            }
            Some(_) => {}
            None => self.shape = Some(found),
        }
        self.records.push(record);
        Ok(())
    }

    /// Replaces the records with the concatenation of `buffers`, stable-sorted by
    /// coordinate, and verifies the result against `domain`.
    ///
    /// The outcome does not depend on the order in which the buffers are supplied.
    pub fn merge<I>(&mut self, buffers: I, domain: &PointDomain) -> Result<(), ConsistencyError>
    where
        I: IntoIterator<Item = Vec<ResultRecord>>,
    {
        let mut merged: Vec<ResultRecord> = Vec::with_capacity(self.expected_len);
        for buffer in buffers {
            merged.extend(buffer);
        }

        #[cfg(not(feature = "parallel"))]
        merged.sort_by(|a, b| a.coordinate.total_cmp(&b.coordinate));

        #[cfg(feature = "parallel")]
        merged.par_sort_by(|a, b| a.coordinate.total_cmp(&b.coordinate));

        self.shape = None;
        if let Some(first) = merged.first().map(|r| r.value.shape()) {
            if let Some(other) = merged
                .iter()
                .map(|r| r.value.shape())
                .find(|shape| *shape != first)
            {
                return Err(ConsistencyError::MixedShapes {
                    tag: self.tag.clone(),
                    first,
                    other,
                });
            }
            self.shape = Some(first);
        }

        self.records = merged;
        self.verify(domain)
    }

    /// Checks that the records hold exactly one entry per domain point, in ascending
    /// coordinate order.
    pub fn verify(&self, domain: &PointDomain) -> Result<(), ConsistencyError> {
        for pair in self.records.windows(2) {
            if pair[0].coordinate == pair[1].coordinate {
                return Err(ConsistencyError::DuplicateKey {
                    tag: self.tag.clone(),
                    coordinate: pair[1].coordinate,
                });
            }
        }

        for (index, record) in self.records.iter().enumerate() {
            match domain.coordinate(index) {
                Some(expected) if expected == record.coordinate => {}
                Some(expected) if record.coordinate > expected => {
                    return Err(ConsistencyError::MissingPoint {
                        tag: self.tag.clone(),
                        index,
                        coordinate: expected,
                    });
                }
                _ => {
                    return Err(ConsistencyError::UnexpectedPoint {
                        tag: self.tag.clone(),
                        coordinate: record.coordinate,
                    });
                }
            }
        }

        if let Some(coordinate) = domain.coordinate(self.records.len()) {
            return Err(ConsistencyError::MissingPoint {
                tag: self.tag.clone(),
                index: self.records.len(),
                coordinate,
            });
        }

        if self.records.len() != self.expected_len {
            return Err(ConsistencyError::LengthMismatch {
                tag: self.tag.clone(),
                expected: self.expected_len,
                found: self.records.len(),
            });
        }
        Ok(())
    }
}

/// The fixed set of series of one sweep, keyed by tag and built once from configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesSet {
    entries: BTreeMap<SeriesTag, ResultSeries>,
}

impl SeriesSet {
    pub fn from_specs<'s, I>(specs: I, expected_len: usize) -> Self
    where
        I: IntoIterator<Item = &'s SeriesSpec>,
    {
        let entries = specs
            .into_iter()
            .map(|spec| (spec.tag.clone(), ResultSeries::new(spec, expected_len)))
            .collect();
        Self { entries }
    }

    pub fn get(&self, tag: &SeriesTag) -> Option<&ResultSeries> {
        self.entries.get(tag)
    }

    pub fn get_mut(&mut self, tag: &SeriesTag) -> Option<&mut ResultSeries> {
        self.entries.get_mut(tag)
    }

    pub fn append(&mut self, tag: &SeriesTag, record: ResultRecord) -> Result<(), SeriesError> {
        self.entries
            .get_mut(tag)
            .ok_or_else(|| SeriesError::UnknownSeries { tag: tag.clone() })?
            .append(record)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResultSeries> {
        self.entries.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ResultSeries> {
        self.entries.values_mut()
    }

    pub fn enabled(&self) -> impl Iterator<Item = &ResultSeries> {
        self.entries.values().filter(|series| series.is_enabled())
    }

    pub fn tags(&self) -> impl Iterator<Item = &SeriesTag> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
