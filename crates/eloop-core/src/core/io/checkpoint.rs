use super::binary::BinaryCodec;
use super::text::TextCodec;
use super::traits::BlockCodec;
use crate::core::series::{ResultRecord, ResultSeries, SeriesTag, ValueShape};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Failed to open checkpoint '{path}' for append: {source}", path = path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write block '{tag}' to checkpoint '{path}': {source}", path = path.display())]
    Write {
        path: PathBuf,
        tag: SeriesTag,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Malformed checkpoint at {location}: {message}")]
    Malformed { location: String, message: String },

    #[error("Checkpoint ends inside block '{tag}': expected {expected} records, found {found}")]
    Truncated {
        tag: SeriesTag,
        expected: u64,
        found: u64,
    },

    #[error("Failed to encode binary block: {0}")]
    Encode(#[from] bincode::error::EncodeError),
}

/// Serialization mode of a checkpoint destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
    #[default]
    Text,
    Binary,
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::Text => f.write_str("text"),
            Encoding::Binary => f.write_str("binary"),
        }
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "ascii" => Ok(Encoding::Text),
            "binary" | "bin" => Ok(Encoding::Binary),
            other => Err(format!("unknown checkpoint encoding '{other}'")),
        }
    }
}

impl Encoding {
    pub fn encode_block(
        self,
        tag: &SeriesTag,
        records: &[ResultRecord],
        out: &mut Vec<u8>,
    ) -> Result<(), CheckpointError> {
        match self {
            Encoding::Text => TextCodec::encode_block(tag, records, out),
            Encoding::Binary => BinaryCodec::encode_block(tag, records, out),
        }
    }

    pub fn decode_path(self, path: &Path) -> Result<Vec<CheckpointBlock>, CheckpointError> {
        match self {
            Encoding::Text => TextCodec::decode_path(path),
            Encoding::Binary => BinaryCodec::decode_path(path),
        }
    }
}

/// One decoded block: a series tag and its records in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointBlock {
    pub tag: SeriesTag,
    pub records: Vec<ResultRecord>,
}

impl CheckpointBlock {
    #[inline]
    pub fn count(&self) -> usize {
        self.records.len()
    }

    /// Lowest and highest coordinate in the block.
    pub fn coordinate_range(&self) -> Option<(f64, f64)> {
        let first = self.records.first()?.coordinate;
        let last = self.records.last()?.coordinate;
        Some((first, last))
    }
}

/// Appends one block per enabled series to a checkpoint destination.
///
/// The destination is opened with `append` semantics and is never truncated. Each block is
/// encoded completely in memory before a single `write_all`, so a failure to open the file
/// writes nothing and a failed write never disturbs blocks that were flushed before it.
#[derive(Debug)]
pub struct CheckpointWriter {
    path: PathBuf,
    encoding: Encoding,
    file: File,
    blocks_written: usize,
}

impl CheckpointWriter {
    pub fn open_append(path: impl AsRef<Path>, encoding: Encoding) -> Result<Self, CheckpointError> {
        let path = path.as_ref().to_path_buf();
        let open_error = |source| CheckpointError::Open {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(open_error)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(open_error)?;

        debug!(path = %path.display(), %encoding, "Opened checkpoint for append.");
        Ok(Self {
            path,
            encoding,
            file,
            blocks_written: 0,
        })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    #[inline]
    pub fn blocks_written(&self) -> usize {
        self.blocks_written
    }

    /// Writes `series` as one block. Disabled series are skipped and yield `false`.
    pub fn write_series(&mut self, series: &ResultSeries) -> Result<bool, CheckpointError> {
        if !series.is_enabled() {
            debug!(tag = %series.tag(), "Skipping disabled series.");
            return Ok(false);
        }

        let mut block = Vec::new();
        self.encoding
            .encode_block(series.tag(), series.records(), &mut block)?;

        let write_error = |source| CheckpointError::Write {
            path: self.path.clone(),
            tag: series.tag().clone(),
            source,
        };
        self.file.write_all(&block).map_err(write_error)?;
        self.file.flush().map_err(write_error)?;
        self.file.sync_data().map_err(write_error)?;

        self.blocks_written += 1;
        info!(
            tag = %series.tag(),
            count = series.len(),
            bytes = block.len(),
            "Checkpoint block written."
        );
        Ok(true)
    }

    /// Writes every enabled series in iteration order and returns the number of blocks.
    pub fn write_enabled<'s, I>(&mut self, series: I) -> Result<usize, CheckpointError>
    where
        I: IntoIterator<Item = &'s ResultSeries>,
    {
        let mut written = 0;
        for s in series {
            if self.write_series(s)? {
                written += 1;
            }
        }
        Ok(written)
    }
}

/// Scans every block of a checkpoint destination.
pub struct CheckpointReader;

impl CheckpointReader {
    pub fn read_all(
        path: impl AsRef<Path>,
        encoding: Encoding,
    ) -> Result<Vec<CheckpointBlock>, CheckpointError> {
        encoding.decode_path(path.as_ref())
    }

    /// All blocks carrying `tag`, oldest first.
    pub fn read_tag(
        path: impl AsRef<Path>,
        encoding: Encoding,
        tag: &SeriesTag,
    ) -> Result<Vec<CheckpointBlock>, CheckpointError> {
        Ok(Self::read_all(path, encoding)?
            .into_iter()
            .filter(|block| &block.tag == tag)
            .collect())
    }
}

/// The single value shape shared by `records`; an empty block is treated as scalar.
pub(crate) fn block_shape(
    tag: &SeriesTag,
    records: &[ResultRecord],
) -> Result<ValueShape, CheckpointError> {
    let Some(first) = records.first() else {
        return Ok(ValueShape::Scalar);
    };
    let shape = first.value.shape();
    if let Some(position) = records.iter().position(|r| r.value.shape() != shape) {
        return Err(CheckpointError::Malformed {
            location: format!("record {position} of block '{tag}'"),
            message: format!(
                "value shape {} differs from the block shape {shape}",
                records[position].value.shape()
            ),
        });
    }
    Ok(shape)
}
