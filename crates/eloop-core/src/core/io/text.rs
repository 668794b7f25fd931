use super::checkpoint::{CheckpointBlock, CheckpointError, block_shape};
use super::traits::BlockCodec;
use crate::core::series::{ResultRecord, ResultValue, SeriesTag, ValueShape};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::io::BufRead;

const BLOCK_MARKER: &str = "BLOCK";

/// CSV text encoding.
///
/// ```text
/// BLOCK,TRANSMISSION,3,scalar
/// -1,0.25
/// 0,1
/// 1,0.25
/// ```
///
/// Floats use Rust's shortest round-trip formatting, so decoding reproduces the exact bits.
pub(crate) struct TextCodec;

impl BlockCodec for TextCodec {
    fn encode_block(
        tag: &SeriesTag,
        records: &[ResultRecord],
        out: &mut Vec<u8>,
    ) -> Result<(), CheckpointError> {
        let shape = block_shape(tag, records)?;
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(out);

        writer.write_record([
            BLOCK_MARKER,
            tag.as_str(),
            records.len().to_string().as_str(),
            shape.to_string().as_str(),
        ])?;

        let mut row: Vec<String> = Vec::with_capacity(1 + shape.arity());
        for record in records {
            row.clear();
            row.push(record.coordinate.to_string());
            row.extend(record.value.components().iter().map(f64::to_string));
            writer.write_record(&row)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn decode_blocks(reader: &mut impl BufRead) -> Result<Vec<CheckpointBlock>, CheckpointError> {
        let mut csv_reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut blocks = Vec::new();
        let mut pending: Option<PendingBlock> = None;

        for result in csv_reader.records() {
            let row = result?;
            let line = row.position().map(|p| p.line()).unwrap_or_default();

            let block = match pending.take() {
                None => PendingBlock::from_header(&row, line)?,
                Some(block) if row.get(0) == Some(BLOCK_MARKER) => return Err(block.truncated()),
                Some(mut block) => {
                    block.push_row(&row, line)?;
                    block
                }
            };

            if block.is_complete() {
                blocks.push(block.finish());
            } else {
                pending = Some(block);
            }
        }

        match pending {
            Some(block) => Err(block.truncated()),
            None => Ok(blocks),
        }
    }
}

struct PendingBlock {
    tag: SeriesTag,
    expected: u64,
    shape: ValueShape,
    records: Vec<ResultRecord>,
}

impl PendingBlock {
    fn from_header(row: &StringRecord, line: u64) -> Result<Self, CheckpointError> {
        let malformed = |message: String| CheckpointError::Malformed {
            location: format!("line {line}"),
            message,
        };

        if row.get(0) != Some(BLOCK_MARKER) || row.len() != 4 {
            return Err(malformed(format!(
                "expected a '{BLOCK_MARKER},<tag>,<count>,<shape>' header"
            )));
        }
        let tag = SeriesTag::new(&row[1]);
        let expected: u64 = row[2]
            .parse()
            .map_err(|_| malformed(format!("invalid record count '{}'", &row[2])))?;
        let shape: ValueShape = row[3].parse().map_err(malformed)?;

        Ok(Self {
            tag,
            expected,
            shape,
            records: Vec::new(),
        })
    }

    fn push_row(&mut self, row: &StringRecord, line: u64) -> Result<(), CheckpointError> {
        let malformed = |message: String| CheckpointError::Malformed {
            location: format!("line {line}"),
            message,
        };

        if row.len() != 1 + self.shape.arity() {
            return Err(malformed(format!(
                "block '{}' expects {} fields per record, found {}",
                self.tag,
                1 + self.shape.arity(),
                row.len()
            )));
        }
        let mut fields = row.iter().map(|field| {
            field
                .trim()
                .parse::<f64>()
                .map_err(|_| malformed(format!("invalid number '{field}'")))
        });

        let coordinate = fields
            .next()
            .ok_or_else(|| malformed("empty record".to_string()))??;
        let components = fields.collect::<Result<Vec<f64>, _>>()?;
        let value = ResultValue::from_components(self.shape, components)
            .ok_or_else(|| malformed(format!("value does not match shape {}", self.shape)))?;

        self.records.push(ResultRecord { coordinate, value });
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.records.len() as u64 == self.expected
    }

    fn truncated(self) -> CheckpointError {
        CheckpointError::Truncated {
            found: self.records.len() as u64,
            tag: self.tag,
            expected: self.expected,
        }
    }

    fn finish(self) -> CheckpointBlock {
        CheckpointBlock {
            tag: self.tag,
            records: self.records,
        }
    }
}
