use super::checkpoint::{CheckpointBlock, CheckpointError, block_shape};
use super::traits::BlockCodec;
use crate::core::series::{ResultRecord, ResultValue, SeriesTag, ValueShape};
use bincode::config::{self, Configuration, Fixint, LittleEndian, Limit};
use bincode::error::DecodeError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, ErrorKind};

const MAGIC: [u8; 4] = *b"EBLK";
const KIND_SCALAR: u8 = 0;
const KIND_VECTOR: u8 = 1;

/// Upper bound on the bytes a single decode call may consume. Headers are the largest
/// item decoded in one call, so this caps the tag length a corrupt file can claim.
const MAX_DECODE_BYTES: usize = 64 * 1024;

/// Magic, tag length prefix, count, kind and arity.
const HEADER_FIXED_BYTES: usize = 4 + 8 + 8 + 1 + 4;

type BlockConfig = Configuration<LittleEndian, Fixint, Limit<MAX_DECODE_BYTES>>;

fn block_config() -> BlockConfig {
    config::standard()
        .with_little_endian()
        .with_fixed_int_encoding()
        .with_limit::<MAX_DECODE_BYTES>()
}

#[derive(Debug, Serialize, Deserialize)]
struct BlockHeader {
    magic: [u8; 4],
    tag: SeriesTag,
    count: u64,
    kind: u8,
    arity: u32,
}

impl BlockHeader {
    fn shape(&self) -> Option<ValueShape> {
        match (self.kind, self.arity) {
            (KIND_SCALAR, 1) => Some(ValueShape::Scalar),
            (KIND_VECTOR, arity) => Some(ValueShape::Vector(arity as usize)),
            _ => None,
        }
    }
}

/// Little-endian, fixed-width `bincode` encoding.
///
/// Layout of one block: `EBLK`, `u64` tag length, UTF-8 tag, `u64` count, `u8` kind
/// (0 scalar, 1 vector), `u32` arity, then `count` records of one `f64` coordinate
/// followed by `arity` `f64` values.
pub(crate) struct BinaryCodec;

impl BlockCodec for BinaryCodec {
    fn encode_block(
        tag: &SeriesTag,
        records: &[ResultRecord],
        out: &mut Vec<u8>,
    ) -> Result<(), CheckpointError> {
        let shape = block_shape(tag, records)?;
        if HEADER_FIXED_BYTES + tag.as_str().len() > MAX_DECODE_BYTES {
            return Err(CheckpointError::Malformed {
                location: format!("block '{tag}'"),
                message: format!("tag is longer than the {MAX_DECODE_BYTES}-byte header limit"),
            });
        }
        let (kind, arity) = match shape {
            ValueShape::Scalar => (KIND_SCALAR, 1),
            ValueShape::Vector(n) => (KIND_VECTOR, n as u32),
        };

        let header = BlockHeader {
            magic: MAGIC,
            tag: tag.clone(),
            count: records.len() as u64,
            kind,
            arity,
        };
        out.reserve(HEADER_FIXED_BYTES + tag.as_str().len() + records.len() * 8 * (1 + shape.arity()));
        bincode::serde::encode_into_std_write(&header, out, block_config())?;
        for record in records {
            bincode::serde::encode_into_std_write(record.coordinate, out, block_config())?;
            for component in record.value.components() {
                bincode::serde::encode_into_std_write(component, out, block_config())?;
            }
        }
        Ok(())
    }

    fn decode_blocks(reader: &mut impl BufRead) -> Result<Vec<CheckpointBlock>, CheckpointError> {
        let mut blocks = Vec::new();

        while !reader.fill_buf()?.is_empty() {
            let index = blocks.len();
            let header: BlockHeader = decode(reader).map_err(|e| {
                if ends_stream(&e) {
                    malformed(index, "stream ends inside a block header".to_string())
                } else {
                    malformed(index, e.to_string())
                }
            })?;
            if header.magic != MAGIC {
                return Err(malformed(index, format!("bad block magic {:?}", header.magic)));
            }
            let Some(shape) = header.shape() else {
                return Err(malformed(
                    index,
                    format!(
                        "block '{}' has kind {} with arity {}",
                        header.tag, header.kind, header.arity
                    ),
                ));
            };

            // Grows with the bytes actually present; `count` and `arity` are untrusted.
            let mut records = Vec::new();
            for found in 0..header.count {
                match decode_record(reader, shape) {
                    Ok(record) => records.push(record),
                    Err(e) if ends_stream(&e) => {
                        return Err(CheckpointError::Truncated {
                            tag: header.tag,
                            expected: header.count,
                            found,
                        });
                    }
                    Err(e) => return Err(malformed(index, e.to_string())),
                }
            }

            blocks.push(CheckpointBlock {
                tag: header.tag,
                records,
            });
        }

        Ok(blocks)
    }
}

fn decode<T: DeserializeOwned>(reader: &mut impl BufRead) -> Result<T, DecodeError> {
    bincode::serde::decode_from_std_read(reader, block_config())
}

fn decode_record(reader: &mut impl BufRead, shape: ValueShape) -> Result<ResultRecord, DecodeError> {
    let coordinate: f64 = decode(reader)?;
    let value = match shape {
        ValueShape::Scalar => ResultValue::Scalar(decode(reader)?),
        ValueShape::Vector(arity) => {
            let mut values = Vec::new();
            for _ in 0..arity {
                values.push(decode(reader)?);
            }
            ResultValue::Vector(values)
        }
    };
    Ok(ResultRecord { coordinate, value })
}

fn ends_stream(error: &DecodeError) -> bool {
    match error {
        DecodeError::UnexpectedEnd { .. } => true,
        DecodeError::Io { inner, .. } => inner.kind() == ErrorKind::UnexpectedEof,
        _ => false,
    }
}

fn malformed(block: usize, message: String) -> CheckpointError {
    CheckpointError::Malformed {
        location: format!("block {block}"),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode(tag: &str, records: &[ResultRecord]) -> Vec<u8> {
        let mut out = Vec::new();
        BinaryCodec::encode_block(&SeriesTag::new(tag), records, &mut out).unwrap();
        out
    }

    fn decode_all(bytes: &[u8]) -> Result<Vec<CheckpointBlock>, CheckpointError> {
        BinaryCodec::decode_blocks(&mut Cursor::new(bytes))
    }

    fn header_bytes(tag_len: u64, count: u64, kind: u8, arity: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"EBLK");
        bytes.extend_from_slice(&tag_len.to_le_bytes());
        bytes.extend(std::iter::repeat_n(b'T', tag_len.min(16) as usize));
        bytes.extend_from_slice(&count.to_le_bytes());
        bytes.push(kind);
        bytes.extend_from_slice(&arity.to_le_bytes());
        bytes
    }

    #[test]
    fn scalar_block_has_the_documented_layout() {
        let bytes = encode("T", &[ResultRecord::new(0.5, ResultValue::Scalar(2.0))]);

        let mut expected = header_bytes(1, 1, 0, 1);
        expected.extend_from_slice(&0.5f64.to_le_bytes());
        expected.extend_from_slice(&2.0f64.to_le_bytes());
        assert_eq!(bytes, expected);
    }

    #[test]
    fn vector_blocks_decode_back_in_sequence() {
        let first = vec![
            ResultRecord::new(-1.0, ResultValue::Vector(vec![0.1, 0.2, 0.3])),
            ResultRecord::new(1.0, ResultValue::Vector(vec![f64::MIN_POSITIVE, -4.0, 1e300])),
        ];
        let second = vec![ResultRecord::new(3.0, ResultValue::Scalar(9.0))];

        let mut bytes = encode("CURRENT0", &first);
        bytes.extend(encode("TRANSMISSION", &second));

        let blocks = decode_all(&bytes).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].tag.as_str(), "CURRENT0");
        assert_eq!(blocks[0].records, first);
        assert_eq!(blocks[1].tag.as_str(), "TRANSMISSION");
        assert_eq!(blocks[1].records, second);
    }

    #[test]
    fn empty_block_decodes_as_an_empty_record_list() {
        let blocks = decode_all(&encode("EMPTY", &[])).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].count(), 0);
    }

    #[test]
    fn missing_records_are_reported_as_truncated() {
        let records: Vec<ResultRecord> = (0..4)
            .map(|i| ResultRecord::new(i as f64, ResultValue::Scalar(1.0)))
            .collect();
        let bytes = encode("T", &records);
        let cut = &bytes[..bytes.len() - 20];

        let result = decode_all(cut);
        assert!(matches!(
            result,
            Err(CheckpointError::Truncated {
                expected: 4,
                found: 2,
                ..
            })
        ));
    }

    #[test]
    fn bad_magic_is_malformed() {
        let mut bytes = encode("T", &[]);
        bytes[..4].copy_from_slice(b"NOPE");
        let result = decode_all(&bytes);
        assert!(matches!(result, Err(CheckpointError::Malformed { .. })));
    }

    #[test]
    fn header_cut_short_is_malformed() {
        let bytes = encode("T", &[]);
        let result = decode_all(&bytes[..6]);
        assert!(matches!(result, Err(CheckpointError::Malformed { .. })));
    }

    #[test]
    fn huge_arity_in_a_corrupt_header_is_truncated_without_allocating() {
        let bytes = header_bytes(0, 1, KIND_VECTOR, u32::MAX);
        let result = decode_all(&bytes);
        assert!(matches!(
            result,
            Err(CheckpointError::Truncated {
                expected: 1,
                found: 0,
                ..
            })
        ));
    }

    #[test]
    fn huge_tag_length_in_a_corrupt_header_is_malformed() {
        let bytes = header_bytes(u32::MAX as u64, 0, KIND_SCALAR, 1);
        let result = decode_all(&bytes);
        assert!(matches!(result, Err(CheckpointError::Malformed { .. })));
    }

    #[test]
    fn huge_count_in_a_corrupt_header_stops_at_the_end_of_the_stream() {
        let mut bytes = header_bytes(1, u64::MAX, KIND_SCALAR, 1);
        bytes.extend_from_slice(&1.0f64.to_le_bytes());
        bytes.extend_from_slice(&2.0f64.to_le_bytes());
        let result = decode_all(&bytes);
        assert!(matches!(
            result,
            Err(CheckpointError::Truncated {
                expected: u64::MAX,
                found: 1,
                ..
            })
        ));
    }

    #[test]
    fn tags_beyond_the_header_limit_are_rejected_on_encode() {
        let tag = SeriesTag::new("X".repeat(MAX_DECODE_BYTES));
        let mut out = Vec::new();
        let result = BinaryCodec::encode_block(&tag, &[], &mut out);
        assert!(matches!(result, Err(CheckpointError::Malformed { .. })));
        assert!(out.is_empty());
    }
}
