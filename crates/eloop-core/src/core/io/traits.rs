use super::checkpoint::{CheckpointBlock, CheckpointError};
use crate::core::series::{ResultRecord, SeriesTag};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Defines the interface for encoding and decoding checkpoint blocks.
///
/// A codec turns one merged series into a self-describing block of bytes and scans a
/// stream of concatenated blocks back into memory. Implementors handle format-specific
/// serialization; the append-only file handling lives in
/// [`CheckpointWriter`](super::checkpoint::CheckpointWriter).
pub trait BlockCodec {
    /// Encodes one block into `out`.
    ///
    /// # Arguments
    ///
    /// * `tag` - The series tag written into the block header.
    /// * `records` - The records in ascending coordinate order, all of one value shape.
    /// * `out` - The buffer the encoded block is appended to.
    ///
    /// # Errors
    ///
    /// Returns an error if the records mix value shapes or serialization fails.
    fn encode_block(
        tag: &SeriesTag,
        records: &[ResultRecord],
        out: &mut Vec<u8>,
    ) -> Result<(), CheckpointError>;

    /// Decodes every block contained in a buffered reader.
    ///
    /// # Arguments
    ///
    /// * `reader` - The buffered reader positioned at the start of a block.
    ///
    /// # Return
    ///
    /// Returns the blocks in the order they appear in the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is malformed or ends inside a block.
    fn decode_blocks(reader: &mut impl BufRead) -> Result<Vec<CheckpointBlock>, CheckpointError>;

    /// Decodes every block of the checkpoint at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or decoding fails.
    fn decode_path<P: AsRef<Path>>(path: P) -> Result<Vec<CheckpointBlock>, CheckpointError> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::decode_blocks(&mut reader)
    }
}
