//! Append-only checkpoint storage for merged result series.
//!
//! A checkpoint is a sequence of self-describing blocks, one per enabled series per sweep
//! run. Each block carries its tag, its record count and the records in ascending
//! coordinate order; nothing ties blocks together, so readers scan the whole file. Two
//! encodings share the same block model: a CSV-based text form and a little-endian binary
//! form, both implemented behind the [`traits::BlockCodec`] trait.

pub(crate) mod binary;
pub mod checkpoint;
pub(crate) mod text;
pub mod traits;
