//! Error types for DZ decode/encode operations.

use thiserror::Error;

/// Result type alias for dzcodec operations.
pub type Result<T> = std::result::Result<T, DzCodecError>;

#[derive(Error, Debug)]
pub enum DzCodecError {
    #[error("format error: {0}")]
    Format(#[from] dzfmt::FormatError),

    #[error("gpt error: {0}")]
    Gpt(#[from] dzgpt::GptError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Running MD5 over the concatenated chunk headers doesn't match the
    /// value recorded in the file header.
    #[error("header MD5 mismatch: expected {expected}, got {actual}")]
    HeaderMd5Mismatch { expected: String, actual: String },

    /// A chunk's payload MD5 doesn't match the value in its header.
    #[error("chunk {chunk_index} payload MD5 mismatch: expected {expected}, got {actual}")]
    ChunkMd5Mismatch { chunk_index: usize, expected: String, actual: String },

    /// A chunk's payload CRC32 doesn't match the value in its header.
    #[error("chunk {chunk_index} payload CRC32 mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChunkCrc32Mismatch { chunk_index: usize, expected: u32, actual: u32 },

    #[error("chunk {0} not found")]
    ChunkNotFound(usize),

    #[error("slice not found: {0}")]
    SliceNotFound(String),

    #[error("no chunks found in container")]
    EmptyContainer,

    /// Two chunks assigned to the same device overlap in target LBA range.
    #[error("overlapping chunks on dev {dev}: [{a_start}, {a_end}) and [{b_start}, {b_end})")]
    OverlappingChunks { dev: u32, a_start: u64, a_end: u64, b_start: u64, b_end: u64 },

    #[error("missing chunk file for slice '{slice}' at target address {target_addr}")]
    MissingChunkFile { slice: String, target_addr: u32 },
}
