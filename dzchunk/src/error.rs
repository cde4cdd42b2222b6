use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record error: {0}")]
    Format(#[from] dzfmt::FormatError),

    #[error("bad .params file: {0}")]
    Params(String),

    #[error("missing required params key {0:?}")]
    MissingParam(&'static str),

    #[error("invalid sparse image magic")]
    SparseMagic,

    #[error("sparse image major version {0} is unsupported (only 1 is)")]
    SparseMajorVersion(u16),

    #[error("sparse image block size {0} is not a power of two")]
    SparseBlockSize(u32),

    #[error("sparse chunk type {0:#06x} is not recognized")]
    SparseChunkType(u16),

    #[error("sparse image CRC32 mismatch: header says {expected:#010x}, computed {actual:#010x}")]
    SparseChecksumMismatch { expected: u32, actual: u32 },

    #[error("external sparse-image tool exited with status {0}")]
    ExternalToolFailed(std::process::ExitStatus),

    #[error("external sparse-image tool closed its output early")]
    ExternalToolShortRead,
}

pub type Result<T> = std::result::Result<T, ChunkError>;
