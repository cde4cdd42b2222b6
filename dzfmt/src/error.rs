use thiserror::Error;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record is {actual} bytes, schema declares {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("schema field widths sum to {actual}, schema declares size {expected}")]
    SchemaSizeMismatch { expected: usize, actual: usize },

    #[error("missing required field {0:?}")]
    MissingField(&'static str),

    #[error("field {0:?} has the wrong width for its schema slot")]
    FieldWidth(&'static str),

    #[error("format major version {0} is newer than the supported major version 2")]
    UnsupportedMajor(u32),

    #[error("block size {0} is not a power of two")]
    BlockSizeNotPowerOfTwo(u32),

    #[error("target size {target_size} exceeds the wipe region of {wipe_count} blocks")]
    WipeCapacityExceeded { target_size: u32, wipe_count: u32 },

    #[error("bad params file: {0}")]
    Params(String),

    #[error("missing required params key {0:?}")]
    MissingParam(&'static str),

    #[error("{0} magic bytes not found at the expected offset")]
    MagicMismatch(&'static str),
}

pub type Result<T> = std::result::Result<T, FormatError>;
