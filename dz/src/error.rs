use thiserror::Error;

#[derive(Error, Debug)]
pub enum DzError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("format error: {0}")]
    Format(#[from] dzfmt::FormatError),

    #[error("gpt error: {0}")]
    Gpt(#[from] dzgpt::GptError),

    #[error("chunker error: {0}")]
    Chunk(#[from] dzchunk::ChunkError),

    #[error("codec error: {0}")]
    Codec(#[from] dzcodec::DzCodecError),

    #[error("unknown chunking strategy: {0:?}")]
    UnknownStrategy(String),

    #[error("slice params file not found: {0}")]
    MissingSliceParams(String),

    #[error("ext2simg not found at {0:?} — required for the sparse-ext4 strategy")]
    MissingExternalTool(std::path::PathBuf),
}

pub type Result<T> = std::result::Result<T, DzError>;
