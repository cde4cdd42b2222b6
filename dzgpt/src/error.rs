use thiserror::Error;

#[derive(Error, Debug)]
pub enum GptError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("buffer too short to hold a GPT header at LBA 1")]
    ShortBuffer,

    #[error("partition entry size {0} is smaller than the fixed 128-byte entry layout")]
    EntryTooSmall(u32),
}

pub type Result<T> = std::result::Result<T, GptError>;
