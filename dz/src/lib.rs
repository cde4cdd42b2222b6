//! DZ firmware container pipeline: decode an existing container, chunk a
//! raw slice image with one of three strategies, and encode a new
//! container from chunk files.

pub mod error;
pub mod pipeline;

pub use error::{DzError, Result};
pub use pipeline::{chunk_slice, decode, encode, load_slice_params, ChunkStrategy};

// Re-export the layer crates so downstream callers don't need to depend
// on them directly.
pub use dzchunk;
pub use dzcodec;
pub use dzfmt;
pub use dzgpt;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_roundtrips_through_display_names() {
        for name in ["holes", "probe", "sparse-ext4"] {
            assert!(ChunkStrategy::parse(name, None).is_ok());
        }
    }
}
