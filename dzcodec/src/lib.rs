//! Decoder and encoder for LG DZ firmware containers.
//!
//! A DZ container is a 512-byte `FileHeader` followed by `chunkCount`
//! chunks, each a 512-byte `ChunkHeader` immediately followed by its
//! zlib-compressed payload. [`Decoder`] validates and scans an existing
//! container; [`Encoder`]-equivalent [`encoder::build`] assembles chunk
//! files produced by `dzchunk` back into one.
//!
//! ```no_run
//! use std::path::Path;
//!
//! # fn example() -> dzcodec::Result<()> {
//! let decoder = dzcodec::Decoder::open(Path::new("firmware.dz"), 512)?;
//! for chunk in decoder.list() {
//!     println!("{}", chunk.chunk_name_str());
//! }
//! # Ok(())
//! # }
//! ```

pub mod decoder;
pub mod encoder;
pub mod error;

pub use decoder::{Decoder, SliceInfo};
pub use error::{DzCodecError, Result};
