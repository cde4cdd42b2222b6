//! Builds DZ chunk files from a raw disk-slice image using one of three
//! strategies: [`holes`] (OS sparse-region queries), [`probe`] (manual
//! all-zero-block scanning), or [`sparse_ext4`] (delegates to an external
//! `ext2simg`-style tool and re-chunks its Android sparse output).
//!
//! ```no_run
//! use dzfmt::params::SliceParams;
//! use dzfmt::record::ChunkSchemaVariant;
//! use std::path::Path;
//!
//! # fn example(params: &SliceParams) -> dzchunk::Result<()> {
//! dzchunk::holes::build(
//!     Path::new("boot.img"),
//!     Path::new("out"),
//!     "boot",
//!     params,
//!     ChunkSchemaVariant::Reserved,
//!     None,
//! )?;
//! # Ok(())
//! # }
//! ```

pub mod android_sparse;
pub mod chunk_writer;
pub mod error;
pub mod holes;
pub mod probe;
pub mod sparse_ext4;

pub use chunk_writer::ChunkWriter;
pub use error::{ChunkError, Result};
