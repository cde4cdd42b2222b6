//! Fixed-layout record codec and schemas for LG's DZ partitioned-firmware
//! container.
//!
//! ```
//! use dzfmt::record::{ChunkHeader, ChunkSchemaVariant};
//!
//! let chunk = ChunkHeader {
//!     variant: ChunkSchemaVariant::Reserved,
//!     slice_name: b"boot".to_vec(),
//!     chunk_name: b"boot_0.bin".to_vec(),
//!     target_size: 512,
//!     data_size: 20,
//!     md5: [0u8; 16],
//!     target_addr: 0,
//!     wipe_count: 1,
//!     dev: 0,
//!     crc32: 0,
//! };
//! let bytes = chunk.encode().unwrap();
//! assert_eq!(bytes.len(), 512);
//! ```

pub mod codec;
pub mod error;
pub mod params;
pub mod record;

pub use error::{FormatError, Result};
