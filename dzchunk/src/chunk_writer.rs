//! Emits one `.chunk` file: placeholder `ChunkHeader` zeros, a streamed
//! zlib payload (level 1), then rewind-and-overwrite with the finalized
//! header once the payload's length/MD5/CRC32 are known.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crc32fast::Hasher as Crc32Hasher;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use md5::{Digest, Md5};

use dzfmt::record::{ChunkHeader, ChunkSchemaVariant};

use crate::error::Result;

pub struct ChunkWriter {
    path: PathBuf,
    encoder: ZlibEncoder<File>,
    md5: Md5,
    crc32: Crc32Hasher,
    uncompressed_len: u64,
    variant: ChunkSchemaVariant,
    slice_name: String,
    target_addr: u32,
    dev: u32,
}

impl ChunkWriter {
    pub fn create(
        dir: &Path,
        slice_name: &str,
        target_addr: u32,
        variant: ChunkSchemaVariant,
        dev: u32,
    ) -> Result<Self> {
        let path = dir.join(format!("{slice_name}_{target_addr}.bin.chunk"));
        let mut file = File::create(&path)?;
        file.write_all(&[0u8; dzfmt::record::RECORD_SIZE])?;

        Ok(ChunkWriter {
            path,
            encoder: ZlibEncoder::new(file, Compression::new(1)),
            md5: Md5::new(),
            crc32: Crc32Hasher::new(),
            uncompressed_len: 0,
            variant,
            slice_name: slice_name.to_string(),
            target_addr,
            dev,
        })
    }

    /// Feed uncompressed source bytes. MD5/CRC32 are updated over these
    /// bytes before they're deflated.
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.md5.update(buf);
        self.crc32.update(buf);
        self.uncompressed_len += buf.len() as u64;
        self.encoder.write_all(buf)?;
        Ok(())
    }

    pub fn uncompressed_len(&self) -> u64 {
        self.uncompressed_len
    }

    /// Flush the deflate stream, rewind, and overwrite the placeholder
    /// header with the finalized one. Returns the chunk file path.
    pub fn finish(self, wipe_count: u32) -> Result<PathBuf> {
        let data_size = self.encoder.total_out();
        let mut file = self.encoder.finish()?;

        let chunk_name = format!("{}_{}.bin", self.slice_name, self.target_addr);
        let header = ChunkHeader {
            variant: self.variant,
            slice_name: self.slice_name.into_bytes(),
            chunk_name: chunk_name.into_bytes(),
            target_size: self.uncompressed_len as u32,
            data_size: data_size as u32,
            md5: self.md5.finalize().into(),
            target_addr: self.target_addr,
            wipe_count,
            dev: self.dev,
            crc32: self.crc32.finalize(),
        };

        let header_bytes = header.encode()?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header_bytes)?;

        Ok(self.path)
    }
}
