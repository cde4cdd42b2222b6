//! Parses the Android sparse image stream produced by an external `ext2simg`
//! process: a 28-byte header followed by `totalChunks` chunk records
//! (Raw/Fill/DontCare/Crc32).

use std::io::Read;

use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher as Crc32Hasher;

use crate::chunk_writer::ChunkWriter;
use crate::error::{ChunkError, Result};

pub const MAGIC: u32 = 0x3AFF_26ED;

pub const CHUNK_TYPE_RAW: u16 = 0xCAC1;
pub const CHUNK_TYPE_FILL: u16 = 0xCAC2;
pub const CHUNK_TYPE_DONT_CARE: u16 = 0xCAC3;
pub const CHUNK_TYPE_CRC32: u16 = 0xCAC4;

const FILL_BUF_SIZE: usize = 1 << 16;

#[derive(Debug, Clone, Copy)]
pub struct SparseHeader {
    pub major: u16,
    pub minor: u16,
    pub block_size: u32,
    pub total_blocks: u32,
    pub total_chunks: u32,
    pub image_crc32: u32,
}

pub struct SparseReader<R> {
    reader: R,
    pub header: SparseHeader,
    chunks_remaining: u32,
    running_crc: Crc32Hasher,
}

impl<R: Read> SparseReader<R> {
    pub fn new(mut reader: R) -> Result<Self> {
        let mut raw = [0u8; 28];
        reader.read_exact(&mut raw)?;

        let magic = LittleEndian::read_u32(&raw[0..4]);
        if magic != MAGIC {
            return Err(ChunkError::SparseMagic);
        }
        let major = LittleEndian::read_u16(&raw[4..6]);
        let minor = LittleEndian::read_u16(&raw[6..8]);
        let block_size = LittleEndian::read_u32(&raw[12..16]);
        let total_blocks = LittleEndian::read_u32(&raw[16..20]);
        let total_chunks = LittleEndian::read_u32(&raw[20..24]);
        let image_crc32 = LittleEndian::read_u32(&raw[24..28]);

        if major != 1 {
            return Err(ChunkError::SparseMajorVersion(major));
        }
        if block_size == 0 || !block_size.is_power_of_two() {
            return Err(ChunkError::SparseBlockSize(block_size));
        }

        Ok(SparseReader {
            reader,
            header: SparseHeader { major, minor, block_size, total_blocks, total_chunks, image_crc32 },
            chunks_remaining: total_chunks,
            running_crc: Crc32Hasher::new(),
        })
    }

    /// `minor > 0` is advisory, never fatal.
    pub fn minor_version_is_advisory(&self) -> bool {
        self.header.minor > 0
    }

    /// `(chunk_type, block_count)`, or `None` once `totalChunks` are consumed.
    pub fn next_chunk_header(&mut self) -> Result<Option<(u16, u32)>> {
        if self.chunks_remaining == 0 {
            return Ok(None);
        }
        let mut raw = [0u8; 12];
        if let Err(e) = self.reader.read_exact(&mut raw) {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                return Err(ChunkError::ExternalToolShortRead);
            }
            return Err(e.into());
        }
        self.chunks_remaining -= 1;
        let chunk_type = LittleEndian::read_u16(&raw[0..2]);
        let chunk_count = LittleEndian::read_u32(&raw[4..8]);
        Ok(Some((chunk_type, chunk_count)))
    }

    /// Copies `block_count * blockSize` raw bytes straight into `writer`.
    pub fn copy_raw_payload(&mut self, block_count: u32, writer: &mut ChunkWriter) -> Result<()> {
        let mut remaining = block_count as u64 * self.header.block_size as u64;
        let mut buf = vec![0u8; FILL_BUF_SIZE];
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            self.reader.read_exact(&mut buf[..want])?;
            self.running_crc.update(&buf[..want]);
            writer.write(&buf[..want])?;
            remaining -= want as u64;
        }
        Ok(())
    }

    pub fn read_fill_pattern(&mut self) -> Result<[u8; 4]> {
        let mut pattern = [0u8; 4];
        self.reader.read_exact(&mut pattern)?;
        Ok(pattern)
    }

    /// Expands `pattern` into `block_count * blockSize` bytes and writes them.
    pub fn expand_fill(&mut self, block_count: u32, pattern: [u8; 4], writer: &mut ChunkWriter) -> Result<()> {
        let mut buf = vec![0u8; FILL_BUF_SIZE];
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = pattern[i % 4];
        }
        let mut remaining = block_count as u64 * self.header.block_size as u64;
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            self.running_crc.update(&buf[..want]);
            writer.write(&buf[..want])?;
            remaining -= want as u64;
        }
        Ok(())
    }

    /// DontCare regions contribute zero bytes to the running image CRC.
    pub fn account_dont_care(&mut self, block_count: u32) {
        let zeros = [0u8; FILL_BUF_SIZE];
        let mut remaining = block_count as u64 * self.header.block_size as u64;
        while remaining > 0 {
            let want = remaining.min(zeros.len() as u64) as usize;
            self.running_crc.update(&zeros[..want]);
            remaining -= want as u64;
        }
    }

    pub fn read_advisory_crc32(&mut self) -> Result<u32> {
        let mut raw = [0u8; 4];
        self.reader.read_exact(&mut raw)?;
        Ok(LittleEndian::read_u32(&raw))
    }

    /// Checked only when `imageCRC32 != 0`.
    pub fn verify_final_crc(&self) -> Result<()> {
        if self.header.image_crc32 == 0 {
            return Ok(());
        }
        let actual = self.running_crc.clone().finalize();
        if actual != self.header.image_crc32 {
            return Err(ChunkError::SparseChecksumMismatch { expected: self.header.image_crc32, actual });
        }
        Ok(())
    }
}
