//! Strategy "Sparse-EXT4": spawn `ext2simg`, parse its sparse image stdout
//! stream, and re-chunk it into DZ chunks. The child is always reaped:
//! waited for on success, sent `SIGTERM` then `SIGKILL` after a 10-second
//! grace period on any early abort.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use dzfmt::params::SliceParams;
use dzfmt::record::ChunkSchemaVariant;

use crate::android_sparse::{self, SparseReader};
use crate::chunk_writer::ChunkWriter;
use crate::error::{ChunkError, Result};

/// Run `ext2simg -c <ext4_source> -` and convert its sparse stdout stream
/// into DZ chunks under `out_dir`.
pub fn build(
    ext2simg_path: &Path,
    ext4_source: &Path,
    out_dir: &Path,
    slice_name: &str,
    params: &SliceParams,
    variant: ChunkSchemaVariant,
) -> Result<Vec<PathBuf>> {
    let mut child = Command::new(ext2simg_path)
        .arg("-c")
        .arg(ext4_source)
        .arg("-")
        .stdout(Stdio::piped())
        .spawn()?;

    let stdout = child.stdout.take().expect("piped stdout requested above");

    match run_conversion(stdout, out_dir, slice_name, params, variant) {
        Ok(outputs) => {
            let status = child.wait()?;
            if !status.success() {
                return Err(ChunkError::ExternalToolFailed(status));
            }
            Ok(outputs)
        }
        Err(e) => {
            abort_and_reap(&mut child);
            Err(e)
        }
    }
}

fn run_conversion<R: Read>(
    stdout: R,
    out_dir: &Path,
    slice_name: &str,
    params: &SliceParams,
    variant: ChunkSchemaVariant,
) -> Result<Vec<PathBuf>> {
    let dev = params.dev.unwrap_or(0);
    let mut sparse = SparseReader::new(stdout)?;

    let mut outputs = Vec::new();
    let mut writer: Option<ChunkWriter> = None;
    let mut chunk_start_lba = params.start_addr;
    let mut trim_count: u64 = 0;

    while let Some((chunk_type, block_count)) = sparse.next_chunk_header()? {
        match chunk_type {
            android_sparse::CHUNK_TYPE_RAW => {
                if writer.is_none() {
                    writer = Some(ChunkWriter::create(out_dir, slice_name, chunk_start_lba as u32, variant, dev)?);
                }
                sparse.copy_raw_payload(block_count, writer.as_mut().unwrap())?;
                trim_count += block_count as u64;
            }
            android_sparse::CHUNK_TYPE_FILL => {
                if writer.is_none() {
                    writer = Some(ChunkWriter::create(out_dir, slice_name, chunk_start_lba as u32, variant, dev)?);
                }
                let pattern = sparse.read_fill_pattern()?;
                sparse.expand_fill(block_count, pattern, writer.as_mut().unwrap())?;
                trim_count += block_count as u64;
            }
            android_sparse::CHUNK_TYPE_DONT_CARE => {
                sparse.account_dont_care(block_count);
                trim_count += block_count as u64;
                match writer.take() {
                    Some(w) => {
                        outputs.push(w.finish(trim_count as u32)?);
                    }
                    None => {}
                }
                chunk_start_lba += trim_count;
                trim_count = 0;
            }
            android_sparse::CHUNK_TYPE_CRC32 => {
                let _ = sparse.read_advisory_crc32()?;
            }
            other => return Err(ChunkError::SparseChunkType(other)),
        }
    }

    if let Some(w) = writer {
        let wipe_count = (params.last_wipe - chunk_start_lba) as u32;
        outputs.push(w.finish(wipe_count)?);
    }

    sparse.verify_final_crc()?;

    Ok(outputs)
}

fn abort_and_reap(child: &mut Child) {
    if matches!(child.try_wait(), Ok(Some(_))) {
        return;
    }
    if let Ok(pid) = i32::try_from(child.id()) {
        let _ = signal::kill(Pid::from_raw(pid), Signal::SIGTERM);
    }

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        match child.try_wait() {
            Ok(Some(_)) | Err(_) => return,
            Ok(None) => {}
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{ByteOrder, LittleEndian};
    use dzfmt::params::SliceParams;
    use dzfmt::record::ChunkHeader;
    use std::io::Cursor;

    fn push_chunk_header(buf: &mut Vec<u8>, chunk_type: u16, block_count: u32) {
        let mut raw = [0u8; 12];
        LittleEndian::write_u16(&mut raw[0..2], chunk_type);
        LittleEndian::write_u32(&mut raw[4..8], block_count);
        buf.extend_from_slice(&raw);
    }

    /// `[Raw:2blocks][DontCare:3blocks][Fill(0x00000000):2blocks]`, 512-byte
    /// blocks: two DZ chunks with wipeCounts 5 and `lastWipe-5`.
    fn sparse_stream(block_size: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut header = [0u8; 28];
        LittleEndian::write_u32(&mut header[0..4], android_sparse::MAGIC);
        LittleEndian::write_u16(&mut header[4..6], 1);
        LittleEndian::write_u32(&mut header[12..16], block_size);
        LittleEndian::write_u32(&mut header[16..20], 7);
        LittleEndian::write_u32(&mut header[20..24], 3);
        buf.extend_from_slice(&header);

        push_chunk_header(&mut buf, android_sparse::CHUNK_TYPE_RAW, 2);
        buf.extend(std::iter::repeat(0x7Au8).take(2 * block_size as usize));

        push_chunk_header(&mut buf, android_sparse::CHUNK_TYPE_DONT_CARE, 3);

        push_chunk_header(&mut buf, android_sparse::CHUNK_TYPE_FILL, 2);
        buf.extend_from_slice(&[0u8; 4]);

        buf
    }

    #[test]
    fn raw_dontcare_fill_splits_into_two_chunks_with_trim_accounted() {
        let dir = tempfile::tempdir().unwrap();
        let params = SliceParams {
            start_lba: 0,
            start_addr: 0,
            end_lba: 20,
            end_addr: 20,
            last_wipe: 20,
            block_size: 512,
            block_shift: 9,
            dev: None,
            phantom: false,
        };

        let stream = sparse_stream(512);
        let outputs = run_conversion(
            Cursor::new(stream),
            dir.path(),
            "system",
            &params,
            ChunkSchemaVariant::Reserved,
        )
        .unwrap();

        assert_eq!(outputs.len(), 2);

        let read_header = |path: &Path| -> ChunkHeader {
            let bytes = std::fs::read(path).unwrap();
            ChunkHeader::decode(ChunkSchemaVariant::Reserved, &bytes[..dzfmt::record::RECORD_SIZE])
                .unwrap()
                .unwrap()
        };

        let first = read_header(&outputs[0]);
        let second = read_header(&outputs[1]);
        assert_eq!(first.target_addr, 0);
        assert_eq!(first.wipe_count, 5);
        assert_eq!(second.target_addr, 5);
        assert_eq!(second.wipe_count, 15);
    }
}
