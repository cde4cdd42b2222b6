//! Strategy "Probe": for filesystems without sparse-region queries, scan
//! the source in fixed `blockSize * 1024`-byte quanta looking for all-zero
//! blocks. Always emits at least one chunk starting at offset 0, even if
//! the slice begins with zeros.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use dzfmt::params::SliceParams;
use dzfmt::record::ChunkSchemaVariant;

use crate::chunk_writer::ChunkWriter;
use crate::error::Result;

fn read_quantum(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

pub fn build(
    slice_path: &Path,
    out_dir: &Path,
    slice_name: &str,
    params: &SliceParams,
    variant: ChunkSchemaVariant,
) -> Result<Vec<PathBuf>> {
    let block_size = params.block_size as u64;
    let read_size = (block_size * 1024) as usize;
    let dev = params.dev.unwrap_or(0);
    let mut file = File::open(slice_path)?;

    let mut outputs = Vec::new();
    let mut offset: u64 = 0;
    let mut chunk_start_offset: u64 = 0;
    let mut writer: Option<ChunkWriter> = None;
    let mut seen_nonzero = false;
    let mut skipping = false;
    let mut skip_bytes: u64 = 0;
    let mut buf = vec![0u8; read_size];

    loop {
        let n = read_quantum(&mut file, &mut buf)?;
        if n == 0 {
            break;
        }
        let block = &buf[..n];
        let is_zero = block.iter().all(|&b| b == 0);

        if writer.is_none() {
            chunk_start_offset = offset;
            let target_addr = (params.start_addr + offset / block_size) as u32;
            let mut w = ChunkWriter::create(out_dir, slice_name, target_addr, variant, dev)?;
            w.write(block)?;
            writer = Some(w);
            seen_nonzero = !is_zero;
        } else if is_zero {
            if seen_nonzero {
                skipping = true;
                skip_bytes += n as u64;
            } else {
                writer.as_mut().unwrap().write(block)?;
            }
        } else if skipping {
            let finished = writer.take().unwrap();
            let wipe_count = (skip_bytes / block_size) as u32;
            outputs.push(finished.finish(wipe_count)?);

            skipping = false;
            skip_bytes = 0;
            chunk_start_offset = offset;
            let target_addr = (params.start_addr + offset / block_size) as u32;
            let mut new_writer = ChunkWriter::create(out_dir, slice_name, target_addr, variant, dev)?;
            new_writer.write(block)?;
            writer = Some(new_writer);
            seen_nonzero = true;
        } else {
            writer.as_mut().unwrap().write(block)?;
            seen_nonzero = true;
        }

        offset += n as u64;
        if n < read_size {
            break;
        }
    }

    if let Some(w) = writer {
        let target_addr = params.start_addr + chunk_start_offset / block_size;
        let wipe_count = (params.last_wipe - target_addr) as u32;
        outputs.push(w.finish(wipe_count)?);
    }

    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dzfmt::record::ChunkHeader;
    use std::io::Write as _;

    /// `[64 KiB zeros][1 MiB 0xFF][64 KiB zeros][1 MiB 0xFF][tail]` must
    /// collapse into exactly two chunks: a zero-run in the middle of a
    /// chunk that has already seen non-zero data is a skip, not a new
    /// chunk boundary, and re-entering non-zero data after a skip must not
    /// forget that the chunk it appends to has already seen non-zero bytes.
    #[test]
    fn leading_zero_run_then_two_data_runs_yields_two_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let slice_path = dir.path().join("system.img");

        let mut file = File::create(&slice_path).unwrap();
        file.write_all(&vec![0u8; 64 * 1024]).unwrap();
        file.write_all(&vec![0xFFu8; 1024 * 1024]).unwrap();
        file.write_all(&vec![0u8; 64 * 1024]).unwrap();
        file.write_all(&vec![0xFFu8; 1024 * 1024]).unwrap();
        file.write_all(&vec![0xAAu8; 4096]).unwrap();
        drop(file);

        // `readSize = blockSize * 1024`; pick 64 so one quantum exactly
        // covers each 64 KiB zero run and aligns to the 1 MiB data runs.
        let params = SliceParams {
            start_lba: 0,
            start_addr: 0,
            end_lba: 35000,
            end_addr: 35000,
            last_wipe: 35000,
            block_size: 64,
            block_shift: 6,
            dev: None,
            phantom: false,
        };

        let outputs = build(&slice_path, dir.path(), "system", &params, ChunkSchemaVariant::Reserved).unwrap();
        assert_eq!(outputs.len(), 2);

        let read_header = |path: &Path| -> ChunkHeader {
            let bytes = std::fs::read(path).unwrap();
            ChunkHeader::decode(ChunkSchemaVariant::Reserved, &bytes[..dzfmt::record::RECORD_SIZE])
                .unwrap()
                .unwrap()
        };
        assert_eq!(read_header(&outputs[0]).target_addr, 0);
        assert_eq!(read_header(&outputs[1]).target_addr, (64 * 1024 + 1024 * 1024 + 64 * 1024) / 64);
    }
}
