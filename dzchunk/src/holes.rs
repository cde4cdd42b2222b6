//! Strategy "Holes": walk the source file using OS sparse-region queries
//! (`SEEK_DATA`/`SEEK_HOLE`) and emit one chunk per contiguous data run,
//! splitting runs wider than the 128 MiB cap.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use dzfmt::params::SliceParams;
use dzfmt::record::ChunkSchemaVariant;

use crate::chunk_writer::ChunkWriter;
use crate::error::Result;

/// The cap exists in later firmware revisions only; per the reference
/// tool's newer behavior this is applied unconditionally and is the
/// default unless a caller overrides it.
pub const DEFAULT_SPLIT_CAP: u64 = 1 << 27;

fn seek_data(file: &File, from: u64) -> std::io::Result<Option<u64>> {
    match nix::unistd::lseek(file.as_raw_fd(), from as i64, nix::unistd::Whence::SeekData) {
        Ok(pos) => Ok(Some(pos as u64)),
        Err(nix::errno::Errno::ENXIO) => Ok(None),
        Err(e) => Err(std::io::Error::from_raw_os_error(e as i32)),
    }
}

fn seek_hole(file: &File, from: u64, file_len: u64) -> std::io::Result<u64> {
    match nix::unistd::lseek(file.as_raw_fd(), from as i64, nix::unistd::Whence::SeekHole) {
        Ok(pos) => Ok(pos as u64),
        Err(nix::errno::Errno::ENXIO) => Ok(file_len),
        Err(e) => Err(std::io::Error::from_raw_os_error(e as i32)),
    }
}

fn align_up(value: u64, align: u64) -> u64 {
    (value + align - 1) / align * align
}

/// Build chunks for `slice_path` (a raw slice image) into `out_dir`.
/// `split_cap` overrides [`DEFAULT_SPLIT_CAP`]; pass `None` to use it.
pub fn build(
    slice_path: &Path,
    out_dir: &Path,
    slice_name: &str,
    params: &SliceParams,
    variant: ChunkSchemaVariant,
    split_cap: Option<u64>,
) -> Result<Vec<PathBuf>> {
    let split_cap = split_cap.unwrap_or(DEFAULT_SPLIT_CAP);
    let block_size = params.block_size as u64;
    let dev = params.dev.unwrap_or(0);
    let mut file = File::open(slice_path)?;
    let file_len = file.metadata()?.len();

    let mut outputs = Vec::new();
    let mut current = 0u64;
    let mut buf = vec![0u8; 1 << 20];

    loop {
        let data_start = match seek_data(&file, current)? {
            Some(pos) => pos,
            None => break,
        };
        let hole_end = seek_hole(&file, data_start, file_len)?;
        let aligned_end = align_up(hole_end, block_size).min(file_len);
        let next_data_start = seek_data(&file, aligned_end)?;

        let mut piece_start = data_start;
        while piece_start < aligned_end {
            let remaining = aligned_end - piece_start;
            let piece_len = remaining.min(split_cap);
            let piece_end = piece_start + piece_len;
            let is_last_piece_of_run = piece_end == aligned_end;

            let target_lba = params.start_addr + piece_start / block_size;
            let mut writer = ChunkWriter::create(out_dir, slice_name, target_lba as u32, variant, dev)?;

            file.seek(SeekFrom::Start(piece_start))?;
            let mut remaining_to_read = piece_len;
            while remaining_to_read > 0 {
                let want = remaining_to_read.min(buf.len() as u64) as usize;
                file.read_exact(&mut buf[..want])?;
                writer.write(&buf[..want])?;
                remaining_to_read -= want as u64;
            }

            let wipe_count = if is_last_piece_of_run {
                match next_data_start {
                    Some(next) => ((next - piece_start) / block_size) as u32,
                    None => (params.last_wipe - target_lba) as u32,
                }
            } else {
                (piece_len / block_size) as u32
            };

            outputs.push(writer.finish(wipe_count)?);
            piece_start = piece_end;
        }

        current = match next_data_start {
            Some(next) => next,
            None => break,
        };
    }

    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dzfmt::record::ChunkHeader;
    use std::io::Write as _;

    #[test]
    fn single_data_run_surrounded_by_holes_yields_one_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let slice_path = dir.path().join("system.img");

        let block_size = 512u64;
        let mut file = File::create(&slice_path).unwrap();
        file.set_len(4 * block_size).unwrap();
        file.seek(SeekFrom::Start(block_size)).unwrap();
        file.write_all(&[0xCDu8; 2 * 512]).unwrap();
        drop(file);

        let params = SliceParams {
            start_lba: 0,
            start_addr: 0,
            end_lba: 4,
            end_addr: 4,
            last_wipe: 4,
            block_size: block_size as u32,
            block_shift: 9,
            dev: None,
            phantom: false,
        };

        let out_dir = dir.path();
        let outputs = build(&slice_path, out_dir, "system", &params, ChunkSchemaVariant::Reserved, None).unwrap();
        assert_eq!(outputs.len(), 1);

        let bytes = std::fs::read(&outputs[0]).unwrap();
        let header = ChunkHeader::decode(ChunkSchemaVariant::Reserved, &bytes[..dzfmt::record::RECORD_SIZE])
            .unwrap()
            .unwrap();
        assert_eq!(header.target_addr, 1);
        assert_eq!(header.target_size, 2 * 512);
    }
}
