//! Assembles chunk files and a `.dz.params` sidecar into a DZ container.
//! Chunk files are trusted verbatim — their hashes were already computed
//! by the Chunker and are not re-verified here.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};

use dzfmt::params::ContainerParams;
use dzfmt::record::{ChunkHeader, FileHeader, RECORD_SIZE};

use crate::error::{DzCodecError, Result};

struct LoadedChunk {
    path: PathBuf,
    header: ChunkHeader,
    header_bytes: [u8; RECORD_SIZE],
}

/// Load `.dz.params` from `params_path` and every `*.bin.chunk` file in
/// `chunk_dir`, then write the assembled container to `out_path`.
pub fn build(params_path: &Path, chunk_dir: &Path, out_path: &Path) -> Result<()> {
    let params_text = fs::read_to_string(params_path)?;
    let container_params = ContainerParams::parse(&params_text)?;
    let block_shift = container_params.block_shift()?;
    let mut file_header = container_params.to_file_header()?;

    let variant = file_header.schema_variant();
    let mut chunks = load_chunk_files(chunk_dir, variant)?;

    for chunk in &chunks {
        chunk.header.check_wipe_capacity(block_shift)?;
    }

    sort_chunks(&mut chunks);
    check_no_overlap(&chunks, block_shift)?;

    let mut header_md5 = Md5::new();
    for chunk in &chunks {
        header_md5.update(chunk.header_bytes);
    }

    file_header.chunk_count = chunks.len() as u32;
    file_header.md5 = header_md5.finalize().into();

    let mut out = File::create(out_path)?;
    out.write_all(&file_header.encode()?)?;
    for chunk in &chunks {
        let mut src = File::open(&chunk.path)?;
        std::io::copy(&mut src, &mut out)?;
    }

    Ok(())
}

fn load_chunk_files(chunk_dir: &Path, variant: dzfmt::record::ChunkSchemaVariant) -> Result<Vec<LoadedChunk>> {
    let mut chunks = Vec::new();
    for entry in fs::read_dir(chunk_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("chunk") {
            continue;
        }

        let mut file = File::open(&path)?;
        let mut header_bytes = [0u8; RECORD_SIZE];
        file.read_exact(&mut header_bytes)?;
        let header = ChunkHeader::decode(variant, &header_bytes)?
            .ok_or(DzCodecError::Format(dzfmt::FormatError::MagicMismatch("ChunkHeader")))?;

        chunks.push(LoadedChunk { path, header, header_bytes });
    }
    Ok(chunks)
}

/// Sort by `(dev, targetAddr)`; when both tie, a chunk file whose name ends
/// in `.img` sorts first (a phantom wipe-only placeholder at the same
/// address always follows the data it precedes).
fn sort_chunks(chunks: &mut [LoadedChunk]) {
    chunks.sort_by(|a, b| {
        let key_a = (a.header.dev, a.header.target_addr, !a.path.file_name().unwrap().to_string_lossy().contains(".img"));
        let key_b = (b.header.dev, b.header.target_addr, !b.path.file_name().unwrap().to_string_lossy().contains(".img"));
        key_a.cmp(&key_b)
    });
}

fn check_no_overlap(chunks: &[LoadedChunk], block_shift: u32) -> Result<()> {
    let mut by_dev: BTreeMap<u32, Vec<(u64, u64)>> = BTreeMap::new();
    for chunk in chunks {
        let start = chunk.header.target_addr as u64;
        let end = start + (chunk.header.wipe_count as u64).max((chunk.header.target_size as u64) >> block_shift);
        by_dev.entry(chunk.header.dev).or_default().push((start, end));
    }

    for (dev, mut ranges) in by_dev {
        ranges.sort();
        for window in ranges.windows(2) {
            let (a_start, a_end) = window[0];
            let (b_start, b_end) = window[1];
            if b_start < a_end {
                return Err(DzCodecError::OverlappingChunks { dev, a_start, a_end, b_start, b_end });
            }
        }
    }
    Ok(())
}

/// Rewrite `.dz.params` from a decoded [`FileHeader`], for round-tripping
/// a decoded container back through the Encoder.
pub fn write_params(header: &FileHeader, block_shift: u32, out_path: &Path) -> Result<()> {
    let params = ContainerParams::from_file_header(header, block_shift);
    fs::write(out_path, params.to_text())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dzfmt::record::ChunkSchemaVariant;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    fn write_sample_chunk(dir: &Path, slice_name: &str, target_addr: u32, wipe_count: u32) -> PathBuf {
        let payload = vec![0x11u8; 512];
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(1));
        encoder.write_all(&payload).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut md5 = Md5::new();
        md5.update(&payload);
        let crc = crc32fast::hash(&payload);

        let header = ChunkHeader {
            variant: ChunkSchemaVariant::Reserved,
            slice_name: slice_name.as_bytes().to_vec(),
            chunk_name: format!("{slice_name}_{target_addr}.bin").into_bytes(),
            target_size: payload.len() as u32,
            data_size: compressed.len() as u32,
            md5: md5.finalize().into(),
            target_addr,
            wipe_count,
            dev: 0,
            crc32: crc,
        };

        let path = dir.join(format!("{slice_name}_{target_addr}.bin.chunk"));
        let mut file = File::create(&path).unwrap();
        file.write_all(&header.encode().unwrap()).unwrap();
        file.write_all(&compressed).unwrap();
        path
    }

    fn sample_params_text() -> String {
        "formatMajor=2\nformatMinor=1\ndevice=bullhead\nversion=test\nunknown0=0\nunknown1=00000000000000000000000000000000000000\nunknown2=\nbuild_type=user\nunknown3=0000000000000000\noldDateCode=20160101\nblockShift=9\n".to_string()
    }

    #[test]
    fn build_writes_a_container_with_correct_header_md5() {
        let dir = tempfile::tempdir().unwrap();
        write_sample_chunk(dir.path(), "boot", 0, 1);

        let params_path = dir.path().join("container.dz.params");
        fs::write(&params_path, sample_params_text()).unwrap();

        let out_path = dir.path().join("out.dz");
        build(&params_path, dir.path(), &out_path).unwrap();

        let decoder = crate::decoder::Decoder::open(&out_path, 512).unwrap();
        assert_eq!(decoder.list().len(), 1);
    }

    #[test]
    fn wipe_capacity_violation_is_rejected_at_build_time() {
        let dir = tempfile::tempdir().unwrap();
        // 512-byte payload with blockShift=9 needs wipeCount >= 1.
        write_sample_chunk(dir.path(), "boot", 0, 0);

        let params_path = dir.path().join("container.dz.params");
        fs::write(&params_path, sample_params_text()).unwrap();

        let out_path = dir.path().join("out.dz");
        let err = build(&params_path, dir.path(), &out_path).unwrap_err();
        assert!(matches!(err, DzCodecError::Format(dzfmt::FormatError::WipeCapacityExceeded { .. })));
    }

    #[test]
    fn overlapping_chunks_on_same_dev_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_sample_chunk(dir.path(), "boot", 0, 4);
        write_sample_chunk(dir.path(), "boot", 2, 4);

        let params_path = dir.path().join("container.dz.params");
        fs::write(&params_path, sample_params_text()).unwrap();

        let out_path = dir.path().join("out.dz");
        let err = build(&params_path, dir.path(), &out_path).unwrap_err();
        assert!(matches!(err, DzCodecError::OverlappingChunks { .. }));
    }
}
