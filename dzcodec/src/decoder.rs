//! Scans a DZ container, validates its integrity invariants, and exposes
//! list/extract operations over its chunks and slices.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crc32fast::Hasher as Crc32Hasher;
use flate2::read::ZlibDecoder;
use md5::{Digest, Md5};

use dzfmt::params::{ContainerParams, SliceParams};
use dzfmt::record::{ChunkHeader, FileHeader, RECORD_SIZE};

use crate::error::{DzCodecError, Result};

/// Byte offset and on-disk size of one chunk's header + payload, as found
/// while scanning the container.
#[derive(Debug, Clone, Copy)]
struct ChunkLocation {
    header_offset: u64,
    payload_offset: u64,
    payload_len: u64,
}

/// One slice's worth of chunks, in the order they appear in the container.
#[derive(Debug, Clone)]
pub struct SliceInfo {
    pub name: String,
    pub dev: u32,
    pub chunk_indices: Vec<usize>,
    pub gpt: Option<dzgpt::GptSlice>,
}

pub struct Decoder {
    path: PathBuf,
    file_header: FileHeader,
    chunk_headers: Vec<ChunkHeader>,
    locations: Vec<ChunkLocation>,
    slices: Vec<SliceInfo>,
    advisories: Vec<dzfmt::record::Advisory>,
}

impl Decoder {
    /// Scan `path`: read the file header, every chunk header in sequence,
    /// and verify the running MD5 over the concatenated chunk headers.
    /// `block_size` is used only for GPT-slice resolution; it does not
    /// affect header parsing.
    pub fn open(path: &Path, block_size: u32) -> Result<Self> {
        let mut file = File::open(path)?;

        let mut header_buf = [0u8; RECORD_SIZE];
        file.read_exact(&mut header_buf)?;
        let file_header = FileHeader::decode(&header_buf)?
            .ok_or(DzCodecError::Format(dzfmt::FormatError::MagicMismatch("FileHeader")))?;
        let mut advisories = file_header.validate()?;

        let variant = file_header.schema_variant();
        let mut chunk_headers = Vec::with_capacity(file_header.chunk_count as usize);
        let mut locations = Vec::with_capacity(file_header.chunk_count as usize);
        let mut header_md5 = Md5::new();
        let mut offset = RECORD_SIZE as u64;
        let file_len = file.metadata()?.len();

        let mut index = 0;
        while offset < file_len {
            let mut raw = [0u8; RECORD_SIZE];
            file.read_exact(&mut raw)?;
            header_md5.update(&raw);

            let chunk = ChunkHeader::decode(variant, &raw)?
                .ok_or(DzCodecError::Format(dzfmt::FormatError::MagicMismatch("ChunkHeader")))?;

            if let Some(advisory) = chunk.check_name_advisory(index) {
                advisories.push(advisory);
            }

            let payload_offset = offset + RECORD_SIZE as u64;
            locations.push(ChunkLocation {
                header_offset: offset,
                payload_offset,
                payload_len: chunk.data_size as u64,
            });
            offset = payload_offset + chunk.data_size as u64;
            file.seek(SeekFrom::Start(offset))?;

            chunk_headers.push(chunk);
            index += 1;
        }

        let expected_md5 = header_md5.finalize();
        if expected_md5.as_slice() != file_header.md5 {
            return Err(DzCodecError::HeaderMd5Mismatch {
                expected: hex(&file_header.md5),
                actual: hex(expected_md5.as_slice()),
            });
        }

        if chunk_headers.len() != file_header.chunk_count as usize {
            advisories.push(dzfmt::record::Advisory::ChunkCountMismatch {
                declared: file_header.chunk_count,
                actual: chunk_headers.len(),
            });
        }

        if !is_sorted_by_target_addr(&chunk_headers) {
            advisories.push(dzfmt::record::Advisory::ChunksOutOfOrder);
            stable_sort_by_slice_and_addr(&mut chunk_headers, &mut locations);
        }

        let slices = group_into_slices(&chunk_headers, &locations, &mut file, variant, block_size)?;

        Ok(Decoder {
            path: path.to_path_buf(),
            file_header,
            chunk_headers,
            locations,
            slices,
            advisories,
        })
    }

    pub fn file_header(&self) -> &FileHeader {
        &self.file_header
    }

    pub fn advisories(&self) -> &[dzfmt::record::Advisory] {
        &self.advisories
    }

    /// List every chunk header in container order.
    pub fn list(&self) -> &[ChunkHeader] {
        &self.chunk_headers
    }

    pub fn slices(&self) -> &[SliceInfo] {
        &self.slices
    }

    pub fn slice(&self, name: &str) -> Option<&SliceInfo> {
        self.slices.iter().find(|s| s.name == name)
    }

    /// Decompress chunk `index`, verifying its MD5/CRC32 against the header.
    pub fn extract_chunk(&self, index: usize) -> Result<Vec<u8>> {
        let header = self.chunk_headers.get(index).ok_or(DzCodecError::ChunkNotFound(index))?;
        let location = &self.locations[index];

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(location.payload_offset))?;
        let mut compressed = vec![0u8; location.payload_len as usize];
        file.read_exact(&mut compressed)?;

        let mut decoder = ZlibDecoder::new(&compressed[..]);
        let mut out = vec![0u8; header.target_size as usize];
        read_full(&mut decoder, &mut out)?;

        let mut crc = Crc32Hasher::new();
        crc.update(&out);
        let actual_crc = crc.finalize();
        if actual_crc != header.crc32 {
            return Err(DzCodecError::ChunkCrc32Mismatch { chunk_index: index, expected: header.crc32, actual: actual_crc });
        }

        let mut md5 = Md5::new();
        md5.update(&out);
        let actual_md5 = md5.finalize();
        if actual_md5.as_slice() != header.md5 {
            return Err(DzCodecError::ChunkMd5Mismatch {
                chunk_index: index,
                expected: hex(&header.md5),
                actual: hex(actual_md5.as_slice()),
            });
        }

        Ok(out)
    }

    /// Copy chunk `index`'s header+payload bytes verbatim into `out_dir`.
    pub fn extract_chunk_file(&self, index: usize, out_dir: &Path) -> Result<PathBuf> {
        let header = self.chunk_headers.get(index).ok_or(DzCodecError::ChunkNotFound(index))?;
        let location = &self.locations[index];

        let mut src = File::open(&self.path)?;
        src.seek(SeekFrom::Start(location.header_offset))?;
        let total = RECORD_SIZE as u64 + location.payload_len;
        let mut buf = vec![0u8; total as usize];
        src.read_exact(&mut buf)?;

        let out_path = out_dir.join(format!("{}.chunk", header.chunk_name_str()));
        fs::write(&out_path, &buf)?;
        Ok(out_path)
    }

    /// Reconstruct one slice's image, writing each chunk's payload at its
    /// `targetAddr * blockSize` offset. Regions not covered by any chunk are
    /// never written, so the result is a sparse file on filesystems that
    /// support holes.
    pub fn extract_slice(&self, name: &str, out_path: &Path) -> Result<()> {
        let slice = self.slice(name).ok_or_else(|| DzCodecError::SliceNotFound(name.to_string()))?;
        if slice.chunk_indices.is_empty() {
            File::create(out_path)?;
            return Ok(());
        }

        let block_size = self.infer_block_size();
        let mut out = File::create(out_path)?;
        for &index in &slice.chunk_indices {
            let header = &self.chunk_headers[index];
            let data = self.extract_chunk(index)?;
            out.seek(SeekFrom::Start(header.target_addr as u64 * block_size))?;
            out.write_all(&data)?;
        }
        Ok(())
    }

    /// Reconstruct every slice into `out_dir`, one file per slice name.
    pub fn extract_image(&self, out_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for slice in &self.slices {
            let out_path = out_dir.join(format!("{}.img", slice.name));
            self.extract_slice(&slice.name, &out_path)?;
            paths.push(out_path);
        }
        Ok(paths)
    }

    /// Write `.dz.params` and one `<slice>.image.params` per slice.
    pub fn save_header(&self, out_dir: &Path) -> Result<()> {
        let block_shift = dzfmt::record::block_shift_of(self.infer_block_size() as u32)?;
        let container_params = ContainerParams::from_file_header(&self.file_header, block_shift);
        fs::write(out_dir.join("container.dz.params"), container_params.to_text())?;

        for slice in &self.slices {
            let params = self.slice_params_for(slice, block_shift)?;
            fs::write(out_dir.join(format!("{}.image.params", slice.name)), params.to_text())?;
        }
        Ok(())
    }

    fn slice_params_for(&self, slice: &SliceInfo, block_shift: u32) -> Result<SliceParams> {
        let block_size = self.infer_block_size() as u32;
        if slice.chunk_indices.is_empty() {
            return Ok(SliceParams {
                start_lba: 0,
                start_addr: 0,
                end_lba: 0,
                end_addr: 0,
                last_wipe: 0,
                block_size,
                block_shift,
                dev: Some(slice.dev),
                phantom: true,
            });
        }
        let first = &self.chunk_headers[slice.chunk_indices[0]];
        let last = &self.chunk_headers[*slice.chunk_indices.last().unwrap()];
        let last_wipe = last.target_addr as u64 + last.wipe_count as u64;
        Ok(SliceParams {
            start_lba: first.target_addr as u64,
            start_addr: first.target_addr as u64,
            end_lba: last_wipe,
            end_addr: last_wipe,
            last_wipe,
            block_size,
            block_shift,
            dev: Some(slice.dev),
            phantom: false,
        })
    }

    /// `blockSize` isn't carried by the container itself; absent a GPT
    /// chunk's own header field we fall back to the default 512-byte LBA.
    fn infer_block_size(&self) -> u64 {
        512
    }
}

fn is_sorted_by_target_addr(chunks: &[ChunkHeader]) -> bool {
    chunks.windows(2).all(|w| w[0].target_addr <= w[1].target_addr || w[0].slice_name != w[1].slice_name)
}

/// Out-of-order chunks are a recoverable condition: stable-sort by
/// `(sliceName, targetAddr)`, keeping `locations` in lockstep so each header
/// still points at its own on-disk payload.
fn stable_sort_by_slice_and_addr(chunks: &mut Vec<ChunkHeader>, locations: &mut Vec<ChunkLocation>) {
    let mut paired: Vec<(ChunkHeader, ChunkLocation)> = chunks.drain(..).zip(locations.drain(..)).collect();
    paired.sort_by(|a, b| (a.0.slice_name_str(), a.0.target_addr).cmp(&(b.0.slice_name_str(), b.0.target_addr)));
    for (chunk, location) in paired {
        chunks.push(chunk);
        locations.push(location);
    }
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..])? {
            0 => break,
            n => total += n,
        }
    }
    Ok(total)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Group chunk headers into slices in first-seen order. The first chunk in
/// container order is always decoded and handed to [`dzgpt::parse`] to
/// annotate matching slices with their authoritative LBA boundaries; a GPT
/// signature mismatch falls back to grouping purely by the chunk-header
/// slice name, which is always present.
fn group_into_slices(
    chunks: &[ChunkHeader],
    locations: &[ChunkLocation],
    file: &mut File,
    variant: dzfmt::record::ChunkSchemaVariant,
    block_size: u32,
) -> Result<Vec<SliceInfo>> {
    let _ = variant;
    let mut order: Vec<String> = Vec::new();
    let mut by_name: BTreeMap<String, (u32, Vec<usize>)> = BTreeMap::new();

    for (index, chunk) in chunks.iter().enumerate() {
        let name = chunk.slice_name_str();
        let entry = by_name.entry(name.clone()).or_insert_with(|| {
            order.push(name.clone());
            (chunk.dev, Vec::new())
        });
        entry.1.push(index);
    }

    let mut slices: Vec<SliceInfo> = order
        .into_iter()
        .map(|name| {
            let (dev, indices) = by_name.remove(&name).unwrap();
            SliceInfo { name, dev, chunk_indices: indices, gpt: None }
        })
        .collect();

    if !chunks.is_empty() {
        let location = locations[0];
        file.seek(SeekFrom::Start(location.payload_offset))?;
        let mut compressed = vec![0u8; location.payload_len as usize];
        file.read_exact(&mut compressed)?;
        let mut decoder = ZlibDecoder::new(&compressed[..]);
        let mut raw = vec![0u8; chunks[0].target_size as usize];
        read_full(&mut decoder, &mut raw)?;

        if let dzgpt::GptOutcome::Parsed(info) = dzgpt::parse(&raw, block_size)? {
            for gpt_slice in &info.slices {
                match slices.iter_mut().find(|s| s.name == gpt_slice.name) {
                    Some(slice) => slice.gpt = Some(gpt_slice.clone()),
                    None => slices.push(SliceInfo {
                        name: gpt_slice.name.clone(),
                        dev: 0,
                        chunk_indices: Vec::new(),
                        gpt: Some(gpt_slice.clone()),
                    }),
                }
            }
            insert_unallocated_and_bracket_slices(&mut slices, &info);
        }
    }

    Ok(slices)
}

/// Fill the space GPT knows about but no chunk or named partition covers:
/// one synthetic `_unallocated_N` slice per gap between consecutive
/// partitions, plus bracket slices for the primary and backup GPT regions
/// themselves (`[0, dataStartLBA)` and `[dataEndLBA, altLBA]`).
fn insert_unallocated_and_bracket_slices(slices: &mut Vec<SliceInfo>, info: &dzgpt::GptInfo) {
    let synthetic = |name: String, start_lba: u64, end_lba: u64| SliceInfo {
        name,
        dev: 0,
        chunk_indices: Vec::new(),
        gpt: Some(dzgpt::GptSlice { name: String::new(), start_lba, end_lba }),
    };

    let mut regions: Vec<(u64, u64)> =
        slices.iter().filter_map(|s| s.gpt.as_ref().map(|g| (g.start_lba, g.end_lba))).collect();
    regions.sort();

    let mut gaps = Vec::new();
    let mut cursor = info.data_start_lba;
    for (start, end) in &regions {
        if *start > cursor {
            gaps.push((cursor, *start));
        }
        cursor = cursor.max(*end);
    }
    if cursor < info.data_end_lba {
        gaps.push((cursor, info.data_end_lba));
    }

    for (i, (start, end)) in gaps.into_iter().enumerate() {
        slices.push(synthetic(format!("_unallocated_{i}"), start, end));
    }

    if info.data_start_lba > 0 {
        slices.push(synthetic("_gpt_primary".to_string(), 0, info.data_start_lba));
    }
    if info.alt_lba >= info.data_end_lba {
        slices.push(synthetic("_gpt_backup".to_string(), info.data_end_lba, info.alt_lba + 1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dzfmt::record::ChunkSchemaVariant;
    use std::io::Write as _;

    fn write_chunk(file: &mut File, slice_name: &str, target_addr: u32, payload: &[u8]) {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(1));
        encoder.write_all(payload).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut md5 = Md5::new();
        md5.update(payload);
        let mut crc = Crc32Hasher::new();
        crc.update(payload);

        let header = ChunkHeader {
            variant: ChunkSchemaVariant::Reserved,
            slice_name: slice_name.as_bytes().to_vec(),
            chunk_name: format!("{slice_name}_{target_addr}.bin").into_bytes(),
            target_size: payload.len() as u32,
            data_size: compressed.len() as u32,
            md5: md5.finalize().into(),
            target_addr,
            wipe_count: (payload.len() as u32 / 512).max(1),
            dev: 0,
            crc32: crc.finalize(),
        };
        file.write_all(&header.encode().unwrap()).unwrap();
        file.write_all(&compressed).unwrap();
    }

    fn sample_file_header(chunk_count: u32, md5: [u8; 16]) -> FileHeader {
        FileHeader {
            format_major: 2,
            format_minor: 1,
            reserved0: 0,
            device: b"bullhead".to_vec(),
            version: b"test".to_vec(),
            chunk_count,
            md5,
            unknown0: 0,
            reserved1: 0,
            unknown1: vec![0u8; 20],
            unknown2: vec![0u8; 48],
            build_type: b"user".to_vec(),
            unknown3: vec![0u8; 8],
            reserved2: 0,
            reserved3: 0,
            old_date_code: b"20160101".to_vec(),
        }
    }

    #[test]
    fn open_rejects_bad_header_md5() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.dz");
        let mut file = File::create(&path).unwrap();
        file.write_all(&sample_file_header(0, [0u8; 16]).encode().unwrap()).unwrap();
        drop(file);

        let err = Decoder::open(&path, 512).unwrap_err();
        assert!(matches!(err, DzCodecError::HeaderMd5Mismatch { .. }));
    }

    #[test]
    fn open_and_extract_single_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.dz");

        let payload = vec![0xABu8; 4096];
        let mut tmp = File::create(&path).unwrap();
        tmp.write_all(&[0u8; RECORD_SIZE]).unwrap();
        write_chunk(&mut tmp, "boot", 0, &payload);
        drop(tmp);

        let mut chunk_bytes = fs::read(&path).unwrap();
        let header_bytes = &chunk_bytes[RECORD_SIZE..2 * RECORD_SIZE];
        let mut md5 = Md5::new();
        md5.update(header_bytes);
        let file_header = sample_file_header(1, md5.finalize().into());
        let encoded = file_header.encode().unwrap();
        chunk_bytes[..RECORD_SIZE].copy_from_slice(&encoded);
        fs::write(&path, &chunk_bytes).unwrap();

        let decoder = Decoder::open(&path, 512).unwrap();
        assert_eq!(decoder.list().len(), 1);
        let data = decoder.extract_chunk(0).unwrap();
        assert_eq!(data, payload);
        assert_eq!(decoder.slices().len(), 1);
        assert_eq!(decoder.slices()[0].name, "boot");
    }

    #[test]
    fn out_of_order_chunks_are_stable_sorted_and_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unordered.dz");

        let first_payload = vec![0x11u8; 512];
        let second_payload = vec![0x22u8; 512];

        let mut tmp = File::create(&path).unwrap();
        tmp.write_all(&[0u8; RECORD_SIZE]).unwrap();
        // Written out of targetAddr order: addr 1 before addr 0.
        write_chunk(&mut tmp, "boot", 1, &second_payload);
        write_chunk(&mut tmp, "boot", 0, &first_payload);
        drop(tmp);

        let mut chunk_bytes = fs::read(&path).unwrap();
        let chunk_one_header = &chunk_bytes[RECORD_SIZE..2 * RECORD_SIZE];

        // Recompute header md5 directly from the two written headers by
        // re-reading them back out in file order.
        let mut md5 = Md5::new();
        md5.update(chunk_one_header);
        let mut cursor = RECORD_SIZE;
        let first_header = ChunkHeader::decode(dzfmt::record::ChunkSchemaVariant::Reserved, chunk_one_header)
            .unwrap()
            .unwrap();
        cursor += RECORD_SIZE + first_header.data_size as usize;
        let second_header_bytes = &chunk_bytes[cursor..cursor + RECORD_SIZE];
        md5.update(second_header_bytes);

        let file_header = sample_file_header(2, md5.finalize().into());
        let encoded = file_header.encode().unwrap();
        chunk_bytes[..RECORD_SIZE].copy_from_slice(&encoded);
        fs::write(&path, &chunk_bytes).unwrap();

        let decoder = Decoder::open(&path, 512).unwrap();
        assert!(decoder.advisories().contains(&dzfmt::record::Advisory::ChunksOutOfOrder));
        assert_eq!(decoder.list()[0].target_addr, 0);
        assert_eq!(decoder.list()[1].target_addr, 1);
        assert_eq!(decoder.extract_chunk(0).unwrap(), first_payload);
        assert_eq!(decoder.extract_chunk(1).unwrap(), second_payload);
    }
}
