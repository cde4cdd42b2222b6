//! Reads just enough of a GUID Partition Table to hand the DZ decoder
//! authoritative slice boundaries. The decoder treats this crate as an
//! optional collaborator: absence of a valid GPT (protective MBR only, or
//! garbage) is not an error, it's the [`GptOutcome::NoGpt`] sentinel.

pub mod error;

use byteorder::{ByteOrder, LittleEndian};

pub use error::{GptError, Result};

const SIGNATURE: &[u8; 8] = b"EFI PART";
const ENTRY_NAME_LEN: usize = 72;
const ENTRY_NAME_CHARS: usize = ENTRY_NAME_LEN / 2;

/// One partition table entry translated into an LBA range and name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GptSlice {
    pub name: String,
    pub start_lba: u64,
    pub end_lba: u64,
}

/// Geometry derived from a successfully parsed GPT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GptInfo {
    pub shift_lba: u32,
    pub data_start_lba: u64,
    pub data_end_lba: u64,
    pub alt_lba: u64,
    pub slices: Vec<GptSlice>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GptOutcome {
    Parsed(GptInfo),
    NoGpt,
}

/// Parse a GPT out of `buf`, a byte buffer holding (at least) the
/// protective MBR and primary GPT header/array, addressed with
/// `block_size`-byte sectors.
pub fn parse(buf: &[u8], block_size: u32) -> Result<GptOutcome> {
    let shift_lba = dzfmt_block_shift(block_size);
    let header_offset = block_size as usize;
    if buf.len() < header_offset + 92 {
        return Ok(GptOutcome::NoGpt);
    }
    if &buf[header_offset..header_offset + 8] != SIGNATURE {
        return Ok(GptOutcome::NoGpt);
    }

    let h = &buf[header_offset..];
    let alt_lba = LittleEndian::read_u64(&h[32..40]);
    let first_usable_lba = LittleEndian::read_u64(&h[40..48]);
    let last_usable_lba = LittleEndian::read_u64(&h[48..56]);
    let partition_entry_lba = LittleEndian::read_u64(&h[72..80]);
    let num_entries = LittleEndian::read_u32(&h[80..84]);
    let entry_size = LittleEndian::read_u32(&h[84..88]);

    if entry_size < 128 {
        return Err(GptError::EntryTooSmall(entry_size));
    }

    let entries_start = partition_entry_lba as usize * block_size as usize;
    let mut slices = Vec::new();
    for i in 0..num_entries as usize {
        let off = entries_start + i * entry_size as usize;
        if off + entry_size as usize > buf.len() {
            break;
        }
        let entry = &buf[off..off + entry_size as usize];
        let type_guid = &entry[0..16];
        if type_guid.iter().all(|&b| b == 0) {
            continue;
        }
        let start_lba = LittleEndian::read_u64(&entry[32..40]);
        let end_lba = LittleEndian::read_u64(&entry[40..48]);
        let name = decode_utf16_name(&entry[56..56 + ENTRY_NAME_LEN]);
        slices.push(GptSlice { name, start_lba, end_lba: end_lba + 1 });
    }

    Ok(GptOutcome::Parsed(GptInfo {
        shift_lba,
        data_start_lba: first_usable_lba,
        data_end_lba: last_usable_lba,
        alt_lba,
        slices,
    }))
}

fn decode_utf16_name(raw: &[u8]) -> String {
    let mut units = Vec::with_capacity(ENTRY_NAME_CHARS);
    for chunk in raw.chunks_exact(2) {
        let unit = LittleEndian::read_u16(chunk);
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    String::from_utf16_lossy(&units)
}

fn dzfmt_block_shift(block_size: u32) -> u32 {
    if block_size == 0 || !block_size.is_power_of_two() {
        // Callers are expected to validate block size themselves; fall
        // back to the common 512-byte sector rather than panic here.
        return 9;
    }
    block_size.trailing_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_fake_gpt(block_size: u32) -> Vec<u8> {
        let mut buf = vec![0u8; block_size as usize * 4];
        let header_off = block_size as usize;
        buf[header_off..header_off + 8].copy_from_slice(SIGNATURE);
        LittleEndian::write_u64(&mut buf[header_off + 32..header_off + 40], 33); // alt_lba
        LittleEndian::write_u64(&mut buf[header_off + 40..header_off + 48], 34); // first usable
        LittleEndian::write_u64(&mut buf[header_off + 48..header_off + 56], 100); // last usable
        LittleEndian::write_u64(&mut buf[header_off + 72..header_off + 80], 2); // entry array at LBA 2
        LittleEndian::write_u32(&mut buf[header_off + 80..header_off + 84], 1); // 1 entry
        LittleEndian::write_u32(&mut buf[header_off + 84..header_off + 88], 128); // entry size

        let entry_off = 2 * block_size as usize;
        buf[entry_off..entry_off + 16].copy_from_slice(&[1u8; 16]); // non-zero type guid
        LittleEndian::write_u64(&mut buf[entry_off + 32..entry_off + 40], 34);
        LittleEndian::write_u64(&mut buf[entry_off + 40..entry_off + 48], 40);
        let name: Vec<u16> = "boot".encode_utf16().collect();
        for (i, unit) in name.iter().enumerate() {
            LittleEndian::write_u16(&mut buf[entry_off + 56 + i * 2..entry_off + 56 + i * 2 + 2], *unit);
        }
        buf
    }

    #[test]
    fn parses_a_single_partition_entry() {
        let buf = build_fake_gpt(512);
        let outcome = parse(&buf, 512).unwrap();
        match outcome {
            GptOutcome::Parsed(info) => {
                assert_eq!(info.shift_lba, 9);
                assert_eq!(info.data_start_lba, 34);
                assert_eq!(info.data_end_lba, 100);
                assert_eq!(info.alt_lba, 33);
                assert_eq!(info.slices.len(), 1);
                assert_eq!(info.slices[0].name, "boot");
                assert_eq!(info.slices[0].start_lba, 34);
                assert_eq!(info.slices[0].end_lba, 41);
            }
            GptOutcome::NoGpt => panic!("expected a parsed GPT"),
        }
    }

    #[test]
    fn missing_signature_is_no_gpt_not_an_error() {
        let buf = vec![0u8; 4096];
        let outcome = parse(&buf, 512).unwrap();
        assert_eq!(outcome, GptOutcome::NoGpt);
    }

    #[test]
    fn buffer_shorter_than_header_is_no_gpt() {
        let buf = vec![0u8; 10];
        let outcome = parse(&buf, 512).unwrap();
        assert_eq!(outcome, GptOutcome::NoGpt);
    }
}
