//! The two DZ record schemas: `FileHeader` and `ChunkHeader`, plus the
//! invariants that tie their fields together. Layout is grounded directly
//! on the reference tool's `DZFile`/`DZChunk` structure tables.

use crate::codec::{self, FieldKind, FieldSpec, FieldValue, Record, Schema};
use crate::error::{FormatError, Result};

pub const FILE_HEADER_MAGIC: &[u8; 4] = b"\x32\x96\x18\x74";
pub const CHUNK_HEADER_MAGIC: &[u8; 4] = b"\x30\x12\x95\x78";
pub const RECORD_SIZE: usize = 512;

const FILE_HEADER_FIELDS: &[FieldSpec] = &[
    FieldSpec { name: "formatMajor", kind: FieldKind::U32, collapsible: false },
    FieldSpec { name: "formatMinor", kind: FieldKind::U32, collapsible: false },
    FieldSpec { name: "reserved0", kind: FieldKind::U32, collapsible: true },
    FieldSpec { name: "device", kind: FieldKind::Bytes(32), collapsible: true },
    FieldSpec { name: "version", kind: FieldKind::Bytes(144), collapsible: true },
    FieldSpec { name: "chunkCount", kind: FieldKind::U32, collapsible: false },
    FieldSpec { name: "md5", kind: FieldKind::Bytes(16), collapsible: false },
    FieldSpec { name: "unknown0", kind: FieldKind::U32, collapsible: false },
    FieldSpec { name: "reserved1", kind: FieldKind::U32, collapsible: true },
    FieldSpec { name: "unknown1", kind: FieldKind::Bytes(20), collapsible: false },
    FieldSpec { name: "unknown2", kind: FieldKind::Bytes(48), collapsible: false },
    FieldSpec { name: "build_type", kind: FieldKind::Bytes(20), collapsible: true },
    FieldSpec { name: "unknown3", kind: FieldKind::Bytes(8), collapsible: false },
    FieldSpec { name: "reserved2", kind: FieldKind::U32, collapsible: true },
    FieldSpec { name: "reserved3", kind: FieldKind::U16, collapsible: true },
    FieldSpec { name: "oldDateCode", kind: FieldKind::Bytes(10), collapsible: true },
    FieldSpec { name: "pad", kind: FieldKind::Bytes(180), collapsible: true },
];

pub static FILE_HEADER_SCHEMA: Schema = Schema {
    name: "FileHeader",
    magic: FILE_HEADER_MAGIC,
    fields: FILE_HEADER_FIELDS,
    size: RECORD_SIZE,
};

/// `reserved` in the original schema; later revisions replace it with `dev`,
/// a physical-device pass number. Two static schemas, never a single schema
/// with a conditionally-present field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkSchemaVariant {
    Reserved,
    Dev,
}

const CHUNK_HEADER_FIELDS_RESERVED: &[FieldSpec] = &[
    FieldSpec { name: "sliceName", kind: FieldKind::Bytes(32), collapsible: true },
    FieldSpec { name: "chunkName", kind: FieldKind::Bytes(64), collapsible: true },
    FieldSpec { name: "targetSize", kind: FieldKind::U32, collapsible: false },
    FieldSpec { name: "dataSize", kind: FieldKind::U32, collapsible: false },
    FieldSpec { name: "md5", kind: FieldKind::Bytes(16), collapsible: false },
    FieldSpec { name: "targetAddr", kind: FieldKind::U32, collapsible: false },
    FieldSpec { name: "wipeCount", kind: FieldKind::U32, collapsible: false },
    FieldSpec { name: "reserved", kind: FieldKind::U32, collapsible: true },
    FieldSpec { name: "crc32", kind: FieldKind::U32, collapsible: false },
    FieldSpec { name: "pad", kind: FieldKind::Bytes(372), collapsible: true },
];

const CHUNK_HEADER_FIELDS_DEV: &[FieldSpec] = &[
    FieldSpec { name: "sliceName", kind: FieldKind::Bytes(32), collapsible: true },
    FieldSpec { name: "chunkName", kind: FieldKind::Bytes(64), collapsible: true },
    FieldSpec { name: "targetSize", kind: FieldKind::U32, collapsible: false },
    FieldSpec { name: "dataSize", kind: FieldKind::U32, collapsible: false },
    FieldSpec { name: "md5", kind: FieldKind::Bytes(16), collapsible: false },
    FieldSpec { name: "targetAddr", kind: FieldKind::U32, collapsible: false },
    FieldSpec { name: "wipeCount", kind: FieldKind::U32, collapsible: false },
    FieldSpec { name: "dev", kind: FieldKind::U32, collapsible: false },
    FieldSpec { name: "crc32", kind: FieldKind::U32, collapsible: false },
    FieldSpec { name: "pad", kind: FieldKind::Bytes(372), collapsible: true },
];

pub static CHUNK_HEADER_SCHEMA_RESERVED: Schema = Schema {
    name: "ChunkHeader(reserved)",
    magic: CHUNK_HEADER_MAGIC,
    fields: CHUNK_HEADER_FIELDS_RESERVED,
    size: RECORD_SIZE,
};

pub static CHUNK_HEADER_SCHEMA_DEV: Schema = Schema {
    name: "ChunkHeader(dev)",
    magic: CHUNK_HEADER_MAGIC,
    fields: CHUNK_HEADER_FIELDS_DEV,
    size: RECORD_SIZE,
};

impl ChunkSchemaVariant {
    pub fn schema(self) -> &'static Schema {
        match self {
            ChunkSchemaVariant::Reserved => &CHUNK_HEADER_SCHEMA_RESERVED,
            ChunkSchemaVariant::Dev => &CHUNK_HEADER_SCHEMA_DEV,
        }
    }
}

/// Parsed, verbatim-preserved FileHeader. `unknown*` fields round-trip as
/// raw bytes without reinterpretation.
#[derive(Debug, Clone)]
pub struct FileHeader {
    pub format_major: u32,
    pub format_minor: u32,
    pub reserved0: u32,
    pub device: Vec<u8>,
    pub version: Vec<u8>,
    pub chunk_count: u32,
    pub md5: [u8; 16],
    pub unknown0: u32,
    pub reserved1: u32,
    pub unknown1: Vec<u8>,
    pub unknown2: Vec<u8>,
    pub build_type: Vec<u8>,
    pub unknown3: Vec<u8>,
    pub reserved2: u32,
    pub reserved3: u16,
    pub old_date_code: Vec<u8>,
}

/// Non-fatal findings surfaced at `list`/`extract` time; never affects the
/// correctness of downstream operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    HigherMinorVersion(u32),
    ChunkNameMismatch { chunk_index: usize, expected: String, actual: String },
    ChunksOutOfOrder,
    /// The header's `chunkCount` field disagreed with the number of chunk
    /// headers actually found before end of file; the scan trusts the file,
    /// not the count.
    ChunkCountMismatch { declared: u32, actual: usize },
}

impl FileHeader {
    pub fn decode(buf: &[u8]) -> Result<Option<Self>> {
        let record = match codec::decode(&FILE_HEADER_SCHEMA, buf)? {
            Some(r) => r,
            None => return Ok(None),
        };
        Ok(Some(Self::from_record(&record)?))
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        codec::encode(&FILE_HEADER_SCHEMA, &self.to_record())
    }

    /// `formatMajor == 2` required (fatal if higher); `formatMinor > 1`
    /// is advisory only.
    pub fn validate(&self) -> Result<Vec<Advisory>> {
        if self.format_major > 2 {
            return Err(FormatError::UnsupportedMajor(self.format_major));
        }
        let mut advisories = Vec::new();
        if self.format_minor > 1 {
            advisories.push(Advisory::HigherMinorVersion(self.format_minor));
        }
        Ok(advisories)
    }

    pub fn schema_variant(&self) -> ChunkSchemaVariant {
        if self.format_minor > 1 {
            ChunkSchemaVariant::Dev
        } else {
            ChunkSchemaVariant::Reserved
        }
    }

    fn from_record(r: &Record) -> Result<Self> {
        Ok(FileHeader {
            format_major: r.get_u32("formatMajor")?,
            format_minor: r.get_u32("formatMinor")?,
            reserved0: r.get_u32("reserved0")?,
            device: r.get_bytes("device")?.to_vec(),
            version: r.get_bytes("version")?.to_vec(),
            chunk_count: r.get_u32("chunkCount")?,
            md5: to_array_16(r.get_bytes("md5")?),
            unknown0: r.get_u32("unknown0")?,
            reserved1: r.get_u32("reserved1")?,
            unknown1: r.get_bytes("unknown1")?.to_vec(),
            unknown2: r.get_bytes("unknown2")?.to_vec(),
            build_type: r.get_bytes("build_type")?.to_vec(),
            unknown3: r.get_bytes("unknown3")?.to_vec(),
            reserved2: r.get_u32("reserved2")?,
            reserved3: r.get_u16("reserved3")?,
            old_date_code: r.get_bytes("oldDateCode")?.to_vec(),
        })
    }

    fn to_record(&self) -> Record {
        let mut r = Record::new();
        r.set("formatMajor", FieldValue::U32(self.format_major));
        r.set("formatMinor", FieldValue::U32(self.format_minor));
        r.set("reserved0", FieldValue::U32(self.reserved0));
        r.set("device", FieldValue::Bytes(self.device.clone()));
        r.set("version", FieldValue::Bytes(self.version.clone()));
        r.set("chunkCount", FieldValue::U32(self.chunk_count));
        r.set("md5", FieldValue::Bytes(self.md5.to_vec()));
        r.set("unknown0", FieldValue::U32(self.unknown0));
        r.set("reserved1", FieldValue::U32(self.reserved1));
        r.set("unknown1", FieldValue::Bytes(self.unknown1.clone()));
        r.set("unknown2", FieldValue::Bytes(self.unknown2.clone()));
        r.set("build_type", FieldValue::Bytes(self.build_type.clone()));
        r.set("unknown3", FieldValue::Bytes(self.unknown3.clone()));
        r.set("reserved2", FieldValue::U32(self.reserved2));
        r.set("reserved3", FieldValue::U16(self.reserved3));
        r.set("oldDateCode", FieldValue::Bytes(self.old_date_code.clone()));
        r
    }
}

/// Parsed ChunkHeader. `dev` reads as 0 under the `Reserved` schema variant.
#[derive(Debug, Clone)]
pub struct ChunkHeader {
    pub variant: ChunkSchemaVariant,
    pub slice_name: Vec<u8>,
    pub chunk_name: Vec<u8>,
    pub target_size: u32,
    pub data_size: u32,
    pub md5: [u8; 16],
    pub target_addr: u32,
    pub wipe_count: u32,
    pub dev: u32,
    pub crc32: u32,
}

impl ChunkHeader {
    pub fn decode(variant: ChunkSchemaVariant, buf: &[u8]) -> Result<Option<Self>> {
        let record = match codec::decode(variant.schema(), buf)? {
            Some(r) => r,
            None => return Ok(None),
        };
        Ok(Some(Self::from_record(variant, &record)?))
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        codec::encode(self.variant.schema(), &self.to_record())
    }

    pub fn slice_name_str(&self) -> String {
        String::from_utf8_lossy(&self.slice_name).into_owned()
    }

    pub fn chunk_name_str(&self) -> String {
        String::from_utf8_lossy(&self.chunk_name).into_owned()
    }

    /// `<sliceName>_<targetAddr>.bin`; mismatches are advisory only.
    pub fn expected_chunk_name(&self) -> String {
        format!("{}_{}.bin", self.slice_name_str(), self.target_addr)
    }

    pub fn check_name_advisory(&self, index: usize) -> Option<Advisory> {
        let expected = self.expected_chunk_name();
        let actual = self.chunk_name_str();
        if expected == actual {
            None
        } else {
            Some(Advisory::ChunkNameMismatch { chunk_index: index, expected, actual })
        }
    }

    /// `targetSize >> blockShift <= wipeCount` — fatal when violated
    /// (checked at encode time, over chunk files about to be written).
    pub fn check_wipe_capacity(&self, block_shift: u32) -> Result<()> {
        if (self.target_size >> block_shift) > self.wipe_count {
            return Err(FormatError::WipeCapacityExceeded {
                target_size: self.target_size,
                wipe_count: self.wipe_count,
            });
        }
        Ok(())
    }

    fn from_record(variant: ChunkSchemaVariant, r: &Record) -> Result<Self> {
        let dev = match variant {
            ChunkSchemaVariant::Dev => r.get_u32("dev")?,
            ChunkSchemaVariant::Reserved => 0,
        };
        Ok(ChunkHeader {
            variant,
            slice_name: r.get_bytes("sliceName")?.to_vec(),
            chunk_name: r.get_bytes("chunkName")?.to_vec(),
            target_size: r.get_u32("targetSize")?,
            data_size: r.get_u32("dataSize")?,
            md5: to_array_16(r.get_bytes("md5")?),
            target_addr: r.get_u32("targetAddr")?,
            wipe_count: r.get_u32("wipeCount")?,
            dev,
            crc32: r.get_u32("crc32")?,
        })
    }

    fn to_record(&self) -> Record {
        let mut r = Record::new();
        r.set("sliceName", FieldValue::Bytes(self.slice_name.clone()));
        r.set("chunkName", FieldValue::Bytes(self.chunk_name.clone()));
        r.set("targetSize", FieldValue::U32(self.target_size));
        r.set("dataSize", FieldValue::U32(self.data_size));
        r.set("md5", FieldValue::Bytes(self.md5.to_vec()));
        r.set("targetAddr", FieldValue::U32(self.target_addr));
        r.set("wipeCount", FieldValue::U32(self.wipe_count));
        match self.variant {
            ChunkSchemaVariant::Reserved => r.set("reserved", FieldValue::U32(0)),
            ChunkSchemaVariant::Dev => r.set("dev", FieldValue::U32(self.dev)),
        }
        r.set("crc32", FieldValue::U32(self.crc32));
        r
    }
}

fn to_array_16(b: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    let n = b.len().min(16);
    out[..n].copy_from_slice(&b[..n]);
    out
}

/// `shiftLBA = log2(blockSize)`; fails unless `block_size` is a power of two.
pub fn block_shift_of(block_size: u32) -> Result<u32> {
    if block_size == 0 || !block_size.is_power_of_two() {
        return Err(FormatError::BlockSizeNotPowerOfTwo(block_size));
    }
    Ok(block_size.trailing_zeros())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file_header() -> FileHeader {
        FileHeader {
            format_major: 2,
            format_minor: 1,
            reserved0: 0,
            device: b"bullhead".to_vec(),
            version: b"BULLHEAD-user 6.0".to_vec(),
            chunk_count: 1,
            md5: [0u8; 16],
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
    fn file_header_roundtrip_preserves_opaque_fields() {
        let header = sample_file_header();
        let bytes = header.encode().unwrap();
        assert_eq!(bytes.len(), RECORD_SIZE);
        let decoded = FileHeader::decode(&bytes).unwrap().unwrap();
        assert_eq!(decoded.device, header.device);
        assert_eq!(decoded.unknown1, header.unknown1);
        assert_eq!(decoded.build_type, header.build_type);
    }

    #[test]
    fn file_header_major_3_is_fatal() {
        let mut header = sample_file_header();
        header.format_major = 3;
        assert!(header.validate().is_err());
    }

    #[test]
    fn file_header_minor_2_is_advisory() {
        let mut header = sample_file_header();
        header.format_minor = 2;
        let advisories = header.validate().unwrap();
        assert_eq!(advisories, vec![Advisory::HigherMinorVersion(2)]);
    }

    #[test]
    fn chunk_header_reserved_schema_roundtrip() {
        let chunk = ChunkHeader {
            variant: ChunkSchemaVariant::Reserved,
            slice_name: b"boot".to_vec(),
            chunk_name: b"boot_0.bin".to_vec(),
            target_size: 4096,
            data_size: 128,
            md5: [1u8; 16],
            target_addr: 0,
            wipe_count: 8,
            dev: 0,
            crc32: 0xdead_beef,
        };
        let bytes = chunk.encode().unwrap();
        let decoded = ChunkHeader::decode(ChunkSchemaVariant::Reserved, &bytes).unwrap().unwrap();
        assert_eq!(decoded.slice_name, chunk.slice_name);
        assert_eq!(decoded.crc32, chunk.crc32);
        assert_eq!(decoded.dev, 0);
    }

    #[test]
    fn chunk_header_dev_schema_roundtrip() {
        let chunk = ChunkHeader {
            variant: ChunkSchemaVariant::Dev,
            slice_name: b"boot".to_vec(),
            chunk_name: b"boot_0.bin".to_vec(),
            target_size: 4096,
            data_size: 128,
            md5: [1u8; 16],
            target_addr: 0,
            wipe_count: 8,
            dev: 3,
            crc32: 0xdead_beef,
        };
        let bytes = chunk.encode().unwrap();
        let decoded = ChunkHeader::decode(ChunkSchemaVariant::Dev, &bytes).unwrap().unwrap();
        assert_eq!(decoded.dev, 3);
    }

    #[test]
    fn chunk_name_mismatch_is_advisory_not_fatal() {
        let chunk = ChunkHeader {
            variant: ChunkSchemaVariant::Reserved,
            slice_name: b"boot".to_vec(),
            chunk_name: b"wrong_name.bin".to_vec(),
            target_size: 0,
            data_size: 0,
            md5: [0u8; 16],
            target_addr: 0,
            wipe_count: 0,
            dev: 0,
            crc32: 0,
        };
        assert!(chunk.check_name_advisory(0).is_some());
    }

    #[test]
    fn wipe_capacity_violation_is_fatal() {
        let chunk = ChunkHeader {
            variant: ChunkSchemaVariant::Reserved,
            slice_name: b"boot".to_vec(),
            chunk_name: b"boot_0.bin".to_vec(),
            target_size: 4096,
            data_size: 0,
            md5: [0u8; 16],
            target_addr: 0,
            wipe_count: 1,
            dev: 0,
            crc32: 0,
        };
        // blockShift=9 (512-byte blocks): targetSize>>9 == 8 > wipeCount(1)
        assert!(chunk.check_wipe_capacity(9).is_err());
    }

    #[test]
    fn block_shift_requires_power_of_two() {
        assert_eq!(block_shift_of(512).unwrap(), 9);
        assert_eq!(block_shift_of(4096).unwrap(), 12);
        assert!(block_shift_of(500).is_err());
    }
}
