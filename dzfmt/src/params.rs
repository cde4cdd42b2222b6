//! The two `key=value` text sidecar formats: `.dz.params` (one per
//! container, mirrors `FileHeader`) and `<slice>.image.params` (one per
//! slice, carries the reconstruction geometry a `Chunker` or `extractSlice`
//! needs).

use std::collections::BTreeMap;

use crate::error::{FormatError, Result};
use crate::record::FileHeader;

fn parse_kv_lines(text: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw_line in text.lines() {
        let line = match raw_line.split('#').next() {
            Some(l) => l.trim(),
            None => continue,
        };
        if line.is_empty() {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            out.push((k.trim().to_string(), v.trim().to_string()));
        }
    }
    out
}

/// `<slice>.image.params`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceParams {
    pub start_lba: u64,
    pub start_addr: u64,
    pub end_lba: u64,
    pub end_addr: u64,
    pub last_wipe: u64,
    pub block_size: u32,
    pub block_shift: u32,
    pub dev: Option<u32>,
    /// A slice with zero data chunks: a wipe-only region.
    pub phantom: bool,
}

impl SliceParams {
    pub fn parse(text: &str) -> Result<Self> {
        let mut map = BTreeMap::new();
        for (k, v) in parse_kv_lines(text) {
            map.insert(k, v);
        }

        let phantom = map.get("phantom").map(|v| v == "1").unwrap_or(false);
        let get_u64 = |key: &'static str| -> Result<u64> {
            map.get(key)
                .ok_or(FormatError::MissingParam(key))?
                .parse::<u64>()
                .map_err(|e| FormatError::Params(format!("{key}: {e}")))
        };
        let get_u32 = |key: &'static str| -> Result<u32> {
            map.get(key)
                .ok_or(FormatError::MissingParam(key))?
                .parse::<u32>()
                .map_err(|e| FormatError::Params(format!("{key}: {e}")))
        };

        Ok(SliceParams {
            start_lba: get_u64("startLBA")?,
            start_addr: get_u64("startAddr")?,
            end_lba: get_u64("endLBA")?,
            end_addr: get_u64("endAddr")?,
            last_wipe: get_u64("lastWipe")?,
            block_size: get_u32("blockSize")?,
            block_shift: get_u32("blockShift")?,
            dev: map.get("dev").and_then(|v| v.parse::<u32>().ok()),
            phantom,
        })
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        if self.phantom {
            out.push_str("phantom=1\n");
        }
        out.push_str(&format!("startLBA={}\n", self.start_lba));
        out.push_str(&format!("startAddr={}\n", self.start_addr));
        out.push_str(&format!("endLBA={}\n", self.end_lba));
        out.push_str(&format!("endAddr={}\n", self.end_addr));
        out.push_str(&format!("lastWipe={}\n", self.last_wipe));
        out.push_str(&format!("blockSize={}\n", self.block_size));
        out.push_str(&format!("blockShift={}\n", self.block_shift));
        if let Some(dev) = self.dev {
            out.push_str(&format!("dev={dev}\n"));
        }
        out
    }
}

const ALIASES: &[(&str, &str)] = &[("android_version", "androidVer"), ("factoryversion", "version")];

/// Fields preserved as hex-encoded opaque bytes rather than plain strings.
const HEX_FIELDS: &[&str] = &["unknown1", "unknown3"];

/// Keys that are intentionally snake_case in `FileHeader` itself and must
/// not be camelCased.
const LITERAL_FIELDS: &[&str] = &["build_type"];

fn camel_case(key: &str) -> String {
    let mut parts = key.split('_');
    let mut out = parts.next().unwrap_or_default().to_string();
    for part in parts {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

fn normalize_key(raw: &str) -> String {
    for (alias, canonical) in ALIASES {
        if raw == *alias {
            return (*canonical).to_string();
        }
    }
    if LITERAL_FIELDS.contains(&raw) || !raw.contains('_') {
        return raw.to_string();
    }
    camel_case(raw)
}

fn hex_decode(s: &str) -> Result<Vec<u8>> {
    if s.len() % 2 != 0 {
        return Err(FormatError::Params(format!("odd-length hex string {s:?}")));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| FormatError::Params(e.to_string())))
        .collect()
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// `.dz.params`, the saved container-level header parameters. Required
/// keys mirror every `FileHeader` field except `header, pad, chunkCount,
/// md5, reserved*`, plus `blockShift`.
#[derive(Debug, Clone)]
pub struct ContainerParams(BTreeMap<String, String>);

impl ContainerParams {
    pub fn parse(text: &str) -> Result<Self> {
        let mut map = BTreeMap::new();
        for (raw_key, value) in parse_kv_lines(text) {
            map.insert(normalize_key(&raw_key), value);
        }
        Ok(ContainerParams(map))
    }

    fn get(&self, key: &'static str) -> Result<&str> {
        self.0.get(key).map(String::as_str).ok_or(FormatError::MissingParam(key))
    }

    fn get_u32(&self, key: &'static str) -> Result<u32> {
        self.get(key)?.parse::<u32>().map_err(|e| FormatError::Params(format!("{key}: {e}")))
    }

    /// `blockShift` is not a `FileHeader` field; it's carried alongside the
    /// header parameters for the Chunker/Encoder.
    pub fn block_shift(&self) -> Result<u32> {
        self.get_u32("blockShift")
    }

    pub fn to_file_header(&self) -> Result<FileHeader> {
        Ok(FileHeader {
            format_major: self.get_u32("formatMajor")?,
            format_minor: self.get_u32("formatMinor")?,
            reserved0: 0,
            device: self.get("device")?.as_bytes().to_vec(),
            version: self.get("version")?.as_bytes().to_vec(),
            chunk_count: 0, // filled in by the Encoder once chunks are counted
            md5: [0u8; 16], // filled in by the Encoder once headers are hashed
            unknown0: self.get_u32("unknown0")?,
            reserved1: 0,
            unknown1: hex_decode(self.get("unknown1")?)?,
            unknown2: self.get("unknown2")?.as_bytes().to_vec(),
            build_type: self.get("build_type")?.as_bytes().to_vec(),
            unknown3: hex_decode(self.get("unknown3")?)?,
            reserved2: 0,
            reserved3: 0,
            old_date_code: self.get("oldDateCode")?.as_bytes().to_vec(),
        })
    }

    pub fn from_file_header(header: &FileHeader, block_shift: u32) -> Self {
        let mut map = BTreeMap::new();
        map.insert("formatMajor".to_string(), header.format_major.to_string());
        map.insert("formatMinor".to_string(), header.format_minor.to_string());
        map.insert("device".to_string(), String::from_utf8_lossy(&header.device).into_owned());
        map.insert("version".to_string(), String::from_utf8_lossy(&header.version).into_owned());
        map.insert("unknown0".to_string(), header.unknown0.to_string());
        map.insert("unknown1".to_string(), hex_encode(&header.unknown1));
        map.insert("unknown2".to_string(), String::from_utf8_lossy(&header.unknown2).into_owned());
        map.insert("build_type".to_string(), String::from_utf8_lossy(&header.build_type).into_owned());
        map.insert("unknown3".to_string(), hex_encode(&header.unknown3));
        map.insert("oldDateCode".to_string(), String::from_utf8_lossy(&header.old_date_code).into_owned());
        map.insert("blockShift".to_string(), block_shift.to_string());
        ContainerParams(map)
    }

    pub fn to_text(&self) -> String {
        self.0.iter().map(|(k, v)| format!("{k}={v}\n")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_params_roundtrip() {
        let params = SliceParams {
            start_lba: 2048,
            start_addr: 2048,
            end_lba: 4096,
            end_addr: 4096,
            last_wipe: 4096,
            block_size: 512,
            block_shift: 9,
            dev: None,
            phantom: false,
        };
        let parsed = SliceParams::parse(&params.to_text()).unwrap();
        assert_eq!(parsed, params);
    }

    #[test]
    fn phantom_slice_parses() {
        let text = "phantom=1\nstartLBA=0\nstartAddr=0\nendLBA=10\nendAddr=10\nlastWipe=10\nblockSize=512\nblockShift=9\n";
        let parsed = SliceParams::parse(text).unwrap();
        assert!(parsed.phantom);
    }

    #[test]
    fn container_params_alias_resolution() {
        let text = "android_version=6.0\nfactoryversion=BULLHEAD\n";
        let params = ContainerParams::parse(text).unwrap();
        assert_eq!(params.0.get("androidVer").map(String::as_str), Some("6.0"));
        assert_eq!(params.0.get("version").map(String::as_str), Some("BULLHEAD"));
    }

    #[test]
    fn container_params_snake_to_camel() {
        let text = "format_major=2\n";
        let params = ContainerParams::parse(text).unwrap();
        assert_eq!(params.0.get("formatMajor").map(String::as_str), Some("2"));
    }

    #[test]
    fn build_type_stays_snake_case() {
        let text = "build_type=user\n";
        let params = ContainerParams::parse(text).unwrap();
        assert_eq!(params.0.get("build_type").map(String::as_str), Some("user"));
    }

    #[test]
    fn hex_fields_roundtrip_through_file_header() {
        let header = FileHeader {
            format_major: 2,
            format_minor: 1,
            reserved0: 0,
            device: b"bullhead".to_vec(),
            version: b"6.0".to_vec(),
            chunk_count: 0,
            md5: [0u8; 16],
            unknown0: 7,
            reserved1: 0,
            unknown1: vec![0xde, 0xad, 0xbe, 0xef],
            unknown2: b"id".to_vec(),
            build_type: b"user".to_vec(),
            unknown3: vec![0x01, 0x02],
            reserved2: 0,
            reserved3: 0,
            old_date_code: b"20160101".to_vec(),
        };
        let params = ContainerParams::from_file_header(&header, 9);
        let roundtripped = params.to_file_header().unwrap();
        assert_eq!(roundtripped.unknown1, header.unknown1);
        assert_eq!(roundtripped.unknown3, header.unknown3);
        assert_eq!(params.block_shift().unwrap(), 9);
    }
}
