//! High-level entry points tying the format layer ([`dzfmt`]), the GPT
//! reader ([`dzgpt`]), the chunk builder ([`dzchunk`]), and the
//! decoder/encoder ([`dzcodec`]) into the three operations a caller
//! actually performs: decode a container, chunk a raw slice image, and
//! encode a container back from chunk files.

use std::path::{Path, PathBuf};

use dzfmt::params::SliceParams;
use dzfmt::record::ChunkSchemaVariant;

use crate::error::{DzError, Result};

/// Which [`dzchunk`] strategy to use when chunking a raw slice image.
#[derive(Debug, Clone)]
pub enum ChunkStrategy {
    /// OS sparse-region queries (`SEEK_DATA`/`SEEK_HOLE`).
    Holes { split_cap: Option<u64> },
    /// Manual all-zero-block scanning, for filesystems without hole queries.
    Probe,
    /// Delegates to an external `ext2simg`-style tool and re-chunks its
    /// Android sparse output.
    SparseExt4 { ext2simg_path: PathBuf },
}

impl ChunkStrategy {
    pub fn parse(name: &str, ext2simg_path: Option<PathBuf>) -> Result<Self> {
        match name {
            "holes" => Ok(ChunkStrategy::Holes { split_cap: None }),
            "probe" => Ok(ChunkStrategy::Probe),
            "sparse-ext4" | "sparse_ext4" => {
                let path = ext2simg_path.unwrap_or_else(|| PathBuf::from("ext2simg"));
                Ok(ChunkStrategy::SparseExt4 { ext2simg_path: path })
            }
            other => Err(DzError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Open and validate a DZ container, producing a ready-to-query decoder.
pub fn decode(path: &Path, block_size: u32) -> Result<dzcodec::Decoder> {
    Ok(dzcodec::Decoder::open(path, block_size)?)
}

/// Run one chunking strategy over a raw slice image, writing `.bin.chunk`
/// files into `out_dir`.
pub fn chunk_slice(
    strategy: &ChunkStrategy,
    slice_path: &Path,
    out_dir: &Path,
    slice_name: &str,
    params: &SliceParams,
    variant: ChunkSchemaVariant,
) -> Result<Vec<PathBuf>> {
    let outputs = match strategy {
        ChunkStrategy::Holes { split_cap } => {
            dzchunk::holes::build(slice_path, out_dir, slice_name, params, variant, *split_cap)?
        }
        ChunkStrategy::Probe => dzchunk::probe::build(slice_path, out_dir, slice_name, params, variant)?,
        ChunkStrategy::SparseExt4 { ext2simg_path } => {
            dzchunk::sparse_ext4::build(ext2simg_path, slice_path, out_dir, slice_name, params, variant)?
        }
    };
    Ok(outputs)
}

/// Load `<slice>.image.params` for `slice_name` from `params_dir`.
pub fn load_slice_params(params_dir: &Path, slice_name: &str) -> Result<SliceParams> {
    let path = params_dir.join(format!("{slice_name}.image.params"));
    let text = std::fs::read_to_string(&path)
        .map_err(|_| DzError::MissingSliceParams(path.display().to_string()))?;
    Ok(SliceParams::parse(&text)?)
}

/// Assemble every `*.bin.chunk` file in `chunk_dir` plus `.dz.params` at
/// `params_path` into a finished container at `out_path`.
pub fn encode(params_path: &Path, chunk_dir: &Path, out_path: &Path) -> Result<()> {
    Ok(dzcodec::encoder::build(params_path, chunk_dir, out_path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_strategy_parses_known_names() {
        assert!(matches!(ChunkStrategy::parse("holes", None).unwrap(), ChunkStrategy::Holes { .. }));
        assert!(matches!(ChunkStrategy::parse("probe", None).unwrap(), ChunkStrategy::Probe));
        assert!(matches!(
            ChunkStrategy::parse("sparse-ext4", None).unwrap(),
            ChunkStrategy::SparseExt4 { .. }
        ));
    }

    #[test]
    fn chunk_strategy_rejects_unknown_names() {
        assert!(ChunkStrategy::parse("bogus", None).is_err());
    }
}
