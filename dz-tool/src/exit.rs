//! Maps the `dz` error taxonomy onto the tool's process exit codes.
//!
//! - `0`  success
//! - `1`  OS I/O error
//! - `2`  format / invariant violation (bad magic, unsupported version, overlap, wipe capacity)
//! - `4`  integrity failure (MD5/CRC32 mismatch)
//! - `64` usage error (bad arguments)
//! - `127` external tool missing or failed (sparse-ext4 strategy's `ext2simg`)

pub(crate) const USAGE: i32 = 64;

/// A bad CLI invocation (missing flag, unparseable id). Distinct from the
/// library error types so it can be mapped to exit code 64 rather than the
/// default 1.
#[derive(Debug)]
pub(crate) struct UsageError(pub String);

impl std::fmt::Display for UsageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for UsageError {}

/// Commands call into `dz`, `dzcodec`, and `dzchunk` directly, so an error
/// surfacing at the CLI boundary may be any one of those three types (or a
/// plain I/O error, or a usage string). Try each known type in turn.
pub(crate) fn code_for_boxed(err: &(dyn std::error::Error + 'static)) -> i32 {
    if err.downcast_ref::<UsageError>().is_some() {
        return USAGE;
    }
    if let Some(e) = err.downcast_ref::<dz::DzError>() {
        return dz_exit_code(e);
    }
    if let Some(e) = err.downcast_ref::<dzcodec::DzCodecError>() {
        return codec_exit_code(e);
    }
    if let Some(e) = err.downcast_ref::<dzchunk::ChunkError>() {
        return chunk_exit_code(e);
    }
    if let Some(e) = err.downcast_ref::<dzfmt::FormatError>() {
        return format_exit_code(e);
    }
    if err.downcast_ref::<std::io::Error>().is_some() {
        return 1;
    }
    1
}

fn dz_exit_code(err: &dz::DzError) -> i32 {
    use dz::DzError;

    match err {
        DzError::Io(_) => 1,
        DzError::Format(_) => 2,
        DzError::Gpt(_) => 2,
        DzError::Chunk(chunk_err) => chunk_exit_code(chunk_err),
        DzError::Codec(codec_err) => codec_exit_code(codec_err),
        DzError::UnknownStrategy(_) => USAGE,
        DzError::MissingSliceParams(_) => 2,
        DzError::MissingExternalTool(_) => 127,
    }
}

fn chunk_exit_code(err: &dzchunk::ChunkError) -> i32 {
    use dzchunk::ChunkError;
    match err {
        ChunkError::Io(_) => 1,
        ChunkError::Format(_) => 2,
        ChunkError::ExternalToolFailed(_) | ChunkError::ExternalToolShortRead => 127,
        ChunkError::SparseChecksumMismatch { .. } => 4,
        _ => 2,
    }
}

fn codec_exit_code(err: &dzcodec::DzCodecError) -> i32 {
    use dzcodec::DzCodecError;
    match err {
        DzCodecError::Io(_) => 1,
        DzCodecError::Format(_) | DzCodecError::Gpt(_) => 2,
        DzCodecError::HeaderMd5Mismatch { .. }
        | DzCodecError::ChunkMd5Mismatch { .. }
        | DzCodecError::ChunkCrc32Mismatch { .. } => 4,
        _ => 2,
    }
}

fn format_exit_code(err: &dzfmt::FormatError) -> i32 {
    use dzfmt::FormatError;
    match err {
        FormatError::Io(_) => 1,
        _ => 2,
    }
}
