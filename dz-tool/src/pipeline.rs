use std::path::Path;
use std::time::Instant;

use crate::style::*;

pub(crate) fn timed_decode(path: &Path, block_size: u32) -> Result<dzcodec::Decoder, Box<dyn std::error::Error>> {
    spinner_msg(&format!("Opening {}", path.display()));
    let t = Instant::now();
    let decoder = dz::decode(path, block_size)?;
    spinner_done(&format!(" ({})", format_duration(t.elapsed())));
    Ok(decoder)
}
