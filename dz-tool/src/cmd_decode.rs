//! `dz-tool decode -f FILE {-l|-x|-c|-s|-i} [-d DIR] [-b BLOCKSIZE] [ids...]`

use std::path::PathBuf;

use crate::exit::UsageError;
use crate::pipeline::timed_decode;
use crate::style::*;

struct Args {
    file: PathBuf,
    out_dir: PathBuf,
    block_size: u32,
    op: Op,
    ids: Vec<String>,
}

enum Op {
    List,
    ExtractChunk,
    ExtractChunkFile,
    ExtractSlice,
    ExtractImage,
}

pub(crate) fn run(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = parse(args)?;
    let decoder = timed_decode(&parsed.file, parsed.block_size)?;

    for advisory in decoder.advisories() {
        warn(&format!("{advisory:?}"));
    }

    match parsed.op {
        Op::List => {
            header("Chunks");
            for (i, chunk) in decoder.list().iter().enumerate() {
                kv(&i.to_string(), &chunk.chunk_name_str());
            }
            section("Slices");
            for slice in decoder.slices() {
                kv_highlight(&slice.name, &format!("{} chunk(s), dev {}", slice.chunk_indices.len(), slice.dev));
            }
        }
        Op::ExtractChunk => {
            std::fs::create_dir_all(&parsed.out_dir)?;
            for id in &parsed.ids {
                let index: usize = id.parse().map_err(|_| usage_error("chunk id must be a number"))?;
                let data = decoder.extract_chunk(index)?;
                let header = &decoder.list()[index];
                let out_path = parsed.out_dir.join(header.chunk_name_str());
                std::fs::write(&out_path, &data)?;
                kv("wrote", &out_path.display().to_string());
            }
        }
        Op::ExtractChunkFile => {
            std::fs::create_dir_all(&parsed.out_dir)?;
            for id in &parsed.ids {
                let index: usize = id.parse().map_err(|_| usage_error("chunk id must be a number"))?;
                let out_path = decoder.extract_chunk_file(index, &parsed.out_dir)?;
                kv("wrote", &out_path.display().to_string());
            }
        }
        Op::ExtractSlice => {
            std::fs::create_dir_all(&parsed.out_dir)?;
            for name in &parsed.ids {
                let out_path = parsed.out_dir.join(format!("{name}.img"));
                decoder.extract_slice(name, &out_path)?;
                kv("wrote", &out_path.display().to_string());
            }
        }
        Op::ExtractImage => {
            std::fs::create_dir_all(&parsed.out_dir)?;
            let paths = decoder.extract_image(&parsed.out_dir)?;
            decoder.save_header(&parsed.out_dir)?;
            for path in paths {
                kv("wrote", &path.display().to_string());
            }
        }
    }

    Ok(())
}

fn parse(args: &[String]) -> Result<Args, Box<dyn std::error::Error>> {
    let mut file = None;
    let mut out_dir = PathBuf::from(".");
    let mut block_size = 512u32;
    let mut op = None;
    let mut ids = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-f" => {
                i += 1;
                file = Some(PathBuf::from(args.get(i).ok_or("-f requires a path")?));
            }
            "-d" => {
                i += 1;
                out_dir = PathBuf::from(args.get(i).ok_or("-d requires a path")?);
            }
            "-b" => {
                i += 1;
                block_size = args.get(i).ok_or("-b requires a number")?.parse()?;
            }
            "-l" => op = Some(Op::List),
            "-x" => op = Some(Op::ExtractChunk),
            "-c" => op = Some(Op::ExtractChunkFile),
            "-s" => op = Some(Op::ExtractSlice),
            "-i" => op = Some(Op::ExtractImage),
            other => ids.push(other.to_string()),
        }
        i += 1;
    }

    let file = file.ok_or_else(|| usage_error("missing -f FILE"))?;
    let op = op.ok_or_else(|| usage_error("one of -l, -x, -c, -s, -i is required"))?;

    Ok(Args { file, out_dir, block_size, op, ids })
}

fn usage_error(msg: &str) -> Box<dyn std::error::Error> {
    Box::new(UsageError(msg.to_string()))
}
