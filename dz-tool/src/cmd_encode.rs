//! `dz-tool encode -f FILE {-l|-m} [-d DIR]`
//!
//! `-m` assembles `<DIR>/container.dz.params` plus the `*.bin.chunk` files
//! in `DIR` into a container at `FILE`. `-l` does the reverse: opens an
//! existing container at `FILE` and unpacks its params and chunk files
//! into `DIR`, ready to be re-assembled with `-m`.

use std::path::PathBuf;

use crate::exit::UsageError;
use crate::style::*;

struct Args {
    file: PathBuf,
    dir: PathBuf,
    op: Op,
}

enum Op {
    Load,
    Make,
}

pub(crate) fn run(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = parse(args)?;

    match parsed.op {
        Op::Make => {
            let params_path = parsed.dir.join("container.dz.params");
            spinner_msg(&format!("Encoding {}", parsed.file.display()));
            let t = std::time::Instant::now();
            dz::encode(&params_path, &parsed.dir, &parsed.file)?;
            spinner_done(&format!(" ({})", format_duration(t.elapsed())));
        }
        Op::Load => {
            std::fs::create_dir_all(&parsed.dir)?;
            let decoder = dz::decode(&parsed.file, 512)?;
            decoder.save_header(&parsed.dir)?;
            for index in 0..decoder.list().len() {
                let out_path = decoder.extract_chunk_file(index, &parsed.dir)?;
                kv("wrote", &out_path.display().to_string());
            }
        }
    }

    Ok(())
}

fn parse(args: &[String]) -> Result<Args, Box<dyn std::error::Error>> {
    let mut file = None;
    let mut dir = PathBuf::from(".");
    let mut op = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-f" => {
                i += 1;
                file = Some(PathBuf::from(args.get(i).ok_or_else(|| usage_error("-f requires a path"))?));
            }
            "-d" => {
                i += 1;
                dir = PathBuf::from(args.get(i).ok_or_else(|| usage_error("-d requires a path"))?);
            }
            "-l" => op = Some(Op::Load),
            "-m" => op = Some(Op::Make),
            other => return Err(usage_error(&format!("unexpected argument: {other}"))),
        }
        i += 1;
    }

    let file = file.ok_or_else(|| usage_error("missing -f FILE"))?;
    let op = op.ok_or_else(|| usage_error("one of -l, -m is required"))?;
    Ok(Args { file, dir, op })
}

fn usage_error(msg: &str) -> Box<dyn std::error::Error> {
    Box::new(UsageError(msg.to_string()))
}
