//! `dz-tool chunk {-e|-s|-p} [-d DIR] [--ext2simg PATH] file...`
//!
//! `-e` sparse-ext4 (delegates to an external `ext2simg`), `-s` holes
//! (OS sparse-region queries), `-p` probe (manual zero-block scan). Each
//! positional `file` is a raw slice image; its slice name is the file
//! stem, and `<DIR>/<stem>.image.params` supplies the reconstruction
//! geometry.

use std::path::PathBuf;

use dzfmt::record::ChunkSchemaVariant;

use crate::exit::UsageError;
use crate::style::*;

pub(crate) fn run(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let mut strategy_name = None;
    let mut out_dir = PathBuf::from(".");
    let mut ext2simg_path = None;
    let mut files = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-e" => strategy_name = Some("sparse-ext4"),
            "-s" => strategy_name = Some("holes"),
            "-p" => strategy_name = Some("probe"),
            "-d" => {
                i += 1;
                out_dir = PathBuf::from(args.get(i).ok_or_else(|| usage_error("-d requires a path"))?);
            }
            "--ext2simg" => {
                i += 1;
                ext2simg_path =
                    Some(PathBuf::from(args.get(i).ok_or_else(|| usage_error("--ext2simg requires a path"))?));
            }
            other => files.push(PathBuf::from(other)),
        }
        i += 1;
    }

    let strategy_name = strategy_name.ok_or_else(|| usage_error("one of -e, -s, -p is required"))?;
    let strategy = dz::ChunkStrategy::parse(strategy_name, ext2simg_path)?;

    if files.is_empty() {
        return Err(usage_error("at least one slice image is required"));
    }

    std::fs::create_dir_all(&out_dir)?;

    for file in &files {
        let slice_name = file
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| usage_error("slice image path has no usable file stem"))?;

        let params = dz::load_slice_params(&out_dir, slice_name)?;
        let variant = if params.dev.is_some() { ChunkSchemaVariant::Dev } else { ChunkSchemaVariant::Reserved };

        spinner_msg(&format!("Chunking {slice_name} ({strategy_name})"));
        let t = std::time::Instant::now();
        let outputs = dz::chunk_slice(&strategy, file, &out_dir, slice_name, &params, variant)?;
        spinner_done(&format!(" ({}, {} chunk(s))", format_duration(t.elapsed()), outputs.len()));

        for path in outputs {
            kv("wrote", &path.display().to_string());
        }
    }

    Ok(())
}

fn usage_error(msg: &str) -> Box<dyn std::error::Error> {
    Box::new(UsageError(msg.to_string()))
}
