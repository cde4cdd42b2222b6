//! dz-tool — CLI for the DZ firmware container format
//!
//! # Usage
//!
//! ```text
//! dz-tool decode -f FILE -l [-d DIR] [-b BLOCKSIZE]              List chunks and slices
//! dz-tool decode -f FILE -x [-d DIR] [-b BLOCKSIZE] ids...        Extract chunk payloads
//! dz-tool decode -f FILE -c [-d DIR] [-b BLOCKSIZE] ids...        Extract chunk files verbatim
//! dz-tool decode -f FILE -s [-d DIR] [-b BLOCKSIZE] names...      Reconstruct named slices
//! dz-tool decode -f FILE -i [-d DIR] [-b BLOCKSIZE]               Reconstruct every slice + params
//!
//! dz-tool encode -f FILE -m [-d DIR]                              Assemble chunks + params into a container
//! dz-tool encode -f FILE -l [-d DIR]                              Unpack a container's chunks + params
//!
//! dz-tool chunk -e [-d DIR] [--ext2simg PATH] file...             Sparse-EXT4 strategy
//! dz-tool chunk -s [-d DIR] file...                               Holes strategy
//! dz-tool chunk -p [-d DIR] file...                               Probe strategy
//! ```

mod cmd_chunk;
mod cmd_decode;
mod cmd_encode;
mod exit;
mod pipeline;
mod style;

use std::env;
use std::process;

use style::{BOLD, DIM, GREEN, RED, RESET};

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(exit::USAGE);
    }

    let result = match args[1].as_str() {
        "decode" => cmd_decode::run(&args[2..]),
        "encode" => cmd_encode::run(&args[2..]),
        "chunk" => cmd_chunk::run(&args[2..]),
        "-h" | "--help" | "help" => {
            print_usage();
            Ok(())
        }
        _ => {
            eprintln!("{RED}Unknown command: {}{RESET}", args[1]);
            print_usage();
            process::exit(exit::USAGE);
        }
    };

    if let Err(e) = result {
        eprintln!("{RED}error:{RESET} {e}");
        process::exit(exit::code_for_boxed(e.as_ref()));
    }
}

fn print_usage() {
    eprintln!(
        r#"
{BOLD}dz-tool{RESET} — DZ firmware container explorer

{DIM}Decode, chunk, and re-encode LG Android firmware images{RESET}

{BOLD}USAGE:{RESET}
    dz-tool <COMMAND> [OPTIONS]

{BOLD}COMMANDS:{RESET}
    {GREEN}decode{RESET}   -f FILE {{-l|-x|-c|-s|-i}} [-d DIR] [-b BLOCKSIZE] [ids...]
    {GREEN}encode{RESET}   -f FILE {{-l|-m}} [-d DIR]
    {GREEN}chunk{RESET}    {{-e|-s|-p}} [-d DIR] [--ext2simg PATH] file...

{BOLD}EXAMPLES:{RESET}
    dz-tool decode -f firmware.dz -l
    dz-tool decode -f firmware.dz -i -d out/
    dz-tool chunk -s -d out/ boot.img
    dz-tool encode -f rebuilt.dz -m -d out/

{DIM}Run dz-tool help for this message{RESET}
"#
    );
}
