//! Program text compiler and decompiler CLI.
//!
//! # Usage
//! ```text
//! asm <input>            Compile text source to hex bytecode on stdout
//! asm -d <input>         Decompile hex bytecode to text on stdout
//! ```

use chainvm::assembler::{compile, decompile};
use chainvm::{error, info};
use std::env;
use std::fs;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let (decompile_mode, input_path) = match args[1].as_str() {
        "--decompile" | "-d" => {
            if args.len() < 3 {
                error!("-d requires an input file");
                process::exit(1);
            }
            (true, &args[2])
        }
        _ => (false, &args[1]),
    };

    let source = match fs::read_to_string(input_path) {
        Ok(s) => s,
        Err(e) => {
            error!("failed to read {}: {}", input_path, e);
            process::exit(1);
        }
    };

    if decompile_mode {
        let bytecode = match parse_hex(&source) {
            Some(b) => b,
            None => {
                error!("{} is not a hex bytecode file", input_path);
                process::exit(1);
            }
        };
        match decompile(&bytecode) {
            Ok(text) => {
                println!("{}", text);
                info!("decompiled {} ({} bytes)", input_path, bytecode.len());
            }
            Err(e) => {
                error!("decompilation failed: {}", e);
                process::exit(1);
            }
        }
    } else {
        match compile(&source) {
            Ok(bytecode) => {
                let mut out = String::with_capacity(bytecode.len() * 2);
                for byte in &bytecode {
                    out.push_str(&format!("{:02x}", byte));
                }
                println!("{}", out);
                info!("compiled {} ({} bytes)", input_path, bytecode.len());
            }
            Err(e) => {
                error!("compilation failed: {}", e);
                process::exit(1);
            }
        }
    }
}

fn parse_hex(source: &str) -> Option<Vec<u8>> {
    let cleaned: String = source.chars().filter(|c| !c.is_whitespace()).collect();
    let cleaned = cleaned.strip_prefix("0x").unwrap_or(&cleaned);
    if cleaned.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(cleaned.len() / 2);
    let bytes = cleaned.as_bytes();
    for pair in bytes.chunks(2) {
        let hi = (pair[0] as char).to_digit(16)?;
        let lo = (pair[1] as char).to_digit(16)?;
        out.push((hi << 4 | lo) as u8);
    }
    Some(out)
}

const USAGE: &str = "\
Predicate Program Assembler

USAGE:
    {program} [-d] <input>

ARGS:
    <input>    Text source to compile, or hex bytecode with -d

OPTIONS:
    -d, --decompile    Decompile hex bytecode to text
    -h, --help         Print this help message

EXAMPLES:
    # Compile a program to hex bytecode
    {program} program.txt

    # Turn bytecode back into text
    {program} -d program.hex
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
