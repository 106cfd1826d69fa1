//! samd-cli entry point.
//!
//! ## CLI Subcommands
//!
//! - `samd-cli build <corpus.json> <out> [--eos ID]` - Build and save a static index
//! - `samd-cli inspect <index>` - Print index summary
//! - `samd-cli lookup <index> [--horizon N] <token>...` - Predict after a token walk
//! - `samd-cli simulate <reference.json> [--prompt-len N] [--index PATH] [--tree]`
//! - `samd-cli config [show|json|validate [FILE]]` - Show or check configuration

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use samd_core::cli::{config_cmd, index_cmd, simulate_cmd};
use samd_core::config as samd_config;
use samd_core::telemetry::{self, LogError};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    let env = samd_config::load();
    match telemetry::init_logging(&env.log) {
        Ok(()) | Err(LogError::AlreadyInitialized) => {}
        Err(e) => {
            eprintln!("Logging disabled: {}", e);
        }
    }

    match command {
        "build" => {
            let (Some(corpus), Some(out)) = (positional(&args, 0), positional(&args, 1)) else {
                print_command_help("build");
                return ExitCode::from(2u8);
            };
            let eos = match flag_value::<u32>(&args, "--eos") {
                Ok(eos) => eos.or(env.generation.eos_token).unwrap_or(0),
                Err(code) => return code,
            };
            exit(index_cmd::run_build(Path::new(corpus), Path::new(out), eos))
        }
        "inspect" => {
            let Some(index) = positional(&args, 0) else {
                print_command_help("inspect");
                return ExitCode::from(2u8);
            };
            exit(index_cmd::run_inspect(Path::new(index)))
        }
        "lookup" => {
            let Some(index) = positional(&args, 0) else {
                print_command_help("lookup");
                return ExitCode::from(2u8);
            };
            let horizon = match flag_value::<usize>(&args, "--horizon") {
                Ok(h) => h.unwrap_or(env.speculative.max_predicts).max(1),
                Err(code) => return code,
            };
            let mut tokens = Vec::new();
            for raw in positionals(&args).skip(1) {
                match raw.parse::<u32>() {
                    Ok(token) => tokens.push(token),
                    Err(_) => {
                        eprintln!("Invalid token id: {}", raw);
                        return ExitCode::from(2u8);
                    }
                }
            }
            exit(index_cmd::run_lookup(Path::new(index), &tokens, horizon))
        }
        "simulate" => {
            let Some(reference) = positional(&args, 0) else {
                print_command_help("simulate");
                return ExitCode::from(2u8);
            };
            let prompt_len = match flag_value::<usize>(&args, "--prompt-len") {
                Ok(n) => n.unwrap_or(1),
                Err(code) => return code,
            };
            let index = match flag_value::<PathBuf>(&args, "--index") {
                Ok(index) => index.or_else(|| env.static_index.clone()),
                Err(code) => return code,
            };
            let tree = args.iter().any(|a| a == "--tree");
            exit(simulate_cmd::run_simulate(
                &env,
                Path::new(reference),
                prompt_len,
                index.as_deref(),
                tree,
            ))
        }
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => {
                    config_cmd::run_show();
                    ExitCode::SUCCESS
                }
                "json" => exit(config_cmd::run_show_json()),
                "validate" => exit(config_cmd::run_validate(args.get(3).map(Path::new))),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("samd-cli {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn exit(code: i32) -> ExitCode {
    ExitCode::from(code.clamp(0, 255) as u8)
}

/// Flags that take a value; their values are not positionals.
const VALUE_FLAGS: &[&str] = &["--eos", "--horizon", "--prompt-len", "--index"];

/// Arguments after the command that are neither flags nor flag values.
fn positionals(args: &[String]) -> impl Iterator<Item = &str> {
    let mut skip_next = false;
    args.iter().skip(2).filter_map(move |arg| {
        if skip_next {
            skip_next = false;
            return None;
        }
        if VALUE_FLAGS.contains(&arg.as_str()) {
            skip_next = true;
            return None;
        }
        if arg.starts_with("--") {
            return None;
        }
        Some(arg.as_str())
    })
}

fn positional(args: &[String], n: usize) -> Option<&str> {
    positionals(args).nth(n)
}

/// Parse the value following `flag`. Exit code 2 on a missing or bad value.
fn flag_value<T: std::str::FromStr>(args: &[String], flag: &str) -> Result<Option<T>, ExitCode> {
    let Some(pos) = args.iter().position(|a| a == flag) else {
        return Ok(None);
    };
    match args.get(pos + 1).map(|v| v.parse::<T>()) {
        Some(Ok(value)) => Ok(Some(value)),
        _ => {
            eprintln!("{} needs a valid value", flag);
            Err(ExitCode::from(2u8))
        }
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "samd-cli - suffix automaton speculative decoding tools v{}

USAGE:
    samd-cli [COMMAND] [OPTIONS]

COMMANDS:
    build        Build a static corpus index from a JSON corpus
    inspect      Show a saved index summary
    lookup       Predict the continuation after a token walk
    simulate     Replay a reference sequence through the decoder
    config       Show or validate configuration
    version      Show version information
    help         Show this help message

EXAMPLES:
    samd-cli build corpus.json corpus.samd --eos 2
    samd-cli inspect corpus.samd
    samd-cli lookup corpus.samd --horizon 8 17 4 981
    samd-cli simulate reference.json --prompt-len 32 --index corpus.samd --tree
    samd-cli config validate samd.toml

ENVIRONMENT:
    SAMD_MAX_PREDICTS    Tokens predicted per lookup (default: 40)
    SAMD_LEN_THRESHOLD   Match length needed to trust an automaton (default: 5)
    SAMD_LEN_BIAS        Static match length bias (default: 5)
    SAMD_STATIC_INDEX    Saved static index used by simulate
    SAMD_LOG_LEVEL       Log filter (default: info)
    SAMD_LOG_FORMAT      json or pretty (default: json)

EXIT CODES:
    0  Success
    1  Failure
    2  Usage error",
        version
    );
}

fn print_command_help(command: &str) {
    match command {
        "build" => eprintln!(
            "samd-cli build <corpus.json> <out> [--eos ID]

Reads a JSON array of token-id arrays, appends the EOS token after every
sequence not already ending in it, and saves the checksummed index to <out>.
EOS defaults to SAMD_EOS_TOKEN, then 0."
        ),
        "inspect" => eprintln!(
            "samd-cli inspect <index>

Loads and verifies a saved index and prints its summary as JSON."
        ),
        "lookup" => eprintln!(
            "samd-cli lookup <index> [--horizon N] <token>...

Walks all but the last token through a fresh cursor, then prints the
prediction following the last token and its match length."
        ),
        "simulate" => eprintln!(
            "samd-cli simulate <reference.json> [--prompt-len N] [--index PATH] [--tree]

Replays a JSON token array through the decoder with an oracle base model that
always predicts the next reference token. Prints tokens per step and
acceptance statistics. --tree enables the token-recycle tree drafter."
        ),
        "config" => eprintln!(
            "samd-cli config [show|json|validate [FILE]]

show      Print effective SAMD_* values (default)
json      Print effective values as JSON
validate  Check the environment, or a TOML file, for misconfiguration"
        ),
        other => {
            eprintln!("No help for '{}'.", other);
            print_usage();
        }
    }
}
