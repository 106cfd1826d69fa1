//! CLI subcommands for `samd-cli`.
//!
//! ## Usage
//!
//! ```bash
//! samd-cli build corpus.json corpus.samd --eos 2
//! samd-cli inspect corpus.samd
//! samd-cli lookup corpus.samd 17 4 981
//! samd-cli simulate reference.json --prompt-len 32 --index corpus.samd
//! samd-cli config show
//! ```

pub mod config_cmd;
pub mod index_cmd;
pub mod simulate_cmd;

use thiserror::Error;

use crate::automaton::IndexError;
use crate::engine::DecodeError;

/// Errors surfaced by CLI subcommands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("{0}")]
    Usage(String),
}
