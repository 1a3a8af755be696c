//! confsig — configuration-reconciliation sidecar.
//!
//! # Usage
//!
//! ```text
//! confsig [--settings <path>] [--] <command> [args...]
//! ```
//!
//! Reads `confsig.yml` from the working directory (or `--settings`), performs
//! one reconciliation of the watched store key into the local config file,
//! launches `<command>` with the sidecar's stdio, and keeps the file in sync
//! — SIGHUPing the child whenever the rendered content changes. When no
//! command is given, `app` from the settings file is launched instead.
//!
//! The sidecar's lifetime is bound to the child's: it exits when the child
//! does, mirroring the child's exit code.

use std::path::PathBuf;
use std::process::ExitStatus;

use anyhow::{Context, Result};
use clap::Parser;

use confsig_core::Settings;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "confsig",
    version,
    about = "Keep a local config file in sync with a remote KV entry and reload the wrapped process on change",
    long_about = None,
)]
struct Cli {
    /// Settings file (defaults to confsig.yml in the working directory).
    #[arg(long, value_name = "PATH")]
    settings: Option<PathBuf>,

    /// Command to supervise; falls back to `app` from the settings file.
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => Settings::load_at(path),
        None => Settings::load_default(),
    }
    .context("loading settings")?;

    let status = confsig_daemon::start_blocking(settings, cli.command)
        .context("running the sidecar")?;

    std::process::exit(exit_code(status));
}

/// Mirror the child's exit: its code when it has one, 128+signal when it was
/// killed by a signal, 1 as the last resort.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
