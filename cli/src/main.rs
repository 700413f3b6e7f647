// cli/src/main.rs — bgenvctl entrypoint
//
// Installed (or linked) as `bg_setenv` it modifies the environment, as
// `bg_printenv` it prints it. Under any other name it takes a subcommand.

use std::ffi::OsString;
use std::path::Path;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod bgenvctl;
use bgenvctl::error::CliError;
use bgenvctl::printenv::{self, PrintArgs};
use bgenvctl::setenv::{self, SetArgs};

#[derive(Parser)]
#[command(
    name = "bgenvctl",
    version,
    about = "bgenvctl — EFI Boot Guard environment tool",
    long_about = "Reads and updates the redundant EFI Boot Guard environment. \
                  Link it as bg_setenv or bg_printenv to get the classic tools."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Modify the environment (bg_setenv)
    #[command(name = "setenv")]
    Setenv(SetArgs),
    /// Print the environment (bg_printenv)
    #[command(name = "printenv")]
    Printenv(PrintArgs),
}

enum Personality {
    Setenv,
    Printenv,
    Multi,
}

fn personality(argv0: Option<&OsString>) -> Personality {
    let name = argv0
        .and_then(|a| Path::new(a).file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if name.contains("bg_setenv") {
        Personality::Setenv
    } else if name.contains("bg_printenv") {
        Personality::Printenv
    } else {
        Personality::Multi
    }
}

fn main() -> ExitCode {
    let argv: Vec<OsString> = std::env::args_os().collect();

    let result: Result<(), CliError> = match personality(argv.first()) {
        Personality::Setenv => setenv::run(SetArgs::parse_from(argv)),
        Personality::Printenv => printenv::run(PrintArgs::parse_from(argv)),
        Personality::Multi => match Cli::parse_from(argv).command {
            Commands::Setenv(args) => setenv::run(args),
            Commands::Printenv(args) => printenv::run(args),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            e.report();
            e.exit_code()
        }
    }
}
