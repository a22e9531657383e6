use clap::{Parser, Subcommand};

#[derive(Debug, Clone, Copy)]
enum ResponseMode {
    Json,
    Raw,
}

mod commands;
mod output;
mod tty;

use commands::{check, edit, find, info, renum, uexp};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "cardshift")]
#[command(version = VERSION)]
#[command(about = "Renumber identifiers and edit cell attributes in MCNP input decks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Renumber identifiers and apply attribute edits
    Renum(renum::RenumArgs),
    /// Apply attribute edits to cells
    Edit(edit::EditArgs),
    /// Show which identifiers are in use, as ranges
    Info(info::InfoArgs),
    /// List cells matching a condition
    Find(find::FindArgs),
    /// Load a deck and report what it contains
    Check(check::CheckArgs),
    /// Write u=0 on cells that belong to the real world implicitly
    Uexp(uexp::UexpArgs),
}

fn response_mode(command: &Commands) -> ResponseMode {
    match command {
        Commands::Renum(args) if args.is_raw() => ResponseMode::Raw,
        Commands::Edit(args) if args.is_raw() => ResponseMode::Raw,
        Commands::Info(args) if args.text => ResponseMode::Raw,
        Commands::Uexp(args) if args.is_raw() => ResponseMode::Raw,
        _ => ResponseMode::Json,
    }
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    if let ResponseMode::Raw = response_mode(&cli.command) {
        return match commands::run_raw(cli.command) {
            Ok((content, exit_code)) => {
                let _ = output::print_raw(&content);
                std::process::ExitCode::from(exit_code_to_u8(exit_code))
            }
            Err(err) => {
                let exit_code = output::exit_code_for_error(err.code);
                let _ = output::print_error_stderr(&err);
                std::process::ExitCode::from(exit_code_to_u8(exit_code))
            }
        };
    }

    let (json_result, exit_code) = commands::run_json(cli.command);
    let _ = output::print_json_result(json_result);

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
