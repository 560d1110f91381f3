// SPDX-License-Identifier: SEE LICENSE IN LICENSE.md
// SPDX-FileCopyrightText: 2022 CYBERTEC PostgreSQL International GmbH
// <office@cybertec.at>

//! Thin command-line front-end over the library.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use plsql_normalizer::{NormalizeFlags, Normalizer, Wrapper};

#[derive(Parser)]
#[command(name = "plsql-normalizer", version, about = "Normalize or unwrap Oracle PL/SQL files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Normalize one PL/SQL file and write the result to another.
    Normalize {
        /// Input file path.
        #[arg(long = "in", value_name = "PATH")]
        input: PathBuf,
        /// Output file path.
        #[arg(long = "out", value_name = "PATH")]
        output: PathBuf,
        /// Strip comments.
        #[arg(long)]
        no_comments: bool,
        /// Replace whitespace runs with a single space.
        #[arg(long)]
        no_spaces: bool,
        /// Make PL/SQL lexemes uppercase.
        #[arg(long)]
        uppercase: bool,
        /// Strip literal contents.
        #[arg(long)]
        no_literals: bool,
        /// Leave comments only, strip everything else.
        #[arg(long)]
        comments_only: bool,
        /// Same as --no-comments --no-spaces --uppercase.
        #[arg(long)]
        full: bool,
        /// Only normalize the first N input lines.
        #[arg(long, value_name = "N")]
        lines: Option<usize>,
    },
    /// Decode an Oracle-wrapped PL/SQL file.
    Unwrap {
        /// Input file path.
        #[arg(long = "in", value_name = "PATH")]
        input: PathBuf,
        /// Output file path.
        #[arg(long = "out", value_name = "PATH")]
        output: PathBuf,
    },
}

fn init_logger() -> Result<(), log::SetLoggerError> {
    fern::Dispatch::new()
        .format(|out, message, record| out.finish(format_args!("[{}] {}", record.level(), message)))
        .level(
            std::env::var("PLSQL_NORMALIZER_LOG")
                .ok()
                .and_then(|level| level.parse().ok())
                .unwrap_or(log::LevelFilter::Warn),
        )
        .chain(std::io::stderr())
        .apply()
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Normalize {
            input,
            output,
            no_comments,
            no_spaces,
            uppercase,
            no_literals,
            comments_only,
            full,
            lines,
        } => {
            let mut flags = NormalizeFlags {
                no_comments,
                no_spaces,
                uppercase,
                no_literals,
                comments_only,
            };
            if full {
                flags.no_comments = true;
                flags.no_spaces = true;
                flags.uppercase = true;
            }
            Normalizer::new().normalize_path(&input, &flags, lines, Some(&output))?;
        }
        Command::Unwrap { input, output } => {
            Wrapper::new().unwrap_path(&input, Some(&output))?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let _ = init_logger();
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
