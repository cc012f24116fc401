mod cli;
mod commands;
mod config;
mod engine;
mod input;
mod paths;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity; RUST_LOG still wins per module
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .parse_default_env()
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config: cli.config,
    };
    log::trace!("verbosity {}", ctx.verbose);

    match dispatch(&ctx, cli.command) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            ui::error(&format!("{e:#}"));
            if let Some(advice) = commands::advice(&e) {
                ui::dim(advice);
            }
            std::process::exit(1);
        }
    }
}

fn dispatch(ctx: &Context, command: Command) -> Result<i32> {
    match command {
        Command::Patch(args) => commands::schedule::patch(ctx, &args),
        Command::Migrate(args) => commands::schedule::migrate(ctx, &args),
        Command::Upgrade(args) => commands::schedule::upgrade(ctx, &args),
        Command::Utils(args) => commands::schedule::utils(ctx, &args),
        Command::Validate { action_ids_file } => commands::validate::run(ctx, &action_ids_file),
        Command::User(args) => commands::user::run(ctx, &args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "sumactl", &mut io::stdout());
            Ok(0)
        }
    }
}
