mod catalog;
mod cli;
mod config;
mod document;
mod lifecycle;
mod profile;
mod runtime;
mod status;

use std::env;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;

fn main() -> Result<ExitCode> {
    let cli = cli::Cli::parse();
    init_logging(cli.verbose);

    let cwd = env::current_dir().context("failed to determine current directory")?;
    let paths = config::ProjectPaths::discover(cli.directory.as_deref(), &cwd);
    log::debug!("project root {:?}", paths.project_root);
    let config_manager = config::ConfigManager::new();
    let config = config_manager.load()?;

    let command = cli.command;
    if !matches!(command, cli::Commands::Config(_)) {
        paths.ensure_infrastructure()?;
    }

    match command {
        cli::Commands::Up(args) => lifecycle::handle_up(&args.profile, &config, &paths),
        cli::Commands::Down(args) => lifecycle::handle_down(args.profile.as_deref(), &config, &paths),
        cli::Commands::Status => status::handle_status(&config, &paths).map(|_| ExitCode::SUCCESS),
        cli::Commands::Profiles(args) => {
            profile::handle_profiles(args.command, &paths).map(|_| ExitCode::SUCCESS)
        }
        cli::Commands::Show(args) => {
            profile::handle_show(&args.profile, args.format, &paths).map(|_| ExitCode::SUCCESS)
        }
        cli::Commands::Logs(args) => runtime::handle_logs(args, &config, &paths),
        cli::Commands::Exec(args) => runtime::handle_exec(args, &config, &paths),
        cli::Commands::Config(args) => {
            config::handle_config(args.command, &config_manager, &config, &paths)
                .map(|_| ExitCode::SUCCESS)
        }
    }
}

fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(LevelFilter::Warn);
    builder.parse_env("RUST_LOG");
    if verbose {
        builder.filter_module(env!("CARGO_CRATE_NAME"), LevelFilter::Debug);
    }
    builder.init();
}
