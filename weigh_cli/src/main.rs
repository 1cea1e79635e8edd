#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! `weigh`: command-line front-end for the weighing scale controller.

mod cli;
mod commands;
mod error_fmt;
mod logging;

use std::path::Path;

use clap::Parser;
use eyre::WrapErr;

use crate::cli::{Cli, Commands, DEFAULT_CONFIG, FactorCmd, JSON_MODE, json_mode};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = color_eyre::install() {
        eprintln!("warning: {e}");
    }

    let code = match real_main(&cli) {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            if json_mode() {
                println!("{}", format_error_json(&e));
            } else {
                eprintln!("{}", humanize(&e));
            }
            exit_code_for_error(&e)
        }
    };
    std::process::exit(code);
}

fn real_main(cli: &Cli) -> eyre::Result<()> {
    let cfg = load_config(cli.config.as_deref()).wrap_err("invalid configuration")?;
    logging::init(&cli.log_level, cli.json, &cfg.logging)?;
    tracing::debug!(config = ?cli.config, "configuration loaded");

    match &cli.cmd {
        Commands::Run {
            simulate,
            sim_grams,
        } => {
            commands::run(&cfg, *simulate, *sim_grams, cli.json)?;
        }
        Commands::Factor { action } => match action {
            FactorCmd::Show => commands::factor_show(&cfg, cli.json),
            FactorCmd::Set { value } => commands::factor_set(&cfg, value, cli.json)?,
        },
        Commands::SelfCheck => commands::self_check(&cfg, cli.json)?,
    }
    Ok(())
}

/// Explicit path must exist; otherwise `weigh.toml` is used when present,
/// and built-in defaults when it is not.
fn load_config(path: Option<&Path>) -> eyre::Result<weigh_config::Config> {
    match path {
        Some(p) => weigh_config::load_file(p),
        None if Path::new(DEFAULT_CONFIG).exists() => weigh_config::load_file(Path::new(DEFAULT_CONFIG)),
        None => {
            let cfg = weigh_config::Config::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }
}
