pub mod choices;
pub mod cli;
pub mod commands;
pub mod config;
pub mod data;
pub mod error;
pub mod events;
pub mod filter;
pub mod frame;
pub mod grades;
pub mod io_utils;
pub mod leaves;
pub mod pivot;
pub mod provider;
pub mod schema;
pub mod snapshot;
pub mod table;
pub mod taxonomy;

use std::{env, sync::OnceLock};

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

use crate::cli::{Cli, Commands};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("mtss_explorer", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Build(args) => commands::build(&args),
        Commands::Dedupe(args) => commands::dedupe(&args),
        Commands::Taxonomy(args) => commands::taxonomy(&args),
        Commands::Leaves(args) => commands::leaves(&args),
        Commands::Choices(args) => commands::choices(&args),
        Commands::Filter(args) => commands::filter(&args),
        Commands::Config(args) => commands::config(&args),
    }
}
