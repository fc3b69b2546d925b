//! ---
//! eaf_section: "05-networking-external-interfaces"
//! eaf_subsection: "binary"
//! eaf_type: "source"
//! eaf_scope: "code"
//! eaf_description: "Control CLI for operators following and steering heat sessions."
//! eaf_version: "v0.0.0-prealpha"
//! eaf_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use eaf_common::config::AppConfig;
use eaf_common::logging::init_stderr;

mod control;
mod stream;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "EAF heat session streaming and control utility",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", global = true, help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(
        long,
        value_name = "URL",
        global = true,
        help = "Dashboard page URL; overrides client.page_url"
    )]
    url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Follow a session and print client events as JSON lines")]
    Stream(stream::StreamArgs),
    #[command(subcommand, about = "Drive the demo control endpoints")]
    Session(control::SessionCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    init_stderr("warn");
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/eaf.toml"));
    let mut config = AppConfig::load_with_source(&candidates)?.config;
    if let Some(url) = cli.url {
        config.client.page_url = url;
    }

    match cli.command {
        Commands::Stream(args) => stream::run(config.client, args).await,
        Commands::Session(cmd) => control::run(&config.client.page_url, cmd).await,
    }
}
