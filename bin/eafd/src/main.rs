//! ---
//! eaf_section: "01-core-functionality"
//! eaf_subsection: "binary"
//! eaf_type: "source"
//! eaf_scope: "code"
//! eaf_description: "Binary entrypoint for the EAF transport daemon."
//! eaf_version: "v0.0.0-prealpha"
//! eaf_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use eaf_common::config::AppConfig;
use eaf_common::logging::init_tracing;
use eaf_net::TransportServerBuilder;
use eaf_sim::parse_seed;
use tokio::signal;
use tracing::info;

#[derive(Debug, Parser)]
#[command(
    author,
    version = concat!("eafd ", env!("CARGO_PKG_VERSION")),
    about = "EAF heat telemetry transport daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "ADDR", help = "Override server.listen")]
    listen: Option<SocketAddr>,

    #[arg(long, value_parser = parse_seed, help = "Override simulation.default_seed")]
    seed: Option<u64>,

    #[arg(long, help = "Do not start ticking when a session is created by a subscribe")]
    no_autostart: bool,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(listen) = self.listen {
            config.server.listen = listen;
        }
        if let Some(seed) = self.seed {
            config.simulation.default_seed = seed;
        }
        if self.no_autostart {
            config.server.autostart = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/eaf.toml"));
    candidates.push(PathBuf::from("configs/eaf.dev.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    cli.apply(&mut config);
    config.validate()?;
    init_tracing("eafd", &config.logging)?;

    match &loaded.source {
        Some(path) => info!(config_path = %path.display(), "configuration loaded"),
        None => info!("no configuration file found; running with defaults"),
    }

    let handle = TransportServerBuilder::from_config(&config).spawn().await?;
    info!(
        address = %handle.local_addr(),
        tick_interval_ms = config.server.tick_interval.as_millis() as u64,
        default_seed = config.simulation.default_seed,
        "daemon running; waiting for termination signal"
    );

    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");
    handle.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_config_values() {
        let cli = Cli::parse_from([
            "eafd",
            "--listen",
            "0.0.0.0:9000",
            "--seed",
            "0x2a",
            "--no-autostart",
        ]);
        let mut config = AppConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.server.listen, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.simulation.default_seed, 42);
        assert!(!config.server.autostart);
    }

    #[test]
    fn absent_overrides_keep_config() {
        let cli = Cli::parse_from(["eafd"]);
        let mut config = AppConfig::default();
        config.simulation.default_seed = 7;
        cli.apply(&mut config);
        assert_eq!(config.simulation.default_seed, 7);
        assert!(config.server.autostart);
    }

    #[test]
    fn invalid_seed_is_rejected() {
        assert!(Cli::try_parse_from(["eafd", "--seed", "forty-two"]).is_err());
    }
}
