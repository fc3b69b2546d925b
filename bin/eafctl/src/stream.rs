//! ---
//! eaf_section: "05-networking-external-interfaces"
//! eaf_subsection: "binary"
//! eaf_type: "source"
//! eaf_scope: "code"
//! eaf_description: "Streaming subcommand printing client events."
//! eaf_version: "v0.0.0-prealpha"
//! eaf_owner: "tbd"
//! ---
use std::io::Write;

use anyhow::Result;
use clap::Args;
use eaf_client::{spawn_client, ChannelSink, SinkEvent};
use eaf_common::config::ClientConfig;
use tokio::signal;
use tracing::info;

#[derive(Debug, Args)]
pub struct StreamArgs {
    /// Session to subscribe to after each connect
    #[arg(long)]
    session: Option<String>,

    /// Only print tick events
    #[arg(long)]
    ticks_only: bool,

    /// Exit after this many ticks (live or replayed)
    #[arg(long)]
    limit: Option<usize>,
}

pub async fn run(mut config: ClientConfig, args: StreamArgs) -> Result<()> {
    if args.session.is_some() {
        config.session_key = args.session.clone();
    }
    let (sink, mut events) = ChannelSink::new();
    let handle = spawn_client(&config, sink)?;
    info!(endpoint = %handle.endpoint(), "streaming client started");

    let stdout = std::io::stdout();
    let mut ticks = 0usize;
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("ctrl-c received; closing client");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                let is_tick = matches!(event, SinkEvent::Tick(_));
                if is_tick || !args.ticks_only {
                    let mut out = stdout.lock();
                    serde_json::to_writer(&mut out, &event)?;
                    writeln!(out)?;
                }
                if is_tick {
                    ticks += 1;
                    if args.limit.is_some_and(|limit| ticks >= limit) {
                        break;
                    }
                }
            }
        }
    }

    handle.shutdown().await?;
    Ok(())
}
