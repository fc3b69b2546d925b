//! ---
//! eaf_section: "01-core-functionality"
//! eaf_subsection: "module"
//! eaf_type: "source"
//! eaf_scope: "code"
//! eaf_description: "Shared primitives and utilities for the stream runtime."
//! eaf_version: "v0.0.0-prealpha"
//! eaf_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;
use url::Url;

use crate::logging::LogFormat;

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8090))
}

fn default_tick_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_broadcast_capacity() -> usize {
    256
}

fn default_true() -> bool {
    true
}

fn default_seed() -> u64 {
    42
}

fn default_mass_tonnes() -> f64 {
    85.0
}

fn default_bore_in_until() -> u64 {
    120
}

fn default_melt_until() -> u64 {
    900
}

fn default_refine_until() -> u64 {
    1500
}

fn default_page_url() -> String {
    "http://127.0.0.1:8090/".to_owned()
}

fn default_ws_path() -> String {
    "/ws".to_owned()
}

fn default_buffer_capacity() -> usize {
    180
}

fn default_replay_window() -> usize {
    60
}

fn default_replay_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_base_reconnect_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_latency_probe_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

/// Primary configuration object shared by the daemon, the client CLI and the generator tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when no file was found and defaults are in effect.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "EAF_CONFIG";

    /// Load configuration from disk, respecting the `EAF_CONFIG` override.
    ///
    /// Unlike the daemon's hard requirement on an explicit file, missing candidates fall back
    /// to built-in defaults so that a bare `eafd` starts a demo server.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        debug!("no configuration file found; using defaults");
        let config = Self::default();
        config.validate()?;
        Ok(LoadedAppConfig {
            config,
            source: None,
        })
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants across all sections.
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.simulation.validate()?;
        self.client.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Transport server settings.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Cadence at which each running session produces a tick.
    #[serde(default = "default_tick_interval", rename = "tick_interval_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub tick_interval: Duration,
    /// How long a session without subscribers survives before teardown.
    #[serde(default = "default_idle_timeout", rename = "idle_timeout_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub idle_timeout: Duration,
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
    /// Start ticking as soon as a session is created by a subscribe.
    #[serde(default = "default_true")]
    pub autostart: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            tick_interval: default_tick_interval(),
            idle_timeout: default_idle_timeout(),
            broadcast_capacity: default_broadcast_capacity(),
            autostart: true,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            bail!("server.tick_interval_ms must be greater than zero");
        }
        if self.broadcast_capacity == 0 {
            bail!("server.broadcast_capacity must be greater than zero");
        }
        Ok(())
    }
}

/// Heat generator parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_seed")]
    pub default_seed: u64,
    #[serde(default = "default_mass_tonnes")]
    pub mass_tonnes: f64,
    #[serde(default = "default_bore_in_until")]
    pub bore_in_until_sec: u64,
    #[serde(default = "default_melt_until")]
    pub melt_until_sec: u64,
    #[serde(default = "default_refine_until")]
    pub refine_until_sec: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            default_seed: default_seed(),
            mass_tonnes: default_mass_tonnes(),
            bore_in_until_sec: default_bore_in_until(),
            melt_until_sec: default_melt_until(),
            refine_until_sec: default_refine_until(),
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.mass_tonnes.is_finite() && self.mass_tonnes > 0.0) {
            bail!("simulation.mass_tonnes must be a positive number");
        }
        if self.bore_in_until_sec == 0
            || self.melt_until_sec <= self.bore_in_until_sec
            || self.refine_until_sec <= self.melt_until_sec
        {
            return Err(anyhow!(
                "simulation stage thresholds must be strictly increasing (got {} / {} / {})",
                self.bore_in_until_sec,
                self.melt_until_sec,
                self.refine_until_sec
            ));
        }
        Ok(())
    }
}

/// Resilient streaming client settings.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// URL of the page hosting the dashboard; its scheme decides `ws` vs `wss`.
    #[serde(default = "default_page_url")]
    pub page_url: String,
    #[serde(default = "default_ws_path")]
    pub path: String,
    #[serde(default)]
    pub session_key: Option<String>,
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// Number of most recent buffered ticks cycled during replay.
    #[serde(default = "default_replay_window")]
    pub replay_window: usize,
    #[serde(default = "default_replay_interval", rename = "replay_interval_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub replay_interval: Duration,
    #[serde(
        default = "default_base_reconnect_delay",
        rename = "base_reconnect_delay_ms"
    )]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub base_reconnect_delay: Duration,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(
        default = "default_latency_probe_interval",
        rename = "latency_probe_interval_ms"
    )]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub latency_probe_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            page_url: default_page_url(),
            path: default_ws_path(),
            session_key: None,
            buffer_capacity: default_buffer_capacity(),
            replay_window: default_replay_window(),
            replay_interval: default_replay_interval(),
            base_reconnect_delay: default_base_reconnect_delay(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            latency_probe_interval: default_latency_probe_interval(),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.page_url)
            .with_context(|| format!("client.page_url '{}' is not a valid URL", self.page_url))?;
        if self.buffer_capacity == 0 {
            bail!("client.buffer_capacity must be greater than zero");
        }
        if self.replay_window == 0 || self.replay_window > self.buffer_capacity {
            bail!(
                "client.replay_window must be between 1 and buffer_capacity ({})",
                self.buffer_capacity
            );
        }
        if self.replay_interval.is_zero() || self.latency_probe_interval.is_zero() {
            bail!("client replay and latency probe intervals must be greater than zero");
        }
        if self.max_reconnect_attempts == 0 {
            bail!("client.max_reconnect_attempts must be at least 1");
        }
        if let Some(key) = &self.session_key {
            if key.trim().is_empty() {
                bail!("client.session_key must not be blank when set");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: LogFormat::default(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_yields_defaults() {
        let config: AppConfig = "".parse().unwrap();
        assert_eq!(config.server.tick_interval, Duration::from_secs(1));
        assert_eq!(config.simulation.default_seed, 42);
        assert_eq!(config.client.buffer_capacity, 180);
        assert_eq!(config.client.replay_window, 60);
        assert_eq!(config.client.max_reconnect_attempts, 5);
        assert_eq!(config.client.latency_probe_interval, Duration::from_secs(5));
        assert!(config.metrics.enabled);
    }

    #[test]
    fn millisecond_durations_are_parsed() {
        let config: AppConfig = r#"
            [server]
            tick_interval_ms = 250

            [client]
            session_key = "heat-7"
            replay_interval_ms = 100
            base_reconnect_delay_ms = 50
            "#
        .parse()
        .unwrap();
        assert_eq!(config.server.tick_interval, Duration::from_millis(250));
        assert_eq!(config.client.replay_interval, Duration::from_millis(100));
        assert_eq!(config.client.base_reconnect_delay, Duration::from_millis(50));
        assert_eq!(config.client.session_key.as_deref(), Some("heat-7"));
    }

    #[test]
    fn non_increasing_thresholds_are_rejected() {
        let err = r#"
            [simulation]
            bore_in_until_sec = 900
            melt_until_sec = 120
            "#
        .parse::<AppConfig>()
        .unwrap_err();
        assert!(err.to_string().contains("strictly increasing"));
    }

    #[test]
    fn replay_window_must_fit_buffer() {
        let err = r#"
            [client]
            buffer_capacity = 10
            replay_window = 60
            "#
        .parse::<AppConfig>()
        .unwrap_err();
        assert!(err.to_string().contains("replay_window"));
    }

    #[test]
    fn invalid_page_url_is_rejected() {
        let err = r#"
            [client]
            page_url = "not a url"
            "#
        .parse::<AppConfig>()
        .unwrap_err();
        assert!(err.to_string().contains("page_url"));
    }

    #[test]
    fn load_with_source_prefers_existing_candidate() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[simulation]\ndefault_seed = 7").unwrap();
        file.flush().unwrap();
        let missing = PathBuf::from("does/not/exist.toml");
        let loaded =
            AppConfig::load_with_source(&[missing, file.path().to_path_buf()]).unwrap();
        assert_eq!(loaded.config.simulation.default_seed, 7);
        assert_eq!(loaded.source.as_deref(), Some(file.path()));
    }

    #[test]
    fn load_with_source_falls_back_to_defaults() {
        let loaded = AppConfig::load_with_source(&[PathBuf::from("missing.toml")]).unwrap();
        assert!(loaded.source.is_none());
        assert_eq!(loaded.config.server.listen, default_listen());
    }
}
