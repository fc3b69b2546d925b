//! ---
//! eaf_section: "11-simulation"
//! eaf_subsection: "01-bootstrap"
//! eaf_type: "source"
//! eaf_scope: "code"
//! eaf_description: "Offline generator for reproducible heat tick sequences."
//! eaf_version: "v0.0.0-prealpha"
//! eaf_owner: "tbd"
//! ---
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use eaf_common::AppConfig;
use eaf_msg::{Stage, Tick};
use eaf_sim::{parse_seed, GeneratorConfig, HeatGenerator};
use serde::Serialize;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Generate deterministic EAF heat tick sequences",
    long_about = None
)]
struct Cli {
    /// Output file path. Use '-' for stdout.
    #[arg(long, default_value = "heat.csv")]
    output: PathBuf,

    /// Explicit output format when extension is ambiguous
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Number of simulated seconds to generate
    #[arg(long, default_value_t = 1_800)]
    samples: u64,

    /// Generator seed (decimal or 0x-prefixed hex); defaults to simulation.default_seed
    #[arg(long, value_parser = parse_seed)]
    seed: Option<u64>,

    /// Timestamp of simulated second zero, in epoch milliseconds
    #[arg(long, default_value_t = 0)]
    epoch_ms: i64,

    /// Catalog scenario to inject (e.g. energy-spike, foam-collapse)
    #[arg(long)]
    scenario: Option<String>,

    /// Simulated second at which the scenario applies
    #[arg(long, requires = "scenario")]
    trigger_at: Option<u64>,

    /// Configuration file providing the [simulation] section
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

/// Flat CSV record; every optional column is always present.
#[derive(Debug, Serialize)]
struct TickRow<'a> {
    timestamp: i64,
    stage: Stage,
    temperature_c: f64,
    energy_total_kwh: f64,
    energy_per_tonne: f64,
    power_factor: f64,
    tap_position: i32,
    total_harmonic_distortion_pct: f64,
    foam_index: f64,
    carbon_pct: Option<f64>,
    oxygen_pct: Option<f64>,
    note: Option<&'a str>,
}

impl<'a> From<&'a Tick> for TickRow<'a> {
    fn from(tick: &'a Tick) -> Self {
        Self {
            timestamp: tick.timestamp,
            stage: tick.stage,
            temperature_c: tick.temperature_c,
            energy_total_kwh: tick.energy_total_kwh,
            energy_per_tonne: tick.energy_per_tonne,
            power_factor: tick.power_factor,
            tap_position: tick.tap_position,
            total_harmonic_distortion_pct: tick.total_harmonic_distortion_pct,
            foam_index: tick.foam_index,
            carbon_pct: tick.carbon_pct,
            oxygen_pct: tick.oxygen_pct,
            note: tick.note.as_deref(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.samples == 0 {
        return Err(anyhow!("samples must be greater than zero"));
    }

    let format = determine_format(&cli.output, cli.format);
    let ticks = generate(&cli)?;
    let writer = open_output(&cli.output)?;
    match format {
        OutputFormat::Csv => write_csv(writer, &ticks)?,
        OutputFormat::Json => write_json(writer, &ticks)?,
    }

    if cli.output.as_os_str() != "-" {
        eprintln!(
            "generated {} ticks -> {}",
            ticks.len(),
            cli.output.display()
        );
    }
    Ok(())
}

fn determine_format(path: &Path, override_format: Option<OutputFormat>) -> OutputFormat {
    if let Some(format) = override_format {
        return format;
    }
    if path.as_os_str() == "-" {
        return OutputFormat::Json;
    }
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => OutputFormat::Json,
        _ => OutputFormat::Csv,
    }
}

fn build_generator(cli: &Cli) -> Result<HeatGenerator> {
    let config = match &cli.config {
        Some(path) if !path.exists() => {
            return Err(anyhow!("config file {} does not exist", path.display()))
        }
        Some(path) => AppConfig::load_with_source(&[path])?.config,
        None => AppConfig::default(),
    };
    let seed = cli.seed.unwrap_or(config.simulation.default_seed);
    let mut generator = HeatGenerator::with_config(
        seed,
        cli.epoch_ms,
        GeneratorConfig::from(&config.simulation),
    )?;
    if let Some(id) = &cli.scenario {
        let mut injection = eaf_sim::lookup(id)?;
        if let Some(second) = cli.trigger_at {
            injection = injection.trigger_at(second);
        }
        generator.inject_scenario(injection);
    }
    Ok(generator)
}

fn generate(cli: &Cli) -> Result<Vec<Tick>> {
    let mut generator = build_generator(cli)?;
    (0..cli.samples)
        .map(|_| generator.tick().context("generator fault"))
        .collect()
}

fn open_output(path: &Path) -> Result<Box<dyn Write>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(io::stdout().lock()));
    }
    let file = File::create(path)
        .with_context(|| format!("failed to create output file {}", path.display()))?;
    Ok(Box::new(file))
}

fn write_csv(writer: Box<dyn Write>, ticks: &[Tick]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for tick in ticks {
        writer.serialize(TickRow::from(tick))?;
    }
    writer.flush()?;
    Ok(())
}

fn write_json(mut writer: Box<dyn Write>, ticks: &[Tick]) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, ticks)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
