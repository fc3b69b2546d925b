//! ---
//! eaf_section: "11-simulation"
//! eaf_subsection: "module"
//! eaf_type: "source"
//! eaf_scope: "code"
//! eaf_description: "Simulation runtime helpers and scenario engines."
//! eaf_version: "v0.0.0-prealpha"
//! eaf_owner: "tbd"
//! ---
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::SimError;

/// Seeded noise source. Draw order is part of the determinism contract.
#[derive(Debug, Clone)]
pub struct SeededJitter {
    rng: StdRng,
}

impl SeededJitter {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Uniform sample in `[-amplitude, amplitude]`.
    pub fn symmetric(&mut self, amplitude: f64) -> f64 {
        self.rng.gen_range(-1.0..=1.0) * amplitude
    }

    /// Standard normal sample truncated to three sigma.
    pub fn gaussian(&mut self) -> f64 {
        let sample: f64 = self.rng.sample(StandardNormal);
        sample.clamp(-3.0, 3.0)
    }
}

/// Parse a seed given as decimal (`42`) or hexadecimal (`0x2a`).
pub fn parse_seed(raw: &str) -> Result<u64, SimError> {
    let trimmed = raw.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse::<u64>(),
    };
    parsed.map_err(|_| SimError::InvalidSeed(raw.to_owned()))
}
