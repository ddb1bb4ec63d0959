//! Runtime configuration read from the environment.
//!
//! ## Environment variables
//!
//! - `GRID_HOP_BOUND`: hop bound of the "already connected" test (default: 5)
//! - `GRID_BASE_MVA`: per-unit base power in MVA (default: 100)
//! - `GRID_WRITE_TIMEOUT_SECS`: bound on one aggregate write (default: 30)
//! - `GRID_MODEL_ID`: model that synthesized assets are registered in (default: 0)
//!
//! Unset or unparsable values fall back to the default.

use std::time::Duration;

use crate::graph::DEFAULT_HOP_BOUND;
use crate::per_unit::{PerUnit, DEFAULT_BASE_MVA};
use crate::synth::{SubstationSynthesizer, VoltageLevelSynthesizer};

/// Default bound on one aggregate write, in seconds.
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 30;

/// Kernel configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelConfig {
    /// Paths shorter than this many edges count as connected.
    pub hop_bound: usize,
    /// Per-unit base power in MVA.
    pub base_mva: f64,
    /// Bound on one aggregate write.
    pub write_timeout: Duration,
    /// Model that synthesized assets are registered in.
    pub model_id: i32,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            hop_bound: DEFAULT_HOP_BOUND,
            base_mva: DEFAULT_BASE_MVA,
            write_timeout: Duration::from_secs(DEFAULT_WRITE_TIMEOUT_SECS),
            model_id: 0,
        }
    }
}

impl KernelConfig {
    /// Create configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<f64>().ok());

        Self {
            hop_bound: lookup("GRID_HOP_BOUND")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.hop_bound),
            base_mva: parsed("GRID_BASE_MVA")
                .filter(|mva| *mva > 0.0)
                .unwrap_or(defaults.base_mva),
            write_timeout: lookup("GRID_WRITE_TIMEOUT_SECS")
                .and_then(|v| v.trim().parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.write_timeout),
            model_id: lookup("GRID_MODEL_ID")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.model_id),
        }
    }

    /// Per-unit system for transformer ratings.
    pub fn per_unit(&self) -> PerUnit {
        PerUnit::new(self.base_mva)
    }

    /// Voltage level synthesizer using this configuration.
    pub fn voltage_level_synthesizer(&self) -> VoltageLevelSynthesizer {
        VoltageLevelSynthesizer::new(self.hop_bound)
    }

    /// Substation synthesizer using this configuration.
    pub fn substation_synthesizer(&self) -> SubstationSynthesizer {
        SubstationSynthesizer::new(self.hop_bound, self.per_unit())
    }
}
