//! Per-unit conversion relative to a base power.

/// Base power in MVA used when none is configured.
pub const DEFAULT_BASE_MVA: f64 = 100.0;

/// Per-unit system with a fixed base power.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerUnit {
    /// Base power in MVA.
    pub sbase: f64,
}

impl PerUnit {
    /// Per-unit system with the given base power in MVA.
    pub fn new(sbase: f64) -> Self {
        Self { sbase }
    }

    /// Base impedance in ohm for a voltage in kV: `U² / Sbase`.
    pub fn zbase(&self, voltage_kv: f64) -> f64 {
        voltage_kv * voltage_kv / self.sbase
    }

    /// Resistance in ohm expressed in per unit.
    pub fn r_pu(&self, r_ohm: f64, voltage_kv: f64) -> f64 {
        r_ohm / self.zbase(voltage_kv)
    }

    /// Reactance in ohm expressed in per unit.
    pub fn x_pu(&self, x_ohm: f64, voltage_kv: f64) -> f64 {
        x_ohm / self.zbase(voltage_kv)
    }
}

impl Default for PerUnit {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_MVA)
    }
}
