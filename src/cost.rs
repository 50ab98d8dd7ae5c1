//! Repair cost estimation.
//!
//! The estimator is total: unknown damage types fall back to the default
//! profile, unknown severities to the `unknown` load, and numeric inputs are
//! clamped rather than rejected.

use serde::{Deserialize, Serialize};

use crate::record::round_dp;
use crate::severity::Severity;

pub const DEFAULT_LABOR_RATE: f64 = 70.0;
pub const DEFAULT_MATERIAL_RATE: f64 = 50.0;

const OVERHEAD_SHARE: f64 = 0.15;
const COST_STEP: f64 = 10.0;

/// Fixed per-type repair constants.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RepairProfile {
    pub base_hours: f64,
    pub material_factor: f64,
}

pub const DEFAULT_PROFILE: RepairProfile = RepairProfile {
    base_hours: 1.0,
    material_factor: 0.9,
};

const fn profile(base_hours: f64, material_factor: f64) -> RepairProfile {
    RepairProfile {
        base_hours,
        material_factor,
    }
}

const PROFILES: &[(&str, RepairProfile)] = &[
    ("scratch", profile(0.8, 0.5)),
    ("scratches", profile(0.8, 0.5)),
    ("paint", profile(1.0, 0.7)),
    ("dent", profile(1.5, 1.0)),
    ("ding", profile(1.2, 0.8)),
    ("crack", profile(1.1, 1.2)),
    ("glass shatter", profile(2.2, 1.6)),
    ("lamp broken", profile(1.3, 1.1)),
    ("tire flat", profile(1.0, 0.9)),
    ("broken", profile(1.8, 1.4)),
];

/// Look up the profile for a damage type, case-insensitively.
pub fn repair_profile(damage_type: &str) -> RepairProfile {
    let key = damage_type.to_lowercase();
    PROFILES
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, profile)| *profile)
        .unwrap_or(DEFAULT_PROFILE)
}

pub fn severity_load(severity: Severity) -> f64 {
    match severity {
        Severity::Low => 0.7,
        Severity::Medium => 1.0,
        Severity::High => 1.5,
        Severity::Unknown => 0.85,
    }
}

/// Currency rates applied to labor hours and material units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CostRates {
    pub labor_rate: f64,
    pub material_rate: f64,
}

impl Default for CostRates {
    fn default() -> Self {
        Self {
            labor_rate: DEFAULT_LABOR_RATE,
            material_rate: DEFAULT_MATERIAL_RATE,
        }
    }
}

/// Itemized repair estimate for one damage instance.
///
/// Component figures are reported at two decimals; `total_cost` is derived
/// from the unrounded components.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RepairEstimate {
    pub damage_type: String,
    pub severity: Severity,
    pub area_ratio: f64,
    pub labor_hours: f64,
    pub material_units: f64,
    pub labor_cost: f64,
    pub material_cost: f64,
    pub overhead_cost: f64,
    pub confidence_factor: f64,
    pub total_cost: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RepairEstimator {
    rates: CostRates,
}

impl RepairEstimator {
    pub fn new(rates: CostRates) -> Self {
        Self { rates }
    }

    pub fn rates(&self) -> CostRates {
        self.rates
    }

    pub fn estimate(
        &self,
        damage_type: &str,
        severity: Severity,
        area_ratio: f64,
        confidence: f64,
    ) -> RepairEstimate {
        let profile = repair_profile(damage_type);
        let load = severity_load(severity);

        let effort_multiplier = clamp_or_floor(0.9 + area_ratio * 5.0, 0.6, 2.5);
        let confidence_factor = clamp_or_floor(0.75 + confidence * 0.35, 0.55, 1.1);

        let labor_hours = profile.base_hours * load * effort_multiplier;
        let material_units = profile.material_factor * (0.7 + effort_multiplier * 0.5);

        let labor_cost = self.rates.labor_rate * labor_hours;
        let material_cost = self.rates.material_rate * material_units;
        let overhead_cost = OVERHEAD_SHARE * (labor_cost + material_cost);

        let raw_total = (labor_cost + material_cost + overhead_cost) * confidence_factor;

        RepairEstimate {
            damage_type: damage_type.to_string(),
            severity,
            area_ratio: round_dp(area_ratio, 4),
            labor_hours: round_dp(labor_hours, 2),
            material_units: round_dp(material_units, 2),
            labor_cost: round_dp(labor_cost, 2),
            material_cost: round_dp(material_cost, 2),
            overhead_cost: round_dp(overhead_cost, 2),
            confidence_factor: round_dp(confidence_factor, 2),
            total_cost: round_to_step(raw_total),
        }
    }

    /// Shorthand returning only the rounded total.
    pub fn total_cost_for(
        &self,
        damage_type: &str,
        severity: Severity,
        area_ratio: f64,
        confidence: f64,
    ) -> u64 {
        self.estimate(damage_type, severity, area_ratio, confidence)
            .total_cost
    }
}

// NaN reads as the floor.
fn clamp_or_floor(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}

/// Nearest multiple of ten; exact midpoints go to the even multiple.
fn round_to_step(raw_total: f64) -> u64 {
    if !raw_total.is_finite() || raw_total <= 0.0 {
        return 0;
    }
    let steps = (raw_total / COST_STEP).round_ties_even();
    (steps as u64) * COST_STEP as u64
}
