use std::fmt;

use serde::Deserialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VolumePresentation {
    AbsoluteCm3,
    Relative,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub enum DoseUnit {
    #[serde(alias = "gy", alias = "GY")]
    Gy,
    #[default]
    #[serde(rename = "cGy", alias = "cgy", alias = "CGY")]
    CGy,
}

impl DoseUnit {
    /// Multiplier converting a dose expressed in `self` into `target`.
    pub fn factor_to(self, target: DoseUnit) -> f64 {
        match (self, target) {
            (DoseUnit::Gy, DoseUnit::CGy) => 100.0,
            (DoseUnit::CGy, DoseUnit::Gy) => 0.01,
            _ => 1.0,
        }
    }
}

impl fmt::Display for DoseUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DoseUnit::Gy => write!(f, "Gy"),
            DoseUnit::CGy => write!(f, "cGy"),
        }
    }
}

/// What to do when a plan identifier matches more than one plan of a patient.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePlanPolicy {
    #[default]
    Reject,
    LastMatchWins,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanKind {
    Single,
    Combination,
}
