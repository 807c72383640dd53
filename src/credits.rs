//! Credit Calculator
//!
//! Back-of-envelope annual credit estimate for a single site:
//! `area × sequestration factor × permanence × survival × 100 tCO₂e/ha`.

use serde::{Deserialize, Serialize};

use crate::params::ProjectType;

/// tCO₂e per hectare per year before discounting.
pub const BASELINE_T_PER_HA: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CreditFactors {
    pub seq_factor: f64,
    pub permanence: f64,
    pub survival: f64,
}

impl CreditFactors {
    pub fn defaults_for(project_type: ProjectType) -> Self {
        match project_type {
            ProjectType::Reforestation => Self { seq_factor: 0.8, permanence: 0.95, survival: 0.85 },
            ProjectType::Wetland => Self { seq_factor: 0.75, permanence: 0.98, survival: 0.9 },
            ProjectType::Grassland => Self { seq_factor: 0.65, permanence: 0.92, survival: 0.88 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CreditCalculation {
    pub area_ha: f64,
    pub seq_factor: f64,
    pub permanence: f64,
    pub survival: f64,
    pub total_credits: f64,
}

pub fn calculate(area_ha: f64, factors: CreditFactors) -> CreditCalculation {
    CreditCalculation {
        area_ha,
        seq_factor: factors.seq_factor,
        permanence: factors.permanence,
        survival: factors.survival,
        total_credits: area_ha * factors.seq_factor * factors.permanence * factors.survival * BASELINE_T_PER_HA,
    }
}

/// Credits as survival varies from 0.50 to 1.00 in 0.05 steps.
pub fn survival_sensitivity(area_ha: f64, factors: CreditFactors) -> Vec<(f64, f64)> {
    (0..=10)
        .map(|step| {
            let survival = 0.5 + step as f64 * 0.05;
            let credits = calculate(area_ha, CreditFactors { survival, ..factors }).total_credits;
            (survival, credits)
        })
        .collect()
}

pub fn protocol_citation(project_type: ProjectType) -> &'static str {
    match project_type {
        ProjectType::Reforestation => "Canada Afforestation Protocol v2.1, Section 5.2",
        ProjectType::Wetland => "Canada Wetland Restoration Protocol v1.3, Section 4.1",
        ProjectType::Grassland => "Canada Grassland Conservation Protocol v1.0, Section 3.5",
    }
}
