//! Analysis Parameters
//!
//! User-editable inputs to a suitability run, held as one value so that any
//! change can be compared and keyed as a whole.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const BUFFER_MIN: f64 = 0.0;
pub const BUFFER_MAX: f64 = 50.0;
pub const BUFFER_DEFAULT: f64 = 20.0;
pub const BUFFER_STEP: f64 = 5.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    #[default]
    Reforestation,
    Wetland,
    Grassland,
}

impl ProjectType {
    pub const ALL: [ProjectType; 3] = [
        ProjectType::Reforestation,
        ProjectType::Wetland,
        ProjectType::Grassland,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectType::Reforestation => "reforestation",
            ProjectType::Wetland => "wetland",
            ProjectType::Grassland => "grassland",
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reforestation" => Ok(ProjectType::Reforestation),
            "wetland" => Ok(ProjectType::Wetland),
            "grassland" => Ok(ProjectType::Grassland),
            other => Err(format!("unknown project type '{}'", other)),
        }
    }
}

/// Toggleable spatial constraints applied by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constraints {
    /// Protected areas are always excluded.
    pub exclude_cpcad: bool,
    pub water_buffer: bool,
    pub slope_limit: bool,
    pub exclude_infrastructure: bool,
    pub warn_indigenous: bool,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            exclude_cpcad: true,
            water_buffer: false,
            slope_limit: false,
            exclude_infrastructure: false,
            warn_indigenous: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constraint {
    WaterBuffer,
    SlopeLimit,
    ExcludeInfrastructure,
    WarnIndigenous,
}

impl FromStr for Constraint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "water_buffer" => Ok(Constraint::WaterBuffer),
            "slope_limit" => Ok(Constraint::SlopeLimit),
            "exclude_infrastructure" => Ok(Constraint::ExcludeInfrastructure),
            "warn_indigenous" => Ok(Constraint::WarnIndigenous),
            other => Err(format!("unknown or fixed constraint '{}'", other)),
        }
    }
}

impl Constraints {
    /// Re-asserts the fixed protected-area exclusion.
    pub fn normalized(mut self) -> Self {
        self.exclude_cpcad = true;
        self
    }

    pub fn toggle(&mut self, constraint: Constraint) {
        let flag = match constraint {
            Constraint::WaterBuffer => &mut self.water_buffer,
            Constraint::SlopeLimit => &mut self.slope_limit,
            Constraint::ExcludeInfrastructure => &mut self.exclude_infrastructure,
            Constraint::WarnIndigenous => &mut self.warn_indigenous,
        };
        *flag = !*flag;
    }
}

/// Clamp a buffer radius into range. NaN falls back to the minimum.
pub fn clamp_buffer_km(km: f64) -> f64 {
    if km.is_nan() {
        BUFFER_MIN
    } else {
        km.clamp(BUFFER_MIN, BUFFER_MAX)
    }
}

/// Commit free-text buffer input the way the slider's text box does on blur.
pub fn parse_buffer_input(input: &str) -> f64 {
    input.trim().parse::<f64>().map(clamp_buffer_km).unwrap_or(BUFFER_MIN)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParameters {
    pub project_type: ProjectType,
    pub buffer_km: f64,
    pub constraints: Constraints,
}

impl Default for AnalysisParameters {
    fn default() -> Self {
        Self {
            project_type: ProjectType::default(),
            buffer_km: BUFFER_DEFAULT,
            constraints: Constraints::default(),
        }
    }
}

impl AnalysisParameters {
    /// Returns `true` if the value changed.
    pub fn set_project_type(&mut self, project_type: ProjectType) -> bool {
        if self.project_type == project_type {
            return false;
        }
        self.project_type = project_type;
        true
    }

    /// Returns `true` if the value changed after clamping.
    pub fn set_buffer_km(&mut self, km: f64) -> bool {
        let km = clamp_buffer_km(km);
        if self.buffer_km == km {
            return false;
        }
        self.buffer_km = km;
        true
    }

    /// Returns `true` if the value changed.
    pub fn set_constraints(&mut self, constraints: Constraints) -> bool {
        let constraints = constraints.normalized();
        if self.constraints == constraints {
            return false;
        }
        self.constraints = constraints;
        true
    }

    pub fn toggle_constraint(&mut self, constraint: Constraint) {
        self.constraints.toggle(constraint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = AnalysisParameters::default();
        assert_eq!(params.project_type, ProjectType::Reforestation);
        assert_eq!(params.buffer_km, 20.0);
        assert!(params.constraints.exclude_cpcad);
        assert!(params.constraints.warn_indigenous);
        assert!(!params.constraints.water_buffer);
    }

    #[test]
    fn test_buffer_clamped_silently() {
        let mut params = AnalysisParameters::default();
        assert!(params.set_buffer_km(75.0));
        assert_eq!(params.buffer_km, BUFFER_MAX);
        assert!(params.set_buffer_km(-3.0));
        assert_eq!(params.buffer_km, BUFFER_MIN);
        assert!(!params.set_buffer_km(f64::NAN));
    }

    #[test]
    fn test_same_value_is_not_a_change() {
        let mut params = AnalysisParameters::default();
        assert!(!params.set_project_type(ProjectType::Reforestation));
        assert!(params.set_project_type(ProjectType::Wetland));
        assert!(!params.set_buffer_km(20.0));
    }

    #[test]
    fn test_cpcad_exclusion_cannot_be_disabled() {
        let mut params = AnalysisParameters::default();
        let changed = params.set_constraints(Constraints {
            exclude_cpcad: false,
            ..Constraints::default()
        });
        assert!(!changed);
        assert!(params.constraints.exclude_cpcad);
    }

    #[test]
    fn test_buffer_text_input() {
        assert_eq!(parse_buffer_input("12.5"), 12.5);
        assert_eq!(parse_buffer_input("abc"), BUFFER_MIN);
        assert_eq!(parse_buffer_input("900"), BUFFER_MAX);
    }

    #[test]
    fn test_project_type_wire_format() {
        let json = serde_json::to_string(&ProjectType::Grassland).unwrap();
        assert_eq!(json, "\"grassland\"");
        assert_eq!("Wetland".parse::<ProjectType>().unwrap(), ProjectType::Wetland);
    }
}
