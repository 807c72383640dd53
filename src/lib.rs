//! Offset Workbench
//!
//! Client-side coordinator for the offset-site workflow:
//! - Debounced, cached facility map queries
//! - Suitability analysis with apply-latest-only semantics
//! - Site selection and credit totals
//! - One-shot handoff of the analysis to the brief report

pub mod analysis;
pub mod api;
pub mod brief;
pub mod cache;
pub mod config;
pub mod credits;
pub mod error;
pub mod handoff;
pub mod map;
pub mod notify;
pub mod params;
pub mod routes;
pub mod selection;
pub mod telemetry;
pub mod viewport;
pub mod workflow;

// Re-exports for convenience
pub use api::{BackendApi, HttpBackend};
pub use brief::BriefReport;
pub use config::WorkbenchConfig;
pub use error::{ApiError, WorkflowError};
pub use map::FacilityMap;
pub use routes::Route;
pub use workflow::CreditBuilder;
