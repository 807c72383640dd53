//! Wire types for the offset backend.
//!
//! Field names follow the backend's JSON exactly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ──────────────────────────────────────────────────────────────────────────────
// FACILITIES
// ──────────────────────────────────────────────────────────────────────────────

/// Lightweight facility shape returned by the viewport endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FacilityMapPoint {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub province: String,
    pub co2e_2023: f64,
}

/// Facility as returned by search and top-polluter listings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Facility {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub province: String,
    #[serde(default)]
    pub naics_code: String,
    #[serde(default)]
    pub naics_description: String,
    pub co2e_2023: f64,
    /// Last five reporting years, oldest first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub co2e_trend: Option<Vec<f64>>,
    #[serde(default)]
    pub obps_covered: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmissionsData {
    pub year: i32,
    pub co2e: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yoy_change: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_anomaly: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PollutantData {
    pub nox: Option<f64>,
    pub sox: Option<f64>,
    pub pm25: Option<f64>,
    pub vocs: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ObpsStatus {
    pub covered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporting_method: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RegulatoryContext {
    pub ghgrp_method: String,
    pub last_verification_date: String,
    pub eccc_link: String,
}

/// Full facility record from `/api/facilities/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FacilityDetail {
    #[serde(flatten)]
    pub facility: Facility,
    pub emissions_history: Vec<EmissionsData>,
    #[serde(default)]
    pub pollutants: PollutantData,
    #[serde(default)]
    pub obps_status: ObpsStatus,
    #[serde(default)]
    pub regulatory_context: RegulatoryContext,
}

impl FacilityDetail {
    pub fn id(&self) -> &str {
        &self.facility.id
    }
}

/// Any facility shape a view may hold. Each endpoint decodes straight into
/// one concrete variant, so no view re-inspects fields later.
#[derive(Debug, Clone, PartialEq)]
pub enum FacilityRecord {
    MapPoint(FacilityMapPoint),
    Summary(Facility),
    Detail(Box<FacilityDetail>),
}

impl FacilityRecord {
    pub fn id(&self) -> &str {
        match self {
            FacilityRecord::MapPoint(p) => &p.id,
            FacilityRecord::Summary(f) => &f.id,
            FacilityRecord::Detail(d) => d.id(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FacilityRecord::MapPoint(p) => &p.name,
            FacilityRecord::Summary(f) => &f.name,
            FacilityRecord::Detail(d) => &d.facility.name,
        }
    }

    /// `(longitude, latitude)`
    pub fn position(&self) -> (f64, f64) {
        match self {
            FacilityRecord::MapPoint(p) => (p.longitude, p.latitude),
            FacilityRecord::Summary(f) => (f.longitude, f.latitude),
            FacilityRecord::Detail(d) => (d.facility.longitude, d.facility.latitude),
        }
    }
}

impl From<FacilityMapPoint> for FacilityRecord {
    fn from(point: FacilityMapPoint) -> Self {
        FacilityRecord::MapPoint(point)
    }
}

impl From<Facility> for FacilityRecord {
    fn from(facility: Facility) -> Self {
        FacilityRecord::Summary(facility)
    }
}

impl From<FacilityDetail> for FacilityRecord {
    fn from(detail: FacilityDetail) -> Self {
        FacilityRecord::Detail(Box::new(detail))
    }
}

/// Filters for the paged `/api/facilities` listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FacilitySearchParams {
    pub q: Option<String>,
    pub province: Option<String>,
    pub naics: Option<String>,
    pub min_co2e: Option<f64>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl FacilitySearchParams {
    pub fn to_query(&self) -> String {
        let mut pairs = Vec::new();
        if let Some(q) = &self.q {
            pairs.push(format!("q={}", urlencoding::encode(q)));
        }
        if let Some(province) = &self.province {
            pairs.push(format!("province={}", urlencoding::encode(province)));
        }
        if let Some(naics) = &self.naics {
            pairs.push(format!("naics={}", urlencoding::encode(naics)));
        }
        if let Some(min) = self.min_co2e {
            pairs.push(format!("min_co2e={}", min));
        }
        if let Some(page) = self.page {
            pairs.push(format!("page={}", page));
        }
        if let Some(limit) = self.limit {
            pairs.push(format!("limit={}", limit));
        }
        pairs.join("&")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FacilityPage {
    pub facilities: Vec<Facility>,
    pub total: u64,
    pub page: u32,
}

// ──────────────────────────────────────────────────────────────────────────────
// GEOSPATIAL
// ──────────────────────────────────────────────────────────────────────────────

/// A conserved or protected area overlay. Geometry is Polygon or MultiPolygon
/// and is only passed through to the map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProtectedArea {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NearbyArea {
    pub name: String,
    pub designation_type: String,
    pub distance_km: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CpcadProximity {
    pub facility_id: String,
    pub buffer_km: f64,
    pub near_protected_area: bool,
    pub protected_areas_count: u32,
    pub nearest_areas: Vec<NearbyArea>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Territory {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Slug")]
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndigenousCheck {
    pub facility_id: String,
    pub has_indigenous_overlap: bool,
    pub territories: Vec<Territory>,
    pub treaties: Vec<Territory>,
    pub consultation_required: bool,
    #[serde(default)]
    pub details: Value,
}

// ──────────────────────────────────────────────────────────────────────────────
// SUITABILITY
// ──────────────────────────────────────────────────────────────────────────────

/// GeoJSON polygon boundary. Rings are lists of `[lng, lat]` positions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolygonGeometry {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Vec<Vec<Vec<f64>>>,
}

/// Named feature contribution to a polygon's suitability score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShapFeature {
    pub name: String,
    pub value: f64,
    /// -1 to 1
    pub impact: f64,
}

/// Candidate offset site. `id` is only unique within one analysis response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuitabilityPolygon {
    pub id: String,
    pub area_ha: f64,
    pub suitability_score: f64,
    pub est_credits_low: f64,
    pub est_credits_mid: f64,
    pub est_credits_high: f64,
    pub geometry: PolygonGeometry,
    #[serde(default)]
    pub constraints_warnings: Vec<String>,
    #[serde(default)]
    pub shap_features: Vec<ShapFeature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuitabilityAnalysisRequest {
    pub facility_id: String,
    pub buffer_km: f64,
    pub project_type: crate::params::ProjectType,
    pub constraints: crate::params::Constraints,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SuitabilityAnalysisResponse {
    pub polygons: Vec<SuitabilityPolygon>,
    #[serde(default)]
    pub total_area_ha: f64,
    #[serde(default)]
    pub avg_suitability: f64,
}

// ──────────────────────────────────────────────────────────────────────────────
// BRIEFS
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BriefRequest {
    pub facility_id: String,
    pub project_type: String,
    pub selected_polygon_ids: Vec<String>,
    pub all_polygons: Vec<SuitabilityPolygon>,
    pub buffer_km: f64,
}

/// Generated project brief. Chart series and metadata are rendered by the
/// report view as-is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BriefResponse {
    pub brief_markdown: String,
    #[serde(default)]
    pub charts: Value,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact_data: Option<Value>,
}
