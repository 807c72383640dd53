//! Scripted Backend
//!
//! In-process `BackendApi` with a handful of fixture facilities. It generates
//! plausible suitability results from the request parameters, counts calls per
//! endpoint, and can be scripted to fail or delay. Backs the CLI's offline mode
//! and the test suites.

use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::types::*;
use super::BackendApi;
use crate::credits::{self, CreditFactors};
use crate::error::ApiError;
use crate::viewport::Bounds;

/// One queued analysis outcome, served in call order.
pub struct ScriptedAnalysis {
    pub delay: Duration,
    pub result: Result<Vec<SuitabilityPolygon>, ApiError>,
}

pub struct MockBackend {
    facilities: Vec<FacilityDetail>,
    calls: Mutex<HashMap<&'static str, usize>>,
    failures: Mutex<HashSet<&'static str>>,
    scripted: Mutex<VecDeque<ScriptedAnalysis>>,
    analysis_requests: Mutex<Vec<SuitabilityAnalysisRequest>>,
    brief_requests: Mutex<Vec<BriefRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            facilities: fixture_facilities(),
            calls: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashSet::new()),
            scripted: Mutex::new(VecDeque::new()),
            analysis_requests: Mutex::new(Vec::new()),
            brief_requests: Mutex::new(Vec::new()),
        }
    }

    /// Number of calls made to `endpoint` (the `BackendApi` method name).
    pub fn calls(&self, endpoint: &str) -> usize {
        lock(&self.calls).get(endpoint).copied().unwrap_or(0)
    }

    /// Make the next call to `endpoint` fail with a transport error.
    pub fn fail_next(&self, endpoint: &'static str) {
        lock(&self.failures).insert(endpoint);
    }

    pub fn script_analysis(&self, delay: Duration, result: Result<Vec<SuitabilityPolygon>, ApiError>) {
        lock(&self.scripted).push_back(ScriptedAnalysis { delay, result });
    }

    pub fn analysis_requests(&self) -> Vec<SuitabilityAnalysisRequest> {
        lock(&self.analysis_requests).clone()
    }

    pub fn brief_requests(&self) -> Vec<BriefRequest> {
        lock(&self.brief_requests).clone()
    }

    pub fn facility_detail(&self, id: &str) -> Option<FacilityDetail> {
        self.facilities.iter().find(|f| f.id() == id).cloned()
    }

    fn record(&self, endpoint: &'static str) -> Result<(), ApiError> {
        *lock(&self.calls).entry(endpoint).or_insert(0) += 1;
        if lock(&self.failures).remove(endpoint) {
            return Err(ApiError::Transport(format!("{}: connection refused", endpoint)));
        }
        Ok(())
    }

    fn find(&self, id: &str) -> Result<&FacilityDetail, ApiError> {
        self.facilities.iter().find(|f| f.id() == id).ok_or(ApiError::Status {
            status: 404,
            reason: "Not Found".to_string(),
        })
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackendApi for MockBackend {
    async fn get_facility(&self, id: &str) -> Result<FacilityDetail, ApiError> {
        self.record("get_facility")?;
        self.find(id).cloned()
    }

    async fn search_facilities(&self, query: &str) -> Result<Vec<Facility>, ApiError> {
        self.record("search_facilities")?;
        let query = query.to_lowercase();
        Ok(self
            .facilities
            .iter()
            .filter(|f| f.facility.name.to_lowercase().contains(&query))
            .map(|f| f.facility.clone())
            .collect())
    }

    async fn list_facilities(&self, params: &FacilitySearchParams) -> Result<FacilityPage, ApiError> {
        self.record("list_facilities")?;
        let matches: Vec<Facility> = self
            .facilities
            .iter()
            .map(|f| &f.facility)
            .filter(|f| params.province.as_ref().map_or(true, |p| &f.province == p))
            .filter(|f| params.min_co2e.map_or(true, |min| f.co2e_2023 >= min))
            .filter(|f| {
                params
                    .q
                    .as_ref()
                    .map_or(true, |q| f.name.to_lowercase().contains(&q.to_lowercase()))
            })
            .cloned()
            .collect();
        Ok(FacilityPage {
            total: matches.len() as u64,
            page: params.page.unwrap_or(1),
            facilities: matches,
        })
    }

    async fn facilities_in_viewport(&self, bounds: Bounds) -> Result<Vec<FacilityMapPoint>, ApiError> {
        self.record("facilities_in_viewport")?;
        let b = bounds.normalized();
        Ok(self
            .facilities
            .iter()
            .map(|d| &d.facility)
            .filter(|f| f.longitude >= b.west && f.longitude <= b.east && f.latitude >= b.south && f.latitude <= b.north)
            .map(|f| FacilityMapPoint {
                id: f.id.clone(),
                name: f.name.clone(),
                latitude: f.latitude,
                longitude: f.longitude,
                province: f.province.clone(),
                co2e_2023: f.co2e_2023,
            })
            .collect())
    }

    async fn top_polluters(&self, limit: u32, _year: i32) -> Result<Vec<Facility>, ApiError> {
        self.record("top_polluters")?;
        let mut all: Vec<Facility> = self.facilities.iter().map(|d| d.facility.clone()).collect();
        all.sort_by(|a, b| b.co2e_2023.total_cmp(&a.co2e_2023));
        all.truncate(limit as usize);
        Ok(all)
    }

    async fn emissions_history(&self, facility_id: &str) -> Result<Vec<EmissionsData>, ApiError> {
        self.record("emissions_history")?;
        Ok(self.find(facility_id)?.emissions_history.clone())
    }

    async fn pollutants(&self, facility_id: &str) -> Result<PollutantData, ApiError> {
        self.record("pollutants")?;
        Ok(self.find(facility_id)?.pollutants.clone())
    }

    async fn obps_status(&self, facility_id: &str) -> Result<ObpsStatus, ApiError> {
        self.record("obps_status")?;
        Ok(self.find(facility_id)?.obps_status.clone())
    }

    async fn cpcad_proximity(&self, facility_id: &str, buffer_km: f64) -> Result<CpcadProximity, ApiError> {
        self.record("cpcad_proximity")?;
        self.find(facility_id)?;
        let nearest = NearbyArea {
            name: "Glenbow Ranch Provincial Park".to_string(),
            designation_type: "Provincial Park".to_string(),
            distance_km: 12.4,
        };
        let near = nearest.distance_km <= buffer_km;
        Ok(CpcadProximity {
            facility_id: facility_id.to_string(),
            buffer_km,
            near_protected_area: near,
            protected_areas_count: u32::from(near),
            nearest_areas: vec![nearest],
        })
    }

    async fn indigenous_check(&self, facility_id: &str) -> Result<IndigenousCheck, ApiError> {
        self.record("indigenous_check")?;
        self.find(facility_id)?;
        Ok(IndigenousCheck {
            facility_id: facility_id.to_string(),
            has_indigenous_overlap: true,
            territories: vec![Territory {
                name: "Niitsitapi (Blackfoot)".to_string(),
                slug: "niitsitapi-blackfoot".to_string(),
                description: None,
            }],
            treaties: vec![Territory {
                name: "Treaty 7".to_string(),
                slug: "treaty-7".to_string(),
                description: None,
            }],
            consultation_required: true,
            details: json!({}),
        })
    }

    async fn protected_areas(&self, bounds: Bounds) -> Result<Vec<ProtectedArea>, ApiError> {
        self.record("protected_areas")?;
        let b = bounds.normalized();
        Ok(vec![ProtectedArea {
            id: "CPCAD-1001".to_string(),
            name: "Fish Creek Provincial Park".to_string(),
            kind: "Provincial Park".to_string(),
            geometry: square((b.west + b.east) / 2.0, (b.south + b.north) / 2.0, 0.02),
        }])
    }

    async fn analyze_suitability(
        &self,
        request: &SuitabilityAnalysisRequest,
    ) -> Result<SuitabilityAnalysisResponse, ApiError> {
        self.record("analyze_suitability")?;
        lock(&self.analysis_requests).push(request.clone());

        let scripted = lock(&self.scripted).pop_front();
        let polygons = match scripted {
            Some(ScriptedAnalysis { delay, result }) => {
                tokio::time::sleep(delay).await;
                result?
            }
            None => generate_polygons(self.find(&request.facility_id)?, request),
        };

        let total_area_ha = polygons.iter().map(|p| p.area_ha).sum();
        let avg_suitability = if polygons.is_empty() {
            0.0
        } else {
            polygons.iter().map(|p| p.suitability_score).sum::<f64>() / polygons.len() as f64
        };
        Ok(SuitabilityAnalysisResponse {
            polygons,
            total_area_ha,
            avg_suitability,
        })
    }

    async fn shap_features(&self, _polygon_id: &str) -> Result<Vec<ShapFeature>, ApiError> {
        self.record("shap_features")?;
        Ok(sample_shap_features(0))
    }

    async fn generate_brief(&self, request: &BriefRequest) -> Result<BriefResponse, ApiError> {
        self.record("generate_brief")?;
        lock(&self.brief_requests).push(request.clone());
        let facility = self.find(&request.facility_id)?;

        let selected: Vec<&SuitabilityPolygon> = request
            .all_polygons
            .iter()
            .filter(|p| request.selected_polygon_ids.contains(&p.id))
            .collect();
        let annual: f64 = selected.iter().map(|p| p.est_credits_mid).sum();
        let area: f64 = selected.iter().map(|p| p.area_ha).sum();
        let offset_percentage = if facility.facility.co2e_2023 > 0.0 {
            annual / facility.facility.co2e_2023 * 100.0
        } else {
            0.0
        };

        Ok(BriefResponse {
            brief_markdown: format!(
                "# {} offset brief\n\n{} {} site(s) within {} km, {:.1} ha, about {:.0} tCO₂e per year.\n",
                facility.facility.name,
                selected.len(),
                request.project_type,
                request.buffer_km,
                area,
                annual
            ),
            charts: json!({
                "emissions": facility.emissions_history.iter().map(|e| json!({ "year": e.year, "co2e": e.co2e })).collect::<Vec<_>>(),
            }),
            metadata: json!({
                "total_credits_20yr": annual * 20.0,
                "total_area_ha": area,
                "offset_percentage": offset_percentage,
            }),
            impact_data: None,
        })
    }
}

/// Minimal polygon with the given mid credit estimate.
pub fn polygon(id: &str, est_credits_mid: f64) -> SuitabilityPolygon {
    SuitabilityPolygon {
        id: id.to_string(),
        area_ha: est_credits_mid / 50.0,
        suitability_score: 0.8,
        est_credits_low: est_credits_mid * 0.8,
        est_credits_mid,
        est_credits_high: est_credits_mid * 1.2,
        geometry: polygon_geometry(-114.0, 51.0, 0.01),
        constraints_warnings: Vec::new(),
        shap_features: Vec::new(),
        thumbnail_url: None,
    }
}

fn generate_polygons(facility: &FacilityDetail, request: &SuitabilityAnalysisRequest) -> Vec<SuitabilityPolygon> {
    let count = ((request.buffer_km / 5.0).floor() as usize).min(8);
    let factors = CreditFactors::defaults_for(request.project_type);

    (0..count)
        .map(|i| {
            let area_ha = 25.0 * (i + 1) as f64 + request.buffer_km * 2.0;
            let score = 0.95 - 0.07 * i as f64;
            let mid = credits::calculate(area_ha, factors).total_credits * score;

            let mut warnings = Vec::new();
            if request.constraints.warn_indigenous && i % 3 == 0 {
                warnings.push("Overlaps traditional territory; consultation recommended".to_string());
            }
            if !request.constraints.water_buffer && i % 4 == 1 {
                warnings.push("Within 30 m of a watercourse".to_string());
            }

            let angle = i as f64 * 0.8;
            let reach = request.buffer_km / 111.0 * 0.6;
            SuitabilityPolygon {
                id: format!("{}-{}-{}", request.project_type, request.buffer_km as u32, i + 1),
                area_ha,
                suitability_score: score,
                est_credits_low: mid * 0.8,
                est_credits_mid: mid,
                est_credits_high: mid * 1.2,
                geometry: polygon_geometry(
                    facility.facility.longitude + reach * angle.cos(),
                    facility.facility.latitude + reach * angle.sin(),
                    0.01,
                ),
                constraints_warnings: warnings,
                shap_features: sample_shap_features(i),
                thumbnail_url: None,
            }
        })
        .collect()
}

fn sample_shap_features(rank: usize) -> Vec<ShapFeature> {
    let decay = 1.0 - rank as f64 * 0.05;
    vec![
        ShapFeature { name: "soil_organic_carbon".to_string(), value: 4.2, impact: 0.45 * decay },
        ShapFeature { name: "slope_deg".to_string(), value: 3.1, impact: 0.2 * decay },
        ShapFeature { name: "distance_to_road_km".to_string(), value: 1.4, impact: -0.15 * decay },
    ]
}

fn polygon_geometry(lng: f64, lat: f64, half: f64) -> PolygonGeometry {
    PolygonGeometry {
        kind: "Polygon".to_string(),
        coordinates: vec![vec![
            vec![lng - half, lat - half],
            vec![lng + half, lat - half],
            vec![lng + half, lat + half],
            vec![lng - half, lat + half],
            vec![lng - half, lat - half],
        ]],
    }
}

fn square(lng: f64, lat: f64, half: f64) -> serde_json::Value {
    serde_json::to_value(polygon_geometry(lng, lat, half)).unwrap_or_default()
}

fn fixture_facilities() -> Vec<FacilityDetail> {
    let facility = |id: &str, name: &str, lng: f64, lat: f64, province: &str, naics: &str, co2e: f64| {
        let history: Vec<EmissionsData> = (2019..=2023)
            .map(|year| EmissionsData {
                year,
                co2e: co2e * (1.0 + (2023 - year) as f64 * 0.03),
                yoy_change: Some(-2.9),
                is_anomaly: Some(false),
            })
            .collect();
        FacilityDetail {
            facility: Facility {
                id: id.to_string(),
                name: name.to_string(),
                latitude: lat,
                longitude: lng,
                province: province.to_string(),
                naics_code: naics.to_string(),
                naics_description: String::new(),
                co2e_2023: co2e,
                co2e_trend: Some(history.iter().map(|e| e.co2e).collect()),
                obps_covered: co2e >= 50_000.0,
            },
            emissions_history: history,
            pollutants: PollutantData {
                nox: Some(co2e / 900.0),
                sox: Some(co2e / 1400.0),
                pm25: Some(co2e / 20_000.0),
                vocs: None,
            },
            obps_status: ObpsStatus {
                covered: co2e >= 50_000.0,
                compliance_info: None,
                reporting_method: Some("Facility-specific".to_string()),
            },
            regulatory_context: RegulatoryContext {
                ghgrp_method: "Direct measurement".to_string(),
                last_verification_date: "2024-06-30".to_string(),
                eccc_link: format!("https://climate-change.canada.ca/facility-emissions/{}", id),
            },
        }
    };

    vec![
        facility("F1", "Bow Valley Cement Kiln", -114.0, 51.0, "AB", "327", 1_150_000.0),
        facility("F2", "Sarnia Refinery", -82.4, 42.97, "ON", "324", 2_400_000.0),
        facility("F3", "Trail Smelter", -117.7, 49.1, "BC", "331", 420_000.0),
    ]
}
