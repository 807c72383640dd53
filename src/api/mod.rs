//! Offset Backend Client
//!
//! The backend does all the spatial work. This module only speaks its HTTP
//! contract; everything above it depends on the `BackendApi` trait so tests
//! can script responses.

pub mod mock;
pub mod types;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::viewport::Bounds;
pub use types::*;

#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn get_facility(&self, id: &str) -> Result<FacilityDetail, ApiError>;

    async fn search_facilities(&self, query: &str) -> Result<Vec<Facility>, ApiError>;

    async fn list_facilities(&self, params: &FacilitySearchParams) -> Result<FacilityPage, ApiError>;

    async fn facilities_in_viewport(&self, bounds: Bounds) -> Result<Vec<FacilityMapPoint>, ApiError>;

    async fn top_polluters(&self, limit: u32, year: i32) -> Result<Vec<Facility>, ApiError>;

    async fn emissions_history(&self, facility_id: &str) -> Result<Vec<EmissionsData>, ApiError>;

    async fn pollutants(&self, facility_id: &str) -> Result<PollutantData, ApiError>;

    async fn obps_status(&self, facility_id: &str) -> Result<ObpsStatus, ApiError>;

    async fn cpcad_proximity(&self, facility_id: &str, buffer_km: f64) -> Result<CpcadProximity, ApiError>;

    async fn indigenous_check(&self, facility_id: &str) -> Result<IndigenousCheck, ApiError>;

    async fn protected_areas(&self, bounds: Bounds) -> Result<Vec<ProtectedArea>, ApiError>;

    async fn analyze_suitability(
        &self,
        request: &SuitabilityAnalysisRequest,
    ) -> Result<SuitabilityAnalysisResponse, ApiError>;

    async fn shap_features(&self, polygon_id: &str) -> Result<Vec<ShapFeature>, ApiError>;

    async fn generate_brief(&self, request: &BriefRequest) -> Result<BriefResponse, ApiError>;
}

/// `BackendApi` over HTTP/JSON.
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, ApiError> {
        let mut builder = Client::builder().user_agent(concat!("offset-workbench/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn request<T, B>(&self, method: Method, endpoint: &str, body: Option<&B>) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized + Sync,
    {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("{} {}", method, url);

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!("Backend returned {} for {}", status, endpoint);
            return Err(ApiError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.request::<T, ()>(Method::GET, endpoint, None).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + Sync>(&self, endpoint: &str, body: &B) -> Result<T, ApiError> {
        self.request(Method::POST, endpoint, Some(body)).await
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn get_facility(&self, id: &str) -> Result<FacilityDetail, ApiError> {
        self.get(&format!("/api/facilities/{}", urlencoding::encode(id))).await
    }

    async fn search_facilities(&self, query: &str) -> Result<Vec<Facility>, ApiError> {
        self.get(&format!("/api/facilities/search?q={}", urlencoding::encode(query))).await
    }

    async fn list_facilities(&self, params: &FacilitySearchParams) -> Result<FacilityPage, ApiError> {
        let query = params.to_query();
        if query.is_empty() {
            self.get("/api/facilities").await
        } else {
            self.get(&format!("/api/facilities?{}", query)).await
        }
    }

    async fn facilities_in_viewport(&self, bounds: Bounds) -> Result<Vec<FacilityMapPoint>, ApiError> {
        let bounds = bounds.normalized();
        self.get(&format!("/api/facilities/map?bounds={}", bounds.to_query_value())).await
    }

    async fn top_polluters(&self, limit: u32, year: i32) -> Result<Vec<Facility>, ApiError> {
        self.get(&format!("/api/facilities/top-polluters?limit={}&year={}", limit, year)).await
    }

    async fn emissions_history(&self, facility_id: &str) -> Result<Vec<EmissionsData>, ApiError> {
        self.get(&format!("/api/facilities/{}/emissions-history", urlencoding::encode(facility_id))).await
    }

    async fn pollutants(&self, facility_id: &str) -> Result<PollutantData, ApiError> {
        self.get(&format!("/api/facilities/{}/pollutants", urlencoding::encode(facility_id))).await
    }

    async fn obps_status(&self, facility_id: &str) -> Result<ObpsStatus, ApiError> {
        self.get(&format!("/api/facilities/{}/obps-status", urlencoding::encode(facility_id))).await
    }

    async fn cpcad_proximity(&self, facility_id: &str, buffer_km: f64) -> Result<CpcadProximity, ApiError> {
        self.get(&format!(
            "/api/facilities/{}/cpcad-proximity?buffer_km={}",
            urlencoding::encode(facility_id),
            buffer_km
        ))
        .await
    }

    async fn indigenous_check(&self, facility_id: &str) -> Result<IndigenousCheck, ApiError> {
        self.get(&format!("/api/facilities/{}/indigenous-check", urlencoding::encode(facility_id))).await
    }

    async fn protected_areas(&self, bounds: Bounds) -> Result<Vec<ProtectedArea>, ApiError> {
        let bounds = bounds.normalized();
        self.get(&format!("/api/protected-areas?bounds={}", bounds.to_query_value())).await
    }

    async fn analyze_suitability(
        &self,
        request: &SuitabilityAnalysisRequest,
    ) -> Result<SuitabilityAnalysisResponse, ApiError> {
        self.post("/api/suitability/analyze", request).await
    }

    async fn shap_features(&self, polygon_id: &str) -> Result<Vec<ShapFeature>, ApiError> {
        self.get(&format!("/api/suitability/shap-features/{}", urlencoding::encode(polygon_id))).await
    }

    async fn generate_brief(&self, request: &BriefRequest) -> Result<BriefResponse, ApiError> {
        self.post("/api/projects/generate-brief", request).await
    }
}
