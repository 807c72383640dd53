//! Brief Report
//!
//! Destination of the credit-builder handoff: reads the route and the stored
//! payload, asks the backend for the AI-generated brief, and reports where to
//! send the user when something required is missing.

use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::{BackendApi, BriefRequest, BriefResponse};
use crate::error::WorkflowError;
use crate::handoff::{self, HandoffStore};
use crate::notify::{Notification, Notifier};
use crate::routes::BriefQuery;

/// Project horizon used for cumulative impact figures.
pub const TIMELINE_YEARS: u32 = 20;

pub struct BriefReport {
    api: Arc<dyn BackendApi>,
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn HandoffStore>,
}

/// Headline numbers pulled from the brief metadata.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpactSummary {
    pub co2_removal: f64,
    pub total_area_ha: f64,
    pub timeline_years: u32,
    pub offset_percentage: f64,
}

impl ImpactSummary {
    pub fn from_metadata(metadata: &Value) -> Self {
        let number = |key: &str| metadata.get(key).and_then(Value::as_f64).unwrap_or(0.0);
        Self {
            co2_removal: number("total_credits_20yr"),
            total_area_ha: number("total_area_ha"),
            timeline_years: TIMELINE_YEARS,
            offset_percentage: number("offset_percentage"),
        }
    }
}

impl BriefReport {
    pub fn new(api: Arc<dyn BackendApi>, notifier: Arc<dyn Notifier>, store: Arc<dyn HandoffStore>) -> Self {
        Self { api, notifier, store }
    }

    /// Build the brief for `route` (e.g. `/brief?facility=F1&sites=a,b`).
    ///
    /// On error the caller should follow [`WorkflowError::redirect`].
    pub async fn load(&self, route: &str) -> Result<BriefResponse, WorkflowError> {
        let query = BriefQuery::parse(route).inspect_err(|_| {
            self.notifier.notify(Notification::error("Missing project data"));
        })?;

        let payload = match handoff::take_handoff(self.store.as_ref()).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Brief handoff unavailable: {}", e);
                self.notifier.notify(Notification::error("No site data found"));
                return Err(e);
            }
        };

        let request = BriefRequest {
            facility_id: query.facility,
            project_type: payload.project_type,
            selected_polygon_ids: query.sites,
            all_polygons: payload.polygons,
            buffer_km: payload.buffer_km,
        };

        info!(
            "Generating brief for {} with {} of {} sites",
            request.facility_id,
            request.selected_polygon_ids.len(),
            request.all_polygons.len()
        );

        self.api.generate_brief(&request).await.map_err(|e| {
            warn!("Brief generation failed: {}", e);
            self.notifier.notify(
                Notification::error("Failed to generate brief")
                    .with_description("Please try again or contact support."),
            );
            WorkflowError::Api(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{polygon, MockBackend};
    use crate::handoff::{write_handoff, FileHandoffStore, MemoryHandoffStore};
    use crate::notify::{Level, NotificationLog};
    use crate::params::ProjectType;
    use crate::routes::Route;
    use serde_json::json;

    fn report() -> (Arc<MockBackend>, Arc<NotificationLog>, Arc<MemoryHandoffStore>, BriefReport) {
        let api = Arc::new(MockBackend::new());
        let log = Arc::new(NotificationLog::new());
        let store = Arc::new(MemoryHandoffStore::new());
        let report = BriefReport::new(api.clone(), log.clone(), store.clone());
        (api, log, store, report)
    }

    #[tokio::test]
    async fn test_missing_route_params_redirect_to_map() {
        let (api, log, _store, report) = report();
        let err = report.load("/brief?facility=F1").await.unwrap_err();
        assert_eq!(err.redirect(Some("F1")), Some(Route::Map));
        assert!(log.contains(Level::Error, "Missing project data"));
        assert_eq!(api.calls("generate_brief"), 0);
    }

    #[tokio::test]
    async fn test_missing_payload_redirects_to_builder() {
        let (api, log, _store, report) = report();
        let err = report.load("/brief?facility=F1&sites=a").await.unwrap_err();
        assert_eq!(
            err.redirect(Some("F1")),
            Some(Route::CreditBuilder { facility: Some("F1".into()) })
        );
        assert!(log.contains(Level::Error, "No site data found"));
        assert_eq!(api.calls("generate_brief"), 0);
    }

    #[tokio::test]
    async fn test_unreadable_handoff_file_redirects_to_builder() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("handoff.json");
        std::fs::write(&path, "{ truncated").unwrap();

        let api = Arc::new(MockBackend::new());
        let log = Arc::new(NotificationLog::new());
        let report = BriefReport::new(api.clone(), log.clone(), Arc::new(FileHandoffStore::new(&path)));

        let err = report.load("/brief?facility=F1&sites=a").await.unwrap_err();
        assert!(matches!(err, WorkflowError::MalformedHandoff(_)));
        assert_eq!(
            err.redirect(Some("F1")),
            Some(Route::CreditBuilder { facility: Some("F1".into()) })
        );
        assert!(log.contains(Level::Error, "No site data found"));
        assert_eq!(api.calls("generate_brief"), 0);
    }

    #[tokio::test]
    async fn test_sends_full_list_and_selected_ids() {
        let (api, _log, store, report) = report();
        let polygons = vec![polygon("a", 100.0), polygon("b", 200.0), polygon("c", 300.0)];
        write_handoff(store.as_ref(), &polygons, ProjectType::Grassland, 10.0).await.unwrap();

        let brief = report.load("/brief?facility=F1&sites=a,c").await.unwrap();
        assert!(brief.brief_markdown.contains("Bow Valley Cement Kiln"));

        let sent = &api.brief_requests()[0];
        assert_eq!(sent.all_polygons.len(), 3);
        assert_eq!(sent.selected_polygon_ids, vec!["a", "c"]);
        assert_eq!(sent.project_type, "grassland");
        assert_eq!(sent.buffer_km, 10.0);

        let summary = ImpactSummary::from_metadata(&brief.metadata);
        assert!((summary.co2_removal - 400.0 * 20.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_backend_failure_notifies() {
        let (api, log, store, report) = report();
        write_handoff(store.as_ref(), &[polygon("a", 1.0)], ProjectType::Wetland, 5.0)
            .await
            .unwrap();
        api.fail_next("generate_brief");
        let err = report.load("facility=F1&sites=a").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Api(_)));
        assert_eq!(err.redirect(Some("F1")), None);
        assert!(log.contains(Level::Error, "Failed to generate brief"));
    }

    #[test]
    fn test_summary_defaults_missing_fields() {
        let summary = ImpactSummary::from_metadata(&json!({ "total_area_ha": 12.5 }));
        assert_eq!(summary.total_area_ha, 12.5);
        assert_eq!(summary.co2_removal, 0.0);
        assert_eq!(summary.timeline_years, 20);
    }
}
