//! Credit Builder Workflow
//!
//! Owns the state of one credit-builder session: the loaded facility, the
//! analysis parameters, the current candidate sites, and the user's picks.
//! Every parameter change re-runs the analysis. Changes may overlap; the
//! coordinator applies only the latest request and prunes the selection on
//! every list it applies.

use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

use crate::analysis::{AnalysisCoordinator, AnalysisOutcome};
use crate::api::{BackendApi, FacilityDetail, SuitabilityPolygon};
use crate::error::WorkflowError;
use crate::handoff::{self, HandoffStore};
use crate::notify::{Notification, Notifier};
use crate::params::{AnalysisParameters, Constraint, Constraints, ProjectType};
use crate::routes::Route;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NoFacility,
    Loading,
    Ready,
    Analyzing,
    Generating,
    NavigatedAway,
    Failed,
}

struct Session {
    facility: Option<FacilityDetail>,
    params: AnalysisParameters,
    phase: Phase,
}

pub struct CreditBuilder {
    api: Arc<dyn BackendApi>,
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn HandoffStore>,
    coordinator: AnalysisCoordinator,
    session: Mutex<Session>,
}

impl CreditBuilder {
    pub fn new(api: Arc<dyn BackendApi>, notifier: Arc<dyn Notifier>, store: Arc<dyn HandoffStore>) -> Self {
        let coordinator = AnalysisCoordinator::new(api.clone(), notifier.clone());
        Self {
            api,
            notifier,
            store,
            coordinator,
            session: Mutex::new(Session {
                facility: None,
                params: AnalysisParameters::default(),
                phase: Phase::NoFacility,
            }),
        }
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Load `facility_id` and run the first analysis with default parameters.
    ///
    /// On error the caller should follow [`WorkflowError::redirect`].
    pub async fn open(&self, facility_id: Option<&str>) -> Result<AnalysisOutcome, WorkflowError> {
        let Some(facility_id) = facility_id.map(str::trim).filter(|id| !id.is_empty()) else {
            self.notifier.notify(
                Notification::error("No facility selected")
                    .with_description("Please select a facility from the map first."),
            );
            self.session().phase = Phase::Failed;
            return Err(WorkflowError::NoFacility);
        };

        {
            let mut session = self.session();
            session.phase = Phase::Loading;
            session.facility = None;
            session.params = AnalysisParameters::default();
        }
        self.coordinator.reset();

        match self.api.get_facility(facility_id).await {
            Ok(facility) => {
                info!("Loaded facility {} ({})", facility.facility.name, facility.id());
                let id = facility.id().to_string();
                let params = {
                    let mut session = self.session();
                    session.facility = Some(facility);
                    session.phase = Phase::Ready;
                    session.params
                };
                Ok(self.coordinator.analyze(&id, params).await)
            }
            Err(e) => {
                warn!("Failed to load facility {}: {}", facility_id, e);
                self.notifier.notify(Notification::error("Failed to load facility"));
                self.session().phase = Phase::Failed;
                Err(WorkflowError::FacilityLoad(e))
            }
        }
    }

    /// `Analyzing` while the latest request is outstanding, even when an
    /// older one has already come back.
    pub fn phase(&self) -> Phase {
        let phase = self.session().phase;
        if phase == Phase::Ready && self.coordinator.is_loading() {
            Phase::Analyzing
        } else {
            phase
        }
    }

    pub fn facility(&self) -> Option<FacilityDetail> {
        self.session().facility.clone()
    }

    pub fn params(&self) -> AnalysisParameters {
        self.session().params
    }

    pub fn coordinator(&self) -> &AnalysisCoordinator {
        &self.coordinator
    }

    pub fn is_analyzing(&self) -> bool {
        self.coordinator.is_loading()
    }

    pub fn polygons(&self) -> Arc<Vec<SuitabilityPolygon>> {
        self.coordinator.polygons()
    }

    pub async fn set_project_type(&self, project_type: ProjectType) -> Option<AnalysisOutcome> {
        if !self.session().params.set_project_type(project_type) {
            return None;
        }
        self.reanalyze().await
    }

    pub async fn set_buffer_km(&self, km: f64) -> Option<AnalysisOutcome> {
        if !self.session().params.set_buffer_km(km) {
            return None;
        }
        self.reanalyze().await
    }

    pub async fn set_constraints(&self, constraints: Constraints) -> Option<AnalysisOutcome> {
        if !self.session().params.set_constraints(constraints) {
            return None;
        }
        self.reanalyze().await
    }

    pub async fn toggle_constraint(&self, constraint: Constraint) -> Option<AnalysisOutcome> {
        self.session().params.toggle_constraint(constraint);
        self.reanalyze().await
    }

    /// Re-run the analysis for the current facility and parameters. `None`
    /// when no facility is loaded.
    pub async fn reanalyze(&self) -> Option<AnalysisOutcome> {
        let (facility_id, params) = {
            let session = self.session();
            (session.facility.as_ref()?.id().to_string(), session.params)
        };
        Some(self.coordinator.analyze(&facility_id, params).await)
    }

    /// Toggle a site in or out of the selection. Ids not in the current list
    /// are ignored; returns whether the site is now selected.
    pub fn toggle_polygon(&self, id: &str) -> bool {
        self.coordinator.toggle(id)
    }

    pub fn clear_selection(&self) {
        self.coordinator.clear_selection();
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.coordinator.is_selected(id)
    }

    pub fn selected_count(&self) -> usize {
        self.coordinator.selected_count()
    }

    /// Mid-estimate annual credits across the selected sites.
    pub fn total_estimated_credits(&self) -> f64 {
        self.coordinator.total_mid_credits()
    }

    /// Persist the handoff and return the report route to navigate to.
    pub async fn generate_brief(&self) -> Result<Route, WorkflowError> {
        let (polygons, sites) = self.coordinator.selection_snapshot();
        if sites.is_empty() {
            self.notifier.notify(
                Notification::error("No sites selected")
                    .with_description("Please select at least one site to generate a brief."),
            );
            return Err(WorkflowError::EmptySelection);
        }

        let (facility_id, params, previous) = {
            let mut session = self.session();
            let Some(facility_id) = session.facility.as_ref().map(|f| f.id().to_string()) else {
                drop(session);
                self.notifier.notify(Notification::error("Facility data not loaded"));
                return Err(WorkflowError::FacilityNotLoaded);
            };
            let previous = session.phase;
            session.phase = Phase::Generating;
            (facility_id, session.params, previous)
        };

        if let Err(e) =
            handoff::write_handoff(self.store.as_ref(), &polygons, params.project_type, params.buffer_km).await
        {
            warn!("Handoff failed: {}", e);
            self.notifier.notify(Notification::error("Failed to generate brief"));
            self.session().phase = previous;
            return Err(e);
        }

        let route = Route::Brief {
            facility: facility_id,
            sites,
        };
        info!("Navigating to {}", route);
        self.session().phase = Phase::NavigatedAway;
        Ok(route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{polygon, MockBackend};
    use crate::handoff::MemoryHandoffStore;
    use crate::notify::{Level, NotificationLog};
    use std::time::Duration;

    fn builder() -> (Arc<MockBackend>, Arc<NotificationLog>, Arc<MemoryHandoffStore>, CreditBuilder) {
        let api = Arc::new(MockBackend::new());
        let log = Arc::new(NotificationLog::new());
        let store = Arc::new(MemoryHandoffStore::new());
        let builder = CreditBuilder::new(api.clone(), log.clone(), store.clone());
        (api, log, store, builder)
    }

    #[tokio::test]
    async fn test_open_without_facility_redirects_to_map() {
        let (api, log, _store, builder) = builder();
        let err = builder.open(None).await.unwrap_err();
        assert_eq!(err.redirect(None), Some(Route::Map));
        assert!(log.contains(Level::Error, "No facility selected"));
        assert_eq!(api.calls("get_facility"), 0);
    }

    #[tokio::test]
    async fn test_open_runs_default_analysis() {
        let (api, _log, _store, builder) = builder();
        let outcome = builder.open(Some("F1")).await.unwrap();
        assert_eq!(outcome, AnalysisOutcome::Applied { polygons: 4 });
        assert_eq!(builder.phase(), Phase::Ready);
        assert_eq!(api.analysis_requests()[0].buffer_km, 20.0);
    }

    #[tokio::test]
    async fn test_load_failure_is_terminal() {
        let (api, log, _store, builder) = builder();
        api.fail_next("get_facility");
        let err = builder.open(Some("F1")).await.unwrap_err();
        assert_eq!(err.redirect(Some("F1")), Some(Route::Map));
        assert_eq!(builder.phase(), Phase::Failed);
        assert!(log.contains(Level::Error, "Failed to load facility"));
    }

    #[tokio::test]
    async fn test_unchanged_parameter_does_not_reanalyze() {
        let (api, _log, _store, builder) = builder();
        builder.open(Some("F1")).await.unwrap();
        assert!(builder.set_buffer_km(20.0).await.is_none());
        assert!(builder.set_project_type(ProjectType::Reforestation).await.is_none());
        assert_eq!(api.calls("analyze_suitability"), 1);

        assert!(builder.set_buffer_km(30.0).await.is_some());
        assert!(builder.toggle_constraint(Constraint::SlopeLimit).await.is_some());
        assert_eq!(api.calls("analyze_suitability"), 3);
    }

    #[tokio::test]
    async fn test_toggle_unknown_site_is_ignored() {
        let (_api, _log, _store, builder) = builder();
        builder.open(Some("F1")).await.unwrap();
        assert!(!builder.toggle_polygon("nope"));
        assert_eq!(builder.selected_count(), 0);
    }

    #[tokio::test]
    async fn test_reanalysis_prunes_selection() {
        let (_api, _log, _store, builder) = builder();
        builder.open(Some("F1")).await.unwrap();
        let first = builder.polygons()[0].id.clone();
        assert!(builder.toggle_polygon(&first));

        // Ids encode the project type, so none survive a type change
        builder.set_project_type(ProjectType::Wetland).await;
        assert_eq!(builder.selected_count(), 0);
        assert_eq!(builder.total_estimated_credits(), 0.0);
    }

    #[tokio::test]
    async fn test_generate_brief_requires_selection() {
        let (_api, log, _store, builder) = builder();
        builder.open(Some("F1")).await.unwrap();
        assert!(matches!(builder.generate_brief().await, Err(WorkflowError::EmptySelection)));
        assert!(log.contains(Level::Error, "No sites selected"));
        assert_eq!(builder.phase(), Phase::Ready);
    }

    #[tokio::test]
    async fn test_list_replaced_elsewhere_blocks_brief() {
        let (api, log, store, builder) = builder();
        api.script_analysis(Duration::ZERO, Ok(vec![polygon("P1", 500.0)]));
        builder.open(Some("F1")).await.unwrap();
        assert!(builder.toggle_polygon("P1"));

        // A list applied through another coordinator handle
        api.script_analysis(Duration::ZERO, Ok(vec![polygon("Q9", 900.0)]));
        builder.coordinator().clone().analyze("F1", builder.params()).await;

        assert_eq!(builder.selected_count(), 0);
        assert!(builder.total_estimated_credits().is_sign_positive());
        assert!(matches!(builder.generate_brief().await, Err(WorkflowError::EmptySelection)));
        assert!(log.contains(Level::Error, "No sites selected"));
        assert_eq!(store.get(handoff::POLYGONS_KEY).await.unwrap(), None);
        assert_ne!(builder.phase(), Phase::NavigatedAway);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_parameter_changes_settle_on_latest() {
        let (api, _log, _store, builder) = builder();
        builder.open(Some("F1")).await.unwrap();

        api.script_analysis(Duration::from_millis(50), Ok(vec![polygon("first", 1.0)]));
        api.script_analysis(Duration::from_millis(300), Ok(vec![polygon("second", 2.0)]));

        let (first, second, midway) = tokio::join!(
            builder.set_buffer_km(30.0),
            builder.set_project_type(ProjectType::Wetland),
            async {
                // The first response is back, the second still outstanding
                tokio::time::sleep(Duration::from_millis(100)).await;
                (builder.phase(), builder.is_analyzing(), builder.polygons().len())
            },
        );

        assert_eq!(first, Some(AnalysisOutcome::Superseded));
        assert_eq!(second, Some(AnalysisOutcome::Applied { polygons: 1 }));
        assert_eq!(midway.0, Phase::Analyzing);
        assert!(midway.1);
        assert_eq!(midway.2, 4);

        assert_eq!(builder.phase(), Phase::Ready);
        assert_eq!(builder.polygons()[0].id, "second");
        let latest = api.analysis_requests().pop().unwrap();
        assert_eq!(latest.buffer_km, 30.0);
        assert_eq!(latest.project_type, ProjectType::Wetland);
        assert_eq!(builder.params().buffer_km, 30.0);
    }
}
