//! Suitability Analysis Coordinator
//!
//! Issues analysis requests and applies only the most recently issued one.
//! Every call takes a generation number before it suspends; when a response
//! comes back carrying an older generation it is dropped, so overlapping
//! requests settle on the latest parameters regardless of completion order.
//!
//! The site selection lives next to the polygon list it refers to and is
//! pruned in the same critical section that replaces the list.

use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::api::{BackendApi, SuitabilityAnalysisRequest, SuitabilityPolygon};
use crate::error::ApiError;
use crate::notify::{Notification, Notifier};
use crate::params::AnalysisParameters;
use crate::selection::SelectionSet;

/// What a result was computed for.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisKey {
    pub facility_id: String,
    pub params: AnalysisParameters,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Applied { polygons: usize },
    Empty,
    Failed(ApiError),
    /// A newer request was issued while this one was in flight.
    Superseded,
}

#[derive(Default)]
struct State {
    latest: u64,
    loading: bool,
    requested: Option<AnalysisKey>,
    applied: Option<AnalysisKey>,
    polygons: Arc<Vec<SuitabilityPolygon>>,
    selection: SelectionSet,
    total_area_ha: f64,
    avg_suitability: f64,
}

impl State {
    fn replace_polygons(&mut self, polygons: Vec<SuitabilityPolygon>) {
        self.polygons = Arc::new(polygons);
        let dropped = self.selection.prune_to(&self.polygons);
        if dropped > 0 {
            debug!("Dropped {} selected sites missing from the new analysis", dropped);
        }
    }
}

#[derive(Clone)]
pub struct AnalysisCoordinator {
    api: Arc<dyn BackendApi>,
    notifier: Arc<dyn Notifier>,
    state: Arc<Mutex<State>>,
}

impl AnalysisCoordinator {
    pub fn new(api: Arc<dyn BackendApi>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            api,
            notifier,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run an analysis for `facility_id` with `params` and apply it if no newer
    /// request was issued in the meantime.
    pub async fn analyze(&self, facility_id: &str, params: AnalysisParameters) -> AnalysisOutcome {
        let key = AnalysisKey {
            facility_id: facility_id.to_string(),
            params,
        };
        let generation = {
            let mut state = self.lock();
            state.latest += 1;
            state.loading = true;
            state.requested = Some(key.clone());
            state.latest
        };

        info!(
            "Analyzing {} ({}, {} km) as generation {}",
            facility_id, params.project_type, params.buffer_km, generation
        );

        let request = SuitabilityAnalysisRequest {
            facility_id: key.facility_id.clone(),
            buffer_km: params.buffer_km,
            project_type: params.project_type,
            constraints: params.constraints,
        };
        let result = self.api.analyze_suitability(&request).await;

        let outcome = {
            let mut state = self.lock();
            if state.latest != generation {
                debug!(
                    "Discarding analysis generation {} (latest is {})",
                    generation, state.latest
                );
                return AnalysisOutcome::Superseded;
            }

            state.loading = false;
            state.applied = Some(key);
            match result {
                Ok(response) => {
                    let count = response.polygons.len();
                    state.replace_polygons(response.polygons);
                    state.total_area_ha = response.total_area_ha;
                    state.avg_suitability = response.avg_suitability;
                    if count == 0 {
                        AnalysisOutcome::Empty
                    } else {
                        AnalysisOutcome::Applied { polygons: count }
                    }
                }
                Err(e) => {
                    state.replace_polygons(Vec::new());
                    state.total_area_ha = 0.0;
                    state.avg_suitability = 0.0;
                    AnalysisOutcome::Failed(e)
                }
            }
        };

        match &outcome {
            AnalysisOutcome::Applied { polygons } => info!("Analysis found {} candidate sites", polygons),
            AnalysisOutcome::Empty => self.notifier.notify(Notification::info(
                "No suitable sites found",
                "Try adjusting your buffer distance or constraints.",
            )),
            AnalysisOutcome::Failed(e) => {
                warn!("Analysis failed: {}", e);
                self.notifier.notify(
                    Notification::error("Failed to analyze suitability")
                        .with_description("Please try again with different parameters."),
                );
            }
            AnalysisOutcome::Superseded => {}
        }

        outcome
    }

    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    /// The current ranked polygon list. Replaced wholesale, never edited.
    pub fn polygons(&self) -> Arc<Vec<SuitabilityPolygon>> {
        self.lock().polygons.clone()
    }

    /// Parameters the current polygon list was computed for.
    pub fn applied(&self) -> Option<AnalysisKey> {
        self.lock().applied.clone()
    }

    /// Parameters of the most recently issued request.
    pub fn requested(&self) -> Option<AnalysisKey> {
        self.lock().requested.clone()
    }

    /// `(total_area_ha, avg_suitability)` as reported with the current list.
    pub fn summary(&self) -> (f64, f64) {
        let state = self.lock();
        (state.total_area_ha, state.avg_suitability)
    }

    /// Toggle a site in or out of the selection. Ids not in the current list
    /// are ignored; returns whether the site is now selected.
    pub fn toggle(&self, id: &str) -> bool {
        let mut state = self.lock();
        if !state.polygons.iter().any(|p| p.id == id) {
            warn!("Ignoring toggle of unknown site {}", id);
            return false;
        }
        state.selection.toggle(id);
        state.selection.contains(id)
    }

    pub fn clear_selection(&self) {
        self.lock().selection.clear();
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.lock().selection.contains(id)
    }

    /// Selected sites present in the current list.
    pub fn selected_count(&self) -> usize {
        let state = self.lock();
        state.selection.selected(&state.polygons).count()
    }

    /// Mid-estimate annual credits across the selected sites.
    pub fn total_mid_credits(&self) -> f64 {
        let state = self.lock();
        state.selection.total_mid_credits(&state.polygons)
    }

    /// The current list together with the selected ids from it, in list order,
    /// taken under one lock.
    pub fn selection_snapshot(&self) -> (Arc<Vec<SuitabilityPolygon>>, Vec<String>) {
        let state = self.lock();
        (state.polygons.clone(), state.selection.ids_in_order(&state.polygons))
    }

    /// Forget all results and the selection. Responses still in flight will be discarded.
    pub fn reset(&self) {
        let mut state = self.lock();
        let latest = state.latest + 1;
        *state = State {
            latest,
            ..State::default()
        };
    }
}
