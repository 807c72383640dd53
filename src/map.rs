//! Facility Map
//!
//! Backend reads behind the facility map: facilities in the settled viewport,
//! protected-area overlays, the top-polluters card, search, and resolving a
//! clicked facility to its full record.

use std::sync::Arc;
use tracing::{info, warn};

use crate::api::{BackendApi, Facility, FacilityDetail, FacilityMapPoint, FacilityRecord, ProtectedArea};
use crate::cache::QueryCache;
use crate::config::WorkbenchConfig;
use crate::error::ApiError;
use crate::notify::{Notification, Notifier};
use crate::viewport::{BoundsKey, Viewport, ViewportKey};

pub const TOP_POLLUTERS_LIMIT: u32 = 5;
pub const TOP_POLLUTERS_YEAR: i32 = 2023;
/// Search queries shorter than this return nothing without a request.
pub const MIN_SEARCH_LEN: usize = 2;

pub struct FacilityMap {
    api: Arc<dyn BackendApi>,
    notifier: Arc<dyn Notifier>,
    facilities: QueryCache<ViewportKey, Vec<FacilityMapPoint>>,
    protected_areas: QueryCache<BoundsKey, Vec<ProtectedArea>>,
    top_polluters: QueryCache<(u32, i32), Vec<Facility>>,
    viewport: Option<Viewport>,
    show_conserved_areas: bool,
}

impl FacilityMap {
    pub fn new(api: Arc<dyn BackendApi>, notifier: Arc<dyn Notifier>, config: &WorkbenchConfig) -> Self {
        Self {
            api,
            notifier,
            facilities: QueryCache::new("facilities", config.cache_ttl),
            protected_areas: QueryCache::new("protected_areas", config.cache_ttl),
            top_polluters: QueryCache::new("top_polluters", config.top_polluters_ttl),
            viewport: None,
            show_conserved_areas: false,
        }
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    pub fn show_conserved_areas(&self) -> bool {
        self.show_conserved_areas
    }

    pub fn set_show_conserved_areas(&mut self, show: bool) {
        self.show_conserved_areas = show;
    }

    /// Drop every cached map query so the next reads hit the backend.
    pub fn refresh(&self) {
        self.facilities.clear();
        self.protected_areas.clear();
        self.top_polluters.clear();
    }

    /// Apply a settled viewport from the tracker and return the facilities in
    /// it. `None` clears the map without a request.
    pub async fn apply_viewport(&mut self, viewport: Option<Viewport>) -> Result<Vec<FacilityMapPoint>, ApiError> {
        self.viewport = viewport;
        self.facilities_in_view().await
    }

    /// Facilities for the current viewport, served from cache when fresh.
    pub async fn facilities_in_view(&self) -> Result<Vec<FacilityMapPoint>, ApiError> {
        let Some(viewport) = self.viewport else {
            return Ok(Vec::new());
        };

        let api = self.api.clone();
        let result = self
            .facilities
            .get_or_fetch(viewport.key(), move || async move {
                api.facilities_in_viewport(viewport.bounds).await
            })
            .await;

        match result {
            Ok(facilities) => {
                info!("{} facilities in view", facilities.len());
                Ok(facilities)
            }
            Err(e) => {
                warn!("Facility fetch failed: {}", e);
                self.notifier.notify(
                    Notification::error("Failed to load facilities")
                        .with_description("Unable to load facilities in this area."),
                );
                Err(e)
            }
        }
    }

    /// Protected areas in view. Only fetched while the layer is shown.
    pub async fn protected_areas_in_view(&self) -> Result<Vec<ProtectedArea>, ApiError> {
        let Some(viewport) = self.viewport.filter(|_| self.show_conserved_areas) else {
            return Ok(Vec::new());
        };

        let api = self.api.clone();
        let bounds = viewport.bounds;
        self.protected_areas
            .get_or_fetch(BoundsKey::from(bounds), move || async move { api.protected_areas(bounds).await })
            .await
    }

    pub async fn top_polluters(&self) -> Result<Vec<Facility>, ApiError> {
        let api = self.api.clone();
        self.top_polluters
            .get_or_fetch((TOP_POLLUTERS_LIMIT, TOP_POLLUTERS_YEAR), move || async move {
                api.top_polluters(TOP_POLLUTERS_LIMIT, TOP_POLLUTERS_YEAR).await
            })
            .await
    }

    /// Name search. Failures yield an empty result list.
    pub async fn search(&self, query: &str) -> Vec<Facility> {
        let query = query.trim();
        if query.len() < MIN_SEARCH_LEN {
            return Vec::new();
        }
        match self.api.search_facilities(query).await {
            Ok(results) => results,
            Err(e) => {
                warn!("Search for '{}' failed: {}", query, e);
                Vec::new()
            }
        }
    }

    /// Resolve a clicked facility to its full record, fetching only when the
    /// record is not already detailed.
    pub async fn select_facility(&self, record: FacilityRecord) -> Option<FacilityDetail> {
        let id = match record {
            FacilityRecord::Detail(detail) => return Some(*detail),
            other => other.id().to_string(),
        };

        match self.api.get_facility(&id).await {
            Ok(detail) => Some(detail),
            Err(e) => {
                warn!("Failed to load facility {}: {}", id, e);
                self.notifier.notify(Notification::error("Failed to load facility details"));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{Level, NotificationLog};
    use crate::api::mock::MockBackend;
    use crate::viewport::Bounds;

    fn map(api: Arc<MockBackend>, log: Arc<NotificationLog>) -> FacilityMap {
        FacilityMap::new(api, log, &WorkbenchConfig::default())
    }

    fn calgary() -> Viewport {
        Viewport::new(Bounds::new(-114.3, 50.8, -113.8, 51.2), 9.0)
    }

    #[tokio::test]
    async fn test_same_viewport_fetches_once() {
        let api = Arc::new(MockBackend::new());
        let mut map = map(api.clone(), Arc::new(NotificationLog::new()));

        map.apply_viewport(Some(calgary())).await.unwrap();
        map.apply_viewport(Some(calgary())).await.unwrap();
        assert_eq!(api.calls("facilities_in_viewport"), 1);

        let mut moved = calgary();
        moved.bounds.west -= 0.1;
        map.apply_viewport(Some(moved)).await.unwrap();
        assert_eq!(api.calls("facilities_in_viewport"), 2);
    }

    #[tokio::test]
    async fn test_refresh_refetches() {
        let api = Arc::new(MockBackend::new());
        let mut map = map(api.clone(), Arc::new(NotificationLog::new()));
        map.apply_viewport(Some(calgary())).await.unwrap();
        map.top_polluters().await.unwrap();

        map.refresh();
        map.facilities_in_view().await.unwrap();
        map.top_polluters().await.unwrap();
        assert_eq!(api.calls("facilities_in_viewport"), 2);
        assert_eq!(api.calls("top_polluters"), 2);
    }

    #[tokio::test]
    async fn test_cleared_viewport_does_not_fetch() {
        let api = Arc::new(MockBackend::new());
        let mut map = map(api.clone(), Arc::new(NotificationLog::new()));
        assert!(map.apply_viewport(None).await.unwrap().is_empty());
        assert_eq!(api.calls("facilities_in_viewport"), 0);
    }

    #[tokio::test]
    async fn test_failure_notifies_and_retries() {
        let api = Arc::new(MockBackend::new());
        let log = Arc::new(NotificationLog::new());
        let mut map = map(api.clone(), log.clone());

        api.fail_next("facilities_in_viewport");
        assert!(map.apply_viewport(Some(calgary())).await.is_err());
        assert!(log.contains(Level::Error, "Failed to load facilities"));

        map.apply_viewport(Some(calgary())).await.unwrap();
        assert_eq!(api.calls("facilities_in_viewport"), 2);
    }

    #[tokio::test]
    async fn test_protected_areas_gated_by_layer() {
        let api = Arc::new(MockBackend::new());
        let mut map = map(api.clone(), Arc::new(NotificationLog::new()));
        map.apply_viewport(Some(calgary())).await.unwrap();

        map.protected_areas_in_view().await.unwrap();
        assert_eq!(api.calls("protected_areas"), 0);

        map.set_show_conserved_areas(true);
        map.protected_areas_in_view().await.unwrap();
        map.protected_areas_in_view().await.unwrap();
        assert_eq!(api.calls("protected_areas"), 1);
    }

    #[tokio::test]
    async fn test_select_detail_skips_fetch() {
        let api = Arc::new(MockBackend::new());
        let mut map = map(api.clone(), Arc::new(NotificationLog::new()));

        let detail = api.facility_detail("F1").unwrap();
        let resolved = map.select_facility(detail.clone().into()).await.unwrap();
        assert_eq!(resolved, detail);
        assert_eq!(api.calls("get_facility"), 0);

        let point = map.apply_viewport(Some(calgary())).await.unwrap().remove(0);
        let resolved = map.select_facility(point.into()).await.unwrap();
        assert_eq!(resolved.id(), "F1");
        assert_eq!(api.calls("get_facility"), 1);
    }

    #[tokio::test]
    async fn test_short_search_is_skipped() {
        let api = Arc::new(MockBackend::new());
        let map = map(api.clone(), Arc::new(NotificationLog::new()));
        assert!(map.search("a").await.is_empty());
        assert_eq!(api.calls("search_facilities"), 0);
        map.search("kiln").await;
        assert_eq!(api.calls("search_facilities"), 1);
    }
}
