//! Viewport Tracking
//!
//! Turns a noisy stream of map pan/zoom events into settled viewports.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Below this zoom the whole world is in view and no facility fetch happens.
pub const MIN_FETCH_ZOOM: f64 = 3.0;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(400);

/// Geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl Bounds {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self { west, south, east, north }
    }

    /// Longitudes wrapped into [-180, 180], latitudes clamped to [-90, 90].
    pub fn normalized(self) -> Self {
        Self {
            west: wrap_longitude(self.west),
            south: clamp_latitude(self.south),
            east: wrap_longitude(self.east),
            north: clamp_latitude(self.north),
        }
    }

    /// `minLng,minLat,maxLng,maxLat`
    pub fn to_query_value(&self) -> String {
        format!("{},{},{},{}", self.west, self.south, self.east, self.north)
    }

    fn bits(&self) -> [u64; 4] {
        [
            self.west.to_bits(),
            self.south.to_bits(),
            self.east.to_bits(),
            self.north.to_bits(),
        ]
    }
}

fn wrap_longitude(lng: f64) -> f64 {
    if !lng.is_finite() {
        return 0.0;
    }
    let mut lng = lng;
    while lng > 180.0 {
        lng -= 360.0;
    }
    while lng < -180.0 {
        lng += 360.0;
    }
    lng
}

fn clamp_latitude(lat: f64) -> f64 {
    if lat.is_nan() {
        return 0.0;
    }
    lat.clamp(-90.0, 90.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub bounds: Bounds,
    pub zoom: f64,
}

impl Viewport {
    pub fn new(bounds: Bounds, zoom: f64) -> Self {
        Self { bounds, zoom }
    }

    /// Exact-match cache key. Any coordinate change yields a different key.
    pub fn key(&self) -> ViewportKey {
        let [w, s, e, n] = self.bounds.bits();
        ViewportKey([w, s, e, n, self.zoom.to_bits()])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewportKey([u64; 5]);

/// Key for bounds-only queries (protected areas).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundsKey([u64; 4]);

impl From<Bounds> for BoundsKey {
    fn from(bounds: Bounds) -> Self {
        BoundsKey(bounds.bits())
    }
}

/// Trailing-edge debouncer for map viewport events.
///
/// Settled values are delivered on the receiver returned by [`ViewportTracker::new`].
/// `None` means "no viewport": the map is zoomed out past [`MIN_FETCH_ZOOM`].
pub struct ViewportTracker {
    window: Duration,
    generation: Arc<AtomicU64>,
    pending: Option<JoinHandle<()>>,
    tx: mpsc::UnboundedSender<Option<Viewport>>,
}

impl ViewportTracker {
    pub fn new(window: Duration) -> (Self, mpsc::UnboundedReceiver<Option<Viewport>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let tracker = Self {
            window,
            generation: Arc::new(AtomicU64::new(0)),
            pending: None,
            tx,
        };
        (tracker, rx)
    }

    /// Feed one raw map event. Must be called from within a tokio runtime.
    pub fn on_viewport_change(&mut self, bounds: Bounds, zoom: f64) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }

        // NaN zoom counts as zoomed out
        if !(zoom >= MIN_FETCH_ZOOM) {
            debug!("Zoom {} below fetch threshold, clearing viewport", zoom);
            let _ = self.tx.send(None);
            return;
        }

        let viewport = Viewport::new(bounds, zoom);
        let latest = self.generation.clone();
        let tx = self.tx.clone();
        let window = self.window;

        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if latest.load(Ordering::SeqCst) == generation {
                debug!("Viewport settled at zoom {:.2}", viewport.zoom);
                let _ = tx.send(Some(viewport));
            }
        }));
    }
}

impl Drop for ViewportTracker {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }
}
