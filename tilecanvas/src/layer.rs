//! Tile lifecycle.
//!
//! [`TileLayer`] owns the live tile elements of one map layer and is the
//! only caller of [`RenderCoordinator::render_tile`]. It:
//!
//! - assigns a fresh [`GenerationKey`] whenever a tile slot is created or
//!   reused, and starts a render for it
//! - emits [`TileEvent::Ready`] once per key, on the first successful paint
//! - re-renders tiles whose labels were invalidated, or every tile on a
//!   click or style refresh, without changing their keys
//! - runs the pick cycle: a click arms the pointer, re-renders everything,
//!   and after the pick window broadcasts the first picked feature
//!
//! Re-renders are not cancelled. A newer render for the same key and zoom
//! simply races the older one; whichever finishes last owns the canvas.
//!
//! # Example
//!
//! ```ignore
//! let (layer, mut events) = TileLayer::builder(viewport)
//!     .source("base", Arc::new(source))
//!     .paint_rules(rules)
//!     .build();
//!
//! let (key, element) = layer.create_tile(TileCoord::new(3, 4, 2));
//! while let Some(TileEvent::Ready { key, coord }) = events.recv().await {
//!     // element is painted
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::config::LayerConfig;
use crate::coord::{GenerationKey, LatLng, TileCoord};
use crate::labels::{LabelIndex, LabelRule, MonospaceMeasure, TextMeasure};
use crate::paint::{PaintRule, Painter, RulePainter};
use crate::pointer::{ClickEvent, FeatureClick};
use crate::render::{RenderCoordinator, RenderOutcome, TileElement};
use crate::source::{PickedFeature, SourceView};
use crate::telemetry::{RenderMetrics, RenderSnapshot};
use crate::viewport::Viewport;

/// Capacity of the feature click broadcast channel.
pub const FEATURE_CLICK_CAPACITY: usize = 16;

/// Notifications for the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileEvent {
    /// First paint for `key` finished.
    Ready { key: GenerationKey, coord: TileCoord },
}

struct TileSlot {
    element: TileElement,
    ready: AtomicBool,
}

struct LayerShared {
    coordinator: RenderCoordinator,
    tiles: DashMap<GenerationKey, Arc<TileSlot>>,
    generation: AtomicU64,
    events: mpsc::UnboundedSender<TileEvent>,
    clicks: broadcast::Sender<FeatureClick>,
    shutdown: CancellationToken,
}

impl LayerShared {
    fn spawn_render(self: &Arc<Self>, key: GenerationKey, slot: Arc<TileSlot>) {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let coord = slot.element.coord();
            let outcome = tokio::select! {
                biased;
                _ = shared.shutdown.cancelled() => return,
                outcome = shared.coordinator.render_tile(coord, &slot.element, &key) => outcome,
            };

            if let RenderOutcome::Painted { .. } = outcome {
                if !slot.ready.swap(true, Ordering::SeqCst) {
                    trace!(tile = %coord, key = %key, "Tile ready");
                    let _ = shared.events.send(TileEvent::Ready { key, coord });
                }
            }
        });
    }

    fn rerender_tile(self: &Arc<Self>, key: &GenerationKey) -> bool {
        let Some(slot) = self.tiles.get(key).map(|entry| Arc::clone(entry.value())) else {
            return false;
        };
        self.spawn_render(key.clone(), slot);
        true
    }

    fn rerender_tiles(self: &Arc<Self>, coords: &HashSet<TileCoord>) -> usize {
        let matching: Vec<(GenerationKey, Arc<TileSlot>)> = self
            .tiles
            .iter()
            .filter(|entry| coords.contains(&entry.value().element.coord()))
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        let count = matching.len();
        for (key, slot) in matching {
            self.spawn_render(key, slot);
        }
        count
    }

    fn rerender_all_tiles(self: &Arc<Self>) -> usize {
        let all: Vec<(GenerationKey, Arc<TileSlot>)> = self
            .tiles
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        let count = all.len();
        for (key, slot) in all {
            self.spawn_render(key, slot);
        }
        count
    }

    fn next_key(&self, coord: &TileCoord) -> GenerationKey {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        GenerationKey::new(coord, generation)
    }
}

/// Re-renders tiles reported by the label index until the layer is gone.
async fn invalidation_listener(
    layer: Weak<LayerShared>,
    mut invalidated: mpsc::UnboundedReceiver<HashSet<TileCoord>>,
    shutdown: CancellationToken,
) {
    loop {
        let tiles = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            tiles = invalidated.recv() => match tiles {
                Some(tiles) => tiles,
                None => break,
            },
        };
        let Some(layer) = layer.upgrade() else {
            break;
        };
        layer.coordinator.metrics().labels_invalidated(tiles.len());
        let count = layer.rerender_tiles(&tiles);
        debug!(invalidated = tiles.len(), rerendered = count, "Re-rendering after label invalidation");
    }
}

/// Builder for [`TileLayer`].
pub struct TileLayerBuilder {
    viewport: Arc<dyn Viewport>,
    config: LayerConfig,
    sources: Vec<(String, Arc<dyn SourceView>)>,
    painter: Arc<dyn Painter>,
    paint_rules: Vec<PaintRule>,
    label_rules: Vec<LabelRule>,
    measure: Arc<dyn TextMeasure>,
    metrics: Arc<RenderMetrics>,
    tasks: Vec<(String, futures::future::BoxFuture<'static, Result<(), String>>)>,
}

impl TileLayerBuilder {
    pub fn config(mut self, config: LayerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn source(mut self, name: impl Into<String>, source: Arc<dyn SourceView>) -> Self {
        self.sources.push((name.into(), source));
        self
    }

    pub fn painter(mut self, painter: Arc<dyn Painter>) -> Self {
        self.painter = painter;
        self
    }

    pub fn paint_rules(mut self, rules: Vec<PaintRule>) -> Self {
        self.paint_rules = rules;
        self
    }

    pub fn label_rules(mut self, rules: Vec<LabelRule>) -> Self {
        self.label_rules = rules;
        self
    }

    pub fn text_measure(mut self, measure: Arc<dyn TextMeasure>) -> Self {
        self.measure = measure;
        self
    }

    pub fn metrics(mut self, metrics: Arc<RenderMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Register deferred work every render waits on before layout.
    /// Failures are tolerated.
    pub fn auxiliary_task<F, E>(mut self, name: impl Into<String>, task: F) -> Self
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: std::fmt::Display,
    {
        use futures::FutureExt;
        let task = async move { task.await.map_err(|e| e.to_string()) }.boxed();
        self.tasks.push((name.into(), task));
        self
    }

    /// Build the layer and start its invalidation listener.
    ///
    /// Must be called within a Tokio runtime.
    pub fn build(self) -> (TileLayer, mpsc::UnboundedReceiver<TileEvent>) {
        let (invalidate_tx, invalidate_rx) = mpsc::unbounded_channel();
        let labels = Arc::new(LabelIndex::new(
            self.measure,
            self.label_rules,
            self.config.tile_size,
            Box::new(move |tiles: HashSet<TileCoord>| {
                let _ = invalidate_tx.send(tiles);
            }),
        ));

        let mut coordinator =
            RenderCoordinator::new(self.viewport, labels, self.painter, self.config)
                .with_paint_rules(self.paint_rules)
                .with_metrics(self.metrics);
        for (name, source) in self.sources {
            coordinator = coordinator.with_source(name, source);
        }
        for (name, task) in self.tasks {
            coordinator.context().tasks().register(name, task);
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (clicks, _) = broadcast::channel(FEATURE_CLICK_CAPACITY);
        let shutdown = CancellationToken::new();

        let shared = Arc::new(LayerShared {
            coordinator,
            tiles: DashMap::new(),
            generation: AtomicU64::new(0),
            events: events_tx,
            clicks,
            shutdown: shutdown.clone(),
        });

        tokio::spawn(invalidation_listener(
            Arc::downgrade(&shared),
            invalidate_rx,
            shutdown,
        ));

        let sources: Vec<&str> = shared.coordinator.source_names().collect();
        info!(sources = ?sources, tile_size = shared.coordinator.config().tile_size, "Tile layer created");

        (TileLayer { shared }, events_rx)
    }
}

/// Live tiles of one map layer.
pub struct TileLayer {
    shared: Arc<LayerShared>,
}

impl std::fmt::Debug for TileLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileLayer")
            .field("tiles", &self.shared.tiles.len())
            .field("coordinator", &self.shared.coordinator)
            .finish()
    }
}

impl TileLayer {
    pub fn builder(viewport: Arc<dyn Viewport>) -> TileLayerBuilder {
        TileLayerBuilder {
            viewport,
            config: LayerConfig::default(),
            sources: Vec::new(),
            painter: Arc::new(RulePainter::new()),
            paint_rules: Vec::new(),
            label_rules: Vec::new(),
            measure: Arc::new(MonospaceMeasure),
            metrics: Arc::new(RenderMetrics::new()),
            tasks: Vec::new(),
        }
    }

    pub fn coordinator(&self) -> &RenderCoordinator {
        &self.shared.coordinator
    }

    /// Create an element for `coord` and start rendering it.
    pub fn create_tile(&self, coord: TileCoord) -> (GenerationKey, TileElement) {
        let key = self.shared.next_key(&coord);
        let element = TileElement::new(coord, key.clone());
        let slot = Arc::new(TileSlot {
            element: element.clone(),
            ready: AtomicBool::new(false),
        });
        self.shared.tiles.insert(key.clone(), Arc::clone(&slot));
        trace!(tile = %coord, key = %key, "Tile created");
        self.shared.spawn_render(key.clone(), slot);
        (key, element)
    }

    /// Stop tracking `key`. Renders in flight for it will not paint.
    pub fn remove_tile(&self, key: &GenerationKey) -> bool {
        match self.shared.tiles.remove(key) {
            Some((_, slot)) => {
                slot.element.detach();
                trace!(key = %key, "Tile removed");
                true
            }
            None => false,
        }
    }

    /// Reuse the element of `old_key` for `coord` under a fresh key.
    pub fn recycle_tile(&self, old_key: &GenerationKey, coord: TileCoord) -> Option<GenerationKey> {
        let (_, old) = self.shared.tiles.remove(old_key)?;
        let key = self.shared.next_key(&coord);
        old.element.assign(coord, key.clone());
        let slot = Arc::new(TileSlot {
            element: old.element.clone(),
            ready: AtomicBool::new(false),
        });
        self.shared.tiles.insert(key.clone(), Arc::clone(&slot));
        trace!(tile = %coord, old_key = %old_key, key = %key, "Tile recycled");
        self.shared.spawn_render(key.clone(), slot);
        Some(key)
    }

    /// Render `key` again without changing its key.
    pub fn rerender_tile(&self, key: &GenerationKey) -> bool {
        self.shared.rerender_tile(key)
    }

    /// Re-render every live tile at any of `coords`. Returns how many started.
    pub fn rerender_tiles(&self, coords: &HashSet<TileCoord>) -> usize {
        self.shared.rerender_tiles(coords)
    }

    pub fn rerender_all_tiles(&self) -> usize {
        self.shared.rerender_all_tiles()
    }

    /// Start a pick cycle at the click position.
    ///
    /// Every tile re-renders with the pointer armed. After the pick window,
    /// the first feature hit during those paints is broadcast to
    /// [`subscribe_feature_clicks`](Self::subscribe_feature_clicks)
    /// receivers. A later click restarts the window.
    pub fn click(&self, event: ClickEvent) {
        let coordinator = &self.shared.coordinator;
        let zoom = coordinator.viewport().zoom();
        let pointer = coordinator.projector().project(&event, zoom);
        let cycle = coordinator.context().arm_pick(event, pointer);
        debug!(
            lat = event.latlng.lat,
            lng = event.latlng.lng,
            tile = %pointer.tile,
            cycle,
            "Pick cycle armed"
        );

        self.shared.rerender_all_tiles();

        let shared = Arc::clone(&self.shared);
        let window = coordinator.config().pick_window;
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = shared.shutdown.cancelled() => {}
                _ = tokio::time::sleep(window) => {
                    match shared.coordinator.context().resolve_pick(cycle) {
                        Some(click) => {
                            debug!(
                                source = %click.feature.source,
                                layer = %click.feature.layer,
                                feature = click.feature.feature_id,
                                "Feature clicked"
                            );
                            let _ = shared.clicks.send(click);
                        }
                        None => trace!(cycle, "Pick cycle ended without a feature"),
                    }
                }
            }
        });
    }

    pub fn subscribe_feature_clicks(&self) -> broadcast::Receiver<FeatureClick> {
        self.shared.clicks.subscribe()
    }

    /// Whether a pick cycle is collecting features.
    pub fn is_picking(&self) -> bool {
        self.shared.coordinator.context().pick_ticket().is_some()
    }

    /// Features near `position` from every source, using the configured
    /// debug brush radius.
    pub fn query_tile_features_debug(&self, position: LatLng) -> BTreeMap<String, Vec<PickedFeature>> {
        let radius = self.shared.coordinator.config().debug_brush_radius;
        self.shared
            .coordinator
            .query_tile_features_debug(position, radius)
    }

    /// Discard all label placements. Tiles keep their pixels until re-rendered.
    pub fn clear_layout(&self) {
        self.shared.coordinator.clear_layout();
    }

    pub fn element(&self, key: &GenerationKey) -> Option<TileElement> {
        self.shared
            .tiles
            .get(key)
            .map(|entry| entry.value().element.clone())
    }

    pub fn tile_count(&self) -> usize {
        self.shared.tiles.len()
    }

    pub fn metrics(&self) -> RenderSnapshot {
        self.shared.coordinator.metrics().snapshot()
    }

    /// Stop the listener, pending renders, and pick timers.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
        info!(tiles = self.shared.tiles.len(), "Tile layer shut down");
    }
}

impl Drop for TileLayer {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}
