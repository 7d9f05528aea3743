//! Per-tile render pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, trace, warn};

use crate::config::LayerConfig;
use crate::coord::{GenerationKey, LatLng, TileCoord, MAX_ZOOM};
use crate::labels::LabelIndex;
use crate::paint::{draw_debug_overlay, DebugInfo, PaintRequest, PaintRule, Painter, TileCanvas};
use crate::pointer::PointerProjector;
use crate::priority;
use crate::source::{PickedFeature, PreparedTileMap, SourceView};
use crate::telemetry::RenderMetrics;
use crate::viewport::Viewport;

use super::{RenderContext, RenderOutcome, RenderStage, TaskSettled, TileElement};

/// Buffer around each tile, in 256-units, passed to the painter so
/// symbols straddling the edge are drawn on both sides.
pub const PAINT_BUFFER: f64 = 16.0;

/// Renders tiles for one layer.
///
/// Host-agnostic: the host supplies a [`Viewport`], and tile elements are
/// plain [`TileElement`]s. All renders share one [`RenderContext`].
pub struct RenderCoordinator {
    sources: Vec<(String, Arc<dyn SourceView>)>,
    labels: Arc<LabelIndex>,
    painter: Arc<dyn Painter>,
    viewport: Arc<dyn Viewport>,
    paint_rules: Vec<PaintRule>,
    config: LayerConfig,
    projector: PointerProjector,
    context: Arc<RenderContext>,
    metrics: Arc<RenderMetrics>,
}

impl fmt::Debug for RenderCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sources: Vec<&str> = self.sources.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("RenderCoordinator")
            .field("sources", &sources)
            .field("paint_rules", &self.paint_rules.len())
            .field("config", &self.config)
            .field("context", &self.context)
            .finish()
    }
}

impl RenderCoordinator {
    /// Create a coordinator with no sources.
    ///
    /// # Arguments
    ///
    /// * `viewport` - Host view used for attachment and priority
    /// * `labels` - Label index shared by every render
    /// * `painter` - Paint engine
    /// * `config` - Layer configuration
    pub fn new(
        viewport: Arc<dyn Viewport>,
        labels: Arc<LabelIndex>,
        painter: Arc<dyn Painter>,
        config: LayerConfig,
    ) -> Self {
        let projector = PointerProjector::new(config.tile_size, config.device_pixel_ratio);
        Self {
            sources: Vec::new(),
            labels,
            painter,
            viewport,
            paint_rules: Vec::new(),
            config,
            projector,
            context: Arc::new(RenderContext::new()),
            metrics: Arc::new(RenderMetrics::new()),
        }
    }

    /// Add a named source. Sources are fetched concurrently in every render.
    pub fn with_source(mut self, name: impl Into<String>, source: Arc<dyn SourceView>) -> Self {
        self.sources.push((name.into(), source));
        self
    }

    pub fn with_paint_rules(mut self, rules: Vec<PaintRule>) -> Self {
        self.paint_rules = rules;
        self
    }

    /// Share an existing metrics sink.
    pub fn with_metrics(mut self, metrics: Arc<RenderMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn context(&self) -> &Arc<RenderContext> {
        &self.context
    }

    pub fn metrics(&self) -> &Arc<RenderMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &LayerConfig {
        &self.config
    }

    pub fn viewport(&self) -> &Arc<dyn Viewport> {
        &self.viewport
    }

    pub fn projector(&self) -> &PointerProjector {
        &self.projector
    }

    pub fn labels(&self) -> &Arc<LabelIndex> {
        &self.labels
    }

    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|(name, _)| name.as_str())
    }

    /// Render `coord` into `element` on behalf of `key`.
    ///
    /// Never fails: anything that prevents painting is reported through the
    /// returned [`RenderOutcome`].
    pub async fn render_tile(
        &self,
        coord: TileCoord,
        element: &TileElement,
        key: &GenerationKey,
    ) -> RenderOutcome {
        if coord.zoom > MAX_ZOOM {
            warn!(tile = %coord, max = MAX_ZOOM, "Zoom out of range, not rendering");
            return RenderOutcome::InvalidZoom(coord.zoom);
        }
        self.metrics.render_started();
        self.context.record_requested_zoom(coord.zoom);

        let tile_map = self.fetch_sources(coord).await;
        if let Some(stale) = self.gate(&coord, element, key, RenderStage::Fetch) {
            return stale;
        }

        for (name, settled) in self.context.tasks().settle_all().await {
            if let TaskSettled::Failed(e) = settled {
                debug!(task = %name, error = %e, "Auxiliary task failed");
                self.metrics.auxiliary_failed();
            }
        }
        if let Some(stale) = self.gate(&coord, element, key, RenderStage::Tasks) {
            return stale;
        }

        let layout_time = self.labels.add(coord.zoom, &tile_map);
        let placements = self.labels.get_index(coord.zoom);
        if let Some(stale) = self.gate(&coord, element, key, RenderStage::Layout) {
            return stale;
        }

        if !self.viewport.is_attached() {
            trace!(tile = %coord, "Layer detached, skipping paint");
            self.metrics.render_detached();
            return RenderOutcome::Detached;
        }

        let center = self.viewport.tile_range_center(coord.zoom);
        let delay = priority::render_delay(&coord, &center, self.config.tile_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(stale) = self.gate(&coord, element, key, RenderStage::Delay) {
            return stale;
        }

        let ticket = self.context.pick_ticket();
        let pointer = ticket.and_then(|t| t.pointer.local_in(&coord, self.projector.tile_pixels()));

        let size = self.config.canvas_size();
        let mut canvas = match TileCanvas::new(size, size) {
            Ok(canvas) => canvas,
            Err(e) => {
                error!(tile = %coord, error = %e, "Cannot render tile");
                self.metrics.surface_failed();
                return RenderOutcome::SurfaceFailed;
            }
        };
        if let Some(background) = self.config.background_color {
            canvas.fill(background);
        }

        let request = PaintRequest {
            zoom: coord.zoom,
            tile_map: &tile_map,
            labels: (!self.config.xray).then_some(placements.as_slice()),
            rules: &self.paint_rules,
            bbox: coord.bbox(PAINT_BUFFER),
            origin: coord.origin(),
            scale: self.config.device_scale(),
            xray: self.config.xray,
            debug_color: self.config.debug_color,
            pointer,
        };
        let mut picked = Vec::new();
        let paint_time = self.painter.paint(&mut canvas, &request, &mut picked);

        if let Some(color) = self.config.debug_color {
            draw_debug_overlay(
                &mut canvas,
                &DebugInfo {
                    coord,
                    bbox: request.bbox,
                    origin: request.origin,
                    scale: request.scale,
                    tile_map: &tile_map,
                    pointer,
                    layout_time,
                    paint_time,
                    color,
                },
            );
        }

        let zoom_current = || self.context.last_requested_zoom() == Some(coord.zoom);
        if !element.install(key, canvas, zoom_current) {
            trace!(tile = %coord, key = %key, stage = %RenderStage::Paint, "Render superseded");
            self.metrics.render_stale();
            return RenderOutcome::Stale(RenderStage::Paint);
        }

        if let Some(ticket) = ticket {
            if !picked.is_empty() {
                debug!(tile = %coord, features = picked.len(), "Picked features under pointer");
                self.context.record_picks(ticket.cycle, picked);
            }
        }

        self.metrics.render_painted(layout_time, paint_time);
        debug!(
            tile = %coord,
            sources = tile_map.len(),
            labels = placements.len(),
            layout_ms = layout_time.as_millis() as u64,
            paint_ms = paint_time.as_millis() as u64,
            "Tile painted"
        );
        RenderOutcome::Painted {
            layout: layout_time,
            paint: paint_time,
        }
    }

    /// Features near `position` from every source, at the viewport's zoom.
    pub fn query_tile_features_debug(
        &self,
        position: LatLng,
        brush_radius: f64,
    ) -> BTreeMap<String, Vec<PickedFeature>> {
        let zoom = self.viewport.zoom();
        self.sources
            .iter()
            .map(|(name, source)| {
                (
                    name.clone(),
                    source.query_features(position, zoom, brush_radius),
                )
            })
            .collect()
    }

    /// Discard every label placement.
    pub fn clear_layout(&self) {
        self.labels.clear_layout();
    }

    async fn fetch_sources(&self, coord: TileCoord) -> PreparedTileMap {
        let fetches = self.sources.iter().map(|(name, source)| async move {
            (name, source.fetch_for_display(coord).await)
        });

        let mut tile_map = PreparedTileMap::new();
        for (name, result) in join_all(fetches).await {
            match result {
                Ok(tiles) => {
                    if let Some(first) = tiles.into_iter().next() {
                        tile_map.insert(name.clone(), vec![first]);
                    }
                }
                Err(e) if e.is_superseded() => {
                    trace!(tile = %coord, source = %name, "Fetch superseded");
                    self.metrics.fetch_superseded();
                }
                Err(e) => {
                    warn!(tile = %coord, source = %name, error = %e, "Source fetch failed");
                    self.metrics.source_failed();
                }
            }
        }
        tile_map
    }

    fn gate(
        &self,
        coord: &TileCoord,
        element: &TileElement,
        key: &GenerationKey,
        stage: RenderStage,
    ) -> Option<RenderOutcome> {
        if element.is_current(key) && self.context.last_requested_zoom() == Some(coord.zoom) {
            return None;
        }
        trace!(tile = %coord, key = %key, stage = %stage, "Render superseded");
        self.metrics.render_stale();
        Some(RenderOutcome::Stale(stage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::Point;
    use crate::labels::MonospaceMeasure;
    use crate::paint::{Color, RulePainter};
    use crate::source::{Feature, Geometry, MemorySource, PreparedSourceTile, SourceError};
    use crate::viewport::StaticViewport;
    use futures::future::BoxFuture;
    use serde_json::Map;
    use std::time::Duration;

    struct FailingSource(SourceError);

    impl SourceView for FailingSource {
        fn fetch_for_display(
            &self,
            _coord: TileCoord,
        ) -> BoxFuture<'_, Result<Vec<PreparedSourceTile>, SourceError>> {
            let err = self.0.clone();
            Box::pin(async move { Err(err) })
        }

        fn query_features(&self, _: LatLng, _: u8, _: f64) -> Vec<PickedFeature> {
            Vec::new()
        }
    }

    struct SlowSource {
        inner: MemorySource,
        delay: Duration,
    }

    impl SourceView for SlowSource {
        fn fetch_for_display(
            &self,
            coord: TileCoord,
        ) -> BoxFuture<'_, Result<Vec<PreparedSourceTile>, SourceError>> {
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                self.inner.fetch_for_display(coord).await
            })
        }

        fn query_features(&self, p: LatLng, z: u8, r: f64) -> Vec<PickedFeature> {
            self.inner.query_features(p, z, r)
        }
    }

    fn land_source() -> MemorySource {
        let mut source = MemorySource::new("base", 14);
        source.add_feature(
            "land",
            Feature {
                id: 1,
                geometry: Geometry::Polygon(vec![vec![
                    Point::new(0.0, 0.0),
                    Point::new(1.0, 0.0),
                    Point::new(1.0, 1.0),
                    Point::new(0.0, 1.0),
                ]]),
                properties: Map::new(),
            },
        );
        source
    }

    fn coordinator(viewport: Arc<StaticViewport>, config: LayerConfig) -> RenderCoordinator {
        let labels = Arc::new(LabelIndex::new(
            Arc::new(MonospaceMeasure),
            Vec::new(),
            config.tile_size,
            Box::new(|_| {}),
        ));
        RenderCoordinator::new(viewport, labels, Arc::new(RulePainter::new()), config)
            .with_paint_rules(vec![PaintRule::new(
                "land",
                crate::paint::Symbolizer::Fill {
                    color: Color::rgb(0, 128, 0),
                },
            )])
    }

    fn viewport() -> Arc<StaticViewport> {
        Arc::new(StaticViewport::new(LatLng::new(0.0, 0.0), 2, (1024.0, 1024.0), 256))
    }

    fn element(coord: TileCoord) -> (TileElement, GenerationKey) {
        let key = GenerationKey::new(&coord, 1);
        (TileElement::new(coord, key.clone()), key)
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_paints_tile() {
        let coordinator = coordinator(viewport(), LayerConfig::default())
            .with_source("base", Arc::new(land_source()));
        let coord = TileCoord::new(2, 1, 1);
        let (element, key) = element(coord);

        let outcome = coordinator.render_tile(coord, &element, &key).await;

        assert!(outcome.is_painted());
        assert_eq!(element.paint_count(), 1);
        assert!(!element.canvas().unwrap().is_blank());
        assert_eq!(coordinator.metrics().snapshot().renders_painted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_source_is_omitted() {
        let coordinator = coordinator(viewport(), LayerConfig::default())
            .with_source("base", Arc::new(land_source()))
            .with_source(
                "broken",
                Arc::new(FailingSource(SourceError::Fetch("timeout".into()))),
            );
        let coord = TileCoord::new(2, 1, 1);

        let tile_map = coordinator.fetch_sources(coord).await;
        assert_eq!(tile_map.keys().collect::<Vec<_>>(), vec!["base"]);

        let (element, key) = element(coord);
        assert!(coordinator.render_tile(coord, &element, &key).await.is_painted());
        assert_eq!(coordinator.metrics().snapshot().source_failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_fetch_is_not_a_failure() {
        let coordinator = coordinator(viewport(), LayerConfig::default())
            .with_source("gone", Arc::new(FailingSource(SourceError::Superseded)));
        let coord = TileCoord::new(2, 1, 1);
        let (element, key) = element(coord);

        assert!(coordinator.render_tile(coord, &element, &key).await.is_painted());
        let snapshot = coordinator.metrics().snapshot();
        assert_eq!(snapshot.source_failures, 0);
        assert_eq!(snapshot.fetches_superseded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_change_during_fetch_aborts() {
        let slow = SlowSource {
            inner: land_source(),
            delay: Duration::from_millis(50),
        };
        let coordinator = Arc::new(
            coordinator(viewport(), LayerConfig::default()).with_source("base", Arc::new(slow)),
        );
        let coord = TileCoord::new(2, 1, 1);
        let (element, key) = element(coord);

        let render = {
            let coordinator = Arc::clone(&coordinator);
            let element = element.clone();
            let key = key.clone();
            tokio::spawn(async move { coordinator.render_tile(coord, &element, &key).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        element.detach();

        let outcome = render.await.unwrap();
        assert_eq!(outcome, RenderOutcome::Stale(RenderStage::Fetch));
        assert!(element.canvas().is_none());
        assert!(coordinator.labels().get_index(coord.zoom).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zoom_change_aborts_older_render() {
        let slow = SlowSource {
            inner: land_source(),
            delay: Duration::from_millis(50),
        };
        let coordinator = Arc::new(
            coordinator(viewport(), LayerConfig::default()).with_source("base", Arc::new(slow)),
        );
        let old = TileCoord::new(2, 1, 1);
        let (old_element, old_key) = element(old);
        let new = TileCoord::new(3, 2, 2);
        let (new_element, new_key) = element(new);

        let (old_outcome, new_outcome) = tokio::join!(
            coordinator.render_tile(old, &old_element, &old_key),
            coordinator.render_tile(new, &new_element, &new_key),
        );

        assert_eq!(old_outcome, RenderOutcome::Stale(RenderStage::Fetch));
        assert!(new_outcome.is_painted());
    }

    fn labeled_coordinator(config: LayerConfig) -> RenderCoordinator {
        let mut source = MemorySource::new("base", 14);
        let mut properties = Map::new();
        properties.insert("name".into(), serde_json::Value::from("Harbor"));
        source.add_feature(
            "places",
            Feature {
                id: 7,
                geometry: Geometry::Points(vec![Point::new(0.375, 0.375)]),
                properties,
            },
        );
        let labels = Arc::new(LabelIndex::new(
            Arc::new(MonospaceMeasure),
            vec![crate::labels::LabelRule::new("places", "name")],
            config.tile_size,
            Box::new(|_| {}),
        ));
        RenderCoordinator::new(viewport(), labels, Arc::new(RulePainter::new()), config)
            .with_source("base", Arc::new(source))
    }

    #[tokio::test(start_paused = true)]
    async fn test_labeled_render_places_label() {
        let coordinator = labeled_coordinator(LayerConfig::default());
        let coord = TileCoord::new(2, 1, 1);
        let (element, key) = element(coord);

        assert!(coordinator.render_tile(coord, &element, &key).await.is_painted());
        assert_eq!(coordinator.labels().get_index(coord.zoom).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_while_tasks_pending_aborts_before_layout() {
        let coordinator = Arc::new(labeled_coordinator(LayerConfig::default()));
        coordinator.context().tasks().register("fonts", async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<(), String>(())
        });
        let coord = TileCoord::new(2, 1, 1);
        let (element, key) = element(coord);

        let render = {
            let coordinator = Arc::clone(&coordinator);
            let element = element.clone();
            let key = key.clone();
            tokio::spawn(async move { coordinator.render_tile(coord, &element, &key).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        element.detach();

        let outcome = render.await.unwrap();
        assert_eq!(outcome, RenderOutcome::Stale(RenderStage::Tasks));
        assert!(coordinator.labels().get_index(coord.zoom).is_empty());
        assert!(element.canvas().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zoom_change_during_priority_delay_aborts() {
        let coordinator = Arc::new(labeled_coordinator(
            LayerConfig::default().with_tile_delay(100.0),
        ));
        let coord = TileCoord::new(2, 0, 0);
        let (element, key) = element(coord);

        let render = {
            let coordinator = Arc::clone(&coordinator);
            let element = element.clone();
            let key = key.clone();
            tokio::spawn(async move { coordinator.render_tile(coord, &element, &key).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        coordinator.context().record_requested_zoom(3);

        let outcome = render.await.unwrap();
        assert_eq!(outcome, RenderOutcome::Stale(RenderStage::Delay));
        assert!(element.canvas().is_none());
        assert_eq!(coordinator.metrics().snapshot().renders_stale, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_layer_skips_paint() {
        let viewport = viewport();
        viewport.set_attached(false);
        let coordinator = coordinator(Arc::clone(&viewport), LayerConfig::default());
        let coord = TileCoord::new(2, 1, 1);
        let (element, key) = element(coord);

        assert_eq!(
            coordinator.render_tile(coord, &element, &key).await,
            RenderOutcome::Detached
        );
        assert!(element.canvas().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_far_tile_waits_for_priority_delay() {
        let coordinator = coordinator(viewport(), LayerConfig::default().with_tile_delay(100.0));
        // Range center at zoom 2 is (1.5, 1.5); tile (0,0) is ~2.12 tiles away.
        let coord = TileCoord::new(2, 0, 0);
        let (element, key) = element(coord);

        let start = tokio::time::Instant::now();
        coordinator.render_tile(coord, &element, &key).await;
        assert!(start.elapsed() >= Duration::from_millis(212));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_size_surface_fails_only_that_tile() {
        let coordinator = coordinator(viewport(), LayerConfig::default().with_tile_size(0));
        let coord = TileCoord::new(2, 1, 1);
        let (element, key) = element(coord);

        assert_eq!(
            coordinator.render_tile(coord, &element, &key).await,
            RenderOutcome::SurfaceFailed
        );
        assert_eq!(coordinator.metrics().snapshot().surface_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_fill_applied() {
        let config = LayerConfig::default().with_background_color(Color::rgb(10, 20, 30));
        let coordinator = coordinator(viewport(), config);
        let coord = TileCoord::new(2, 1, 1);
        let (element, key) = element(coord);

        coordinator.render_tile(coord, &element, &key).await;
        let canvas = element.canvas().unwrap();
        assert_eq!(canvas.pixel(5, 5), Some(Color::rgb(10, 20, 30)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_auxiliary_task_does_not_block() {
        let coordinator = coordinator(viewport(), LayerConfig::default());
        coordinator
            .context()
            .tasks()
            .register("fonts", async { Err::<(), _>("missing font") });
        let coord = TileCoord::new(2, 1, 1);
        let (element, key) = element(coord);

        assert!(coordinator.render_tile(coord, &element, &key).await.is_painted());
        assert_eq!(coordinator.metrics().snapshot().auxiliary_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_tile_features_debug_per_source() {
        let coordinator = coordinator(viewport(), LayerConfig::default())
            .with_source("base", Arc::new(land_source()))
            .with_source("empty", Arc::new(MemorySource::new("empty", 14)));

        let results = coordinator.query_tile_features_debug(LatLng::new(10.0, 10.0), 16.0);
        assert_eq!(results.len(), 2);
        assert_eq!(results["base"].len(), 1);
        assert!(results["empty"].is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_zoom_is_rejected() {
        let coordinator = coordinator(viewport(), LayerConfig::default())
            .with_source("base", Arc::new(land_source()));
        let coord = TileCoord::new(64, 3, 3);
        let (element, key) = element(coord);

        assert_eq!(
            coordinator.render_tile(coord, &element, &key).await,
            RenderOutcome::InvalidZoom(64)
        );
        assert!(element.canvas().is_none());
        assert_eq!(coordinator.context().last_requested_zoom(), None);
    }

    #[test]
    fn test_paint_buffer_bbox() {
        let coord = TileCoord::new(0, 0, 0);
        let bbox = coord.bbox(PAINT_BUFFER);
        assert_eq!(bbox.min_x, -16.0);
        assert_eq!(bbox.max_x, 272.0);
    }
}
