use crate::constants::{DEFAULT_INTERACTION_IDLE_MS, DEFAULT_MAX_INFLIGHT_LOADS, MAX_BASELINE_TILES};
use crate::core::config::TileLoadingConfig;
use crate::core::geo::{tiles_per_axis, Point, TileCoord};
use crate::prelude::{Arc, HashSet};
use crate::rendering::context::TextureStore;
use crate::tiles::cache::TileCache;
use crate::tiles::loader::TileLoader;
use crate::tiles::queue::{TilePriority, TileQueue};
use crate::tiles::source::TileSource;

/// Queue + loader under a concurrency cap.
///
/// The render thread feeds it wanted tiles every frame, calls
/// [`TilePipeline::process`] to start work and
/// [`TilePipeline::drain_completions`] to apply finished loads.
pub struct TilePipeline {
    queue: TileQueue,
    loader: TileLoader,
    max_inflight_loads: usize,
    interaction_idle_ms: f64,
    last_interaction_ms: f64,
    view_level: u8,
    view_center: Point,
}

impl TilePipeline {
    pub fn new(tile_size: u32) -> Self {
        Self {
            queue: TileQueue::new(tile_size),
            loader: TileLoader::new(),
            max_inflight_loads: DEFAULT_MAX_INFLIGHT_LOADS,
            interaction_idle_ms: DEFAULT_INTERACTION_IDLE_MS,
            last_interaction_ms: f64::NEG_INFINITY,
            view_level: 0,
            view_center: Point::default(),
        }
    }

    pub fn with_config(tile_size: u32, config: &TileLoadingConfig) -> Self {
        let mut pipeline = Self::new(tile_size);
        pipeline.configure(config);
        pipeline
    }

    pub fn with_loader(mut self, loader: TileLoader) -> Self {
        self.loader = loader;
        self
    }

    pub fn configure(&mut self, config: &TileLoadingConfig) {
        self.max_inflight_loads = config.max_inflight_loads.max(1);
        self.interaction_idle_ms = config.interaction_idle_ms;
    }

    /// Replaces the source. Everything queued, in flight or cached belongs to
    /// the old source and is dropped.
    pub fn set_source(
        &mut self,
        source: Option<Arc<dyn TileSource>>,
        tile_size: u32,
        cache: &mut TileCache,
        store: &mut dyn TextureStore,
    ) {
        self.clear(cache, store);
        self.queue.set_tile_size(tile_size);
        self.loader.set_source(source);
    }

    /// Swaps the source but keeps settled tiles in the cache. Queued and
    /// in-flight work of the old source is dropped.
    pub fn replace_source(&mut self, source: Option<Arc<dyn TileSource>>, cache: &mut TileCache) {
        self.queue.clear();
        self.loader.set_source(source);
        cache.drop_unsettled();
    }

    pub fn has_source(&self) -> bool {
        self.loader.source().is_some()
    }

    pub fn loader(&self) -> &TileLoader {
        &self.loader
    }

    pub fn queue(&self) -> &TileQueue {
        &self.queue
    }

    pub fn inflight(&self) -> usize {
        self.loader.inflight()
    }

    pub fn max_inflight_loads(&self) -> usize {
        self.max_inflight_loads
    }

    /// Requests a tile. Keys the cache already knows (pending, loading,
    /// ready or failed) are refused; a queued key may get its priority raised.
    pub fn enqueue(&mut self, coord: TileCoord, priority: TilePriority, cache: &mut TileCache) -> bool {
        if self.queue.has(&coord) {
            self.queue.enqueue(coord, String::new(), priority);
            return false;
        }
        if cache.has(&coord) || !coord.is_valid() {
            return false;
        }
        let Some(url) = self.loader.url(coord) else {
            return false;
        };
        cache.set_pending(coord);
        self.queue.enqueue(coord, url, priority)
    }

    /// Drops queued tasks outside `wanted` and their pending records.
    /// In-flight loads are left to finish.
    pub fn cancel_unwanted(&mut self, wanted: &HashSet<TileCoord>, cache: &mut TileCache) -> usize {
        let removed = self.queue.prune(wanted);
        for coord in &removed {
            cache.remove_pending(coord);
        }
        if !removed.is_empty() {
            log::debug!("pruned {} queued tiles", removed.len());
        }
        removed.len()
    }

    pub fn clear(&mut self, cache: &mut TileCache, store: &mut dyn TextureStore) {
        self.queue.clear();
        self.loader.clear();
        cache.clear(store);
    }

    /// Records user input; prefetching pauses until the map has been idle
    /// for `interaction_idle_ms`.
    pub fn note_interaction(&mut self, now_ms: f64) {
        self.last_interaction_ms = now_ms;
    }

    pub fn is_idle(&self, now_ms: f64) -> bool {
        now_ms - self.last_interaction_ms > self.interaction_idle_ms
    }

    /// View used to rank queued tiles: integer level and center in that
    /// level's pixels.
    pub fn set_view(&mut self, level: u8, center_world: Point) {
        self.view_level = level;
        self.view_center = center_world;
    }

    /// Starts queued loads until the concurrency cap is reached. Returns the
    /// number of loads started.
    pub fn process(&mut self, now_ms: f64, cache: &mut TileCache) -> usize {
        let idle = self.is_idle(now_ms);
        let mut started = 0;
        while self.loader.inflight() < self.max_inflight_loads {
            let Some(task) = self.queue.next(self.view_level, self.view_center, idle) else {
                break;
            };
            self.loader.start(task, cache);
            started += 1;
        }
        started
    }

    pub fn drain_completions(
        &mut self,
        cache: &mut TileCache,
        store: &mut dyn TextureStore,
        frame: u64,
    ) -> usize {
        self.loader.drain_completions(cache, store, frame)
    }

    /// Pins and queues every tile of a coarse level so a low-resolution
    /// backdrop is always available. The level is lowered until its grid
    /// fits the baseline budget. Returns the level used.
    pub fn schedule_baseline_prefetch(&mut self, level: u8, cache: &mut TileCache) -> u8 {
        let mut level = level;
        while level > 0 && (tiles_per_axis(level) as usize).pow(2) > MAX_BASELINE_TILES {
            level -= 1;
        }
        let n = tiles_per_axis(level);
        let mut queued = 0;
        for y in 0..n {
            for x in 0..n {
                let coord = TileCoord::new(level, x, y);
                cache.pin(coord);
                if self.enqueue(coord, TilePriority::Baseline, cache) {
                    queued += 1;
                }
            }
        }
        log::info!("baseline prefetch: level {} ({} tiles queued)", level, queued);
        level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiles::cache::TileStatus;
    use crate::tiles::source::XyzTileSource;

    fn pipeline(cache_size: usize) -> (TilePipeline, TileCache) {
        let mut p = TilePipeline::new(256);
        p.loader.set_source(Some(Arc::new(XyzTileSource::new("mem://{z}/{x}/{y}.png"))));
        (p, TileCache::new(cache_size))
    }

    #[test]
    fn test_enqueue_refuses_known_keys() {
        let (mut p, mut cache) = pipeline(8);
        let key = TileCoord::new(2, 1, 1);
        assert!(p.enqueue(key, TilePriority::Visible, &mut cache));
        assert_eq!(cache.status(&key), Some(TileStatus::Pending));
        assert!(!p.enqueue(key, TilePriority::Visible, &mut cache));

        let other = TileCoord::new(2, 2, 2);
        cache.set_error(other);
        assert!(!p.enqueue(other, TilePriority::Visible, &mut cache));
        assert!(!p.enqueue(TileCoord::new(1, 5, 0), TilePriority::Visible, &mut cache));
        assert_eq!(p.queue().len(), 1);
    }

    #[test]
    fn test_cancel_removes_pending_records() {
        let (mut p, mut cache) = pipeline(8);
        let keep = TileCoord::new(3, 0, 0);
        let drop = TileCoord::new(3, 7, 7);
        p.enqueue(keep, TilePriority::Visible, &mut cache);
        p.enqueue(drop, TilePriority::Visible, &mut cache);

        let mut wanted = HashSet::default();
        wanted.insert(keep);
        assert_eq!(p.cancel_unwanted(&wanted, &mut cache), 1);
        assert!(!cache.has(&drop));
        assert!(cache.has(&keep));
    }

    #[test]
    fn test_baseline_level_is_capped() {
        let (mut p, mut cache) = pipeline(8);
        let level = p.schedule_baseline_prefetch(9, &mut cache);
        assert_eq!(level, 4);
        assert_eq!(p.queue().len(), 256);
        assert!(cache.is_pinned(&TileCoord::new(4, 15, 15)));
    }

    #[test]
    fn test_idle_window() {
        let (mut p, _) = pipeline(8);
        assert!(p.is_idle(0.0));
        p.note_interaction(1000.0);
        assert!(!p.is_idle(1100.0));
        assert!(p.is_idle(1161.0));
    }
}
