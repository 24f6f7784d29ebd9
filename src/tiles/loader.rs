use crate::core::geo::TileCoord;
use crate::prelude::{Arc, HashMap};
use crate::rendering::context::TextureStore;
use crate::runtime::{spawn, AsyncHandle, AsyncSpawner};
use crate::tiles::cache::{TileCache, TileStatus};
use crate::tiles::decode::{DecodedTile, HintedDecoder, SniffingDecoder, TileDecoder};
use crate::tiles::queue::TileTask;
use crate::tiles::source::{ImageFormatHint, TileSource};
use crate::{MapError, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};

/// Outcome of one spawned load, sent back to the render thread
#[derive(Debug)]
pub struct TileCompletion {
    pub coord: TileCoord,
    generation: u64,
    pub result: Result<DecodedTile>,
}

/// Fetch → decode jobs. Jobs run on the async runtime and only ever talk
/// back through the completion channel; the cache and GPU are touched in
/// [`TileLoader::drain_completions`] on the render thread.
pub struct TileLoader {
    source: Option<Arc<dyn TileSource>>,
    fast: Arc<dyn TileDecoder>,
    fallback: Arc<dyn TileDecoder>,
    fast_path: Arc<AtomicBool>,
    tx: Sender<TileCompletion>,
    rx: Receiver<TileCompletion>,
    handles: HashMap<TileCoord, Box<dyn AsyncHandle>>,
    /// Overrides the process-wide spawner
    spawner: Option<Arc<dyn AsyncSpawner>>,
    inflight: usize,
    /// Bumped on clear so late completions of an old source are dropped
    generation: u64,
}

impl TileLoader {
    pub fn new() -> Self {
        Self::with_decoders(Arc::new(HintedDecoder), Arc::new(SniffingDecoder))
    }

    pub fn with_decoders(fast: Arc<dyn TileDecoder>, fallback: Arc<dyn TileDecoder>) -> Self {
        let (tx, rx) = unbounded();
        Self {
            source: None,
            fast,
            fallback,
            fast_path: Arc::new(AtomicBool::new(true)),
            tx,
            rx,
            handles: HashMap::default(),
            spawner: None,
            inflight: 0,
            generation: 0,
        }
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn AsyncSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    pub fn set_source(&mut self, source: Option<Arc<dyn TileSource>>) {
        self.clear();
        self.source = source;
    }

    pub fn source(&self) -> Option<&Arc<dyn TileSource>> {
        self.source.as_ref()
    }

    pub fn url(&self, coord: TileCoord) -> Option<String> {
        self.source.as_ref().map(|s| s.url(coord))
    }

    pub fn inflight(&self) -> usize {
        self.inflight
    }

    /// Whether the format-hinted decoder is still trusted this session
    pub fn fast_path_enabled(&self) -> bool {
        self.fast_path.load(Ordering::Acquire)
    }

    /// Marks the tile loading and spawns its job.
    pub fn start(&mut self, task: TileTask, cache: &mut TileCache) {
        let Some(source) = self.source.clone() else {
            cache.set_error(task.coord);
            return;
        };
        cache.set_loading(task.coord);
        self.inflight += 1;

        let coord = task.coord;
        let generation = self.generation;
        let tx = self.tx.clone();
        let fast = self.fast.clone();
        let fallback = self.fallback.clone();
        let fast_path = self.fast_path.clone();
        log::debug!("loading tile {} from {}", coord, task.url);

        let job = async move {
            let hint = source.format_hint();
            let result = match source.fetch(coord, &task.url).await {
                Ok(bytes) => decode_off_thread(bytes, hint, fast, fallback, fast_path).await,
                Err(e) => Err(e),
            };
            let _ = tx.send(TileCompletion {
                coord,
                generation,
                result,
            });
        };
        let spawned = match &self.spawner {
            Some(spawner) => spawner.spawn_boxed(Box::pin(job)),
            None => spawn(job),
        };
        match spawned {
            Ok(handle) => {
                self.handles.insert(coord, handle);
            }
            Err(e) => {
                // The job never runs, so its slot is released through the
                // same path as a failed fetch
                log::warn!("could not schedule tile {}: {}", coord, e);
                let _ = self.tx.send(TileCompletion {
                    coord,
                    generation,
                    result: Err(e),
                });
            }
        }
    }

    /// Applies finished jobs: uploads textures and updates the cache.
    /// Returns the number of completions consumed for the current source.
    pub fn drain_completions(
        &mut self,
        cache: &mut TileCache,
        store: &mut dyn TextureStore,
        frame: u64,
    ) -> usize {
        let mut applied = 0;
        while let Ok(completion) = self.rx.try_recv() {
            if completion.generation != self.generation {
                continue;
            }
            self.handles.remove(&completion.coord);
            self.inflight = self.inflight.saturating_sub(1);
            applied += 1;

            if cache.status(&completion.coord) != Some(TileStatus::Loading) {
                log::debug!("dropping result for {}, record no longer loading", completion.coord);
                continue;
            }
            let uploaded = completion.result.and_then(|tile| {
                let texture = store.upload(&tile)?;
                Ok((texture, tile.width, tile.height))
            });
            match uploaded {
                Ok((texture, width, height)) => {
                    cache.set_ready(completion.coord, texture, width, height, frame, store);
                }
                Err(e) => {
                    log::warn!("tile {} failed: {}", completion.coord, e);
                    cache.set_error(completion.coord);
                }
            }
        }
        applied
    }

    /// Forgets every in-flight job. Jobs that cannot be aborted finish in
    /// the background and their results are discarded.
    pub fn clear(&mut self) {
        self.generation += 1;
        for (_, handle) in self.handles.drain() {
            handle.cancel();
        }
        self.inflight = 0;
        while self.rx.try_recv().is_ok() {}
    }
}

impl Default for TileLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs [`decode`] (which also builds the mip chain) on the blocking pool
/// when a Tokio runtime is driving the job.
async fn decode_off_thread(
    bytes: Vec<u8>,
    hint: ImageFormatHint,
    fast: Arc<dyn TileDecoder>,
    fallback: Arc<dyn TileDecoder>,
    fast_path: Arc<AtomicBool>,
) -> Result<DecodedTile> {
    #[cfg(feature = "tokio-runtime")]
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        return handle
            .spawn_blocking(move || decode(&bytes, hint, fast.as_ref(), fallback.as_ref(), &fast_path))
            .await
            .unwrap_or_else(|e| Err(MapError::Runtime(format!("decode task failed: {}", e))));
    }
    decode(&bytes, hint, fast.as_ref(), fallback.as_ref(), &fast_path)
}

/// Fast decode first; on failure the fast path is switched off for the rest
/// of the session and the same bytes go through the fallback decoder.
fn decode(
    bytes: &[u8],
    hint: ImageFormatHint,
    fast: &dyn TileDecoder,
    fallback: &dyn TileDecoder,
    fast_path: &AtomicBool,
) -> Result<DecodedTile> {
    if hint != ImageFormatHint::Unknown && fast_path.load(Ordering::Acquire) {
        match fast.decode(bytes, hint) {
            Ok(tile) => return Ok(tile),
            Err(e) => {
                if fast_path.swap(false, Ordering::AcqRel) {
                    log::warn!("{} decoder failed ({}), using {} from now on", fast.name(), e, fallback.name());
                }
            }
        }
    }
    fallback
        .decode(bytes, hint)
        .map_err(|e| MapError::Decode(format!("{} decoder: {}", fallback.name(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::headless::HeadlessContext;
    use crate::tiles::decode::tests::png_bytes;
    use crate::tiles::queue::TilePriority;
    use async_trait::async_trait;

    struct PngSource {
        hint: ImageFormatHint,
    }

    #[async_trait]
    impl TileSource for PngSource {
        fn url(&self, coord: TileCoord) -> String {
            format!("mem://{}", coord)
        }

        async fn fetch(&self, coord: TileCoord, _url: &str) -> Result<Vec<u8>> {
            if coord.x == 99 {
                return Err(MapError::InvalidTile("missing".into()));
            }
            Ok(png_bytes(4))
        }

        fn format_hint(&self) -> ImageFormatHint {
            self.hint
        }
    }

    fn task(coord: TileCoord) -> TileTask {
        TileTask {
            coord,
            url: format!("mem://{}", coord),
            priority: TilePriority::Visible,
            sequence: 0,
        }
    }

    async fn drain_all(loader: &mut TileLoader, cache: &mut TileCache, store: &mut HeadlessContext) {
        for _ in 0..200 {
            loader.drain_completions(cache, store, 1);
            if loader.inflight() == 0 {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("loads did not finish");
    }

    #[tokio::test]
    async fn test_load_becomes_ready() {
        let mut loader = TileLoader::new();
        loader.set_source(Some(Arc::new(PngSource {
            hint: ImageFormatHint::Png,
        })));
        let mut cache = TileCache::new(8);
        let mut store = HeadlessContext::new();
        let coord = TileCoord::new(1, 0, 0);

        loader.start(task(coord), &mut cache);
        assert_eq!(cache.status(&coord), Some(TileStatus::Loading));
        assert_eq!(loader.inflight(), 1);

        drain_all(&mut loader, &mut cache, &mut store).await;
        assert!(cache.is_ready(&coord));
        assert_eq!(cache.get(&coord).unwrap().width, 4);
        assert!(loader.fast_path_enabled());
    }

    #[tokio::test]
    async fn test_fast_path_failure_falls_back_and_disables() {
        let mut loader = TileLoader::new();
        loader.set_source(Some(Arc::new(PngSource {
            hint: ImageFormatHint::WebP,
        })));
        let mut cache = TileCache::new(8);
        let mut store = HeadlessContext::new();
        let coord = TileCoord::new(1, 1, 0);

        loader.start(task(coord), &mut cache);
        drain_all(&mut loader, &mut cache, &mut store).await;

        assert!(cache.is_ready(&coord));
        assert!(!loader.fast_path_enabled());
    }

    #[tokio::test]
    async fn test_fetch_failure_marks_error() {
        let mut loader = TileLoader::new();
        loader.set_source(Some(Arc::new(PngSource {
            hint: ImageFormatHint::Png,
        })));
        let mut cache = TileCache::new(8);
        let mut store = HeadlessContext::new();
        let coord = TileCoord::new(7, 99, 0);

        loader.start(task(coord), &mut cache);
        drain_all(&mut loader, &mut cache, &mut store).await;
        assert_eq!(cache.status(&coord), Some(TileStatus::Error));
        assert_eq!(store.live_textures(), 0);
    }

    struct RefusingSpawner;

    impl AsyncSpawner for RefusingSpawner {
        fn spawn_boxed(
            &self,
            _future: crate::prelude::Pin<Box<dyn crate::prelude::Future<Output = ()> + Send + 'static>>,
        ) -> Result<Box<dyn AsyncHandle>> {
            Err(MapError::Runtime("spawner shut down".into()))
        }
    }

    #[test]
    fn test_unscheduled_jobs_release_their_slots() {
        let mut loader = TileLoader::new().with_spawner(Arc::new(RefusingSpawner));
        loader.set_source(Some(Arc::new(PngSource {
            hint: ImageFormatHint::Png,
        })));
        let mut cache = TileCache::new(16);
        let mut store = HeadlessContext::new();
        let coords: Vec<_> = (0..10).map(|x| TileCoord::new(4, x, 0)).collect();

        for coord in &coords {
            loader.start(task(*coord), &mut cache);
        }
        assert_eq!(loader.inflight(), 10);

        assert_eq!(loader.drain_completions(&mut cache, &mut store, 1), 10);
        assert_eq!(loader.inflight(), 0);
        for coord in &coords {
            assert_eq!(cache.status(coord), Some(TileStatus::Error));
        }
        assert_eq!(store.live_textures(), 0);
    }

    #[tokio::test]
    async fn test_clear_discards_late_results() {
        let mut loader = TileLoader::new();
        loader.set_source(Some(Arc::new(PngSource {
            hint: ImageFormatHint::Png,
        })));
        let mut cache = TileCache::new(8);
        let mut store = HeadlessContext::new();
        let coord = TileCoord::new(2, 1, 1);

        loader.start(task(coord), &mut cache);
        loader.clear();
        cache.clear(&mut store);
        assert_eq!(loader.inflight(), 0);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(loader.drain_completions(&mut cache, &mut store, 1), 0);
        assert!(!cache.has(&coord));
    }
}
