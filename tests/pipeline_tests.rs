mod common;

use common::{gtpk_bytes, init_logging, png_bytes, settle, MemorySource};
use gtmap::prelude::*;

/// Tile pipeline behavior against in-memory sources
#[cfg(test)]
mod pipeline_tests {
    use super::*;

    fn pipeline_with(source: Arc<dyn TileSource>, max_inflight: usize) -> (TilePipeline, TileCache, HeadlessContext) {
        let config = TileLoadingConfig {
            max_inflight_loads: max_inflight,
            ..TileLoadingConfig::default()
        };
        let mut pipeline = TilePipeline::with_config(256, &config);
        let mut cache = TileCache::new(128);
        let mut store = HeadlessContext::new();
        pipeline.set_source(Some(source), 256, &mut cache, &mut store);
        (pipeline, cache, store)
    }

    /// Many queued tiles never exceed the concurrency cap and all finish
    #[tokio::test]
    async fn test_loads_respect_inflight_cap() {
        init_logging();
        let source = Arc::new(MemorySource::with_delay(5));
        let (mut pipeline, mut cache, mut store) = pipeline_with(source.clone(), 8);

        let coords: Vec<TileCoord> = (0..100u32).map(|i| TileCoord::new(4, i % 16, i / 16)).collect();
        for coord in &coords {
            assert!(pipeline.enqueue(*coord, TilePriority::Visible, &mut cache));
        }

        let mut frame = 0;
        while frame < 2000 && !coords.iter().all(|c| cache.is_ready(c)) {
            frame += 1;
            pipeline.process(frame as f64, &mut cache);
            assert!(pipeline.inflight() <= 8);
            settle(&mut pipeline, &mut cache, &mut store, frame).await;
        }

        assert!(coords.iter().all(|c| cache.is_ready(c)), "not every tile loaded");
        assert!(source.peak() <= 8, "peak concurrency was {}", source.peak());
        assert_eq!(source.fetched().len(), 100);
        assert_eq!(pipeline.inflight(), 0);
        assert_eq!(store.live_textures(), 100);
    }

    /// A queued tile that leaves the view is pruned before it is fetched
    #[tokio::test]
    async fn test_pruned_tile_is_never_fetched() {
        let source = Arc::new(MemorySource::with_delay(5));
        let (mut pipeline, mut cache, mut store) = pipeline_with(source.clone(), 1);
        let near = TileCoord::new(2, 0, 0);
        let far = TileCoord::new(2, 3, 3);

        pipeline.enqueue(near, TilePriority::Visible, &mut cache);
        pipeline.enqueue(far, TilePriority::Visible, &mut cache);
        pipeline.set_view(2, Point::new(0.0, 0.0));
        assert_eq!(pipeline.process(0.0, &mut cache), 1);
        assert_eq!(cache.status(&near), Some(TileStatus::Loading));

        let mut wanted = HashSet::default();
        wanted.insert(near);
        assert_eq!(pipeline.cancel_unwanted(&wanted, &mut cache), 1);
        assert!(!cache.has(&far));

        for frame in 1..500 {
            pipeline.process(frame as f64, &mut cache);
            settle(&mut pipeline, &mut cache, &mut store, frame).await;
            if cache.is_ready(&near) {
                break;
            }
        }
        assert!(cache.is_ready(&near));
        assert_eq!(source.fetched(), vec![near]);
    }

    /// A load already running finishes even after its tile leaves the view
    #[tokio::test]
    async fn test_inflight_tile_completes_after_prune() {
        let source = Arc::new(MemorySource::with_delay(5));
        let (mut pipeline, mut cache, mut store) = pipeline_with(source.clone(), 1);
        let started = TileCoord::new(2, 1, 1);
        let queued = TileCoord::new(2, 2, 2);

        pipeline.enqueue(started, TilePriority::Visible, &mut cache);
        pipeline.enqueue(queued, TilePriority::Visible, &mut cache);
        pipeline.set_view(2, Point::new(384.0, 384.0));
        assert_eq!(pipeline.process(0.0, &mut cache), 1);
        assert_eq!(cache.status(&started), Some(TileStatus::Loading));

        let mut wanted = HashSet::default();
        wanted.insert(TileCoord::new(2, 0, 0));
        assert_eq!(pipeline.cancel_unwanted(&wanted, &mut cache), 1);
        assert!(!cache.has(&queued));
        assert_eq!(cache.status(&started), Some(TileStatus::Loading));
        assert_eq!(pipeline.inflight(), 1);

        for frame in 1..500 {
            settle(&mut pipeline, &mut cache, &mut store, frame).await;
            if cache.is_ready(&started) {
                break;
            }
        }
        assert!(cache.is_ready(&started));
        assert_eq!(pipeline.inflight(), 0);
        assert_eq!(source.fetched(), vec![started]);
    }

    /// Failed tiles stay failed until the cache forgets them
    #[tokio::test]
    async fn test_failed_tile_is_not_retried() {
        let broken = TileCoord::new(1, 1, 0);
        let mut source = MemorySource::default();
        source.failing.insert(broken);
        let source = Arc::new(source);
        let (mut pipeline, mut cache, mut store) = pipeline_with(source.clone(), 4);

        pipeline.enqueue(broken, TilePriority::Visible, &mut cache);
        pipeline.process(0.0, &mut cache);
        for frame in 1..500 {
            settle(&mut pipeline, &mut cache, &mut store, frame).await;
            if cache.status(&broken) == Some(TileStatus::Error) {
                break;
            }
        }

        assert_eq!(cache.status(&broken), Some(TileStatus::Error));
        assert!(!pipeline.enqueue(broken, TilePriority::Visible, &mut cache));
        assert_eq!(pipeline.inflight(), 0);
        assert_eq!(store.live_textures(), 0);
    }

    /// A pack that lies about its encoding still loads through the
    /// sniffing decoder, and the hinted decoder is switched off
    #[tokio::test]
    async fn test_pack_with_mislabelled_tiles_falls_back() {
        init_logging();
        let tiles: Vec<_> = [(0, 0, 0), (1, 0, 0), (1, 1, 0), (1, 0, 1), (1, 1, 1)]
            .into_iter()
            .map(|(z, x, y)| (TileCoord::new(z, x, y), png_bytes(16)))
            .collect();
        let source = Arc::new(GtpkTileSource::from_bytes(gtpk_bytes(16, &tiles)).unwrap());
        assert_eq!(source.pack().zoom_range(), Some((0, 1)));

        let (mut pipeline, mut cache, mut store) = pipeline_with(source, 8);
        for (coord, _) in &tiles {
            pipeline.enqueue(*coord, TilePriority::Visible, &mut cache);
        }
        pipeline.process(0.0, &mut cache);
        for frame in 1..500 {
            settle(&mut pipeline, &mut cache, &mut store, frame).await;
            if tiles.iter().all(|(c, _)| cache.is_ready(c)) {
                break;
            }
        }

        assert!(tiles.iter().all(|(c, _)| cache.is_ready(c)));
        assert!(!pipeline.loader().fast_path_enabled());
        let record = cache.get(&TileCoord::new(0, 0, 0)).unwrap();
        assert_eq!((record.width, record.height), (16, 16));
    }
}
