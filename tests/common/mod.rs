#![allow(dead_code)]

use async_trait::async_trait;
use gtmap::prelude::*;
use gtmap::tiles::source::ImageFormatHint;
use image::{ImageOutputFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn png_bytes(size: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(size, size, Rgba([30, 90, 160, 255]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut out, ImageOutputFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Writes a GTPK file by hand: header, 13-byte entries, then blobs.
pub fn gtpk_bytes(tile_size: u32, tiles: &[(TileCoord, Vec<u8>)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"GTPK");
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&(tiles.len() as u32).to_le_bytes());
    out.extend_from_slice(&tile_size.to_le_bytes());
    let mut offset = 16 + 13 * tiles.len();
    for (coord, blob) in tiles {
        out.push(coord.z);
        out.extend_from_slice(&(coord.x as u16).to_le_bytes());
        out.extend_from_slice(&(coord.y as u16).to_le_bytes());
        out.extend_from_slice(&(offset as u32).to_le_bytes());
        out.extend_from_slice(&(blob.len() as u32).to_le_bytes());
        offset += blob.len();
    }
    for (_, blob) in tiles {
        out.extend_from_slice(blob);
    }
    out
}

/// In-memory source that records every fetch and the peak number of
/// fetches running at once.
#[derive(Default)]
pub struct MemorySource {
    pub delay_ms: u64,
    pub failing: HashSet<TileCoord>,
    active: AtomicUsize,
    peak: AtomicUsize,
    fetched: Mutex<Vec<TileCoord>>,
}

impl MemorySource {
    pub fn with_delay(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            ..Self::default()
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(AtomicOrdering::SeqCst)
    }

    pub fn fetched(&self) -> Vec<TileCoord> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl TileSource for MemorySource {
    fn url(&self, coord: TileCoord) -> String {
        format!("mem://{}", coord)
    }

    async fn fetch(&self, coord: TileCoord, _url: &str) -> Result<Vec<u8>> {
        let now = self.active.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        self.peak.fetch_max(now, AtomicOrdering::SeqCst);
        self.fetched.lock().unwrap().push(coord);
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        self.active.fetch_sub(1, AtomicOrdering::SeqCst);
        if self.failing.contains(&coord) {
            return Err(MapError::InvalidTile(format!("{} is missing", coord)));
        }
        Ok(png_bytes(8))
    }

    fn format_hint(&self) -> ImageFormatHint {
        ImageFormatHint::Png
    }
}

/// Lets spawned loads run, then applies whatever finished.
pub async fn settle(
    pipeline: &mut TilePipeline,
    cache: &mut TileCache,
    store: &mut HeadlessContext,
    frame: u64,
) -> usize {
    tokio::time::sleep(Duration::from_millis(2)).await;
    pipeline.drain_completions(cache, store, frame)
}
