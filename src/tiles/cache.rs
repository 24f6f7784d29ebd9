use crate::core::geo::TileCoord;
use crate::rendering::context::{TextureHandle, TextureStore};
use fxhash::FxHashSet;
use lru::LruCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileStatus {
    /// Queued, nothing started
    Pending,
    Loading,
    Ready,
    /// Failed; not retried until evicted or cleared
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TileRecord {
    pub status: TileStatus,
    pub texture: Option<TextureHandle>,
    pub width: u32,
    pub height: u32,
    pub last_used_frame: u64,
}

impl TileRecord {
    fn new(status: TileStatus) -> Self {
        Self {
            status,
            texture: None,
            width: 0,
            height: 0,
            last_used_frame: 0,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == TileStatus::Ready && self.texture.is_some()
    }
}

/// GPU tile cache: one record per key, LRU by `last_used_frame`.
///
/// Non-pending, unpinned records are bounded by `max_tiles`. Ties in
/// `last_used_frame` go to the least recently accessed entry. Pinned keys
/// are never evicted.
#[derive(Debug)]
pub struct TileCache {
    records: LruCache<TileCoord, TileRecord>,
    pinned: FxHashSet<TileCoord>,
    max_tiles: usize,
}

impl TileCache {
    pub fn new(max_tiles: usize) -> Self {
        Self {
            records: LruCache::unbounded(),
            pinned: FxHashSet::default(),
            max_tiles: max_tiles.max(1),
        }
    }

    pub fn max_tiles(&self) -> usize {
        self.max_tiles
    }

    pub fn set_max_tiles(&mut self, max_tiles: usize, store: &mut dyn TextureStore) {
        self.max_tiles = max_tiles.max(1);
        self.evict_to_budget(None, store);
    }

    pub fn has(&self, key: &TileCoord) -> bool {
        self.records.contains(key)
    }

    pub fn get(&self, key: &TileCoord) -> Option<&TileRecord> {
        self.records.peek(key)
    }

    pub fn status(&self, key: &TileCoord) -> Option<TileStatus> {
        self.get(key).map(|r| r.status)
    }

    /// Texture of a ready tile
    pub fn texture(&self, key: &TileCoord) -> Option<TextureHandle> {
        self.get(key).filter(|r| r.is_ready()).and_then(|r| r.texture)
    }

    pub fn is_ready(&self, key: &TileCoord) -> bool {
        self.get(key).map(|r| r.is_ready()).unwrap_or(false)
    }

    /// Creates the record for a freshly queued tile. Existing records are
    /// left alone.
    pub fn set_pending(&mut self, key: TileCoord) {
        if !self.records.contains(&key) {
            self.records.put(key, TileRecord::new(TileStatus::Pending));
        }
    }

    pub fn set_loading(&mut self, key: TileCoord) {
        self.set_status(key, TileStatus::Loading);
    }

    pub fn set_error(&mut self, key: TileCoord) {
        self.set_status(key, TileStatus::Error);
    }

    fn set_status(&mut self, key: TileCoord, status: TileStatus) {
        match self.records.get_mut(&key) {
            Some(record) => record.status = status,
            None => {
                self.records.put(key, TileRecord::new(status));
            }
        }
    }

    /// Stores the uploaded texture, then evicts down to budget.
    pub fn set_ready(
        &mut self,
        key: TileCoord,
        texture: TextureHandle,
        width: u32,
        height: u32,
        frame: u64,
        store: &mut dyn TextureStore,
    ) {
        let record = TileRecord {
            status: TileStatus::Ready,
            texture: Some(texture),
            width,
            height,
            last_used_frame: frame,
        };
        if let Some((_, old)) = self.records.push(key, record) {
            if let Some(previous) = old.texture.filter(|t| *t != texture) {
                store.release(previous);
            }
        }
        self.evict_to_budget(Some(key), store);
    }

    /// Marks a tile as used this frame
    pub fn touch(&mut self, key: &TileCoord, frame: u64) {
        if let Some(record) = self.records.get_mut(key) {
            record.last_used_frame = record.last_used_frame.max(frame);
        }
    }

    pub fn pin(&mut self, key: TileCoord) {
        self.pinned.insert(key);
    }

    pub fn unpin(&mut self, key: &TileCoord) {
        self.pinned.remove(key);
    }

    pub fn is_pinned(&self, key: &TileCoord) -> bool {
        self.pinned.contains(key)
    }

    pub fn pinned(&self) -> impl Iterator<Item = &TileCoord> {
        self.pinned.iter()
    }

    /// Drops the record of a tile that was queued but never started.
    pub fn remove_pending(&mut self, key: &TileCoord) -> bool {
        if self.status(key) == Some(TileStatus::Pending) {
            self.records.pop(key);
            true
        } else {
            false
        }
    }

    /// Forgets records that are queued or loading, keeping settled tiles.
    /// Used when the source changes without clearing the cache.
    pub fn drop_unsettled(&mut self) -> usize {
        let unsettled: Vec<TileCoord> = self
            .records
            .iter()
            .filter(|(_, record)| matches!(record.status, TileStatus::Pending | TileStatus::Loading))
            .map(|(key, _)| *key)
            .collect();
        for key in &unsettled {
            self.records.pop(key);
        }
        unsettled.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records that count against `max_tiles`
    pub fn budgeted_len(&self) -> usize {
        self.records
            .iter()
            .filter(|(key, record)| record.status != TileStatus::Pending && !self.pinned.contains(*key))
            .count()
    }

    /// Releases every texture and forgets all records and pins. Safe to call
    /// after the GPU context was lost.
    pub fn clear(&mut self, store: &mut dyn TextureStore) {
        for (_, record) in self.records.iter() {
            if let Some(texture) = record.texture {
                store.release(texture);
            }
        }
        self.records.clear();
        self.pinned.clear();
    }

    fn evict_to_budget(&mut self, keep: Option<TileCoord>, store: &mut dyn TextureStore) {
        let mut over = self.budgeted_len().saturating_sub(self.max_tiles);
        if over == 0 {
            return;
        }

        // Least recently accessed first; the stable sort keeps that order
        // among equal frames.
        let mut candidates: Vec<(u64, TileCoord)> = self
            .records
            .iter()
            .rev()
            .filter(|(key, record)| {
                matches!(record.status, TileStatus::Ready | TileStatus::Error)
                    && !self.pinned.contains(*key)
                    && Some(**key) != keep
            })
            .map(|(key, record)| (record.last_used_frame, *key))
            .collect();
        candidates.sort_by_key(|(frame, _)| *frame);

        for (_, key) in candidates {
            if over == 0 {
                break;
            }
            if let Some(record) = self.records.pop(&key) {
                if let Some(texture) = record.texture {
                    store.release(texture);
                }
                log::debug!("evicted tile {}", key);
                over -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::headless::HeadlessContext;

    fn ready(cache: &mut TileCache, store: &mut HeadlessContext, key: TileCoord, frame: u64) {
        let texture = store.fake_texture(256, 256);
        cache.set_loading(key);
        cache.set_ready(key, texture, 256, 256, frame, store);
    }

    #[test]
    fn test_lru_bound_evicts_oldest_frame() {
        let mut store = HeadlessContext::new();
        let mut cache = TileCache::new(2);
        let a = TileCoord::new(1, 0, 0);
        let b = TileCoord::new(1, 1, 0);
        let c = TileCoord::new(1, 0, 1);

        ready(&mut cache, &mut store, a, 1);
        ready(&mut cache, &mut store, b, 2);
        cache.touch(&a, 3);
        ready(&mut cache, &mut store, c, 4);

        assert!(cache.has(&a));
        assert!(!cache.has(&b));
        assert!(cache.has(&c));
        assert_eq!(store.released().len(), 1);
    }

    #[test]
    fn test_budget_holds_for_many_inserts() {
        let mut store = HeadlessContext::new();
        let mut cache = TileCache::new(16);
        for i in 0..100u32 {
            ready(&mut cache, &mut store, TileCoord::new(7, i, 0), i as u64);
            assert!(cache.budgeted_len() <= 16);
        }
        assert_eq!(store.live_textures(), 16);
    }

    #[test]
    fn test_equal_frames_fall_back_to_access_order() {
        let mut store = HeadlessContext::new();
        let mut cache = TileCache::new(2);
        let a = TileCoord::new(2, 0, 0);
        let b = TileCoord::new(2, 1, 0);
        let c = TileCoord::new(2, 2, 0);

        ready(&mut cache, &mut store, a, 5);
        ready(&mut cache, &mut store, b, 5);
        cache.touch(&a, 5);
        ready(&mut cache, &mut store, c, 5);

        assert!(cache.has(&a));
        assert!(!cache.has(&b));
    }

    #[test]
    fn test_pinned_tiles_survive() {
        let mut store = HeadlessContext::new();
        let mut cache = TileCache::new(1);
        let base = TileCoord::new(0, 0, 0);
        cache.pin(base);
        ready(&mut cache, &mut store, base, 0);
        for i in 0..4u32 {
            ready(&mut cache, &mut store, TileCoord::new(2, i, 0), 10 + i as u64);
        }
        assert!(cache.is_ready(&base));
        assert_eq!(cache.budgeted_len(), 1);
    }

    #[test]
    fn test_loading_records_are_not_evicted() {
        let mut store = HeadlessContext::new();
        let mut cache = TileCache::new(1);
        let loading = TileCoord::new(3, 0, 0);
        cache.set_loading(loading);
        ready(&mut cache, &mut store, TileCoord::new(3, 1, 0), 1);
        ready(&mut cache, &mut store, TileCoord::new(3, 2, 0), 2);
        assert_eq!(cache.status(&loading), Some(TileStatus::Loading));
    }

    #[test]
    fn test_remove_pending_only_touches_pending() {
        let mut cache = TileCache::new(4);
        let key = TileCoord::new(1, 0, 0);
        cache.set_pending(key);
        assert!(cache.remove_pending(&key));
        assert!(!cache.has(&key));

        cache.set_loading(key);
        assert!(!cache.remove_pending(&key));
        assert!(cache.has(&key));
    }

    #[test]
    fn test_drop_unsettled_keeps_ready_tiles() {
        let mut store = HeadlessContext::new();
        let mut cache = TileCache::new(8);
        let done = TileCoord::new(2, 0, 0);
        ready(&mut cache, &mut store, done, 0);
        cache.set_pending(TileCoord::new(2, 1, 0));
        cache.set_loading(TileCoord::new(2, 2, 0));

        assert_eq!(cache.drop_unsettled(), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.is_ready(&done));
    }

    #[test]
    fn test_clear_releases_everything() {
        let mut store = HeadlessContext::new();
        let mut cache = TileCache::new(8);
        for i in 0..5u32 {
            ready(&mut cache, &mut store, TileCoord::new(3, i, 0), 0);
        }
        cache.pin(TileCoord::new(3, 0, 0));
        cache.clear(&mut store);
        assert!(cache.is_empty());
        assert_eq!(store.live_textures(), 0);
        assert!(!cache.is_pinned(&TileCoord::new(3, 0, 0)));
    }
}
