use crate::core::geo::{Point, TileCoord};
use crate::core::viewport::level_factor;
use crate::prelude::{HashMap, HashSet, Ordering};

/// Priority for tile loading (higher number = higher priority)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TilePriority {
    /// Next-level tiles for the cross-fade; only loaded while idle
    Prefetch = 10,
    /// Tiles of the base level in view
    Visible = 100,
    /// The pinned low-resolution backdrop
    Baseline = 200,
}

/// A queued tile load
#[derive(Debug, Clone, PartialEq)]
pub struct TileTask {
    pub coord: TileCoord,
    pub url: String,
    pub priority: TilePriority,
    /// Enqueue order, for the final tie-break
    pub sequence: u64,
}

/// Pending loads keyed by tile. Selection is a linear scan; the queue rarely
/// holds more than a few hundred tasks and the ranking depends on the view at
/// the moment of selection.
#[derive(Debug)]
pub struct TileQueue {
    tasks: HashMap<TileCoord, TileTask>,
    next_sequence: u64,
    tile_size: u32,
}

impl TileQueue {
    pub fn new(tile_size: u32) -> Self {
        Self {
            tasks: HashMap::default(),
            next_sequence: 0,
            tile_size,
        }
    }

    pub fn set_tile_size(&mut self, tile_size: u32) {
        self.tile_size = tile_size;
    }

    /// Queues a load. A key that is already queued keeps its task; only its
    /// priority may be raised. Returns whether a new task was created.
    pub fn enqueue(&mut self, coord: TileCoord, url: String, priority: TilePriority) -> bool {
        if let Some(existing) = self.tasks.get_mut(&coord) {
            existing.priority = existing.priority.max(priority);
            return false;
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.tasks.insert(
            coord,
            TileTask {
                coord,
                url,
                priority,
                sequence,
            },
        );
        true
    }

    pub fn has(&self, coord: &TileCoord) -> bool {
        self.tasks.contains_key(coord)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Removes and returns the best eligible task.
    ///
    /// Highest priority wins, then the tile closest to `center_world`
    /// (pixels of `zoom_level`), then the earliest enqueued. While the user is
    /// interacting only `Visible` and `Baseline` tasks are eligible.
    pub fn next(&mut self, zoom_level: u8, center_world: Point, idle: bool) -> Option<TileTask> {
        let best = self
            .tasks
            .values()
            .filter(|task| idle || task.priority >= TilePriority::Visible)
            .map(|task| (task, self.distance_sq(&task.coord, zoom_level, &center_world)))
            .min_by(|(a, da), (b, db)| {
                b.priority
                    .cmp(&a.priority)
                    .then_with(|| da.partial_cmp(db).unwrap_or(Ordering::Equal))
                    .then_with(|| a.sequence.cmp(&b.sequence))
            })
            .map(|(task, _)| task.coord)?;
        self.tasks.remove(&best)
    }

    fn distance_sq(&self, coord: &TileCoord, zoom_level: u8, center_world: &Point) -> f64 {
        let center = coord
            .center_world(self.tile_size)
            .multiply(level_factor(coord.z, zoom_level));
        let dx = center.x - center_world.x;
        let dy = center.y - center_world.y;
        dx * dx + dy * dy
    }

    /// Drops queued tasks that are no longer wanted. Baseline tasks are kept.
    pub fn prune(&mut self, wanted: &HashSet<TileCoord>) -> Vec<TileCoord> {
        let removed: Vec<TileCoord> = self
            .tasks
            .values()
            .filter(|task| task.priority != TilePriority::Baseline && !wanted.contains(&task.coord))
            .map(|task| task.coord)
            .collect();
        for coord in &removed {
            self.tasks.remove(coord);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }
}
