use crate::MapError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Represents a point in screen, world-pixel or native-pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn add(&self, other: &Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }

    pub fn subtract(&self, other: &Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    pub fn multiply(&self, scalar: f64) -> Point {
        Point::new(self.x * scalar, self.y * scalar)
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn floor(&self) -> Point {
        Point::new(self.x.floor(), self.y.floor())
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Viewport dimensions in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn half(&self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

impl Default for Size {
    fn default() -> Self {
        Self::new(800.0, 600.0)
    }
}

/// Number of tiles along one axis of level `z`.
pub fn tiles_per_axis(z: u8) -> u32 {
    1u32 << z
}

/// Full pixel extent of level `z` along one axis.
pub fn world_size(tile_size: u32, z: u8) -> f64 {
    tile_size as f64 * 2_f64.powi(z as i32)
}

/// Wraps a horizontal tile index into `[0, 2^z)`.
pub fn wrap_x(x: i64, z: u8) -> u32 {
    let n = tiles_per_axis(z) as i64;
    (((x % n) + n) % n) as u32
}

/// Identity of one tile in the pyramid. Displays (and parses) as `z/x/y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Builds a coordinate from unbounded indices, returning `None` for tiles
    /// outside the grid. Horizontal indices are wrapped when `wrap` is set.
    pub fn checked(z: u8, x: i64, y: i64, wrap: bool) -> Option<Self> {
        if z > crate::constants::MAX_PYRAMID_LEVEL {
            return None;
        }
        let n = tiles_per_axis(z) as i64;
        if y < 0 || y >= n {
            return None;
        }
        let x = if wrap {
            wrap_x(x, z)
        } else if x < 0 || x >= n {
            return None;
        } else {
            x as u32
        };
        Some(Self::new(z, x, y as u32))
    }

    /// The `z/x/y` string key
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// Center of the tile in world pixels of its own level
    pub fn center_world(&self, tile_size: u32) -> Point {
        let ts = tile_size as f64;
        Point::new((self.x as f64 + 0.5) * ts, (self.y as f64 + 0.5) * ts)
    }

    /// Gets the parent tile at a lower zoom level
    pub fn parent(&self) -> Option<TileCoord> {
        if self.z == 0 {
            None
        } else {
            Some(TileCoord::new(self.z - 1, self.x / 2, self.y / 2))
        }
    }

    /// Checks if the tile is valid for its zoom level
    pub fn is_valid(&self) -> bool {
        let max_coord = tiles_per_axis(self.z);
        self.x < max_coord && self.y < max_coord
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

impl FromStr for TileCoord {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        let [z, x, y] = parts.as_slice() else {
            return Err(MapError::InvalidTile(format!("expected z/x/y, got '{}'", s)));
        };
        let bad = |_| MapError::InvalidTile(format!("non-numeric key '{}'", s));
        Ok(Self::new(
            z.parse().map_err(bad)?,
            x.parse().map_err(bad)?,
            y.parse().map_err(bad)?,
        ))
    }
}
