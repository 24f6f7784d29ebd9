//! Core constants for the tile streaming and viewport engine.
//! Keeping them in a single place makes it easier to tweak engine-wide magic numbers.

/// Default square tile size in pixels.
pub const TILE_SIZE: u32 = 256;

/// Deepest pyramid level the engine will address.
pub const MAX_PYRAMID_LEVEL: u8 = 24;

/// Number of textures the tile cache may hold before LRU eviction kicks in.
pub const DEFAULT_MAX_TILES: usize = 384;

/// Simultaneous fetch/decode jobs allowed by the pipeline.
pub const DEFAULT_MAX_INFLIGHT_LOADS: usize = 8;

/// Time since the last input after which the map counts as idle.
pub const DEFAULT_INTERACTION_IDLE_MS: f64 = 160.0;

/// Upper bound on the baseline prefetch grid (tiles). The baseline level is
/// lowered until its full grid fits.
pub const MAX_BASELINE_TILES: usize = 256;

/// Base coverage at which fallback levels stop being drawn.
pub const FULL_COVERAGE: f64 = 0.995;

/// Fractional zoom above which the next level is cross-faded in.
pub const CROSSFADE_MIN_FRACTION: f64 = 0.01;

/// Zoom easing duration model: `clamp(base + per_unit * |dz|, min, max)`.
pub const EASE_BASE_MS: f64 = 150.0;
pub const EASE_PER_UNIT_MS: f64 = 240.0;
pub const EASE_MIN_MS: f64 = 120.0;
pub const EASE_MAX_MS: f64 = 420.0;

/// Blend weight per unit of zoom-out toward the center-preserving result.
pub const DEFAULT_OUT_CENTER_BIAS: f64 = 0.15;

/// Cap on the zoom-out center bias.
pub const MAX_OUT_CENTER_BIAS: f64 = 0.6;

/// World coverage at which pointer anchoring is replaced by center anchoring.
pub const CENTER_LOCK_ENGAGE_COVERAGE: f64 = 0.995;

/// Coverage under which the center lock may release again.
pub const CENTER_LOCK_RELEASE_COVERAGE: f64 = 0.90;

/// Minimum time the center lock stays engaged.
pub const CENTER_LOCK_MIN_MS: f64 = 300.0;

/// Wheel zoom per normalized line, plain and with Ctrl held.
pub const DEFAULT_WHEEL_SPEED: f64 = 0.15;
pub const DEFAULT_WHEEL_SPEED_CTRL: f64 = 0.4;

/// Per-event wheel zoom delta spike guard.
pub const MAX_WHEEL_ZOOM_DELTA: f64 = 2.0;

/// `deltaMode` normalization to lines.
pub const WHEEL_PIXELS_PER_LINE: f64 = 100.0 / 3.0;
pub const WHEEL_LINES_PER_PAGE: f64 = 10.0;

/// Screen cache validity window on the scale ratio (exclusive).
pub const SCREEN_CACHE_MIN_RATIO: f64 = 0.92;
pub const SCREEN_CACHE_MAX_RATIO: f64 = 1.08;

/// Inertia defaults, in CSS pixels and seconds.
pub const DEFAULT_INERTIA_DECELERATION: f64 = 3400.0;
pub const DEFAULT_INERTIA_MAX_SPEED: f64 = 6000.0;
pub const DEFAULT_EASE_LINEARITY: f64 = 0.2;

/// Drag samples older than this do not contribute to inertia velocity.
pub const INERTIA_SAMPLE_WINDOW_MS: f64 = 100.0;

/// Release speeds below this (px/s) end the drag without inertia.
pub const INERTIA_MIN_SPEED: f64 = 60.0;

/// Default fly-to duration.
pub const DEFAULT_FLY_DURATION_MS: f64 = 600.0;
