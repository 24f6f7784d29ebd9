//! Configuration system for engine tuning
//!
//! Every knob of the tile pipeline, zoom easing, wheel handling, inertia and
//! screen cache lives here. Configurations are plain serde structs so a
//! facade can ship them as JSON; presets cover the common trade-offs.

use crate::animation::{easing::EasingType, zoom::AnchorMode};
use crate::constants::*;
use crate::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineProfile {
    Balanced,
    LowResource,
    HighQuality,
    Custom(EngineConfig),
}

impl EngineProfile {
    pub fn resolve(&self) -> EngineConfig {
        match self {
            Self::Balanced => EngineConfig::default(),
            Self::LowResource => EngineConfig {
                tiles: TileLoadingConfig {
                    max_tiles: 160,
                    max_inflight_loads: 4,
                    next_level_crossfade: false,
                    ..TileLoadingConfig::default()
                },
                screen_cache: ScreenCacheConfig {
                    enabled: false,
                    ..ScreenCacheConfig::default()
                },
                ..EngineConfig::default()
            },
            Self::HighQuality => EngineConfig {
                tiles: TileLoadingConfig {
                    max_tiles: 1024,
                    max_inflight_loads: 16,
                    ..TileLoadingConfig::default()
                },
                zoom: ZoomEasingConfig {
                    ease_max_ms: 520.0,
                    ..ZoomEasingConfig::default()
                },
                ..EngineConfig::default()
            },
            Self::Custom(config) => config.clone(),
        }
    }
}

impl Default for EngineProfile {
    fn default() -> Self {
        Self::Balanced
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tiles: TileLoadingConfig,
    pub zoom: ZoomEasingConfig,
    pub wheel: WheelConfig,
    pub inertia: InertiaOptions,
    pub screen_cache: ScreenCacheConfig,
}

impl EngineConfig {
    /// Parses a (possibly partial) JSON configuration; missing fields keep
    /// their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileLoadingConfig {
    /// Texture budget of the tile cache
    pub max_tiles: usize,
    pub max_inflight_loads: usize,
    pub interaction_idle_ms: f64,
    /// Level whose whole grid is pinned as a backdrop. `None` uses the
    /// source's minimum zoom.
    pub baseline_level: Option<u8>,
    pub baseline_prefetch: bool,
    pub next_level_crossfade: bool,
}

impl Default for TileLoadingConfig {
    fn default() -> Self {
        Self {
            max_tiles: DEFAULT_MAX_TILES,
            max_inflight_loads: DEFAULT_MAX_INFLIGHT_LOADS,
            interaction_idle_ms: DEFAULT_INTERACTION_IDLE_MS,
            baseline_level: None,
            baseline_prefetch: true,
            next_level_crossfade: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomEasingConfig {
    pub ease_base_ms: f64,
    pub ease_per_unit_ms: f64,
    pub ease_min_ms: f64,
    pub ease_max_ms: f64,
    pub out_center_bias: f64,
    /// Anchor used by wheel zoom
    pub wheel_anchor: AnchorMode,
}

impl ZoomEasingConfig {
    pub fn duration_ms(&self, dz: f64) -> f64 {
        (self.ease_base_ms + self.ease_per_unit_ms * dz.abs()).clamp(self.ease_min_ms, self.ease_max_ms)
    }
}

impl Default for ZoomEasingConfig {
    fn default() -> Self {
        Self {
            ease_base_ms: EASE_BASE_MS,
            ease_per_unit_ms: EASE_PER_UNIT_MS,
            ease_min_ms: EASE_MIN_MS,
            ease_max_ms: EASE_MAX_MS,
            out_center_bias: DEFAULT_OUT_CENTER_BIAS,
            wheel_anchor: AnchorMode::Pointer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelConfig {
    /// Zoom per normalized wheel line
    pub speed: f64,
    /// Zoom per line while Ctrl is held (trackpad pinch on most platforms)
    pub ctrl_speed: f64,
    pub max_delta: f64,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            speed: DEFAULT_WHEEL_SPEED,
            ctrl_speed: DEFAULT_WHEEL_SPEED_CTRL,
            max_delta: MAX_WHEEL_ZOOM_DELTA,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InertiaOptions {
    pub enabled: bool,
    /// px/s²
    pub deceleration: f64,
    /// px/s
    pub max_speed: f64,
    pub ease_linearity: f64,
    pub easing: EasingType,
}

impl Default for InertiaOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            deceleration: DEFAULT_INERTIA_DECELERATION,
            max_speed: DEFAULT_INERTIA_MAX_SPEED,
            ease_linearity: DEFAULT_EASE_LINEARITY,
            easing: EasingType::EaseOut,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenCacheConfig {
    pub enabled: bool,
    pub alpha: f32,
}

impl Default for ScreenCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            alpha: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_profile_presets() {
        let balanced = EngineProfile::Balanced.resolve();
        let low = EngineProfile::LowResource.resolve();
        let high = EngineProfile::HighQuality.resolve();

        assert_eq!(balanced.tiles.max_tiles, 384);
        assert_eq!(balanced.tiles.max_inflight_loads, 8);
        assert!(low.tiles.max_tiles < balanced.tiles.max_tiles);
        assert!(!low.screen_cache.enabled);
        assert!(high.tiles.max_inflight_loads > balanced.tiles.max_inflight_loads);
    }

    #[test]
    fn test_ease_duration_is_clamped() {
        let zoom = ZoomEasingConfig::default();
        assert_eq!(zoom.duration_ms(0.0), EASE_BASE_MS);
        assert_eq!(zoom.duration_ms(10.0), EASE_MAX_MS);
        assert_eq!(zoom.duration_ms(-0.5), EASE_BASE_MS + EASE_PER_UNIT_MS * 0.5);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(r#"{"tiles": {"max_tiles": 64}}"#).unwrap();
        assert_eq!(config.tiles.max_tiles, 64);
        assert_eq!(config.tiles.max_inflight_loads, DEFAULT_MAX_INFLIGHT_LOADS);
        assert_eq!(config.wheel, WheelConfig::default());
    }

    #[test]
    fn test_json_round_trip() {
        let config = EngineProfile::HighQuality.resolve();
        let json = config.to_json().unwrap();
        assert_eq!(EngineConfig::from_json(&json).unwrap(), config);
    }
}
