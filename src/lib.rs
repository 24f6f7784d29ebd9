//! # GTMap
//!
//! Tile streaming and viewport engine for huge pixel-addressed raster maps.
//!
//! A game-world map image is cut into a power-of-two tile pyramid (optionally
//! packed into a single GTPK file). This crate owns everything between raw
//! input and GPU draw calls: tile addressing, the bounded texture cache, the
//! priority-aware async load pipeline, multi-resolution frame compositing and
//! the anchored zoom/pan/bounds math. The GPU itself is reached through the
//! [`rendering::context::RenderContextProvider`] contract.

pub mod animation;
pub mod core;
pub mod input;
pub mod prelude;
pub mod rendering;
pub mod runtime;
pub mod tiles;
pub mod traits;
pub use crate::core::constants;

// Re-export public API
pub use crate::core::{
    bounds::Bounds,
    config::{EngineConfig, EngineProfile},
    geo::{Point, Size, TileCoord},
    map::{FlyToOptions, MapEngine, TileSourceOptions},
    viewport::ViewState,
};

pub use tiles::{
    cache::TileCache,
    gtpk::GtpkPack,
    pipeline::TilePipeline,
    queue::{TilePriority, TileQueue},
    source::{GtpkTileSource, TileSource, XyzTileSource},
};

pub use input::{
    events::{EventBus, InputEvent, MapEvent},
    handler::InputController,
};

pub use animation::zoom::{AnchorMode, ZoomController};

pub use rendering::{
    compositor::{FrameCompositor, FrameReport},
    context::{RenderContextProvider, TextureHandle, TextureStore},
    headless::HeadlessContext,
};

#[cfg(feature = "render")]
pub use rendering::wgpu_backend::WgpuContext;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, MapError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Invalid tile pack: {0}")]
    InvalidPack(String),

    #[error("Invalid tile: {0}")]
    InvalidTile(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl From<bincode::Error> for MapError {
    fn from(err: bincode::Error) -> Self {
        MapError::InvalidPack(err.to_string())
    }
}

impl From<image::ImageError> for MapError {
    fn from(err: image::ImageError) -> Self {
        MapError::Decode(err.to_string())
    }
}

/// Error type alias for convenience
pub type Error = MapError;
