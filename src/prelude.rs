//! Prelude module for common gtmap types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use gtmap::prelude::*;`

pub use crate::core::{
    bounds::Bounds,
    config::{
        EngineConfig, EngineProfile, InertiaOptions, ScreenCacheConfig, TileLoadingConfig,
        WheelConfig, ZoomEasingConfig,
    },
    geo::{Point, Size, TileCoord},
    map::{FlyToOptions, MapEngine, TileSourceOptions},
    viewport::ViewState,
};

pub use crate::tiles::{
    cache::{TileCache, TileRecord, TileStatus},
    decode::{DecodedTile, TileDecoder},
    gtpk::GtpkPack,
    loader::TileLoader,
    pipeline::TilePipeline,
    queue::{TilePriority, TileQueue, TileTask},
    source::{GtpkTileSource, ImageFormatHint, TileSource, XyzTileSource},
};

pub use crate::input::{
    events::{EventBus, InputEvent, MapEvent, PointerButton, TouchPhase, TouchPoint, WheelDeltaMode},
    handler::InputController,
};

pub use crate::animation::{
    easing::EasingType,
    pan::PanAnimation,
    zoom::{AnchorMode, ZoomController},
};

pub use crate::rendering::{
    compositor::{FrameCompositor, FrameReport},
    context::{RenderContextProvider, ScreenRect, TextureHandle, TextureStore},
    headless::HeadlessContext,
};

pub use crate::runtime::{runtime, spawn, AsyncHandle, AsyncSpawner};

pub use crate::traits::ViewMutator;

pub use crate::{Error as MapError, Result};

pub use std::{
    cmp::Ordering,
    pin::Pin,
    sync::{Arc, Mutex},
    time::Duration,
};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet, FxHasher};

pub use futures::Future;
