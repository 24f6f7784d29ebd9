pub mod compositor;
pub mod context;
pub mod headless;
pub mod raster;
pub mod screen_cache;
#[cfg(feature = "render")]
pub mod wgpu_backend;

pub use compositor::{FrameCompositor, FrameReport, LevelRole};
pub use context::{RenderContextProvider, ScreenRect, TextureHandle, TextureStore};
pub use headless::HeadlessContext;
pub use raster::{LevelDraw, LevelPass, RasterRenderer, TileRange};
pub use screen_cache::{ScreenCache, ScreenCacheSnapshot, ViewStamp};
#[cfg(feature = "render")]
pub use wgpu_backend::WgpuContext;
