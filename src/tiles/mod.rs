pub mod cache;
pub mod decode;
pub mod gtpk;
pub mod loader;
pub mod pipeline;
pub mod queue;
pub mod source;

// Re-exports for convenience
pub use cache::{TileCache, TileStatus};
pub use loader::TileLoader;
pub use pipeline::TilePipeline;
pub use queue::{TilePriority, TileQueue};
pub use source::{GtpkTileSource, TileSource, XyzTileSource};
