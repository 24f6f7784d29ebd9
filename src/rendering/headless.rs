use crate::core::geo::Size;
use crate::prelude::HashMap;
use crate::rendering::context::{RenderContextProvider, ScreenRect, TextureHandle, TextureStore};
use crate::tiles::decode::DecodedTile;
use crate::Result;

/// Commands recorded by the headless provider
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Quad {
        texture: TextureHandle,
        rect: ScreenRect,
        alpha: f32,
    },
    Snapshot {
        texture: TextureHandle,
    },
}

/// A provider with no GPU behind it. Textures are bookkeeping entries and
/// draws are recorded per frame, which makes compositing observable in tests
/// and in the `headless` demo.
#[derive(Debug, Default)]
pub struct HeadlessContext {
    textures: HashMap<TextureHandle, (u32, u32)>,
    next_id: u64,
    uploads: usize,
    released: Vec<TextureHandle>,
    drawing_queue: Vec<DrawCommand>,
    snapshot: Option<TextureHandle>,
    snapshots_enabled: bool,
    viewport: Size,
    dpr: f64,
    frames: u64,
}

impl HeadlessContext {
    pub fn new() -> Self {
        Self {
            snapshots_enabled: true,
            dpr: 1.0,
            ..Self::default()
        }
    }

    /// Provider that reports no snapshot support
    pub fn without_snapshots() -> Self {
        Self {
            snapshots_enabled: false,
            ..Self::new()
        }
    }

    fn allocate(&mut self, width: u32, height: u32) -> TextureHandle {
        self.next_id += 1;
        let handle = TextureHandle(self.next_id);
        self.textures.insert(handle, (width, height));
        handle
    }

    /// Registers a texture without decoded pixels
    pub fn fake_texture(&mut self, width: u32, height: u32) -> TextureHandle {
        self.allocate(width, height)
    }

    pub fn uploads(&self) -> usize {
        self.uploads
    }

    pub fn released(&self) -> &[TextureHandle] {
        &self.released
    }

    /// Textures allocated and not yet released (the snapshot excluded)
    pub fn live_textures(&self) -> usize {
        self.textures.len() - usize::from(self.snapshot.is_some())
    }

    pub fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.textures.get(&texture).copied()
    }

    /// Commands issued since the last `begin_frame`
    pub fn commands(&self) -> &[DrawCommand] {
        &self.drawing_queue
    }

    pub fn quads(&self) -> impl Iterator<Item = (TextureHandle, ScreenRect, f32)> + '_ {
        self.drawing_queue.iter().filter_map(|cmd| match cmd {
            DrawCommand::Quad {
                texture,
                rect,
                alpha,
            } => Some((*texture, *rect, *alpha)),
            DrawCommand::Snapshot { .. } => None,
        })
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl TextureStore for HeadlessContext {
    fn upload(&mut self, tile: &DecodedTile) -> Result<TextureHandle> {
        self.uploads += 1;
        Ok(self.allocate(tile.width, tile.height))
    }

    fn release(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture).is_some() {
            self.released.push(texture);
        } else {
            log::warn!("release of unknown texture {:?}", texture);
        }
    }
}

impl RenderContextProvider for HeadlessContext {
    fn begin_frame(&mut self, viewport: Size, dpr: f64) -> Result<()> {
        self.drawing_queue.clear();
        self.viewport = viewport;
        self.dpr = dpr;
        Ok(())
    }

    fn draw_quad(&mut self, texture: TextureHandle, rect: ScreenRect, alpha: f32) {
        self.drawing_queue.push(DrawCommand::Quad {
            texture,
            rect,
            alpha,
        });
    }

    fn snapshot_frame(&mut self) -> Result<Option<TextureHandle>> {
        if !self.snapshots_enabled {
            return Ok(None);
        }
        let width = (self.viewport.width * self.dpr).round().max(1.0) as u32;
        let height = (self.viewport.height * self.dpr).round().max(1.0) as u32;
        let texture = match self.snapshot {
            Some(texture) if self.texture_size(texture) == Some((width, height)) => texture,
            stale => {
                if let Some(old) = stale {
                    self.textures.remove(&old);
                }
                let texture = self.allocate(width, height);
                self.snapshot = Some(texture);
                texture
            }
        };
        self.drawing_queue.push(DrawCommand::Snapshot { texture });
        Ok(Some(texture))
    }

    fn end_frame(&mut self) -> Result<()> {
        self.frames += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    #[test]
    fn test_upload_release_bookkeeping() {
        let mut ctx = HeadlessContext::new();
        let tile = DecodedTile::from_rgba(RgbaImage::new(8, 8));
        let a = ctx.upload(&tile).unwrap();
        let b = ctx.upload(&tile).unwrap();
        assert_ne!(a, b);
        assert_eq!(ctx.live_textures(), 2);
        ctx.release(a);
        assert_eq!(ctx.released(), &[a]);
        assert_eq!(ctx.live_textures(), 1);
        assert_eq!(ctx.texture_size(b), Some((8, 8)));
    }

    #[test]
    fn test_frame_records_draws() {
        let mut ctx = HeadlessContext::new();
        let tex = ctx.fake_texture(256, 256);
        ctx.begin_frame(Size::new(100.0, 100.0), 2.0).unwrap();
        ctx.draw_quad(tex, ScreenRect::new(0.0, 0.0, 50.0, 50.0), 1.0);
        let snap = ctx.snapshot_frame().unwrap().unwrap();
        ctx.end_frame().unwrap();

        assert_eq!(ctx.quads().count(), 1);
        assert_eq!(ctx.texture_size(snap), Some((200, 200)));
        assert_eq!(ctx.live_textures(), 1);

        ctx.begin_frame(Size::new(100.0, 100.0), 2.0).unwrap();
        assert!(ctx.commands().is_empty());
        assert_eq!(ctx.snapshot_frame().unwrap(), Some(snap));
    }
}
