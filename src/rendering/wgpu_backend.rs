//! wgpu implementation of the render context contract.
//!
//! Frames render into an offscreen target the host presents or copies.
//! Quads are batched and flushed in a single pass per flush point (the
//! snapshot request and the end of the frame).

use crate::core::geo::Size;
use crate::prelude::HashMap;
use crate::rendering::context::{RenderContextProvider, ScreenRect, TextureHandle, TextureStore};
use crate::tiles::decode::DecodedTile;
use crate::{MapError, Result};
use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

const TILE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

const QUAD_SHADER: &str = r#"
struct Globals {
    viewport: vec2<f32>,
    _pad: vec2<f32>,
};

@group(0) @binding(0) var<uniform> globals: Globals;
@group(0) @binding(1) var tile_texture: texture_2d<f32>;
@group(0) @binding(2) var tile_sampler: sampler;

struct VertexOut {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) alpha: f32,
};

@vertex
fn vs_main(
    @location(0) position: vec2<f32>,
    @location(1) uv: vec2<f32>,
    @location(2) alpha: f32,
) -> VertexOut {
    var out: VertexOut;
    let ndc = vec2<f32>(
        position.x / globals.viewport.x * 2.0 - 1.0,
        1.0 - position.y / globals.viewport.y * 2.0,
    );
    out.position = vec4<f32>(ndc, 0.0, 1.0);
    out.uv = uv;
    out.alpha = alpha;
    return out;
}

@fragment
fn fs_main(in: VertexOut) -> @location(0) vec4<f32> {
    let color = textureSample(tile_texture, tile_sampler, in.uv);
    return vec4<f32>(color.rgb, color.a * in.alpha);
}
"#;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    /// Physical pixels, origin top-left
    pub position: [f32; 2],
    pub uv: [f32; 2],
    pub alpha: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Globals {
    viewport: [f32; 2],
    _pad: [f32; 2],
}

/// Two triangles covering `rect` (CSS pixels) in physical pixels
pub fn quad_vertices(rect: ScreenRect, dpr: f32, alpha: f32) -> [QuadVertex; 6] {
    let (x0, y0) = (rect.x * dpr, rect.y * dpr);
    let (x1, y1) = ((rect.x + rect.width) * dpr, (rect.y + rect.height) * dpr);
    let v = |x: f32, y: f32, u: f32, t: f32| QuadVertex {
        position: [x, y],
        uv: [u, t],
        alpha,
    };
    [
        v(x0, y0, 0.0, 0.0),
        v(x0, y1, 0.0, 1.0),
        v(x1, y0, 1.0, 0.0),
        v(x1, y0, 1.0, 0.0),
        v(x0, y1, 0.0, 1.0),
        v(x1, y1, 1.0, 1.0),
    ]
}

struct GpuTexture {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

struct QueuedQuad {
    texture: TextureHandle,
    rect: ScreenRect,
    alpha: f32,
}

/// GPU-backed provider. Tile textures are mip-mapped, clamp-to-edge and
/// linearly filtered.
pub struct WgpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    target_format: wgpu::TextureFormat,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    globals: wgpu::Buffer,
    textures: HashMap<TextureHandle, GpuTexture>,
    next_id: u64,
    target: Option<(wgpu::Texture, wgpu::TextureView)>,
    snapshot: Option<TextureHandle>,
    quads: Vec<QueuedQuad>,
    cleared: bool,
    viewport: Size,
    dpr: f64,
}

impl WgpuContext {
    /// Creates a device on the default adapter and renders into
    /// `target_format` targets.
    pub async fn new(target_format: wgpu::TextureFormat) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| MapError::Render("no suitable GPU adapter".to_string()))?;
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("gtmap device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| MapError::Render(format!("failed to create device: {}", e)))?;
        Ok(Self::from_device(device, queue, target_format))
    }

    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue, target_format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Quad Shader"),
            source: wgpu::ShaderSource::Wgsl(QUAD_SHADER.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Quad Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Quad Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Quad Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2, 2 => Float32],
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Tile Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let globals = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Quad Globals"),
            size: std::mem::size_of::<Globals>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            device,
            queue,
            target_format,
            pipeline,
            bind_group_layout,
            sampler,
            globals,
            textures: HashMap::default(),
            next_id: 0,
            target: None,
            snapshot: None,
            quads: Vec::new(),
            cleared: false,
            viewport: Size::default(),
            dpr: 1.0,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// The texture the last frame was rendered into
    pub fn frame_texture(&self) -> Option<&wgpu::Texture> {
        self.target.as_ref().map(|(texture, _)| texture)
    }

    fn physical_size(&self) -> (u32, u32) {
        (
            (self.viewport.width * self.dpr).round().max(1.0) as u32,
            (self.viewport.height * self.dpr).round().max(1.0) as u32,
        )
    }

    fn insert(&mut self, texture: wgpu::Texture, width: u32, height: u32) -> TextureHandle {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Quad Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.globals.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        self.next_id += 1;
        let handle = TextureHandle(self.next_id);
        self.textures.insert(
            handle,
            GpuTexture {
                texture,
                bind_group,
                width,
                height,
            },
        );
        handle
    }

    fn ensure_target(&mut self) {
        let (width, height) = self.physical_size();
        if let Some((texture, _)) = &self.target {
            if texture.width() == width && texture.height() == height {
                return;
            }
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Frame Target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.target_format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.target = Some((texture, view));
    }

    /// Encodes the queued quads into one render pass
    fn flush(&mut self, encoder: &mut wgpu::CommandEncoder) {
        let Some((_, target_view)) = &self.target else {
            return;
        };
        let dpr = self.dpr as f32;
        let vertices: Vec<QuadVertex> = self
            .quads
            .iter()
            .filter(|q| self.textures.contains_key(&q.texture))
            .flat_map(|q| quad_vertices(q.rect, dpr, q.alpha))
            .collect();
        let load = if self.cleared {
            wgpu::LoadOp::Load
        } else {
            wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT)
        };
        let vertex_buffer = (!vertices.is_empty()).then(|| {
            self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Quad Vertices"),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            })
        });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Tile Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            if let Some(buffer) = &vertex_buffer {
                pass.set_pipeline(&self.pipeline);
                pass.set_vertex_buffer(0, buffer.slice(..));
                let mut first = 0u32;
                for quad in self.quads.iter() {
                    let Some(gpu) = self.textures.get(&quad.texture) else {
                        continue;
                    };
                    pass.set_bind_group(0, &gpu.bind_group, &[]);
                    pass.draw(first..first + 6, 0..1);
                    first += 6;
                }
            }
        }
        self.quads.clear();
        self.cleared = true;
    }
}

impl TextureStore for WgpuContext {
    fn upload(&mut self, tile: &DecodedTile) -> Result<TextureHandle> {
        if tile.width == 0 || tile.height == 0 || tile.mips.is_empty() {
            return Err(MapError::Render("empty tile image".to_string()));
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Tile Texture"),
            size: wgpu::Extent3d {
                width: tile.width,
                height: tile.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: tile.mip_level_count(),
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TILE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        for (level, mip) in tile.mips.iter().enumerate() {
            let (width, height) = mip.dimensions();
            self.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &texture,
                    mip_level: level as u32,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                mip.as_raw(),
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * width),
                    rows_per_image: Some(height),
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
        }
        Ok(self.insert(texture, tile.width, tile.height))
    }

    fn release(&mut self, texture: TextureHandle) {
        if let Some(gpu) = self.textures.remove(&texture) {
            gpu.texture.destroy();
        }
    }
}

impl RenderContextProvider for WgpuContext {
    fn begin_frame(&mut self, viewport: Size, dpr: f64) -> Result<()> {
        if viewport.is_empty() {
            return Err(MapError::Render("viewport has no area".to_string()));
        }
        self.viewport = viewport;
        self.dpr = if dpr.is_finite() && dpr > 0.0 { dpr } else { 1.0 };
        self.ensure_target();
        let (width, height) = self.physical_size();
        let globals = Globals {
            viewport: [width as f32, height as f32],
            _pad: [0.0; 2],
        };
        self.queue
            .write_buffer(&self.globals, 0, bytemuck::bytes_of(&globals));
        self.quads.clear();
        self.cleared = false;
        Ok(())
    }

    fn draw_quad(&mut self, texture: TextureHandle, rect: ScreenRect, alpha: f32) {
        self.quads.push(QueuedQuad {
            texture,
            rect,
            alpha: alpha.clamp(0.0, 1.0),
        });
    }

    fn snapshot_frame(&mut self) -> Result<Option<TextureHandle>> {
        let (width, height) = self.physical_size();
        let reuse = self
            .snapshot
            .and_then(|handle| self.textures.get(&handle).map(|gpu| (handle, gpu.width, gpu.height)))
            .filter(|(_, w, h)| *w == width && *h == height)
            .map(|(handle, _, _)| handle);
        let handle = match reuse {
            Some(handle) => handle,
            None => {
                if let Some(stale) = self.snapshot.take() {
                    self.release(stale);
                }
                let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("Screen Cache Snapshot"),
                    size: wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: self.target_format,
                    usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                });
                let handle = self.insert(texture, width, height);
                self.snapshot = Some(handle);
                handle
            }
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Snapshot Encoder"),
            });
        self.flush(&mut encoder);
        let (Some((target, _)), Some(snapshot)) = (&self.target, self.textures.get(&handle)) else {
            return Ok(None);
        };
        encoder.copy_texture_to_texture(
            target.as_image_copy(),
            snapshot.texture.as_image_copy(),
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));
        Ok(Some(handle))
    }

    fn end_frame(&mut self) -> Result<()> {
        if self.target.is_none() {
            return Err(MapError::Render("end_frame without begin_frame".to_string()));
        }
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });
        self.flush(&mut encoder);
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_vertices_scale_by_dpr() {
        let v = quad_vertices(ScreenRect::new(10.0, 20.0, 100.0, 50.0), 2.0, 0.5);
        assert_eq!(v[0].position, [20.0, 40.0]);
        assert_eq!(v[5].position, [220.0, 140.0]);
        assert_eq!(v[5].uv, [1.0, 1.0]);
        assert!(v.iter().all(|q| q.alpha == 0.5));
    }

    #[test]
    fn test_vertex_layout_is_packed() {
        assert_eq!(std::mem::size_of::<QuadVertex>(), 20);
        assert_eq!(std::mem::size_of::<Globals>(), 16);
    }
}
