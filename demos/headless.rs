use gtmap::prelude::*;
use image::{ImageOutputFormat, Rgba, RgbaImage};
use std::io::Cursor;

/// Streams a GTPK pack through the engine without a GPU.
///
/// Pass a `.gtpk` path to use a real pack; otherwise a small checkerboard
/// pyramid is generated in memory.
fn main() -> gtmap::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run())
}

async fn run() -> gtmap::Result<()> {
    println!("GTMap Headless Example");
    println!("======================");

    let pack = match std::env::args().nth(1) {
        Some(path) => GtpkPack::parse(std::fs::read(&path)?)?,
        None => GtpkPack::parse(checkerboard_pack(3, 256)?)?,
    };
    let (min_zoom, max_zoom) = pack
        .zoom_range()
        .ok_or_else(|| MapError::InvalidPack("pack has no tiles".into()))?;
    println!("Pack: {} tiles of {}px, levels {}..={}", pack.len(), pack.tile_size(), min_zoom, max_zoom);

    let mut options = TileSourceOptions::new(Arc::new(GtpkTileSource::new(pack.clone())), min_zoom, max_zoom);
    options.tile_size = pack.tile_size();

    let mut engine = MapEngine::new(EngineProfile::Balanced);
    let mut ctx = HeadlessContext::new();
    let events = engine.subscribe();
    engine.resize(1024.0, 768.0, 1.0);
    engine.set_tile_source(options, &mut ctx);

    let mut now = 0.0;
    let frame = |engine: &mut MapEngine, ctx: &mut HeadlessContext, now: &mut f64| {
        *now += 16.67;
        engine.render_frame(ctx, *now)
    };

    println!("\nWaiting for the first complete frame:");
    loop {
        let report = frame(&mut engine, &mut ctx, &mut now)?;
        if report.load_complete || engine.frame_count() > 600 {
            println!(
                "   frame {}: level {} coverage {:.2}, {} tiles cached",
                engine.frame_count(),
                report.base_level,
                report.base_coverage,
                engine.cache().len()
            );
            break;
        }
        tokio::time::sleep(Duration::from_millis(4)).await;
    }

    println!("\nWheel zoom at the cursor:");
    engine.handle_input(
        &InputEvent::Wheel {
            position: Point::new(300.0, 200.0),
            delta_y: -4.0,
            mode: WheelDeltaMode::Line,
            ctrl: false,
        },
        now,
    );
    while engine.is_animating() {
        frame(&mut engine, &mut ctx, &mut now)?;
        tokio::time::sleep(Duration::from_millis(4)).await;
    }
    println!("   zoom {:.3}, center {:?}", engine.zoom(), engine.center());

    println!("\nFly back to the middle of the world:");
    let world = (1u64 << max_zoom) as f64 * pack.tile_size() as f64;
    engine.fly_to(
        FlyToOptions {
            center: Some(Point::new(world / 2.0, world / 2.0)),
            zoom: Some(min_zoom as f64),
            ..FlyToOptions::default()
        },
        now,
    );
    while engine.is_animating() {
        frame(&mut engine, &mut ctx, &mut now)?;
        tokio::time::sleep(Duration::from_millis(4)).await;
    }
    println!("   zoom {:.3}, center {:?}", engine.zoom(), engine.center());

    let mut counts: std::collections::BTreeMap<&'static str, usize> = Default::default();
    for event in events.try_iter() {
        let name = match event {
            MapEvent::Move { .. } => "move",
            MapEvent::MoveEnd { .. } => "moveend",
            MapEvent::Zoom { .. } => "zoom",
            MapEvent::ZoomEnd { .. } => "zoomend",
            MapEvent::Load => "load",
            MapEvent::Resize { .. } => "resize",
            _ => "pointer",
        };
        *counts.entry(name).or_default() += 1;
    }
    println!("\nEvents: {:?}", counts);
    println!(
        "Textures: {} uploaded, {} live, {} frames rendered",
        ctx.uploads(),
        ctx.live_textures(),
        ctx.frames()
    );

    engine.clear(&mut ctx);
    println!("After clear: {} live textures", ctx.live_textures());
    Ok(())
}

/// Builds a pack with every tile of levels `0..=max_level` in memory
fn checkerboard_pack(max_level: u8, tile_size: u32) -> gtmap::Result<Vec<u8>> {
    let mut blobs = Vec::new();
    for z in 0..=max_level {
        let n = 1u32 << z;
        for y in 0..n {
            for x in 0..n {
                let shade = if (x + y) % 2 == 0 { 200 } else { 60 };
                let image = RgbaImage::from_pixel(tile_size, tile_size, Rgba([shade, shade, 40 * z, 255]));
                let mut out = Cursor::new(Vec::new());
                image::DynamicImage::ImageRgba8(image).write_to(&mut out, ImageOutputFormat::Png)?;
                blobs.push((z, x, y, out.into_inner()));
            }
        }
    }

    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"GTPK");
    bytes.extend_from_slice(&1u32.to_le_bytes());
    bytes.extend_from_slice(&(blobs.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&tile_size.to_le_bytes());
    let mut offset = 16 + 13 * blobs.len();
    for (z, x, y, blob) in &blobs {
        bytes.push(*z);
        bytes.extend_from_slice(&(*x as u16).to_le_bytes());
        bytes.extend_from_slice(&(*y as u16).to_le_bytes());
        bytes.extend_from_slice(&(offset as u32).to_le_bytes());
        bytes.extend_from_slice(&(blob.len() as u32).to_le_bytes());
        offset += blob.len();
    }
    for (_, _, _, blob) in blobs {
        bytes.extend_from_slice(&blob);
    }
    Ok(bytes)
}
