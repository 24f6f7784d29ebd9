use crate::tiles::source::ImageFormatHint;
use crate::{MapError, Result};
use image::imageops::{self, FilterType};
use image::RgbaImage;

/// RGBA8 pixels of one tile plus its CPU-built mip chain (level 0 first)
#[derive(Debug, Clone)]
pub struct DecodedTile {
    pub width: u32,
    pub height: u32,
    pub mips: Vec<RgbaImage>,
}

impl DecodedTile {
    pub fn from_rgba(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        let mut mips = vec![image];
        let (mut w, mut h) = (width, height);
        while w > 1 || h > 1 {
            w = (w / 2).max(1);
            h = (h / 2).max(1);
            let next = match mips.last() {
                Some(prev) => imageops::resize(prev, w, h, FilterType::Triangle),
                None => break,
            };
            mips.push(next);
        }
        Self {
            width,
            height,
            mips,
        }
    }

    pub fn mip_level_count(&self) -> u32 {
        self.mips.len() as u32
    }

    /// Bytes of the full-resolution level
    pub fn pixels(&self) -> &[u8] {
        self.mips.first().map(|m| m.as_raw().as_slice()).unwrap_or(&[])
    }
}

/// Turns encoded tile bytes into pixels
pub trait TileDecoder: Send + Sync {
    fn name(&self) -> &'static str;

    fn decode(&self, bytes: &[u8], hint: ImageFormatHint) -> Result<DecodedTile>;
}

/// Fast path: trusts the source's declared format and skips sniffing
#[derive(Debug, Default, Clone, Copy)]
pub struct HintedDecoder;

impl TileDecoder for HintedDecoder {
    fn name(&self) -> &'static str {
        "hinted"
    }

    fn decode(&self, bytes: &[u8], hint: ImageFormatHint) -> Result<DecodedTile> {
        let format = hint
            .image_format()
            .ok_or_else(|| MapError::Decode("source declares no image format".into()))?;
        let image = image::load_from_memory_with_format(bytes, format)?;
        Ok(DecodedTile::from_rgba(image.to_rgba8()))
    }
}

/// Fallback: guesses the format from the leading bytes
#[derive(Debug, Default, Clone, Copy)]
pub struct SniffingDecoder;

impl TileDecoder for SniffingDecoder {
    fn name(&self) -> &'static str {
        "sniffing"
    }

    fn decode(&self, bytes: &[u8], _hint: ImageFormatHint) -> Result<DecodedTile> {
        if bytes.is_empty() {
            return Err(MapError::Decode("empty tile body".into()));
        }
        let image = image::load_from_memory(bytes)?;
        Ok(DecodedTile::from_rgba(image.to_rgba8()))
    }
}
