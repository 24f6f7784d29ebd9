//! Reader for GTPK tile packs.
//!
//! Layout (little-endian, fixed width):
//!
//! ```text
//! header   magic "GTPK" | version u32 (=1) | tile_count u32 | tile_size u32
//! index    tile_count × { zoom u8, x u16, y u16, data_offset u32, data_length u32 }
//! blobs    encoded tiles; offsets are absolute from the start of the file
//! ```

use crate::core::geo::TileCoord;
use crate::{MapError, Result};
use bincode::Options;
use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const GTPK_MAGIC: [u8; 4] = *b"GTPK";
pub const GTPK_VERSION: u32 = 1;
pub const HEADER_LEN: usize = 16;
pub const ENTRY_LEN: usize = 13;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(crate) struct RawHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub tile_count: u32,
    pub tile_size: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(crate) struct RawEntry {
    pub zoom: u8,
    pub x: u16,
    pub y: u16,
    pub data_offset: u32,
    pub data_length: u32,
}

pub(crate) fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .allow_trailing_bytes()
}

/// A parsed pack: the raw bytes plus an index from coordinate to blob
#[derive(Debug, Clone)]
pub struct GtpkPack {
    bytes: Vec<u8>,
    tile_size: u32,
    index: FxHashMap<TileCoord, (usize, usize)>,
}

impl GtpkPack {
    pub fn parse(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(MapError::InvalidPack(format!(
                "file is {} bytes, header needs {}",
                bytes.len(),
                HEADER_LEN
            )));
        }
        let header: RawHeader = codec().deserialize(&bytes[..HEADER_LEN])?;
        if header.magic != GTPK_MAGIC {
            return Err(MapError::InvalidPack("bad magic".into()));
        }
        if header.version != GTPK_VERSION {
            return Err(MapError::InvalidPack(format!(
                "unsupported version {}",
                header.version
            )));
        }
        if header.tile_size == 0 {
            return Err(MapError::InvalidPack("tile size is zero".into()));
        }

        let count = header.tile_count as usize;
        let index_end = count
            .checked_mul(ENTRY_LEN)
            .and_then(|len| len.checked_add(HEADER_LEN))
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| MapError::InvalidPack(format!("index of {} entries is truncated", count)))?;

        let mut index = FxHashMap::default();
        index.reserve(count);
        for chunk in bytes[HEADER_LEN..index_end].chunks_exact(ENTRY_LEN) {
            let entry: RawEntry = codec().deserialize(chunk)?;
            let start = entry.data_offset as usize;
            let len = entry.data_length as usize;
            if start < index_end || start + len > bytes.len() {
                return Err(MapError::InvalidPack(format!(
                    "blob {}/{}/{} at {}+{} lies outside the data section",
                    entry.zoom, entry.x, entry.y, start, len
                )));
            }
            let coord = TileCoord::new(entry.zoom, entry.x as u32, entry.y as u32);
            if !coord.is_valid() {
                return Err(MapError::InvalidPack(format!("{} is outside its level", coord)));
            }
            if index.insert(coord, (start, len)).is_some() {
                log::warn!("duplicate entry for {} in pack, keeping the last", coord);
            }
        }

        log::info!(
            "loaded GTPK pack: {} tiles of {}px, {} bytes",
            index.len(),
            header.tile_size,
            bytes.len()
        );
        Ok(Self {
            bytes,
            tile_size: header.tile_size,
            index,
        })
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, coord: TileCoord) -> bool {
        self.index.contains_key(&coord)
    }

    /// Encoded bytes of one tile
    pub fn tile(&self, coord: TileCoord) -> Option<&[u8]> {
        let (start, len) = *self.index.get(&coord)?;
        self.bytes.get(start..start + len)
    }

    /// Tile count per pyramid level
    pub fn levels(&self) -> BTreeMap<u8, usize> {
        let mut levels = BTreeMap::new();
        for coord in self.index.keys() {
            *levels.entry(coord.z).or_insert(0) += 1;
        }
        levels
    }

    pub fn zoom_range(&self) -> Option<(u8, u8)> {
        let levels = self.levels();
        Some((*levels.keys().next()?, *levels.keys().next_back()?))
    }
}
