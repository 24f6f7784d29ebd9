use crate::core::geo::TileCoord;
use crate::tiles::gtpk::GtpkPack;
use crate::{MapError, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::sync::Arc;
use std::time::Duration;

/// Shared async HTTP client for tile fetching
pub(crate) static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent(concat!("gtmap/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(16)
        .build()
        .unwrap_or_else(|e| {
            log::warn!("falling back to default HTTP client: {}", e);
            reqwest::Client::new()
        })
});

/// Encoding a source promises for its tiles. Lets the decoder skip format
/// detection on the fast path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormatHint {
    WebP,
    Png,
    Jpeg,
    Unknown,
}

impl ImageFormatHint {
    /// Guesses from a URL or file extension
    pub fn from_path(path: &str) -> Self {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let ext = path.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
        match ext.as_str() {
            "webp" => Self::WebP,
            "png" => Self::Png,
            "jpg" | "jpeg" => Self::Jpeg,
            _ => Self::Unknown,
        }
    }

    pub fn image_format(&self) -> Option<image::ImageFormat> {
        match self {
            Self::WebP => Some(image::ImageFormat::WebP),
            Self::Png => Some(image::ImageFormat::Png),
            Self::Jpeg => Some(image::ImageFormat::Jpeg),
            Self::Unknown => None,
        }
    }
}

/// Anything that can produce the encoded bytes of a tile.
#[async_trait]
pub trait TileSource: Send + Sync {
    /// Address of the tile, also used in logs and as the task URL
    fn url(&self, coord: TileCoord) -> String;

    async fn fetch(&self, coord: TileCoord, url: &str) -> Result<Vec<u8>>;

    fn format_hint(&self) -> ImageFormatHint {
        ImageFormatHint::Unknown
    }
}

/// Tiles served over HTTP from a `{z}/{x}/{y}` URL template. `{s}` rotates
/// through the configured subdomains.
#[derive(Debug, Clone)]
pub struct XyzTileSource {
    template: String,
    subdomains: Vec<String>,
    hint: ImageFormatHint,
}

impl XyzTileSource {
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        let hint = ImageFormatHint::from_path(&template);
        Self {
            template,
            subdomains: Vec::new(),
            hint,
        }
    }

    pub fn with_subdomains(mut self, subdomains: &[&str]) -> Self {
        self.subdomains = subdomains.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_format_hint(mut self, hint: ImageFormatHint) -> Self {
        self.hint = hint;
        self
    }
}

#[async_trait]
impl TileSource for XyzTileSource {
    fn url(&self, coord: TileCoord) -> String {
        let mut url = self
            .template
            .replace("{z}", &coord.z.to_string())
            .replace("{x}", &coord.x.to_string())
            .replace("{y}", &coord.y.to_string());
        if !self.subdomains.is_empty() {
            let idx = ((coord.x + coord.y) as usize) % self.subdomains.len();
            url = url.replace("{s}", &self.subdomains[idx]);
        }
        url
    }

    async fn fetch(&self, _coord: TileCoord, url: &str) -> Result<Vec<u8>> {
        let response = HTTP_CLIENT.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    fn format_hint(&self) -> ImageFormatHint {
        self.hint
    }
}

/// Tiles read from an in-memory GTPK pack
#[derive(Debug, Clone)]
pub struct GtpkTileSource {
    pack: Arc<GtpkPack>,
}

impl GtpkTileSource {
    pub fn new(pack: GtpkPack) -> Self {
        Self {
            pack: Arc::new(pack),
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Ok(Self::new(GtpkPack::parse(bytes)?))
    }

    pub fn pack(&self) -> &GtpkPack {
        &self.pack
    }
}

#[async_trait]
impl TileSource for GtpkTileSource {
    fn url(&self, coord: TileCoord) -> String {
        format!("gtpk://{}", coord)
    }

    async fn fetch(&self, coord: TileCoord, _url: &str) -> Result<Vec<u8>> {
        self.pack
            .tile(coord)
            .map(|bytes| bytes.to_vec())
            .ok_or_else(|| MapError::InvalidTile(format!("{} not in pack", coord)))
    }

    fn format_hint(&self) -> ImageFormatHint {
        ImageFormatHint::WebP
    }
}
