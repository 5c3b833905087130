use image::{DynamicImage, ImageFormat, ImageResult};
use serde::{Deserialize, Serialize};

pub const TARGET_MIME: &str = "image/webp";
pub const TARGET_EXTENSION: &str = "webp";

/// Mime type recorded for restored files whose extension is not recognised.
pub const FALLBACK_MIME: &str = "image/jpeg";

/// Formats the engine is willing to convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
}

impl SourceFormat {
    pub const ALL: [Self; 4] = [Self::Jpeg, Self::Png, Self::Gif, Self::Bmp];

    pub const fn mime(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
        }
    }

    pub const fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Jpeg => &["jpg", "jpeg"],
            Self::Png => &["png"],
            Self::Gif => &["gif"],
            Self::Bmp => &["bmp"],
        }
    }

    const fn image_format(self) -> ImageFormat {
        match self {
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
            Self::Gif => ImageFormat::Gif,
            Self::Bmp => ImageFormat::Bmp,
        }
    }

    pub const fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Gif => Some(Self::Gif),
            ImageFormat::Bmp => Some(Self::Bmp),
            _ => None,
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|f| f.mime() == mime)
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.extensions().contains(&ext.as_str()))
    }

    /// Decodes `bytes` as this format. GIFs yield their first frame; palette
    /// images are expanded to true colour by the decoder.
    pub fn decode(self, bytes: &[u8]) -> ImageResult<DynamicImage> {
        image::load_from_memory_with_format(bytes, self.image_format())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sniffed {
    Source(SourceFormat),
    Other(ImageFormat),
    Unknown,
}

/// Identifies an image by its magic bytes, ignoring names and declared types.
pub fn sniff(bytes: &[u8]) -> Sniffed {
    match image::guess_format(bytes) {
        Ok(format) => SourceFormat::from_image_format(format)
            .map_or(Sniffed::Other(format), Sniffed::Source),
        Err(_) => Sniffed::Unknown,
    }
}

pub fn is_target_mime(mime: &str) -> bool {
    mime.trim().eq_ignore_ascii_case(TARGET_MIME)
}

pub fn mime_for_extension(ext: &str) -> &'static str {
    if ext.eq_ignore_ascii_case(TARGET_EXTENSION) {
        return TARGET_MIME;
    }
    SourceFormat::from_extension(ext).map_or(FALLBACK_MIME, SourceFormat::mime)
}

/// Every mime type the ledger tracks: the allow-list plus the target format.
pub fn managed_mime_types() -> Vec<&'static str> {
    SourceFormat::ALL
        .into_iter()
        .map(SourceFormat::mime)
        .chain(std::iter::once(TARGET_MIME))
        .collect()
}
