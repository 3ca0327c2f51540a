use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::ImageFormat;

/// Extensions the attach control accepts.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

const FALLBACK_MIME: &str = "image/jpeg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match image::guess_format(bytes).ok()? {
            ImageFormat::Jpeg => Some(ImageKind::Jpeg),
            ImageFormat::Png => Some(ImageKind::Png),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
        }
    }
}

/// How the media type inside an image data URL is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MimeLabeling {
    /// Tag from the sniffed bytes, `image/jpeg` when the format is unknown.
    #[default]
    Detected,
    /// Tag every image `image/jpeg`, whatever its real format.
    AlwaysJpeg,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedImage {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Reads an attachment from disk, rejecting anything but jpg/jpeg/png.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|value| value.to_str())
            .map(|value| value.to_ascii_lowercase())
            .unwrap_or_default();
        if !ACCEPTED_EXTENSIONS.contains(&ext.as_str()) {
            bail!(
                "unsupported image {} (expected one of: {})",
                path.display(),
                ACCEPTED_EXTENSIONS.join(", ")
            );
        }
        let bytes =
            fs::read(path).with_context(|| format!("failed reading image {}", path.display()))?;
        let name = path
            .file_name()
            .map(|value| value.to_string_lossy().to_string())
            .unwrap_or_else(|| "image".to_string());
        Ok(Self { name, bytes })
    }

    pub fn kind(&self) -> Option<ImageKind> {
        ImageKind::sniff(&self.bytes)
    }

    pub fn mime_type(&self, labeling: MimeLabeling) -> &'static str {
        match labeling {
            MimeLabeling::AlwaysJpeg => FALLBACK_MIME,
            MimeLabeling::Detected => self
                .kind()
                .map(|kind| kind.mime_type())
                .unwrap_or(FALLBACK_MIME),
        }
    }
}

pub fn encode_image(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

pub fn image_data_url(image: &UploadedImage, labeling: MimeLabeling) -> String {
    format!(
        "data:{};base64,{}",
        image.mime_type(labeling),
        encode_image(&image.bytes)
    )
}
