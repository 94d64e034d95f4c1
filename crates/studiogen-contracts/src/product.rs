use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::bail;
use serde::{Deserialize, Serialize};

/// Descriptive attributes of the physical product. Absent fields render as
/// the empty string in prompts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductAttributes {
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub weight: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
}

impl ProductAttributes {
    pub fn material(&self) -> &str {
        self.material.as_deref().unwrap_or_default()
    }

    pub fn size(&self) -> &str {
        self.size.as_deref().unwrap_or_default()
    }

    pub fn weight(&self) -> &str {
        self.weight.as_deref().unwrap_or_default()
    }

    pub fn price(&self) -> &str {
        self.price.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Bytes(Arc<[u8]>),
    File(PathBuf),
}

/// A user-supplied product photo. File-backed images are read again on every
/// access, so an image removed from disk mid-run fails at its next encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    source: ImageSource,
    media_type: String,
}

impl ReferenceImage {
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>, media_type: impl Into<String>) -> Self {
        Self {
            source: ImageSource::Bytes(bytes.into()),
            media_type: media_type.into(),
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let Some(media_type) = media_type_for_path(&path) else {
            bail!("not an image file: {}", path.display());
        };
        Ok(Self {
            source: ImageSource::File(path),
            media_type: media_type.to_string(),
        })
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn source(&self) -> &ImageSource {
        &self.source
    }

    /// Human-readable origin used in error messages.
    pub fn label(&self) -> String {
        match &self.source {
            ImageSource::Bytes(bytes) => format!("<{} bytes in memory>", bytes.len()),
            ImageSource::File(path) => path.display().to_string(),
        }
    }

    pub fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        match &self.source {
            ImageSource::Bytes(bytes) => Ok(bytes.to_vec()),
            ImageSource::File(path) => std::fs::read(path),
        }
    }
}

pub fn media_type_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}
