use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use studiogen_contracts::product::ReferenceImage;

use crate::error::GenerationError;

/// One inline image of a model request: base64 text without a data-URL
/// prefix plus the declared media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePart {
    pub data: String,
    pub media_type: String,
}

/// Reads the whole blob and base64-encodes it. Nothing is cached; every call
/// costs a full read of the image.
pub fn encode(image: &ReferenceImage) -> Result<ImagePart, GenerationError> {
    let bytes = image.read_bytes().map_err(|err| GenerationError::Encode {
        source_label: image.label(),
        message: err.to_string(),
    })?;
    Ok(ImagePart {
        data: BASE64.encode(bytes),
        media_type: image.media_type().to_string(),
    })
}

pub fn encode_all(images: &[ReferenceImage]) -> Result<Vec<ImagePart>, GenerationError> {
    images.iter().map(encode).collect()
}

pub fn png_data_url(data: &str) -> String {
    format!("data:image/png;base64,{data}")
}

/// Splits a `data:<media>;base64,<payload>` URL into media type and bytes.
pub fn decode_data_url(url: &str) -> Result<(String, Vec<u8>)> {
    let Some(rest) = url.strip_prefix("data:") else {
        bail!("not a data URL");
    };
    let Some((header, payload)) = rest.split_once(',') else {
        bail!("data URL has no payload separator");
    };
    let Some(media_type) = header.strip_suffix(";base64") else {
        bail!("data URL is not base64 encoded");
    };
    let bytes = BASE64
        .decode(payload.trim().as_bytes())
        .context("data URL base64 decode failed")?;
    Ok((media_type.to_string(), bytes))
}
