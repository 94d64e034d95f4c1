use std::io::Cursor;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{ImageFormat, Rgb, RgbImage};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::config::EngineConfig;
use crate::encoder::{png_data_url, ImagePart};
use crate::error::{GenerationError, RemoteFailure};

/// Single-shot request against an image-capable model. Implementations return
/// the produced image as a `data:` URL and never retry on their own.
pub trait ImageModel: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, parts: &[ImagePart], prompt: &str) -> Result<String, GenerationError>;
}

pub struct GeminiModel {
    api_base: String,
    model: String,
    api_key: String,
    request_timeout: Duration,
    http: HttpClient,
}

impl GeminiModel {
    /// An empty key is accepted here; every call then fails with
    /// [`GenerationError::MissingCredential`].
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone().unwrap_or_default(),
            request_timeout: config.request_timeout,
            http: HttpClient::new(),
        }
    }

    fn endpoint(&self) -> String {
        let trimmed = self.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    /// One `contents` message: every image part in order, then the prompt.
    pub fn build_payload(parts: &[ImagePart], prompt: &str) -> Value {
        let mut request_parts: Vec<Value> = parts
            .iter()
            .map(|part| {
                json!({
                    "inlineData": {
                        "data": part.data,
                        "mimeType": part.media_type,
                    }
                })
            })
            .collect();
        request_parts.push(json!({ "text": prompt }));
        json!({
            "contents": [{
                "role": "user",
                "parts": request_parts,
            }]
        })
    }

    /// Returns the base64 payload of the first inline image of the first
    /// candidate.
    pub fn extract_image_data(response_payload: &Value) -> Result<String, GenerationError> {
        let parts = response_payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|candidates| candidates.first())
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .ok_or(GenerationError::NoImageInResponse)?;

        parts
            .iter()
            .filter_map(|part| part.get("inlineData").or_else(|| part.get("inline_data")))
            .filter_map(|inline| inline.get("data").and_then(Value::as_str))
            .find(|data| !data.is_empty())
            .map(str::to_string)
            .ok_or(GenerationError::NoImageInResponse)
    }

    pub fn failure_from_response(http_status: u16, body: &str) -> RemoteFailure {
        let nested = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|parsed| parsed.get("error").cloned())
            .and_then(|error| nested_failure(&error));
        RemoteFailure {
            http_status: Some(http_status),
            code: None,
            status: None,
            message: truncate_text(body.trim(), 512),
            nested: nested.map(Box::new),
        }
    }
}

fn nested_failure(error: &Value) -> Option<RemoteFailure> {
    let object = error.as_object()?;
    Some(RemoteFailure {
        http_status: None,
        code: object.get("code").and_then(Value::as_i64),
        status: object
            .get("status")
            .and_then(Value::as_str)
            .map(str::to_string),
        message: object
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        nested: object
            .get("error")
            .and_then(nested_failure)
            .map(Box::new),
    })
}

impl ImageModel for GeminiModel {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, parts: &[ImagePart], prompt: &str) -> Result<String, GenerationError> {
        if self.api_key.trim().is_empty() {
            return Err(GenerationError::MissingCredential);
        }
        let endpoint = self.endpoint();
        let payload = Self::build_payload(parts, prompt);

        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", self.api_key.as_str())])
            .timeout(self.request_timeout)
            .json(&payload)
            .send()
            .map_err(|err| GenerationError::Transport(error_chain_text(&err)))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|err| GenerationError::Transport(error_chain_text(&err)))?;
        if !status.is_success() {
            return Err(GenerationError::Remote(Self::failure_from_response(
                status.as_u16(),
                &body,
            )));
        }
        let parsed: Value = serde_json::from_str(&body).map_err(|err| {
            GenerationError::Remote(RemoteFailure {
                http_status: Some(status.as_u16()),
                message: format!("Gemini returned invalid JSON payload: {err}"),
                ..Default::default()
            })
        })?;
        let data = Self::extract_image_data(&parsed)?;
        Ok(png_data_url(&data))
    }
}

/// Offline stand-in that renders a flat PNG whose colour is derived from the
/// prompt, so each rendering kind gets a distinct, stable image.
#[derive(Debug, Clone)]
pub struct DryrunModel {
    width: u32,
    height: u32,
}

impl DryrunModel {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }
}

impl Default for DryrunModel {
    fn default() -> Self {
        Self::new(256, 256)
    }
}

impl ImageModel for DryrunModel {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, parts: &[ImagePart], prompt: &str) -> Result<String, GenerationError> {
        let (r, g, b) = color_from_prompt(prompt, parts.len() as u64);
        let image = RgbImage::from_pixel(self.width, self.height, Rgb([r, g, b]));
        let mut cursor = Cursor::new(Vec::new());
        image
            .write_to(&mut cursor, ImageFormat::Png)
            .map_err(|err| GenerationError::Remote(RemoteFailure {
                message: format!("dry-run PNG encode failed: {err}"),
                ..Default::default()
            }))?;
        Ok(png_data_url(&BASE64.encode(cursor.into_inner())))
    }
}

fn color_from_prompt(prompt: &str, seed: u64) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(seed.to_be_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

fn error_chain_text(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(cause) = current {
        let text = cause.to_string();
        let trimmed = text.trim();
        if !trimmed.is_empty() && parts.last().map(|last| last != trimmed).unwrap_or(true) {
            parts.push(trimmed.to_string());
        }
        current = cause.source();
    }
    truncate_text(&parts.join(" | caused by: "), 512)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{DryrunModel, GeminiModel, ImageModel};
    use crate::config::EngineConfig;
    use crate::encoder::{decode_data_url, ImagePart};
    use crate::error::{is_transient, GenerationError};

    fn part(data: &str, media_type: &str) -> ImagePart {
        ImagePart {
            data: data.to_string(),
            media_type: media_type.to_string(),
        }
    }

    #[test]
    fn payload_lists_images_before_the_prompt() {
        let payload = GeminiModel::build_payload(
            &[part("AAA", "image/png"), part("BBB", "image/jpeg")],
            "studio shot",
        );
        let contents = payload["contents"].as_array().cloned().unwrap_or_default();
        assert_eq!(contents.len(), 1);
        let parts = contents[0]["parts"].as_array().cloned().unwrap_or_default();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["inlineData"]["data"], json!("AAA"));
        assert_eq!(parts[0]["inlineData"]["mimeType"], json!("image/png"));
        assert_eq!(parts[1]["inlineData"]["mimeType"], json!("image/jpeg"));
        assert_eq!(parts[2], json!({ "text": "studio shot" }));
    }

    #[test]
    fn first_inline_image_wins() -> anyhow::Result<()> {
        let response = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "Here is your image" },
                        { "inlineData": { "mimeType": "image/png", "data": "" } },
                        { "inlineData": { "mimeType": "image/png", "data": "FIRST" } },
                        { "inlineData": { "mimeType": "image/png", "data": "SECOND" } }
                    ]
                }
            }]
        });
        assert_eq!(GeminiModel::extract_image_data(&response)?, "FIRST");
        Ok(())
    }

    #[test]
    fn snake_case_inline_data_is_accepted() -> anyhow::Result<()> {
        let response = json!({
            "candidates": [{ "content": { "parts": [{ "inline_data": { "data": "SNAKE" } }] } }]
        });
        assert_eq!(GeminiModel::extract_image_data(&response)?, "SNAKE");
        Ok(())
    }

    #[test]
    fn missing_image_is_reported() {
        let cases = [
            json!({}),
            json!({ "candidates": [] }),
            json!({ "candidates": [{ "content": {} }] }),
            json!({ "candidates": [{ "content": { "parts": [] } }] }),
            json!({ "candidates": [{ "content": { "parts": [{ "text": "only text" }] } }] }),
        ];
        for case in cases {
            assert!(matches!(
                GeminiModel::extract_image_data(&case),
                Err(GenerationError::NoImageInResponse)
            ));
        }
    }

    #[test]
    fn google_error_body_is_parsed_into_nested_failure() {
        let body = r#"{"error":{"code":429,"message":"Resource has been exhausted (e.g. check quota).","status":"RESOURCE_EXHAUSTED"}}"#;
        let failure = GeminiModel::failure_from_response(429, body);
        assert_eq!(failure.http_status, Some(429));
        let nested = failure.nested.as_deref().cloned().unwrap_or_default();
        assert_eq!(nested.code, Some(429));
        assert_eq!(nested.status.as_deref(), Some("RESOURCE_EXHAUSTED"));
        assert!(is_transient(&GenerationError::Remote(failure)));
    }

    #[test]
    fn non_json_error_body_is_kept_as_message() {
        let failure = GeminiModel::failure_from_response(502, "<html>bad gateway</html>");
        assert_eq!(failure.nested, None);
        assert_eq!(failure.message, "<html>bad gateway</html>");
        assert!(!is_transient(&GenerationError::Remote(failure)));
    }

    #[test]
    fn empty_credential_fails_every_call_without_network() {
        let config = EngineConfig {
            api_key: Some("   ".to_string()),
            api_base: "http://127.0.0.1:9".to_string(),
            ..EngineConfig::default()
        };
        let model = GeminiModel::new(&config);
        for _ in 0..2 {
            let err = model.generate(&[part("AAA", "image/png")], "prompt");
            assert!(matches!(err, Err(GenerationError::MissingCredential)));
        }
    }

    #[test]
    fn endpoint_targets_the_image_model() {
        let model = GeminiModel::new(&EngineConfig::default());
        assert_eq!(
            model.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash-image:generateContent"
        );
    }

    #[test]
    fn dryrun_returns_a_decodable_png() -> anyhow::Result<()> {
        let model = DryrunModel::new(8, 4);
        let url = model.generate(&[part("AAA", "image/png")], "white background")?;
        let (media_type, bytes) = decode_data_url(&url)?;
        assert_eq!(media_type, "image/png");
        let decoded = image::load_from_memory(&bytes)?;
        assert_eq!((decoded.width(), decoded.height()), (8, 4));

        let again = model.generate(&[part("AAA", "image/png")], "white background")?;
        assert_eq!(url, again);
        Ok(())
    }
}
