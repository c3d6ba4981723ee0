use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;

pub const PNG_MIME: &str = "image/png";

#[derive(Debug, Clone)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl ImageData {
    pub fn from_bytes(bytes: Vec<u8>, name: Option<&str>) -> Result<Self> {
        let mime = detect_image_mime(&bytes, name.map(Path::new))?;
        Ok(Self { bytes, mime })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read image file: {}", path.display()))?;
        let name = path.file_name().and_then(|value| value.to_str());
        Self::from_bytes(bytes, name)
    }

    pub fn extension(&self) -> &'static str {
        extension_from_mime(&self.mime).unwrap_or("bin")
    }
}

fn detect_image_mime(bytes: &[u8], path: Option<&Path>) -> Result<String> {
    if let Some(kind) = infer::get(bytes) {
        let detected = kind.mime_type();
        if !detected.starts_with("image/") {
            return Err(anyhow!("expected image data (detected '{}')", detected));
        }
        return Ok(detected.to_string());
    }

    if let Some(mime) = path
        .and_then(|value| value.extension())
        .and_then(|value| value.to_str())
        .and_then(|ext| mime_from_extension(&ext.to_lowercase()))
    {
        return Ok(mime.to_string());
    }

    Err(anyhow!(
        "unable to detect image type for '{}'",
        path.map(|value| value.display().to_string())
            .unwrap_or_else(|| "inline data".to_string())
    ))
}

fn mime_from_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "png" => Some(PNG_MIME),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        "tif" | "tiff" => Some("image/tiff"),
        _ => None,
    }
}

pub fn extension_from_mime(mime: &str) -> Option<&'static str> {
    match mime {
        "image/png" => Some("png"),
        "image/jpeg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/bmp" => Some("bmp"),
        "image/tiff" => Some("tiff"),
        _ => None,
    }
}

pub fn decode_base64(input: &str) -> Result<Vec<u8>> {
    let trimmed = input.trim();
    let payload = match trimmed.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => trimmed,
    };
    BASE64
        .decode(payload)
        .with_context(|| "invalid base64 image payload")
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .with_context(|| "failed to encode image as PNG")?;
    Ok(out.into_inner())
}

pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, BASE64.encode(bytes))
}
