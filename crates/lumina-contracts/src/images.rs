//! Image payloads as they travel between the caller, the studio and the backend.
//!
//! Payloads are kept as base64 text without the `data:` prefix. The prefix is
//! parsed on the way in and re-added on the way out.

use std::fmt;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{DesignError, DesignResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageMime {
    Png,
    Jpeg,
    Webp,
}

impl ImageMime {
    pub fn as_mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
        }
    }

    fn from_marker(marker: &str) -> Option<Self> {
        match marker.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    fn from_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::WebP => Some(Self::Webp),
            _ => None,
        }
    }

    fn format(self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Webp => ImageFormat::WebP,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePayload {
    pub mime: ImageMime,
    pub data: String,
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("mime", &self.mime)
            .field("len", &self.data.len())
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

impl ImagePayload {
    pub fn new(mime: ImageMime, data: impl Into<String>) -> Self {
        Self {
            mime,
            data: data.into(),
        }
    }

    /// Wraps raw base64 returned by the backend, which always comes back
    /// without a prefix and is surfaced to callers as JPEG.
    pub fn from_model_output(data: impl Into<String>) -> Self {
        Self::new(ImageMime::Jpeg, data)
    }

    /// Parses `data:image/<png|jpeg|jpg|webp>;base64,<data>`. Text without a
    /// recognised prefix is taken as raw JPEG base64.
    pub fn from_data_uri(raw: &str) -> DesignResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DesignError::InvalidInput("empty image payload".to_string()));
        }
        let Some(rest) = trimmed.strip_prefix("data:image/") else {
            return Ok(Self::new(ImageMime::Jpeg, trimmed));
        };
        let Some((marker, data)) = rest.split_once(";base64,") else {
            return Err(DesignError::InvalidInput(
                "data URI is not base64 encoded".to_string(),
            ));
        };
        let mime = ImageMime::from_marker(marker).ok_or_else(|| {
            DesignError::InvalidInput(format!("unsupported image type '{marker}'"))
        })?;
        if data.is_empty() {
            return Err(DesignError::InvalidInput("empty image payload".to_string()));
        }
        Ok(Self::new(mime, data))
    }

    /// Accepts an uploaded file's bytes only when they are PNG, JPEG or WebP
    /// and fully decode.
    pub fn from_bytes(bytes: &[u8]) -> DesignResult<Self> {
        let format = image::guess_format(bytes)
            .map_err(|err| DesignError::InvalidInput(format!("unrecognised image: {err}")))?;
        let mime = ImageMime::from_format(format).ok_or_else(|| {
            DesignError::InvalidInput(format!("unsupported image format {format:?}"))
        })?;
        image::load_from_memory_with_format(bytes, mime.format())
            .map_err(|err| DesignError::InvalidInput(format!("image failed to decode: {err}")))?;
        Ok(Self::new(mime, BASE64.encode(bytes)))
    }

    pub fn from_file(path: &Path) -> DesignResult<Self> {
        let bytes = std::fs::read(path).map_err(|err| {
            DesignError::InvalidInput(format!("failed reading {}: {err}", path.display()))
        })?;
        Self::from_bytes(&bytes)
    }

    /// Base64 body with no prefix, as attached to outbound requests.
    pub fn stripped(&self) -> &str {
        &self.data
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime.as_mime(), self.data)
    }

    pub fn decode(&self) -> DesignResult<Vec<u8>> {
        BASE64
            .decode(self.data.as_bytes())
            .map_err(|err| DesignError::InvalidInput(format!("image base64 decode failed: {err}")))
    }

    /// Short content hash used to reference images in logs and events.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.data.as_bytes());
        hex::encode(&digest[..6])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageRole {
    Original,
    Current,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomImage<'a> {
    pub role: ImageRole,
    pub payload: &'a ImagePayload,
}

/// One project's images: the upload and, once something has been rendered,
/// the latest rendition. `current` is replaced wholesale, never merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLineage {
    original: ImagePayload,
    current: Option<ImagePayload>,
}

impl ImageLineage {
    pub fn new(original: ImagePayload) -> Self {
        Self {
            original,
            current: None,
        }
    }

    pub fn original(&self) -> &ImagePayload {
        &self.original
    }

    pub fn current(&self) -> Option<&ImagePayload> {
        self.current.as_ref()
    }

    pub fn most_recent(&self) -> RoomImage<'_> {
        match self.current.as_ref() {
            Some(payload) => RoomImage {
                role: ImageRole::Current,
                payload,
            },
            None => RoomImage {
                role: ImageRole::Original,
                payload: &self.original,
            },
        }
    }

    pub fn replace_current(&mut self, payload: ImagePayload) -> Option<ImagePayload> {
        self.current.replace(payload)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgb, RgbImage};

    use super::*;

    fn encoded(format: ImageFormat) -> Vec<u8> {
        let image = RgbImage::from_pixel(4, 4, Rgb([200, 120, 40]));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), format)
            .unwrap();
        bytes
    }

    #[test]
    fn data_uri_prefix_is_stripped() {
        for marker in ["png", "jpeg", "jpg", "webp"] {
            let payload =
                ImagePayload::from_data_uri(&format!("data:image/{marker};base64,QUJD")).unwrap();
            assert_eq!(payload.stripped(), "QUJD");
        }
        let jpg = ImagePayload::from_data_uri("data:image/jpg;base64,QUJD").unwrap();
        assert_eq!(jpg.mime, ImageMime::Jpeg);
    }

    #[test]
    fn raw_base64_is_taken_as_jpeg() {
        let payload = ImagePayload::from_data_uri("QUJD").unwrap();
        assert_eq!(payload.mime, ImageMime::Jpeg);
        assert_eq!(payload.to_data_uri(), "data:image/jpeg;base64,QUJD");
    }

    #[test]
    fn unsupported_or_empty_uris_are_rejected() {
        assert!(ImagePayload::from_data_uri("data:image/gif;base64,QUJD").is_err());
        assert!(ImagePayload::from_data_uri("data:image/png,QUJD").is_err());
        assert!(ImagePayload::from_data_uri("   ").is_err());
    }

    #[test]
    fn model_output_is_prefixed_as_jpeg() {
        let payload = ImagePayload::from_model_output("AAAA");
        assert_eq!(payload.to_data_uri(), "data:image/jpeg;base64,AAAA");
    }

    #[test]
    fn from_bytes_sniffs_png_and_jpeg() {
        let png = ImagePayload::from_bytes(&encoded(ImageFormat::Png)).unwrap();
        assert_eq!(png.mime, ImageMime::Png);
        let jpeg = ImagePayload::from_bytes(&encoded(ImageFormat::Jpeg)).unwrap();
        assert_eq!(jpeg.mime, ImageMime::Jpeg);
        assert_eq!(jpeg.decode().unwrap(), encoded(ImageFormat::Jpeg));
    }

    #[test]
    fn from_bytes_rejects_garbage_and_truncated_files() {
        assert!(ImagePayload::from_bytes(b"definitely not an image").is_err());
        let png = encoded(ImageFormat::Png);
        assert!(ImagePayload::from_bytes(&png[..png.len() / 2]).is_err());
    }

    #[test]
    fn from_file_reads_upload() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("room.png");
        std::fs::write(&path, encoded(ImageFormat::Png))?;
        let payload = ImagePayload::from_file(&path)?;
        assert_eq!(payload.mime, ImageMime::Png);
        assert!(ImagePayload::from_file(&temp.path().join("missing.png")).is_err());
        Ok(())
    }

    #[test]
    fn lineage_prefers_current_once_set() {
        let original = ImagePayload::new(ImageMime::Png, "b3JpZ2luYWw=");
        let mut lineage = ImageLineage::new(original.clone());
        assert_eq!(lineage.most_recent().role, ImageRole::Original);
        assert_eq!(lineage.most_recent().payload, &original);

        let first = ImagePayload::from_model_output("Zmlyc3Q=");
        assert!(lineage.replace_current(first.clone()).is_none());
        assert_eq!(lineage.most_recent().role, ImageRole::Current);

        let second = ImagePayload::from_model_output("c2Vjb25k");
        assert_eq!(lineage.replace_current(second.clone()), Some(first));
        assert_eq!(lineage.current(), Some(&second));
        assert_eq!(lineage.original(), &original);
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        let a = ImagePayload::from_model_output("QUJD");
        let b = ImagePayload::from_model_output("QUJD");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 12);
        assert_ne!(a.fingerprint(), ImagePayload::from_model_output("QUJE").fingerprint());
    }
}
