use crate::common::image_utils::{detect_mime, is_image_mime};
use mime::Mime;
use std::fmt;
use std::path::Path;
use tokio::fs;

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("Please select a valid image file ({file_name} is {mime})")]
    NotAnImage { file_name: String, mime: Mime },
    #[error("Image file {file_name} is empty")]
    Empty { file_name: String },
    #[error("Cannot read image file: {0}")]
    Io(#[from] std::io::Error),
}

/// One still image, held in memory until it is submitted or replaced.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    bytes: Vec<u8>,
    mime: Mime,
    file_name: String,
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("file_name", &self.file_name)
            .field("mime", &self.mime.essence_str())
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl ImagePayload {
    /// Build a payload from bytes that are already known to be an image of `mime` type.
    pub fn new(bytes: Vec<u8>, mime: Mime, file_name: impl Into<String>) -> Result<Self, PayloadError> {
        let file_name = file_name.into();
        if bytes.is_empty() {
            return Err(PayloadError::Empty { file_name });
        }
        if !is_image_mime(&mime) {
            return Err(PayloadError::NotAnImage { file_name, mime });
        }
        Ok(Self {
            bytes,
            mime,
            file_name,
        })
    }

    /// Accept arbitrary bytes, sniffing the MIME type. Non-images are rejected.
    pub fn from_bytes(bytes: Vec<u8>, file_name: impl Into<String>) -> Result<Self, PayloadError> {
        let file_name = file_name.into();
        let mime = detect_mime(&bytes, &file_name);
        Self::new(bytes, mime, file_name)
    }

    pub async fn from_file(path: &Path) -> Result<Self, PayloadError> {
        let bytes = fs::read(path).await?;
        let file_name = path
            .file_name()
            .map_or_else(|| "upload".to_string(), |f| f.to_string_lossy().to_string());
        Self::from_bytes(bytes, file_name)
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub const fn mime(&self) -> &Mime {
        &self.mime
    }

    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
