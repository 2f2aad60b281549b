use image::ImageError;
use thiserror::Error;

use std::io::Error as IOError;
use std::time::Duration;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct LprError(LprErrorKind);

#[derive(Debug, Error)]
pub enum LprErrorKind {
    #[error(transparent)]
    IOError(IOError),
    #[error(transparent)]
    ImageError(ImageError),
    #[error("failed to parse config file: {0}")]
    ConfigParse(toml::de::Error),
    #[error("invalid value for `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },
    /// The OCR engine could not be brought up, the detector is unusable.
    #[error("could not initialize OCR engine: {0}")]
    OcrInit(String),
    #[error("recognition failed: {0}")]
    Ocr(String),
    #[error("recognition timed out after {0:?}")]
    OcrTimeout(Duration),
    #[error("recognition worker has stopped")]
    OcrUnavailable,
    #[error("video input failed: {0}")]
    Video(String),
}

impl LprError {

    pub fn kind(&self) -> &LprErrorKind {
        &self.0
    }

    pub fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        Self(LprErrorKind::InvalidConfig { field, reason: reason.into() })
    }

    /// Construction time failures. Everything else only costs a candidate or a frame.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(),
            LprErrorKind::OcrInit(_) | LprErrorKind::InvalidConfig { .. } | LprErrorKind::ConfigParse(_))
    }
}

impl<T> From<T> for LprError
where T:  Into<LprErrorKind>
{
    fn from(e: T) -> Self {
        Self(e.into())
    }
}

impl From<IOError> for LprErrorKind {
    fn from(e: IOError) -> Self {
        Self::IOError(e)
    }
}

impl From<ImageError> for LprErrorKind {
    fn from(e: ImageError) -> Self {
        Self::ImageError(e)
    }
}

impl From<toml::de::Error> for LprErrorKind {
    fn from(e: toml::de::Error) -> Self {
        Self::ConfigParse(e)
    }
}
