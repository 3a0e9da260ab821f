use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("capture error: {0}")]
    Capture(String),

    #[error("input error: {0}")]
    Input(String),

    #[error("OCR error: {0}")]
    Ocr(String),

    #[error("detection is already running")]
    AlreadyRunning,

    #[error("no detection run is active")]
    NotRunning,

    #[error("settings are locked while detection is running")]
    SettingsLocked,

    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    #[error("invalid region: the two corners must span a non-empty rectangle")]
    DegenerateRegion,

    #[error("no detection available to rate")]
    NoPendingDetection,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type DetectorResult<T> = Result<T, DetectorError>;
