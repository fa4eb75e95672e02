//! Error types for CBXMage
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MageError {
    /// Neither the primary nor the fallback decoder accepted the data
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("image is not loaded")]
    NotLoaded,

    #[error("Invalid rotation: {0} (must be a multiple of 90)")]
    InvalidRotation(i32),

    #[error("Invalid target size: {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    #[error("Image processing error: {0}")]
    Image(String),

    #[error("Color profile error: {0}")]
    ColorProfile(#[from] lcms2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Native process creation failed
    #[error("Failed to spawn process (error {code}): {message}")]
    Spawn { code: i32, message: String },
}

pub type Result<T> = std::result::Result<T, MageError>;
