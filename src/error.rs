// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CivicError {
    #[error("could not load image: {}", path.display())]
    ImageDecode { path: PathBuf },

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("opencv: {0}")]
    OpenCv(#[from] opencv::Error),

    #[error("configuration: {0}")]
    Config(String),

    #[error("model: {0}")]
    Model(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, CivicError>;
