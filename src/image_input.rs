// src/image_input.rs

use crate::error::{CivicError, Result};
use opencv::{core::Mat, imgcodecs, prelude::*};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

/// Decode an image file into a 3-channel BGR matrix.
pub fn load_image(path: &Path) -> Result<Mat> {
    if !path.exists() {
        return Err(CivicError::ImageDecode {
            path: path.to_path_buf(),
        });
    }
    let path_str = path.to_str().ok_or_else(|| CivicError::ImageDecode {
        path: path.to_path_buf(),
    })?;

    let img = imgcodecs::imread(path_str, imgcodecs::IMREAD_COLOR)?;
    if img.empty() {
        return Err(CivicError::ImageDecode {
            path: path.to_path_buf(),
        });
    }
    validate_image(&img)?;

    debug!("Loaded {} ({}x{})", path.display(), img.cols(), img.rows());
    Ok(img)
}

/// Every downstream stage divides by the image area and expects BGR.
pub fn validate_image(img: &Mat) -> Result<()> {
    if img.empty() || img.rows() <= 0 || img.cols() <= 0 {
        return Err(CivicError::InvalidImage("image has zero area".to_string()));
    }
    if img.channels() != 3 {
        return Err(CivicError::InvalidImage(format!(
            "expected 3 channels, found {}",
            img.channels()
        )));
    }
    if img.depth() != opencv::core::CV_8U {
        return Err(CivicError::InvalidImage(
            "expected 8-bit pixel depth".to_string(),
        ));
    }
    Ok(())
}

/// Recursively collect image files below `dir`, sorted for stable output.
pub fn find_image_files(dir: &Path) -> Vec<PathBuf> {
    let mut images: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_image_file(p))
        .collect();
    images.sort();
    images
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
