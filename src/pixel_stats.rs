// src/pixel_stats.rs
//
// Pixel-level primitives shared by the candidate extractor and the issue
// classifier. Everything works on OpenCV matrices in BGR order with the
// 8-bit HSV convention (H: 0-180, S: 0-255, V: 0-255).

use crate::error::Result;
use opencv::{
    core::{self, Mat, Point, Rect, Scalar, Vector},
    imgproc,
    prelude::*,
};

// ============================================================================
// COLOR SPACES
// ============================================================================

pub fn to_gray(bgr: &Mat) -> Result<Mat> {
    let mut gray = Mat::default();
    imgproc::cvt_color_def(bgr, &mut gray, imgproc::COLOR_BGR2GRAY)?;
    Ok(gray)
}

pub fn to_hsv(bgr: &Mat) -> Result<Mat> {
    let mut hsv = Mat::default();
    imgproc::cvt_color_def(bgr, &mut hsv, imgproc::COLOR_BGR2HSV)?;
    Ok(hsv)
}

/// Inclusive HSV range, evaluated with `cv::inRange`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HsvBand {
    pub lower: [f64; 3],
    pub upper: [f64; 3],
}

impl HsvBand {
    pub const fn new(lower: [f64; 3], upper: [f64; 3]) -> Self {
        Self { lower, upper }
    }

    pub fn mask(&self, hsv: &Mat) -> Result<Mat> {
        let lower = Scalar::new(self.lower[0], self.lower[1], self.lower[2], 0.0);
        let upper = Scalar::new(self.upper[0], self.upper[1], self.upper[2], 0.0);
        let mut mask = Mat::default();
        core::in_range(hsv, &lower, &upper, &mut mask)?;
        Ok(mask)
    }
}

// ============================================================================
// IMAGE REGIONS
// ============================================================================

/// Rows `[h/2, h)`, matching `img[h // 2:, :]`.
pub fn lower_half(width: i32, height: i32) -> Rect {
    let top = height / 2;
    Rect::new(0, top, width, height - top)
}

/// Rows `[0, h/3)`, matching `img[:h // 3, :]`.
pub fn upper_third(width: i32, height: i32) -> Rect {
    Rect::new(0, 0, width, height / 3)
}

/// Copy of `rect` clipped to the matrix. `None` when nothing is left.
pub fn region(mat: &Mat, rect: Rect) -> Result<Option<Mat>> {
    let x1 = rect.x.clamp(0, mat.cols());
    let y1 = rect.y.clamp(0, mat.rows());
    let x2 = rect.x.saturating_add(rect.width).clamp(0, mat.cols());
    let y2 = rect.y.saturating_add(rect.height).clamp(0, mat.rows());
    if x2 <= x1 || y2 <= y1 {
        return Ok(None);
    }
    let roi = Mat::roi(mat, Rect::new(x1, y1, x2 - x1, y2 - y1))?;
    Ok(Some(roi.try_clone()?))
}

// ============================================================================
// THRESHOLDING & COUNTING
// ============================================================================

/// 255 where `gray > cutoff`, or where `gray <= cutoff` when `inverse` is set.
pub fn binarize(gray: &Mat, cutoff: f64, inverse: bool) -> Result<Mat> {
    let kind = if inverse {
        imgproc::THRESH_BINARY_INV
    } else {
        imgproc::THRESH_BINARY
    };
    let mut out = Mat::default();
    imgproc::threshold(gray, &mut out, cutoff, 255.0, kind)?;
    Ok(out)
}

pub fn count_nonzero(mask: &Mat) -> Result<i64> {
    if mask.empty() {
        return Ok(0);
    }
    Ok(core::count_non_zero(mask)? as i64)
}

/// Pixels with `low < v < high` (both bounds exclusive) in a single-channel image.
pub fn count_between(gray: &Mat, low: u8, high: u8) -> Result<i64> {
    if high <= low.saturating_add(1) {
        return Ok(0);
    }
    let mut mask = Mat::default();
    core::in_range(
        gray,
        &Scalar::all(low as f64 + 1.0),
        &Scalar::all(high as f64 - 1.0),
        &mut mask,
    )?;
    count_nonzero(&mask)
}

/// Percentage of `count` over `area`; zero area yields zero.
pub fn percent(count: i64, area: i64) -> f64 {
    if area <= 0 {
        return 0.0;
    }
    count as f64 / area as f64 * 100.0
}

// ============================================================================
// CONTOURS
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct ContourRegion {
    /// Polygon area from `cv::contourArea`
    pub area: f64,
    pub rect: Rect,
}

/// Outer contours of a binary mask with their areas and bounding rectangles.
pub fn external_contours(mask: &Mat) -> Result<Vec<ContourRegion>> {
    if mask.empty() {
        return Ok(Vec::new());
    }
    let mut contours: Vector<Vector<Point>> = Vector::new();
    imgproc::find_contours(
        mask,
        &mut contours,
        imgproc::RETR_EXTERNAL,
        imgproc::CHAIN_APPROX_SIMPLE,
        Point::new(0, 0),
    )?;

    let mut regions = Vec::with_capacity(contours.len());
    for contour in contours.iter() {
        regions.push(ContourRegion {
            area: imgproc::contour_area(&contour, false)?,
            rect: imgproc::bounding_rect(&contour)?,
        });
    }
    Ok(regions)
}

// ============================================================================
// INTENSITY STATISTICS
// ============================================================================

pub fn mean_intensity(gray: &Mat) -> Result<f64> {
    if gray.empty() {
        return Ok(0.0);
    }
    Ok(core::mean_def(gray)?[0])
}

/// Population variance of a single-channel image.
pub fn variance(gray: &Mat) -> Result<f64> {
    if gray.empty() {
        return Ok(0.0);
    }
    let mut mean: Vector<f64> = Vector::new();
    let mut stddev: Vector<f64> = Vector::new();
    core::mean_std_dev_def(gray, &mut mean, &mut stddev)?;
    let sd = stddev.get(0)?;
    Ok(sd * sd)
}
