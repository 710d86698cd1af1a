// src/extractor.rs
//
// Candidate extraction: turns one decoded BGR image into an ImageAnalysis.
//
// Two implementations sit behind the ObjectExtractor trait:
//   - HeuristicExtractor: six classical pixel heuristics, no learned weights
//   - YoloExtractor (feature "yolo"): ONNX object detector
//
// The heuristic sub-detectors each scan the full image independently and
// their outputs are concatenated in a fixed order:
//   dark → road → clutter → light → water → tree
// Nothing is deduplicated across sub-detectors; one region may come out as
// both "clutter" and "tree".

use crate::error::Result;
use crate::image_input::validate_image;
use crate::pixel_stats::{self, HsvBand};
use crate::types::{BBox, DetectedObject, DetectorToggles, ExtractorConfig, ExtractorKind, ImageAnalysis};
use opencv::{
    core::{self, Mat},
    prelude::*,
};
use tracing::{debug, info};

// ============================================================================
// EXTRACTOR INTERFACE
// ============================================================================

pub trait ObjectExtractor {
    fn name(&self) -> &'static str;

    /// Produce candidates for one image. Never fails on a valid 3-channel
    /// image apart from backend errors; an empty image is `InvalidImage`.
    fn extract(&mut self, image: &Mat) -> Result<ImageAnalysis>;
}

/// Build the extractor selected in the configuration.
pub fn build_extractor(config: &ExtractorConfig) -> Result<Box<dyn ObjectExtractor>> {
    match config.kind {
        ExtractorKind::Heuristic => {
            info!("Using heuristic candidate extractor");
            Ok(Box::new(HeuristicExtractor::new(config.detectors)))
        }
        #[cfg(feature = "yolo")]
        ExtractorKind::Yolo => Ok(Box::new(crate::yolo::YoloExtractor::new(
            &config.model_path,
            config.confidence_threshold,
        )?)),
        #[cfg(not(feature = "yolo"))]
        ExtractorKind::Yolo => Err(crate::error::CivicError::Config(
            "yolo extractor requested but the crate was built without the `yolo` feature"
                .to_string(),
        )),
    }
}

// ============================================================================
// THRESHOLDS
// ============================================================================

/// Grayscale cutoff at or below which a pixel counts as dark
const DARK_INTENSITY_CUTOFF: f64 = 50.0;
/// Minimum dark contour area, percent of the image
const DARK_MIN_AREA_PCT: f64 = 2.0;
const POTHOLE_CONFIDENCE: f32 = 0.7;

/// Mid-gray road band, exclusive on both ends
const ROAD_INTENSITY_LOW: u8 = 30;
const ROAD_INTENSITY_HIGH: u8 = 150;
const ROAD_MIN_COVERAGE_PCT: f64 = 30.0;
const ROAD_CONFIDENCE: f32 = 0.8;

/// Saturation above which a pixel counts as vivid
const CLUTTER_SATURATION_CUTOFF: f64 = 100.0;
const CLUTTER_MIN_COVERAGE_PCT: f64 = 5.0;
const CLUTTER_MIN_AREA_PCT: f64 = 1.0;
const CLUTTER_CONFIDENCE: f32 = 0.6;

const LIGHT_INTENSITY_CUTOFF: f64 = 200.0;
/// Bright blobs must fall strictly between these, percent of the image
const LIGHT_MIN_AREA_PCT: f64 = 0.1;
const LIGHT_MAX_AREA_PCT: f64 = 5.0;
const LIGHT_CONFIDENCE: f32 = 0.65;

const WATER_BAND: HsvBand = HsvBand::new([90.0, 50.0, 50.0], [130.0, 255.0, 255.0]);
const WATER_MIN_COVERAGE_PCT: f64 = 5.0;
const WATER_CONFIDENCE: f32 = 0.7;

const TREE_BROWN_BAND: HsvBand = HsvBand::new([10.0, 50.0, 20.0], [20.0, 255.0, 200.0]);
const TREE_GREEN_BAND: HsvBand = HsvBand::new([35.0, 40.0, 40.0], [85.0, 255.0, 255.0]);
const TREE_MIN_AREA_PCT: f64 = 5.0;
/// Height must exceed width by this factor (standing trunk)
const TREE_MIN_ASPECT: f64 = 1.5;
const TREE_CONFIDENCE: f32 = 0.6;

// ============================================================================
// HEURISTIC EXTRACTOR
// ============================================================================

/// Shared per-image planes so each sub-detector does not reconvert.
struct Planes {
    width: i32,
    height: i32,
    image_area: i64,
    gray: Mat,
    hsv: Mat,
}

impl Planes {
    fn new(image: &Mat) -> Result<Self> {
        let width = image.cols();
        let height = image.rows();
        Ok(Self {
            width,
            height,
            image_area: width as i64 * height as i64,
            gray: pixel_stats::to_gray(image)?,
            hsv: pixel_stats::to_hsv(image)?,
        })
    }

    fn pct(&self, area: f64) -> f64 {
        area / self.image_area as f64 * 100.0
    }

    fn lower_half_bbox(&self) -> BBox {
        pixel_stats::lower_half(self.width, self.height).into()
    }
}

pub struct HeuristicExtractor {
    toggles: DetectorToggles,
}

impl Default for HeuristicExtractor {
    fn default() -> Self {
        Self::new(DetectorToggles::default())
    }
}

impl HeuristicExtractor {
    pub fn new(toggles: DetectorToggles) -> Self {
        Self { toggles }
    }

    /// Stateless analysis; `extract` delegates here.
    pub fn analyze(&self, image: &Mat) -> Result<ImageAnalysis> {
        validate_image(image)?;
        let planes = Planes::new(image)?;
        let t = &self.toggles;

        let mut objects = Vec::new();
        if t.dark_region {
            objects.extend(detect_dark_regions(&planes)?);
        }
        if t.road_surface {
            objects.extend(detect_road_surface(&planes)?);
        }
        if t.saturated_clutter {
            objects.extend(detect_saturated_clutter(&planes)?);
        }
        if t.bright_spot {
            objects.extend(detect_bright_spots(&planes)?);
        }
        if t.water_color {
            objects.extend(detect_water(&planes)?);
        }
        if t.tree_color {
            objects.extend(detect_trees(&planes)?);
        }

        debug!(
            "Heuristic extractor: {} candidate(s) in {}x{} image",
            objects.len(),
            planes.width,
            planes.height
        );
        Ok(ImageAnalysis::new(planes.width, planes.height, objects))
    }
}

impl ObjectExtractor for HeuristicExtractor {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn extract(&mut self, image: &Mat) -> Result<ImageAnalysis> {
        self.analyze(image)
    }
}

// ============================================================================
// SUB-DETECTORS
// ============================================================================

/// Dark blobs anywhere in the frame → "pothole".
fn detect_dark_regions(p: &Planes) -> Result<Vec<DetectedObject>> {
    let mask = pixel_stats::binarize(&p.gray, DARK_INTENSITY_CUTOFF, true)?;
    let found: Vec<_> = pixel_stats::external_contours(&mask)?
        .into_iter()
        .filter(|c| p.pct(c.area) >= DARK_MIN_AREA_PCT)
        .map(|c| DetectedObject::new("pothole", POTHOLE_CONFIDENCE, c.rect.into(), p.pct(c.area)))
        .collect();
    debug!("dark-region: {}", found.len());
    Ok(found)
}

/// Mid-gray surface in the lower half → a single "road" spanning that half.
fn detect_road_surface(p: &Planes) -> Result<Vec<DetectedObject>> {
    let Some(lower) = pixel_stats::region(&p.gray, pixel_stats::lower_half(p.width, p.height))?
    else {
        return Ok(Vec::new());
    };
    let road_pixels = pixel_stats::count_between(&lower, ROAD_INTENSITY_LOW, ROAD_INTENSITY_HIGH)?;
    // Normalised by the whole image, not the half that was scanned
    let coverage = pixel_stats::percent(road_pixels, p.image_area);
    debug!("road-surface: {:.1}%", coverage);

    if coverage > ROAD_MIN_COVERAGE_PCT {
        Ok(vec![DetectedObject::new(
            "road",
            ROAD_CONFIDENCE,
            p.lower_half_bbox(),
            coverage,
        )])
    } else {
        Ok(Vec::new())
    }
}

/// Vivid, highly saturated patches → "clutter".
fn detect_saturated_clutter(p: &Planes) -> Result<Vec<DetectedObject>> {
    let mut saturation = Mat::default();
    core::extract_channel(&p.hsv, &mut saturation, 1)?;
    let mask = pixel_stats::binarize(&saturation, CLUTTER_SATURATION_CUTOFF, false)?;

    let coverage = pixel_stats::percent(pixel_stats::count_nonzero(&mask)?, p.image_area);
    if coverage <= CLUTTER_MIN_COVERAGE_PCT {
        return Ok(Vec::new());
    }

    let found: Vec<_> = pixel_stats::external_contours(&mask)?
        .into_iter()
        .filter(|c| p.pct(c.area) >= CLUTTER_MIN_AREA_PCT)
        .map(|c| DetectedObject::new("clutter", CLUTTER_CONFIDENCE, c.rect.into(), p.pct(c.area)))
        .collect();
    debug!("saturated-clutter: {} ({:.1}% vivid)", found.len(), coverage);
    Ok(found)
}

/// Small bright blobs in the upper third → "light".
fn detect_bright_spots(p: &Planes) -> Result<Vec<DetectedObject>> {
    let Some(upper) = pixel_stats::region(&p.gray, pixel_stats::upper_third(p.width, p.height))?
    else {
        return Ok(Vec::new());
    };
    let mask = pixel_stats::binarize(&upper, LIGHT_INTENSITY_CUTOFF, false)?;

    // The region starts at row 0, so contour coordinates are already image coordinates
    let found: Vec<_> = pixel_stats::external_contours(&mask)?
        .into_iter()
        .filter(|c| {
            let pct = p.pct(c.area);
            pct > LIGHT_MIN_AREA_PCT && pct < LIGHT_MAX_AREA_PCT
        })
        .map(|c| DetectedObject::new("light", LIGHT_CONFIDENCE, c.rect.into(), p.pct(c.area)))
        .collect();
    debug!("bright-spot: {}", found.len());
    Ok(found)
}

/// Blue hue at ground level → one "water" candidate spanning the lower half.
fn detect_water(p: &Planes) -> Result<Vec<DetectedObject>> {
    let Some(lower) = pixel_stats::region(&p.hsv, pixel_stats::lower_half(p.width, p.height))?
    else {
        return Ok(Vec::new());
    };
    // Counting only the lower half is the same as zeroing the mask above it
    let water_pixels = pixel_stats::count_nonzero(&WATER_BAND.mask(&lower)?)?;
    let coverage = pixel_stats::percent(water_pixels, p.image_area);
    debug!("water-color: {:.1}%", coverage);

    if coverage > WATER_MIN_COVERAGE_PCT {
        Ok(vec![DetectedObject::new(
            "water",
            WATER_CONFIDENCE,
            p.lower_half_bbox(),
            coverage,
        )])
    } else {
        Ok(Vec::new())
    }
}

/// Large, upright brown/green structures → "tree".
fn detect_trees(p: &Planes) -> Result<Vec<DetectedObject>> {
    let brown = TREE_BROWN_BAND.mask(&p.hsv)?;
    let green = TREE_GREEN_BAND.mask(&p.hsv)?;
    let mut mask = Mat::default();
    core::bitwise_or_def(&brown, &green, &mut mask)?;

    let found: Vec<_> = pixel_stats::external_contours(&mask)?
        .into_iter()
        .filter(|c| p.pct(c.area) >= TREE_MIN_AREA_PCT)
        .filter(|c| c.rect.height as f64 > c.rect.width as f64 * TREE_MIN_ASPECT)
        .map(|c| DetectedObject::new("tree", TREE_CONFIDENCE, c.rect.into(), p.pct(c.area)))
        .collect();
    debug!("tree-color: {}", found.len());
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CivicError;
    use crate::pixel_stats::test_support::{canvas, fill};
    use opencv::core::Rect;

    const ASPHALT: (f64, f64, f64) = (128.0, 128.0, 128.0);

    fn labels(analysis: &ImageAnalysis) -> Vec<&str> {
        analysis
            .detected_objects
            .iter()
            .map(|o| o.label.as_str())
            .collect()
    }

    fn only(toggle: fn(&mut DetectorToggles)) -> HeuristicExtractor {
        let mut t = DetectorToggles {
            dark_region: false,
            road_surface: false,
            saturated_clutter: false,
            bright_spot: false,
            water_color: false,
            tree_color: false,
        };
        toggle(&mut t);
        HeuristicExtractor::new(t)
    }

    #[test]
    fn test_dark_patch_on_asphalt() {
        let mut img = canvas(200, 200, ASPHALT);
        fill(&mut img, Rect::new(50, 120, 40, 40), (0.0, 0.0, 0.0));

        let analysis = HeuristicExtractor::default().analyze(&img).unwrap();
        assert_eq!((analysis.width, analysis.height), (200, 200));
        assert_eq!(labels(&analysis), vec!["pothole", "road"]);

        let pothole = &analysis.detected_objects[0];
        assert_eq!(pothole.bbox, BBox::new(50, 120, 40, 40));
        assert_eq!(pothole.confidence, 0.7);
        assert!((pothole.area_percentage - 39.0 * 39.0 / 40000.0 * 100.0).abs() < 1e-9);

        let road = &analysis.detected_objects[1];
        assert_eq!(road.bbox, BBox::new(0, 100, 200, 100));
        // 200x100 lower half minus the 40x40 dark patch
        assert!((road.area_percentage - 18400.0 / 40000.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_small_dark_patch_ignored() {
        let mut img = canvas(200, 200, ASPHALT);
        fill(&mut img, Rect::new(50, 120, 10, 10), (0.0, 0.0, 0.0));
        let analysis = only(|t| t.dark_region = true).analyze(&img).unwrap();
        assert!(analysis.detected_objects.is_empty());
    }

    #[test]
    fn test_bright_road_is_not_road() {
        let img = canvas(100, 100, (220.0, 220.0, 220.0));
        let analysis = only(|t| t.road_surface = true).analyze(&img).unwrap();
        assert!(analysis.detected_objects.is_empty());
    }

    #[test]
    fn test_saturated_patch_is_clutter() {
        let mut img = canvas(200, 200, ASPHALT);
        fill(&mut img, Rect::new(10, 10, 60, 60), (0.0, 0.0, 255.0));

        let analysis = only(|t| t.saturated_clutter = true).analyze(&img).unwrap();
        assert_eq!(labels(&analysis), vec!["clutter"]);
        assert_eq!(analysis.detected_objects[0].bbox, BBox::new(10, 10, 60, 60));
        assert_eq!(analysis.detected_objects[0].confidence, 0.6);
    }

    #[test]
    fn test_sparse_saturation_skips_contours() {
        // 4% vivid coverage stays under the 5% gate
        let mut img = canvas(100, 100, ASPHALT);
        fill(&mut img, Rect::new(0, 0, 20, 20), (0.0, 0.0, 255.0));
        let analysis = only(|t| t.saturated_clutter = true).analyze(&img).unwrap();
        assert!(analysis.detected_objects.is_empty());
    }

    #[test]
    fn test_bright_spot_in_upper_third() {
        let mut img = canvas(300, 300, ASPHALT);
        fill(&mut img, Rect::new(100, 20, 20, 20), (255.0, 255.0, 255.0));
        // Same size blob low in the frame is ignored
        fill(&mut img, Rect::new(100, 250, 20, 20), (255.0, 255.0, 255.0));

        let analysis = only(|t| t.bright_spot = true).analyze(&img).unwrap();
        assert_eq!(labels(&analysis), vec!["light"]);
        assert_eq!(analysis.detected_objects[0].bbox, BBox::new(100, 20, 20, 20));
        assert_eq!(analysis.detected_objects[0].confidence, 0.65);
    }

    #[test]
    fn test_blown_out_sky_is_not_a_light() {
        let mut img = canvas(300, 300, ASPHALT);
        fill(&mut img, Rect::new(0, 0, 300, 90), (255.0, 255.0, 255.0));
        let analysis = only(|t| t.bright_spot = true).analyze(&img).unwrap();
        assert!(analysis.detected_objects.is_empty());
    }

    #[test]
    fn test_blue_ground_is_water() {
        let mut img = canvas(200, 200, ASPHALT);
        fill(&mut img, Rect::new(0, 130, 200, 60), (255.0, 0.0, 0.0));

        let analysis = only(|t| t.water_color = true).analyze(&img).unwrap();
        assert_eq!(labels(&analysis), vec!["water"]);
        let water = &analysis.detected_objects[0];
        assert_eq!(water.bbox, BBox::new(0, 100, 200, 100));
        assert!((water.area_percentage - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_blue_sky_is_not_water() {
        let mut img = canvas(200, 200, ASPHALT);
        fill(&mut img, Rect::new(0, 0, 200, 90), (255.0, 0.0, 0.0));
        let analysis = only(|t| t.water_color = true).analyze(&img).unwrap();
        assert!(analysis.detected_objects.is_empty());
    }

    #[test]
    fn test_upright_green_is_tree() {
        let mut img = canvas(200, 200, ASPHALT);
        fill(&mut img, Rect::new(100, 20, 30, 150), (0.0, 200.0, 0.0));
        // Wide green band fails the vertical filter
        fill(&mut img, Rect::new(0, 180, 200, 20), (0.0, 200.0, 0.0));

        let analysis = only(|t| t.tree_color = true).analyze(&img).unwrap();
        assert_eq!(labels(&analysis), vec!["tree"]);
        assert_eq!(analysis.detected_objects[0].bbox, BBox::new(100, 20, 30, 150));
    }

    #[test]
    fn test_emission_order_and_double_counting() {
        let mut img = canvas(200, 200, ASPHALT);
        fill(&mut img, Rect::new(0, 130, 200, 60), (255.0, 0.0, 0.0));

        let analysis = HeuristicExtractor::default().analyze(&img).unwrap();
        let l = labels(&analysis);
        // Pure blue is dark in grayscale, vivid, and water-coloured at once
        let pos = |name: &str| l.iter().position(|x| *x == name).unwrap();
        assert!(pos("pothole") < pos("clutter"));
        assert!(pos("clutter") < pos("water"));
        let total: f64 = analysis.detected_objects.iter().map(|o| o.area_percentage).sum();
        assert!(total > 60.0);
    }

    #[test]
    fn test_empty_image_rejected() {
        let err = HeuristicExtractor::default().analyze(&Mat::default()).unwrap_err();
        assert!(matches!(err, CivicError::InvalidImage(_)));
    }

    #[test]
    fn test_extract_is_deterministic() {
        let mut img = canvas(120, 90, ASPHALT);
        fill(&mut img, Rect::new(10, 50, 40, 30), (0.0, 0.0, 0.0));
        fill(&mut img, Rect::new(60, 5, 8, 8), (255.0, 255.0, 255.0));
        let mut ex = HeuristicExtractor::default();
        assert_eq!(ex.extract(&img).unwrap(), ex.extract(&img).unwrap());
    }
}
