// src/classifier.rs
//
// Five-category civic issue classifier.
//
// Each category is decided on its own from the candidate list, and some of
// them look past the candidates at the raw pixels again because candidate
// extraction throws information away:
//
//   potholes      ← candidates only
//   garbage       ← candidates only (coverage, clustering, spread, count)
//   street_lights ← candidates + ROI brightness, or upper-third brightness
//   waterlogging  ← candidates + lower-half blue mask + lower-half variance
//   fallen_trees  ← candidates + lower-half brown mask

use crate::error::Result;
use crate::pixel_stats::{self, HsvBand};
use crate::types::{DetectedObject, ImageAnalysis, IndicatorSets};
use opencv::{core::Mat, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// VERDICT TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PotholeStatus {
    Present,
    NotPresent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GarbageStatus {
    Overflowing,
    Normal,
    NotPresent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreetLightStatus {
    Working,
    NotWorking,
    NotDetected,
}

/// Shared by waterlogging and fallen trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Issue,
    NoIssue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord<T> {
    pub status: T,
}

impl<T> From<T> for StatusRecord<T> {
    fn from(status: T) -> Self {
        Self { status }
    }
}

/// Exactly one status per category; serialises as
/// `{"potholes": {"status": "present"}, ...}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueVerdict {
    pub potholes: StatusRecord<PotholeStatus>,
    pub garbage: StatusRecord<GarbageStatus>,
    pub street_lights: StatusRecord<StreetLightStatus>,
    pub waterlogging: StatusRecord<IssueStatus>,
    pub fallen_trees: StatusRecord<IssueStatus>,
}

// ============================================================================
// THRESHOLDS
// ============================================================================

/// Minimum candidate area (percent of image) for a pothole
pub const POTHOLE_MIN_SIZE: f64 = 2.0;
/// Voids above this fraction of the height are sky, not road
pub const GROUND_TOP_RATIO: f64 = 0.3;

pub const GARBAGE_MIN_COVERAGE: f64 = 5.0;
pub const GARBAGE_OVERFLOW_THRESHOLD: f64 = 20.0;
/// Small confident detections are counted as litter
pub const SMALL_OBJECT_MAX_AREA: f64 = 1.0;
pub const SMALL_OBJECT_MIN_CONFIDENCE: f32 = 0.5;
pub const CLUSTER_MIN_COUNT: usize = 5;
pub const CLUSTER_AMPLIFIER: f64 = 1.3;
pub const SCATTER_MIN_COUNT: usize = 3;
/// Horizontal spread, percent of image width
pub const SCATTER_MIN_SPREAD: f64 = 50.0;
pub const OVERFLOW_MIN_COUNT: usize = 10;

pub const BRIGHT_PIXEL_CUTOFF: f64 = 200.0;
/// Percent of upper-third pixels that must be bright when no lamp was found
pub const BRIGHT_FALLBACK_MIN_PCT: f64 = 1.0;
pub const LIGHT_WORKING_INTENSITY: f64 = 150.0;

pub const WATER_LOGGING_THRESHOLD: f64 = 8.0;
pub const REFLECTION_MIN_VARIANCE: f64 = 2000.0;
pub const REFLECTION_MIN_WATER_PCT: f64 = 3.0;

pub const FALLEN_TREE_THRESHOLD: f64 = 10.0;
pub const FALLEN_TREE_MIN_BROWN_PCT: f64 = 10.0;
/// Width must exceed height by this factor for a lying trunk
pub const HORIZONTAL_MIN_ASPECT: f64 = 1.2;

/// Maps a lower-half pixel fraction onto the percent scale of candidate coverage
pub const LOWER_HALF_RESCALE: f64 = 50.0;

const WATER_BAND: HsvBand = HsvBand::new([90.0, 30.0, 30.0], [130.0, 255.0, 255.0]);
const BROWN_BAND: HsvBand = HsvBand::new([10.0, 30.0, 30.0], [25.0, 255.0, 200.0]);

// ============================================================================
// CLASSIFIER
// ============================================================================

pub struct IssueClassifier {
    vocab: IndicatorSets,
}

impl Default for IssueClassifier {
    fn default() -> Self {
        Self::new(IndicatorSets::default())
    }
}

/// Derived once per image and shared by the pixel-based categories.
struct RawPlanes {
    gray: Mat,
    hsv: Mat,
    width: i32,
    height: i32,
}

impl IssueClassifier {
    pub fn new(vocab: IndicatorSets) -> Self {
        Self { vocab }
    }

    /// All five categories for one image. `raw_image` must be the BGR image
    /// the analysis was extracted from.
    pub fn classify(&self, analysis: &ImageAnalysis, raw_image: &Mat) -> Result<IssueVerdict> {
        let planes = RawPlanes {
            gray: pixel_stats::to_gray(raw_image)?,
            hsv: pixel_stats::to_hsv(raw_image)?,
            width: raw_image.cols(),
            height: raw_image.rows(),
        };

        debug!("Classifying {} candidate(s)", analysis.detected_objects.len());

        Ok(IssueVerdict {
            potholes: self.classify_potholes(analysis).into(),
            garbage: self.classify_garbage(analysis).into(),
            street_lights: self.classify_street_lights(analysis, &planes)?.into(),
            waterlogging: self.classify_waterlogging(analysis, &planes)?.into(),
            fallen_trees: self.classify_fallen_trees(analysis, &planes)?.into(),
        })
    }

    // ------------------------------------------------------------------------
    // POTHOLES
    // ------------------------------------------------------------------------

    pub fn classify_potholes(&self, analysis: &ImageAnalysis) -> PotholeStatus {
        let ground_top = analysis.height as f64 * GROUND_TOP_RATIO;

        let found = analysis.detected_objects.iter().find(|obj| {
            if obj.area_percentage < POTHOLE_MIN_SIZE {
                return false;
            }
            if IndicatorSets::matches(&self.vocab.pothole, &obj.label) {
                return true;
            }
            IndicatorSets::matches(&self.vocab.dark_void, &obj.label)
                && obj.bbox.y as f64 > ground_top
        });

        match found {
            Some(obj) => {
                debug!(
                    "potholes: '{}' at {:.1}% of image",
                    obj.label, obj.area_percentage
                );
                PotholeStatus::Present
            }
            None => PotholeStatus::NotPresent,
        }
    }

    // ------------------------------------------------------------------------
    // GARBAGE
    // ------------------------------------------------------------------------

    fn is_garbage(&self, obj: &DetectedObject) -> bool {
        IndicatorSets::matches(&self.vocab.garbage, &obj.label)
            || (obj.area_percentage < SMALL_OBJECT_MAX_AREA
                && obj.confidence > SMALL_OBJECT_MIN_CONFIDENCE)
    }

    pub fn classify_garbage(&self, analysis: &ImageAnalysis) -> GarbageStatus {
        let garbage: Vec<&DetectedObject> = analysis
            .detected_objects
            .iter()
            .filter(|o| self.is_garbage(o))
            .collect();

        let mut coverage: f64 = garbage.iter().map(|o| o.area_percentage).sum();
        if garbage.len() >= CLUSTER_MIN_COUNT {
            coverage *= CLUSTER_AMPLIFIER;
        }
        debug!(
            "garbage: {} object(s), coverage {:.1}%",
            garbage.len(),
            coverage
        );

        if coverage < GARBAGE_MIN_COVERAGE {
            GarbageStatus::NotPresent
        } else if coverage >= GARBAGE_OVERFLOW_THRESHOLD
            || is_scattered(analysis.width, &garbage)
            || garbage.len() >= OVERFLOW_MIN_COUNT
        {
            GarbageStatus::Overflowing
        } else {
            GarbageStatus::Normal
        }
    }

    // ------------------------------------------------------------------------
    // STREET LIGHTS
    // ------------------------------------------------------------------------

    fn classify_street_lights(
        &self,
        analysis: &ImageAnalysis,
        planes: &RawPlanes,
    ) -> Result<StreetLightStatus> {
        let lights: Vec<&DetectedObject> = analysis
            .detected_objects
            .iter()
            .filter(|o| IndicatorSets::matches(&self.vocab.light, &o.label))
            .collect();

        if lights.is_empty() {
            let upper = pixel_stats::region(
                &planes.gray,
                pixel_stats::upper_third(planes.width, planes.height),
            )?;
            let bright_pct = match upper {
                Some(upper) => {
                    let bright = pixel_stats::binarize(&upper, BRIGHT_PIXEL_CUTOFF, false)?;
                    pixel_stats::percent(
                        pixel_stats::count_nonzero(&bright)?,
                        upper.total() as i64,
                    )
                }
                None => 0.0,
            };
            debug!("street_lights: no lamp candidates, {:.2}% bright sky", bright_pct);

            return Ok(if bright_pct > BRIGHT_FALLBACK_MIN_PCT {
                StreetLightStatus::Working
            } else {
                StreetLightStatus::NotDetected
            });
        }

        let mut working = 0;
        for light in &lights {
            let b = light.bbox;
            let rect = opencv::core::Rect::new(b.x, b.y, b.width, b.height);
            let Some(roi) = pixel_stats::region(&planes.gray, rect)? else {
                continue;
            };
            if pixel_stats::mean_intensity(&roi)? > LIGHT_WORKING_INTENSITY {
                working += 1;
            }
        }
        debug!("street_lights: {}/{} lit", working, lights.len());

        Ok(if working > 0 {
            StreetLightStatus::Working
        } else if !lights.is_empty() {
            StreetLightStatus::NotWorking
        } else {
            StreetLightStatus::NotDetected
        })
    }

    // ------------------------------------------------------------------------
    // WATERLOGGING
    // ------------------------------------------------------------------------

    fn classify_waterlogging(
        &self,
        analysis: &ImageAnalysis,
        planes: &RawPlanes,
    ) -> Result<IssueStatus> {
        let candidate_coverage = self.coverage(analysis, &self.vocab.water);

        let lower = pixel_stats::lower_half(planes.width, planes.height);
        let (mask_pct, variance) = match (
            pixel_stats::region(&planes.hsv, lower)?,
            pixel_stats::region(&planes.gray, lower)?,
        ) {
            (Some(hsv), Some(gray)) => (
                rescaled_fraction(&WATER_BAND.mask(&hsv)?)?,
                pixel_stats::variance(&gray)?,
            ),
            _ => (0.0, 0.0),
        };

        let total = candidate_coverage + mask_pct;
        debug!(
            "waterlogging: candidates {:.1}% + mask {:.1}% = {:.1}%, variance {:.0}",
            candidate_coverage, mask_pct, total, variance
        );

        let reflective = variance > REFLECTION_MIN_VARIANCE && mask_pct > REFLECTION_MIN_WATER_PCT;
        Ok(if total >= WATER_LOGGING_THRESHOLD || reflective {
            IssueStatus::Issue
        } else {
            IssueStatus::NoIssue
        })
    }

    // ------------------------------------------------------------------------
    // FALLEN TREES
    // ------------------------------------------------------------------------

    fn classify_fallen_trees(
        &self,
        analysis: &ImageAnalysis,
        planes: &RawPlanes,
    ) -> Result<IssueStatus> {
        let ground_top = analysis.height as f64 * GROUND_TOP_RATIO;
        let trees: Vec<&DetectedObject> = analysis
            .detected_objects
            .iter()
            .filter(|o| IndicatorSets::matches(&self.vocab.tree, &o.label))
            .collect();

        let tree_coverage: f64 = trees.iter().map(|o| o.area_percentage).sum();
        let horizontal = trees
            .iter()
            .filter(|o| {
                o.bbox.width as f64 > o.bbox.height as f64 * HORIZONTAL_MIN_ASPECT
                    && o.bbox.y as f64 > ground_top
            })
            .count();

        let lower = pixel_stats::lower_half(planes.width, planes.height);
        let brown_pct = match pixel_stats::region(&planes.hsv, lower)? {
            Some(hsv) => rescaled_fraction(&BROWN_BAND.mask(&hsv)?)?,
            None => 0.0,
        };
        debug!(
            "fallen_trees: {} horizontal, coverage {:.1}%, brown {:.1}%",
            horizontal, tree_coverage, brown_pct
        );

        let has_issue = horizontal > 0
            || (tree_coverage >= FALLEN_TREE_THRESHOLD && brown_pct > FALLEN_TREE_MIN_BROWN_PCT);
        Ok(if has_issue {
            IssueStatus::Issue
        } else {
            IssueStatus::NoIssue
        })
    }

    fn coverage(&self, analysis: &ImageAnalysis, set: &[String]) -> f64 {
        analysis
            .detected_objects
            .iter()
            .filter(|o| IndicatorSets::matches(set, &o.label))
            .map(|o| o.area_percentage)
            .sum()
    }
}

/// Needs at least three objects; spread is max(x) - min(x) over image width.
fn is_scattered(image_width: i32, garbage: &[&DetectedObject]) -> bool {
    if garbage.len() < SCATTER_MIN_COUNT || image_width <= 0 {
        return false;
    }
    let xs = garbage.iter().map(|o| o.bbox.x);
    let (min_x, max_x) = xs.fold((i32::MAX, i32::MIN), |(lo, hi), x| (lo.min(x), hi.max(x)));
    let spread = (max_x - min_x) as f64 / image_width as f64 * 100.0;
    spread > SCATTER_MIN_SPREAD
}

/// Mask pixel fraction of the region it was computed on, times the rescale constant.
fn rescaled_fraction(mask: &Mat) -> Result<f64> {
    let area = mask.total() as i64;
    if area == 0 {
        return Ok(0.0);
    }
    Ok(pixel_stats::count_nonzero(mask)? as f64 / area as f64 * LOWER_HALF_RESCALE)
}
