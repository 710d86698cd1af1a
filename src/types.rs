// src/types.rs

use serde::{Deserialize, Serialize};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub extractor: ExtractorConfig,
    pub vocabulary: IndicatorSets,
    pub severity: SeverityConfig,
    pub batch: BatchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    Heuristic,
    Yolo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub kind: ExtractorKind,
    /// ONNX model used by the learned extractor
    pub model_path: String,
    pub confidence_threshold: f32,
    pub detectors: DetectorToggles,
}

/// Switches for the individual pixel heuristics. Each one scans the image on
/// its own, so turning one off never changes what the others emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorToggles {
    pub dark_region: bool,
    pub road_surface: bool,
    pub saturated_clutter: bool,
    pub bright_spot: bool,
    pub water_color: bool,
    pub tree_color: bool,
}

/// Indicator vocabularies matched (by substring) against candidate labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorSets {
    pub garbage: Vec<String>,
    /// Not consulted by any category decision; kept so configs can list it
    pub road: Vec<String>,
    pub pothole: Vec<String>,
    /// Void-like labels that count as potholes only below the skyline
    pub dark_void: Vec<String>,
    pub light: Vec<String>,
    pub water: Vec<String>,
    pub tree: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityConfig {
    /// Scores below this are treated as normal litter levels
    pub noise_threshold: f64,
    /// Scores at or above this are reported as a potential overflow
    pub overflow_threshold: f64,
    /// problem type -> detector labels that count towards it
    pub problem_classes: Vec<ProblemClass>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemClass {
    pub problem_type: String,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub input_dir: String,
    pub output_dir: String,
    pub results_file: String,
    pub issues_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

// ============================================================================
// DETECTION TYPES
// ============================================================================

/// Axis-aligned box in pixel units, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

impl From<opencv::core::Rect> for BBox {
    fn from(r: opencv::core::Rect) -> Self {
        Self::new(r.x, r.y, r.width, r.height)
    }
}

/// A labelled candidate region. `area_percentage` is not clamped: overlapping
/// heuristics may push the per-image sum past 100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub label: String,
    pub confidence: f32,
    pub bbox: BBox,
    pub area_percentage: f64,
}

impl DetectedObject {
    pub fn new(label: &str, confidence: f32, bbox: BBox, area_percentage: f64) -> Self {
        Self {
            label: label.to_string(),
            confidence,
            bbox,
            area_percentage,
        }
    }
}

/// Candidates for one image, in detector emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAnalysis {
    pub width: i32,
    pub height: i32,
    pub detected_objects: Vec<DetectedObject>,
}

impl ImageAnalysis {
    pub fn new(width: i32, height: i32, detected_objects: Vec<DetectedObject>) -> Self {
        Self {
            width,
            height,
            detected_objects,
        }
    }
}

/// Raw detector output consumed by the severity path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    /// Missing confidence weighs the box fully
    pub confidence: Option<f32>,
    /// [x1, y1, x2, y2] in image coordinates
    pub bbox: [f32; 4],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem_type: Option<String>,
}

impl Detection {
    pub fn from_object(obj: &DetectedObject) -> Self {
        let b = obj.bbox;
        Self {
            label: obj.label.clone(),
            confidence: Some(obj.confidence),
            bbox: [
                b.x as f32,
                b.y as f32,
                (b.x + b.width) as f32,
                (b.y + b.height) as f32,
            ],
            problem_type: None,
        }
    }
}
