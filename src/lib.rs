// src/lib.rs
//
// Civic infrastructure issue detection from a single street photo.
//
// Signal flow:
//   decoded BGR image → extractor (heuristic | yolo) → ImageAnalysis
//   ImageAnalysis + raw image → classifier → IssueVerdict (5 categories)
//   raw detections + image → severity → overflow ladder

pub mod classifier;
pub mod config;
pub mod error;
pub mod extractor;
pub mod image_input;
pub mod pipeline;
pub mod pixel_stats;
pub mod report;
pub mod severity;
pub mod types;
#[cfg(feature = "yolo")]
pub mod yolo;

pub use classifier::{IssueClassifier, IssueVerdict};
pub use error::{CivicError, Result};
pub use extractor::{build_extractor, HeuristicExtractor, ObjectExtractor};
pub use pipeline::{BatchEntry, CivicIssueSystem};
pub use severity::severity;
pub use types::{BBox, Config, DetectedObject, Detection, ImageAnalysis};
