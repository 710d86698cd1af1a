// src/severity.rs
//
// Coverage-weighted severity for the overflow-only decision path.
//
//   severity = min(1, Σ box_area × confidence / image_area)

use crate::error::{CivicError, Result};
use crate::types::{Detection, ProblemClass, SeverityConfig};
use opencv::{core::Mat, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Confidence assumed for detections that do not carry one
pub const DEFAULT_CONFIDENCE: f32 = 1.0;

/// Severity of `detections` relative to `image`. An empty list scores 0
/// without inspecting the image.
pub fn severity(detections: &[Detection], image: &Mat) -> Result<f64> {
    if detections.is_empty() {
        return Ok(0.0);
    }
    let area = image.cols() as i64 * image.rows() as i64;
    if area <= 0 {
        return Err(CivicError::InvalidImage("image has zero area".to_string()));
    }
    Ok(severity_for_area(detections, area))
}

/// Same as [`severity`] with the image area given directly.
pub fn severity_for_area(detections: &[Detection], image_area: i64) -> f64 {
    if detections.is_empty() || image_area <= 0 {
        return 0.0;
    }
    let weighted: f64 = detections
        .iter()
        .map(|d| {
            let [x1, y1, x2, y2] = d.bbox;
            let box_area = (x2 - x1).max(0.0) as f64 * (y2 - y1).max(0.0) as f64;
            box_area * d.confidence.unwrap_or(DEFAULT_CONFIDENCE) as f64
        })
        .sum();
    (weighted / image_area as f64).min(1.0)
}

/// Keep detections whose label belongs to a configured problem class,
/// tagging each with that class.
pub fn filter_problem_detections(
    detections: Vec<Detection>,
    classes: &[ProblemClass],
) -> Vec<Detection> {
    detections
        .into_iter()
        .filter_map(|mut d| {
            let class = classes
                .iter()
                .find(|c| c.labels.iter().any(|l| l == &d.label))?;
            d.problem_type = Some(class.problem_type.clone());
            Some(d)
        })
        .collect()
}

// ============================================================================
// OVERFLOW LADDER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowStatus {
    NoIssue,
    Normal,
    PartialOverflow,
    PotentialOverflow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverflowAssessment {
    pub problem: Option<String>,
    pub status: OverflowStatus,
    /// Rounded to three decimals
    pub severity: f64,
}

/// Threshold ladder over the severity of already-filtered detections.
pub fn assess_overflow(
    detections: &[Detection],
    image: &Mat,
    config: &SeverityConfig,
) -> Result<OverflowAssessment> {
    let Some(first) = detections.first() else {
        return Ok(OverflowAssessment {
            problem: None,
            status: OverflowStatus::NoIssue,
            severity: 0.0,
        });
    };

    let score = severity(detections, image)?;
    let status = if score < config.noise_threshold {
        OverflowStatus::Normal
    } else if score < config.overflow_threshold {
        OverflowStatus::PartialOverflow
    } else {
        OverflowStatus::PotentialOverflow
    };
    debug!("severity {:.3} -> {:?}", score, status);

    Ok(OverflowAssessment {
        problem: Some(
            first
                .problem_type
                .clone()
                .unwrap_or_else(|| "garbage".to_string()),
        ),
        status,
        severity: (score * 1000.0).round() / 1000.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel_stats::test_support::canvas;

    fn det(label: &str, bbox: [f32; 4], conf: Option<f32>) -> Detection {
        Detection {
            label: label.to_string(),
            confidence: conf,
            bbox,
            problem_type: None,
        }
    }

    #[test]
    fn test_empty_detections_score_zero() {
        // Never looks at the image, even an empty one
        assert_eq!(severity(&[], &Mat::default()).unwrap(), 0.0);
    }

    #[test]
    fn test_weighted_coverage() {
        let img = canvas(100, 100, (0.0, 0.0, 0.0));
        let dets = [
            det("cup", [0.0, 0.0, 50.0, 50.0], Some(0.5)),
            det("cup", [50.0, 50.0, 60.0, 60.0], None),
        ];
        // 2500 * 0.5 + 100 * 1.0 = 1350 over 10000
        assert!((severity(&dets, &img).unwrap() - 0.135).abs() < 1e-9);
    }

    #[test]
    fn test_clamped_to_unit_interval() {
        let dets = [
            det("bottle", [0.0, 0.0, 100.0, 100.0], Some(0.9)),
            det("bottle", [0.0, 0.0, 100.0, 100.0], Some(0.9)),
        ];
        assert_eq!(severity_for_area(&dets, 10_000), 1.0);
        // Inverted boxes contribute nothing instead of going negative
        let inverted = [det("bottle", [50.0, 50.0, 10.0, 10.0], Some(1.0))];
        assert_eq!(severity_for_area(&inverted, 10_000), 0.0);
    }

    #[test]
    fn test_monotonic_in_area_and_confidence() {
        let base = severity_for_area(&[det("cup", [0.0, 0.0, 20.0, 20.0], Some(0.5))], 10_000);
        let bigger = severity_for_area(&[det("cup", [0.0, 0.0, 30.0, 20.0], Some(0.5))], 10_000);
        let surer = severity_for_area(&[det("cup", [0.0, 0.0, 20.0, 20.0], Some(0.8))], 10_000);
        assert!(bigger >= base);
        assert!(surer >= base);
    }

    #[test]
    fn test_problem_class_filter() {
        let classes = SeverityConfig::default().problem_classes;
        let kept = filter_problem_detections(
            vec![
                det("person", [0.0, 0.0, 1.0, 1.0], None),
                det("vase", [0.0, 0.0, 1.0, 1.0], None),
            ],
            &classes,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].problem_type.as_deref(), Some("garbage"));
    }

    #[test]
    fn test_overflow_ladder() {
        let config = SeverityConfig::default();
        let img = canvas(100, 100, (0.0, 0.0, 0.0));

        let none = assess_overflow(&[], &img, &config).unwrap();
        assert_eq!(none.status, OverflowStatus::NoIssue);
        assert_eq!(none.problem, None);

        let small = [det("cup", [0.0, 0.0, 10.0, 10.0], Some(1.0))];
        assert_eq!(
            assess_overflow(&small, &img, &config).unwrap().status,
            OverflowStatus::Normal
        );

        let partial = [det("cup", [0.0, 0.0, 40.0, 40.0], Some(1.0))];
        let result = assess_overflow(&partial, &img, &config).unwrap();
        assert_eq!(result.status, OverflowStatus::PartialOverflow);
        assert_eq!(result.severity, 0.16);
        assert_eq!(result.problem.as_deref(), Some("garbage"));

        let full = [det("cup", [0.0, 0.0, 60.0, 60.0], Some(1.0))];
        assert_eq!(
            assess_overflow(&full, &img, &config).unwrap().status,
            OverflowStatus::PotentialOverflow
        );
    }
}
