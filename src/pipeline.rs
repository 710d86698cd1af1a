// src/pipeline.rs
//
// Per-image orchestration: decode → extract → classify. Images are handled
// one at a time with no state carried between them; a failing image is
// recorded and the batch moves on.

use crate::classifier::{IssueClassifier, IssueVerdict};
use crate::error::Result;
use crate::extractor::{build_extractor, ObjectExtractor};
use crate::image_input::load_image;
use crate::report::IssueReport;
use crate::severity::{assess_overflow, filter_problem_detections, OverflowAssessment};
use crate::types::{Config, Detection, ImageAnalysis, SeverityConfig};
use opencv::core::Mat;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// One entry of a batch result file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchEntry {
    Classified {
        image_path: String,
        #[serde(flatten)]
        verdict: IssueVerdict,
    },
    Failed {
        image_path: String,
        error: String,
    },
}

impl BatchEntry {
    pub fn image_path(&self) -> &str {
        match self {
            BatchEntry::Classified { image_path, .. } | BatchEntry::Failed { image_path, .. } => {
                image_path
            }
        }
    }

    pub fn verdict(&self) -> Option<&IssueVerdict> {
        match self {
            BatchEntry::Classified { verdict, .. } => Some(verdict),
            BatchEntry::Failed { .. } => None,
        }
    }
}

pub struct CivicIssueSystem {
    extractor: Box<dyn ObjectExtractor>,
    classifier: IssueClassifier,
    severity: SeverityConfig,
}

impl CivicIssueSystem {
    pub fn new(config: &Config) -> Result<Self> {
        let extractor = build_extractor(&config.extractor)?;
        Ok(Self::with_extractor(extractor, config))
    }

    /// Plug in any extractor, e.g. a learned detector built elsewhere.
    pub fn with_extractor(extractor: Box<dyn ObjectExtractor>, config: &Config) -> Self {
        info!("✓ Civic issue system ready ({} extractor)", extractor.name());
        Self {
            extractor,
            classifier: IssueClassifier::new(config.vocabulary.clone()),
            severity: config.severity.clone(),
        }
    }

    /// Extract and classify an already decoded image.
    pub fn analyze(&mut self, image: &Mat) -> Result<(ImageAnalysis, IssueVerdict)> {
        let analysis = self.extractor.extract(image)?;
        let verdict = self.classifier.classify(&analysis, image)?;
        Ok((analysis, verdict))
    }

    pub fn process_image(&mut self, path: &Path) -> Result<IssueVerdict> {
        let image = load_image(path)?;
        let (analysis, verdict) = self.analyze(&image)?;
        debug!(
            "{}: {} candidate(s) -> {:?}",
            path.display(),
            analysis.detected_objects.len(),
            verdict
        );
        Ok(verdict)
    }

    pub fn process_batch(&mut self, paths: &[impl AsRef<Path>]) -> Vec<BatchEntry> {
        let total = paths.len();
        paths
            .iter()
            .enumerate()
            .map(|(i, path)| {
                let path = path.as_ref();
                let image_path = path.display().to_string();
                info!("[{}/{}] Processing: {}", i + 1, total, image_path);
                match self.process_image(path) {
                    Ok(verdict) => BatchEntry::Classified {
                        image_path,
                        verdict,
                    },
                    Err(e) => {
                        warn!("Failed to process {}: {}", image_path, e);
                        BatchEntry::Failed {
                            image_path,
                            error: e.to_string(),
                        }
                    }
                }
            })
            .collect()
    }

    pub fn generate_report(&mut self, path: &Path) -> Result<IssueReport> {
        let verdict = self.process_image(path)?;
        Ok(IssueReport::new(&path.display().to_string(), verdict))
    }

    /// Overflow-only path: severity over the problem-class detections.
    pub fn assess_overflow(&mut self, path: &Path) -> Result<OverflowAssessment> {
        let image = load_image(path)?;
        let analysis = self.extractor.extract(&image)?;
        let detections: Vec<Detection> = analysis
            .detected_objects
            .iter()
            .map(Detection::from_object)
            .collect();
        let detections = filter_problem_detections(detections, &self.severity.problem_classes);
        assess_overflow(&detections, &image, &self.severity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{GarbageStatus, PotholeStatus};
    use crate::pixel_stats::test_support::{canvas, fill};
    use crate::report::upload_records;
    use crate::severity::OverflowStatus;
    use crate::types::{BBox, DetectedObject};
    use opencv::{
        core::{Rect, Vector},
        imgcodecs,
    };

    /// Extractor stub that reports fixed candidates, standing in for a learned model.
    struct FixedExtractor(Vec<DetectedObject>);

    impl ObjectExtractor for FixedExtractor {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn extract(&mut self, image: &Mat) -> Result<ImageAnalysis> {
            use opencv::prelude::*;
            Ok(ImageAnalysis::new(image.cols(), image.rows(), self.0.clone()))
        }
    }

    fn write_png(dir: &Path, name: &str, img: &Mat) -> std::path::PathBuf {
        let path = dir.join(name);
        imgcodecs::imwrite(path.to_str().unwrap(), img, &Vector::<i32>::new()).unwrap();
        path
    }

    #[test]
    fn test_batch_records_failures_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let mut img = canvas(200, 200, (128.0, 128.0, 128.0));
        fill(&mut img, Rect::new(50, 120, 40, 40), (0.0, 0.0, 0.0));
        let good = write_png(dir.path(), "pothole.png", &img);
        let missing = dir.path().join("missing.png");

        let mut system = CivicIssueSystem::new(&Config::default()).unwrap();
        let entries = system.process_batch(&[good, missing]);

        assert_eq!(entries.len(), 2);
        let verdict = entries[0].verdict().unwrap();
        assert_eq!(verdict.potholes.status, PotholeStatus::Present);
        assert!(matches!(entries[1], BatchEntry::Failed { .. }));

        let json = serde_json::to_value(&entries).unwrap();
        assert_eq!(json[0]["potholes"]["status"], "present");
        assert!(json[0]["image_path"].as_str().unwrap().ends_with("pothole.png"));
        assert!(json[1]["error"].is_string());
    }

    #[test]
    fn test_batch_entries_feed_draft_records() {
        let dir = tempfile::tempdir().unwrap();
        let sector = dir.path().join("Sector 4");
        std::fs::create_dir_all(&sector).unwrap();
        let mut img = canvas(200, 200, (128.0, 128.0, 128.0));
        fill(&mut img, Rect::new(50, 120, 40, 40), (0.0, 0.0, 0.0));
        let path = write_png(&sector, "pothole.png", &img);

        let mut system = CivicIssueSystem::new(&Config::default()).unwrap();
        let entries = system.process_batch(&[path]);
        let drafts: Vec<_> = entries
            .iter()
            .filter_map(|e| e.verdict().map(|v| upload_records(v, e.image_path())))
            .flatten()
            .collect();

        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].title, "Potholes");
        assert_eq!(drafts[0].locality.as_deref(), Some("Sector 4"));
        assert_eq!(drafts[0].status.as_deref(), Some("draft"));
    }

    #[test]
    fn test_repeat_classification_is_identical() {
        let mut img = canvas(160, 120, (128.0, 128.0, 128.0));
        fill(&mut img, Rect::new(20, 80, 40, 30), (0.0, 0.0, 0.0));
        fill(&mut img, Rect::new(100, 10, 8, 8), (255.0, 255.0, 255.0));
        fill(&mut img, Rect::new(60, 70, 30, 30), (0.0, 0.0, 255.0));

        let mut system = CivicIssueSystem::new(&Config::default()).unwrap();
        let first = system.analyze(&img).unwrap();
        let second = system.analyze(&img).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_substitute_extractor() {
        let objects = (0..10)
            .map(|i| DetectedObject::new("bottle", 0.8, BBox::new(i * 5, 50, 4, 4), 0.8))
            .collect();
        let mut system =
            CivicIssueSystem::with_extractor(Box::new(FixedExtractor(objects)), &Config::default());
        let (_, verdict) = system.analyze(&canvas(100, 100, (128.0, 128.0, 128.0))).unwrap();
        assert_eq!(verdict.garbage.status, GarbageStatus::Overflowing);
    }

    #[test]
    fn test_overflow_path_uses_problem_classes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "bins.png", &canvas(100, 100, (128.0, 128.0, 128.0)));
        let objects = vec![
            DetectedObject::new("cup", 1.0, BBox::new(0, 0, 40, 40), 16.0),
            DetectedObject::new("person", 1.0, BBox::new(0, 0, 100, 100), 100.0),
        ];
        let mut system =
            CivicIssueSystem::with_extractor(Box::new(FixedExtractor(objects)), &Config::default());

        let result = system.assess_overflow(&path).unwrap();
        assert_eq!(result.status, OverflowStatus::PartialOverflow);
        assert_eq!(result.severity, 0.16);
    }
}
