// src/config.rs

use crate::error::{CivicError, Result};
use crate::types::{
    BatchConfig, Config, DetectorToggles, ExtractorConfig, ExtractorKind, IndicatorSets,
    LoggingConfig, ProblemClass, SeverityConfig,
};
use std::fs;
use std::path::Path;
use tracing::info;

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        info!("✓ Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Reads `path` when it exists, otherwise falls back to defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<()> {
        let s = &self.severity;
        if !(0.0..=1.0).contains(&s.noise_threshold) || !(0.0..=1.0).contains(&s.overflow_threshold)
        {
            return Err(CivicError::Config(
                "severity thresholds must lie in [0, 1]".to_string(),
            ));
        }
        if s.noise_threshold > s.overflow_threshold {
            return Err(CivicError::Config(format!(
                "noise_threshold {} exceeds overflow_threshold {}",
                s.noise_threshold, s.overflow_threshold
            )));
        }
        if self.extractor.kind == ExtractorKind::Yolo && self.extractor.model_path.is_empty() {
            return Err(CivicError::Config(
                "extractor.model_path is required for the yolo extractor".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            kind: ExtractorKind::Heuristic,
            model_path: "yolov8n.onnx".to_string(),
            confidence_threshold: 0.1,
            detectors: DetectorToggles::default(),
        }
    }
}

impl Default for DetectorToggles {
    fn default() -> Self {
        Self {
            dark_region: true,
            road_surface: true,
            saturated_clutter: true,
            bright_spot: true,
            water_color: true,
            tree_color: true,
        }
    }
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

impl Default for IndicatorSets {
    fn default() -> Self {
        Self {
            garbage: words(&[
                "bag", "bags", "container", "bin", "trash", "bottle", "bottles", "can", "cans",
                "box", "boxes", "plastic", "paper", "waste", "debris", "clutter", "litter", "pile",
                "backpack", "handbag", "suitcase", "cup", "garbage",
            ]),
            road: words(&[
                "road", "street", "pavement", "asphalt", "lane", "curb", "highway", "path",
                "surface", "ground",
            ]),
            pothole: words(&[
                "hole",
                "pothole",
                "crack",
                "damage",
                "depression",
                "void",
                "break",
                "damaged",
                "broken",
                "crater",
            ]),
            dark_void: words(&["dark", "hole"]),
            light: words(&[
                "light",
                "lamp",
                "streetlight",
                "street light",
                "bulb",
                "lighting",
                "illumination",
                "traffic light",
            ]),
            water: words(&[
                "water",
                "puddle",
                "flood",
                "flooding",
                "pool",
                "waterlogging",
                "wet",
                "rain",
                "lake",
            ]),
            tree: words(&[
                "tree",
                "branch",
                "trunk",
                "log",
                "wood",
                "plant",
                "vegetation",
                "leaves",
                "foliage",
            ]),
        }
    }
}

impl IndicatorSets {
    /// Lower-cased substring match of `label` against any term in `set`.
    pub fn matches(set: &[String], label: &str) -> bool {
        let label = label.to_lowercase();
        set.iter().any(|term| label.contains(term.as_str()))
    }
}

impl Default for SeverityConfig {
    fn default() -> Self {
        Self {
            noise_threshold: 0.05,
            overflow_threshold: 0.30,
            problem_classes: vec![ProblemClass {
                problem_type: "garbage".to_string(),
                labels: words(&["trash can", "vase", "cup", "bottle", "bowl", "container"]),
            }],
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input_dir: "dataset".to_string(),
            output_dir: ".".to_string(),
            results_file: "all_civic_results.json".to_string(),
            issues_file: "civic_issues_formatted.json".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
