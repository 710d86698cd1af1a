// src/report.rs
//
// Human-facing views of a verdict: the per-image report and the issue
// records handed to the external upload layer.

use crate::classifier::{GarbageStatus, IssueStatus, IssueVerdict, PotholeStatus, StreetLightStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_issues: usize,
    pub critical_issues: usize,
    pub warnings: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueReport {
    pub image_path: String,
    pub analysis_date: DateTime<Utc>,
    pub issues_detected: Vec<String>,
    pub summary: ReportSummary,
    pub detailed_results: IssueVerdict,
}

impl IssueReport {
    pub fn new(image_path: &str, verdict: IssueVerdict) -> Self {
        // (message, is_critical)
        let mut found: Vec<(&str, bool)> = Vec::new();

        if verdict.potholes.status == PotholeStatus::Present {
            found.push(("Potholes detected", true));
        }
        match verdict.garbage.status {
            GarbageStatus::Overflowing => found.push(("Overflowing garbage", true)),
            GarbageStatus::Normal => found.push(("Normal garbage levels", false)),
            GarbageStatus::NotPresent => {}
        }
        if verdict.street_lights.status == StreetLightStatus::NotWorking {
            found.push(("Street lights not working", true));
        }
        if verdict.waterlogging.status == IssueStatus::Issue {
            found.push(("Waterlogging detected", true));
        }
        if verdict.fallen_trees.status == IssueStatus::Issue {
            found.push(("Fallen trees obstructing path", true));
        }

        let critical = found.iter().filter(|(_, c)| *c).count();
        let summary = ReportSummary {
            total_issues: found.len(),
            critical_issues: critical,
            warnings: found.len() - critical,
        };
        let issues = found.into_iter().map(|(text, _)| text.to_string()).collect();
        Self {
            image_path: image_path.to_string(),
            analysis_date: Utc::now(),
            issues_detected: issues,
            summary,
            detailed_results: verdict,
        }
    }
}

// ============================================================================
// ISSUE RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CivicIssueRecord {
    pub title: String,
    pub description: String,
    pub image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl CivicIssueRecord {
    fn new(title: &str, description: &str, image_url: &str) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
            image_url: image_url.to_string(),
            locality: None,
            status: None,
        }
    }
}

/// One record per actionable issue. With `include_collection_notice`, a
/// `normal` garbage level also yields a "collection needed" record.
pub fn issue_records(
    verdict: &IssueVerdict,
    image_url: &str,
    include_collection_notice: bool,
) -> Vec<CivicIssueRecord> {
    let mut records = Vec::new();

    if verdict.potholes.status == PotholeStatus::Present {
        records.push(CivicIssueRecord::new(
            "Potholes",
            "Potholes have increased and clogging water drainage",
            image_url,
        ));
    }
    match verdict.garbage.status {
        GarbageStatus::Overflowing => records.push(CivicIssueRecord::new(
            "Garbage Overflow",
            "Garbage has exceeded limit and overflow into the streets",
            image_url,
        )),
        GarbageStatus::Normal if include_collection_notice => {
            records.push(CivicIssueRecord::new(
                "Garbage Collection Needed",
                "Garbage bins are filling up and need attention",
                image_url,
            ))
        }
        _ => {}
    }
    if verdict.street_lights.status == StreetLightStatus::NotWorking {
        records.push(CivicIssueRecord::new(
            "Faulty Streetlights",
            "Many street lights are faulty and flicker at night",
            image_url,
        ));
    }
    if verdict.waterlogging.status == IssueStatus::Issue {
        records.push(CivicIssueRecord::new(
            "Drains Clogging",
            "Drains have clogged and their water is entering homes",
            image_url,
        ));
    }
    if verdict.fallen_trees.status == IssueStatus::Issue {
        records.push(CivicIssueRecord::new(
            "Fallen Trees",
            "Trees have fallen and blocking the road",
            image_url,
        ));
    }
    records
}

/// Records ready for upload: tagged with locality and a draft status.
pub fn upload_records(verdict: &IssueVerdict, image_url: &str) -> Vec<CivicIssueRecord> {
    let locality = extract_locality(image_url);
    issue_records(verdict, image_url, true)
        .into_iter()
        .map(|mut r| {
            r.locality = locality.clone();
            r.status = Some("draft".to_string());
            r
        })
        .collect()
}

/// First path component starting with "sector", e.g. `data/Sector 3/a.jpg` → `Sector 3`.
pub fn extract_locality(image_path: &str) -> Option<String> {
    let normalized = image_path.replace('\\', "/");
    Path::new(&normalized)
        .iter()
        .filter_map(|part| part.to_str())
        .map(str::trim)
        .find(|part| part.to_lowercase().starts_with("sector"))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::StatusRecord;

    fn verdict(
        pothole: PotholeStatus,
        garbage: GarbageStatus,
        lights: StreetLightStatus,
        water: IssueStatus,
        trees: IssueStatus,
    ) -> IssueVerdict {
        IssueVerdict {
            potholes: StatusRecord::from(pothole),
            garbage: garbage.into(),
            street_lights: lights.into(),
            waterlogging: water.into(),
            fallen_trees: trees.into(),
        }
    }

    #[test]
    fn test_report_counts_critical_and_warnings() {
        let v = verdict(
            PotholeStatus::Present,
            GarbageStatus::Normal,
            StreetLightStatus::NotWorking,
            IssueStatus::NoIssue,
            IssueStatus::Issue,
        );
        let report = IssueReport::new("Sector 2/tree_p1.jpg", v);
        assert_eq!(
            report.summary,
            ReportSummary {
                total_issues: 4,
                critical_issues: 3,
                warnings: 1
            }
        );
        assert_eq!(report.issues_detected[1], "Normal garbage levels");
    }

    #[test]
    fn test_clean_verdict_has_no_records() {
        let v = verdict(
            PotholeStatus::NotPresent,
            GarbageStatus::NotPresent,
            StreetLightStatus::Working,
            IssueStatus::NoIssue,
            IssueStatus::NoIssue,
        );
        assert!(issue_records(&v, "a.jpg", true).is_empty());
        assert_eq!(IssueReport::new("a.jpg", v).summary.total_issues, 0);
    }

    #[test]
    fn test_collection_notice_only_when_requested() {
        let v = verdict(
            PotholeStatus::NotPresent,
            GarbageStatus::Normal,
            StreetLightStatus::NotDetected,
            IssueStatus::Issue,
            IssueStatus::NoIssue,
        );
        let titles = |recs: Vec<CivicIssueRecord>| -> Vec<String> {
            recs.into_iter().map(|r| r.title).collect()
        };
        assert_eq!(titles(issue_records(&v, "x.jpg", false)), vec!["Drains Clogging"]);
        assert_eq!(
            titles(issue_records(&v, "x.jpg", true)),
            vec!["Garbage Collection Needed", "Drains Clogging"]
        );
    }

    #[test]
    fn test_upload_records_carry_locality() {
        let v = verdict(
            PotholeStatus::Present,
            GarbageStatus::NotPresent,
            StreetLightStatus::NotDetected,
            IssueStatus::NoIssue,
            IssueStatus::NoIssue,
        );
        let recs = upload_records(&v, "dataset_mock\\Sector 3\\pothole_p2.jpg");
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].locality.as_deref(), Some("Sector 3"));
        assert_eq!(recs[0].status.as_deref(), Some("draft"));
    }

    #[test]
    fn test_extract_locality() {
        assert_eq!(
            extract_locality("dataset_mock/Sector 1/trash_p2.jpg").as_deref(),
            Some("Sector 1")
        );
        assert_eq!(extract_locality("images/street.jpg"), None);
    }
}
