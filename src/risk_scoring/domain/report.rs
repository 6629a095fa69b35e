use super::advisory::Severity;
use super::ids::{GraphId, PackageVersionId, ReportId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Vulnerability counts per severity bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

impl SeverityCounts {
    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }

    pub fn get(&self, severity: Severity) -> u32 {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }

    pub fn total(&self) -> u32 {
        self.critical + self.high + self.medium + self.low
    }
}

impl AddAssign for SeverityCounts {
    fn add_assign(&mut self, other: Self) {
        self.critical += other.critical;
        self.high += other.high;
        self.medium += other.medium;
        self.low += other.low;
    }
}

/// Letter grade derived from [`ScoredPackage::score`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    E,
}

impl Grade {
    pub fn from_score(score: i64) -> Self {
        match score {
            s if s >= 100 => Grade::A,
            s if s >= 80 => Grade::B,
            s if s >= 60 => Grade::C,
            s if s >= 40 => Grade::D,
            _ => Grade::E,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::E => "E",
        }
    }
}

/// Scoring output for one package version, before it is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPackage {
    pub package_version_id: PackageVersionId,
    pub package: String,
    pub version: String,
    pub release_date: Option<DateTime<Utc>>,
    pub scoring_date: DateTime<Utc>,
    pub quality_score: f64,
    /// Version the quality score was computed for upstream
    pub quality_scored_version: Option<String>,
    pub direct: SeverityCounts,
    pub indirect: SeverityCounts,
    pub authors: Option<u32>,
    pub contributors: Option<u32>,
    pub immediate_deps: u32,
    pub all_deps: u32,
    pub graph_id: Option<GraphId>,
    /// Direct dependencies, resolved to report ids when persisted
    pub dependency_ids: Vec<PackageVersionId>,
}

impl ScoredPackage {
    /// Aggregate risk score; higher is better.
    pub fn score(&self) -> i64 {
        (self.quality_score * 100.0).round() as i64
            + Self::dependency_count_score(self.all_deps)
            + Self::vulnerability_score(&self.direct, &self.indirect)
    }

    pub fn grade(&self) -> Grade {
        Grade::from_score(self.score())
    }

    fn dependency_count_score(all_deps: u32) -> i64 {
        match all_deps {
            0 => 0,
            1..=5 => 10,
            6..=20 => 5,
            n if n >= 100 => -5,
            _ => 0,
        }
    }

    fn vulnerability_score(direct: &SeverityCounts, indirect: &SeverityCounts) -> i64 {
        -30 * i64::from(direct.critical)
            - 15 * i64::from(direct.high)
            - 7 * i64::from(direct.medium)
            - 15 * i64::from(indirect.critical)
            - 7 * i64::from(indirect.high)
            - 4 * i64::from(indirect.medium)
    }
}

/// A persisted report.
///
/// Many reports may exist per package version; the latest one is picked at
/// read time by `scoring_date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    #[serde(flatten)]
    pub summary: ScoredPackage,
    pub dependency_report_ids: Vec<ReportId>,
}

impl Report {
    pub fn package(&self) -> &str {
        &self.summary.package
    }

    pub fn version(&self) -> &str {
        &self.summary.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(quality: f64, all_deps: u32) -> ScoredPackage {
        ScoredPackage {
            package_version_id: PackageVersionId(1),
            package: "express".to_string(),
            version: "4.17.1".to_string(),
            release_date: None,
            scoring_date: Utc::now(),
            quality_score: quality,
            quality_scored_version: None,
            direct: SeverityCounts::default(),
            indirect: SeverityCounts::default(),
            authors: Some(2),
            contributors: Some(10),
            immediate_deps: 0,
            all_deps,
            graph_id: None,
            dependency_ids: vec![],
        }
    }

    #[test]
    fn test_counts_record_and_total() {
        let mut counts = SeverityCounts::default();
        counts.record(Severity::Critical);
        counts.record(Severity::Medium);
        counts.record(Severity::Medium);
        assert_eq!(counts.get(Severity::Medium), 2);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn test_counts_add_assign() {
        let mut a = SeverityCounts {
            critical: 1,
            high: 0,
            medium: 2,
            low: 3,
        };
        a += SeverityCounts {
            critical: 1,
            high: 4,
            medium: 0,
            low: 0,
        };
        assert_eq!(a.critical, 2);
        assert_eq!(a.high, 4);
        assert_eq!(a.medium, 2);
        assert_eq!(a.low, 3);
    }

    #[test]
    fn test_score_quality_and_dependency_terms() {
        assert_eq!(scored(0.9, 0).score(), 90);
        assert_eq!(scored(0.9, 3).score(), 100);
        assert_eq!(scored(0.9, 15).score(), 95);
        assert_eq!(scored(0.9, 50).score(), 90);
        assert_eq!(scored(0.9, 150).score(), 85);
    }

    #[test]
    fn test_score_vulnerability_penalties() {
        let mut report = scored(1.0, 0);
        report.direct.critical = 1;
        report.indirect.high = 2;
        report.direct.low = 5;
        assert_eq!(report.score(), 100 - 30 - 14);
    }

    #[test]
    fn test_grade_boundaries() {
        assert_eq!(Grade::from_score(100), Grade::A);
        assert_eq!(Grade::from_score(99), Grade::B);
        assert_eq!(Grade::from_score(60), Grade::C);
        assert_eq!(Grade::from_score(40), Grade::D);
        assert_eq!(Grade::from_score(-20), Grade::E);
    }

    #[test]
    fn test_report_serializes_flat() {
        let report = Report {
            id: ReportId(3),
            summary: scored(0.5, 0),
            dependency_report_ids: vec![ReportId(1)],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["package"], "express");
        assert_eq!(json["dependency_report_ids"][0], 1);
    }
}
