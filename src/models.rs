use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Normalised outcome of one self-reported application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCategory {
    Accepted,
    Rejected,
    Waitlisted,
    Hold,
    NoDecision,
    Unknown,
}

impl ResultCategory {
    /// Map a raw result string onto a category. Missing values are `Unknown`;
    /// anything unrecognised (pending, withdrawn, typos) counts as undecided.
    pub fn classify(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return ResultCategory::Unknown;
        };
        match raw.trim().to_lowercase().as_str() {
            "accepted" | "wl, accepted" | "wl_accepted" | "accepted_withdrawn"
            | "hold_accepted" => ResultCategory::Accepted,
            "rejected" | "wl, rejected" | "wl_rejected" | "hold_rejected" => {
                ResultCategory::Rejected
            }
            "waitlisted" | "wl" | "wl, withdrawn" | "wl_withdrawn" | "hold_wl" => {
                ResultCategory::Waitlisted
            }
            "hold" | "hold_withdrawn" => ResultCategory::Hold,
            _ => ResultCategory::NoDecision,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResultCategory::Accepted => "accepted",
            ResultCategory::Rejected => "rejected",
            ResultCategory::Waitlisted => "waitlisted",
            ResultCategory::Hold => "hold",
            ResultCategory::NoDecision => "no_decision",
            ResultCategory::Unknown => "unknown",
        }
    }

    pub fn from_stored(value: &str) -> Self {
        match value {
            "accepted" => ResultCategory::Accepted,
            "rejected" => ResultCategory::Rejected,
            "waitlisted" => ResultCategory::Waitlisted,
            "hold" => ResultCategory::Hold,
            "no_decision" => ResultCategory::NoDecision,
            _ => ResultCategory::Unknown,
        }
    }
}

/// Official 25th/50th/75th percentile figures for one school.
/// `None` means the figure is unknown, never zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PercentileReference {
    pub gpa_25: Option<f64>,
    pub gpa_50: Option<f64>,
    pub gpa_75: Option<f64>,
    pub lsat_25: Option<f64>,
    pub lsat_50: Option<f64>,
    pub lsat_75: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeRecord {
    pub gpa: f64,
    pub lsat: f64,
    pub result: ResultCategory,
    pub is_urm: bool,
    pub is_kjd: bool,
    pub sent_at: Option<NaiveDateTime>,
    pub received_at: Option<NaiveDateTime>,
    pub complete_at: Option<NaiveDateTime>,
}

impl OutcomeRecord {
    pub fn is_accepted(&self) -> bool {
        self.result == ResultCategory::Accepted
    }

    /// Earliest of the sent/received/complete timestamps that are present.
    pub fn earliest_activity(&self) -> Option<NaiveDateTime> {
        [self.sent_at, self.received_at, self.complete_at]
            .into_iter()
            .flatten()
            .min()
    }
}

/// Closed interval `[lower, upper]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub lower: f64,
    pub upper: f64,
}

impl Range {
    pub fn new(lower: f64, upper: f64) -> Self {
        debug_assert!(lower <= upper, "range lower bound exceeds upper bound");
        Range { lower, upper }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Decided count and admits for one cascade level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStats {
    pub total: usize,
    pub accepted: usize,
}

impl GroupStats {
    pub fn count<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a OutcomeRecord>,
    {
        records
            .into_iter()
            .fold(GroupStats::default(), |mut stats, record| {
                stats.total += 1;
                if record.is_accepted() {
                    stats.accepted += 1;
                }
                stats
            })
    }

    /// Acceptance rate in percent, undefined for an empty level.
    pub fn rate(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.accepted as f64 / self.total as f64 * 100.0)
        }
    }

    pub fn rate_label(&self) -> String {
        match self.rate() {
            Some(rate) => format!("{rate:.1}%"),
            None => "N/A".to_string(),
        }
    }
}

/// The four nested specificity levels, least to most specific.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cascade {
    pub total: GroupStats,
    pub kjd: GroupStats,
    pub urm: GroupStats,
    pub on_time: GroupStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeLevel {
    Total,
    Kjd,
    Urm,
    OnTime,
}

/// The cascade recomputed with GPA range `[25th, median - eps]` for an
/// applicant whose GPA sits below the 25th percentile but above the floor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub gpa_range: Range,
    pub cascade: Cascade,
}

/// Scalar inputs describing one applicant for one run of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ApplicantProfile {
    pub gpa: f64,
    pub lsat: f64,
    pub is_urm: bool,
    pub is_kjd: bool,
}

impl ApplicantProfile {
    pub fn kjd_label(&self) -> &'static str {
        if self.is_kjd {
            "KJD"
        } else {
            "Non-KJD"
        }
    }

    pub fn urm_label(&self) -> &'static str {
        if self.is_urm {
            "URM"
        } else {
            "Non-URM"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Applicant {
    pub name: Option<String>,
    #[serde(flatten)]
    pub profile: ApplicantProfile,
    pub schools: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub school: String,
    pub lsat_range: Option<Range>,
    pub gpa_range: Option<Range>,
    pub lsat_25: Option<f64>,
    pub lsat_50: Option<f64>,
    pub gpa_25: Option<f64>,
    pub gpa_50: Option<f64>,
    pub at_lsat_median: bool,
    pub below_gpa_floor: bool,
    pub below_gpa_25: bool,
    pub cascade: Cascade,
    pub kjd_label: &'static str,
    pub urm_label: &'static str,
    pub comparison: Option<Comparison>,
    pub warning: Option<String>,
}

impl AnalysisResult {
    pub fn level(&self, level: CascadeLevel) -> GroupStats {
        match level {
            CascadeLevel::Total => self.cascade.total,
            CascadeLevel::Kjd => self.cascade.kjd,
            CascadeLevel::Urm => self.cascade.urm,
            CascadeLevel::OnTime => self.cascade.on_time,
        }
    }

    pub fn level_label(&self, level: CascadeLevel) -> &'static str {
        match level {
            CascadeLevel::Total => "Total",
            CascadeLevel::Kjd => self.kjd_label,
            CascadeLevel::Urm => self.urm_label,
            CascadeLevel::OnTime => "On-time",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    Base,
    AtMedian,
    MedianPlus,
    GpaComp,
    BothUpgrade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Likely,
    #[serde(rename = "Good Chance")]
    GoodChance,
    Possible,
    Unlikely,
    #[serde(rename = "Low Data")]
    LowData,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Verdict::Likely => "Likely",
            Verdict::GoodChance => "Good Chance",
            Verdict::Possible => "Possible",
            Verdict::Unlikely => "Unlikely",
            Verdict::LowData => "Low Data",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestEstimate {
    pub level: CascadeLevel,
    pub label: &'static str,
    pub rate: Option<f64>,
    pub n: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioResult {
    pub label: &'static str,
    pub kind: ScenarioKind,
    pub description: String,
    pub lsat_range: Option<Range>,
    pub gpa_range: Option<Range>,
    pub cascade: Cascade,
    pub best_estimate: BestEstimate,
    pub verdict: Verdict,
}

/// Everything presentation needs for one (applicant, school) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchoolReport {
    pub rank: Option<u32>,
    #[serde(flatten)]
    pub analysis: AnalysisResult,
    pub scenarios: Vec<ScenarioResult>,
}
