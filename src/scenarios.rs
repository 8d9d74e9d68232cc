use std::cmp::Ordering;

use crate::analyzer;
use crate::config::AnalysisConfig;
use crate::models::{
    AnalysisResult, ApplicantProfile, BestEstimate, CascadeLevel, OutcomeRecord,
    PercentileReference, Range, ScenarioKind, ScenarioResult, Verdict,
};

/// Cascade levels from most to least specific.
const ESTIMATE_ORDER: [CascadeLevel; 4] = [
    CascadeLevel::OnTime,
    CascadeLevel::Urm,
    CascadeLevel::Kjd,
    CascadeLevel::Total,
];

/// Most specific cascade level with at least `min_n` decided records.
/// Falls back to Total when nothing qualifies.
pub fn best_estimate(analysis: &AnalysisResult, min_n: usize) -> BestEstimate {
    let level = ESTIMATE_ORDER
        .into_iter()
        .find(|level| {
            let stats = analysis.level(*level);
            stats.total >= min_n && stats.rate().is_some()
        })
        .unwrap_or(CascadeLevel::Total);

    let stats = analysis.level(level);
    BestEstimate {
        level,
        label: analysis.level_label(level),
        rate: stats.rate(),
        n: stats.total,
    }
}

pub fn verdict(estimate: &BestEstimate, min_n: usize) -> Verdict {
    let Some(rate) = estimate.rate else {
        return Verdict::LowData;
    };
    if estimate.n < min_n {
        return Verdict::LowData;
    }
    match rate {
        r if r >= 60.0 => Verdict::Likely,
        r if r >= 40.0 => Verdict::GoodChance,
        r if r >= 20.0 => Verdict::Possible,
        _ => Verdict::Unlikely,
    }
}

pub fn format_range(range: Option<Range>, is_lsat: bool) -> String {
    match range {
        None => "N/A".to_string(),
        Some(range) if is_lsat => format!("{:.0}-{:.0}", range.lower, range.upper),
        Some(range) => format!("{:.2}-{:.2}", range.lower, range.upper),
    }
}

fn scenario(
    label: &'static str,
    kind: ScenarioKind,
    analysis: &AnalysisResult,
    min_n: usize,
) -> ScenarioResult {
    let best_estimate = best_estimate(analysis, min_n);
    let verdict = verdict(&best_estimate, min_n);
    ScenarioResult {
        label,
        kind,
        description: format!(
            "LSAT {}, GPA {}",
            format_range(analysis.lsat_range, true),
            format_range(analysis.gpa_range, false)
        ),
        lsat_range: analysis.lsat_range,
        gpa_range: analysis.gpa_range,
        cascade: analysis.cascade,
        best_estimate,
        verdict,
    }
}

/// What-if rows for one school, sorted by ascending best-estimate rate with
/// undefined rates first.
///
/// Besides the base case, the pipeline is re-run with the LSAT moved to the
/// median (applicant strictly below it), to median plus one point (applicant
/// at or below it), with the GPA moved up to the 25th percentile (applicant
/// below the 25th but above the floor), and with both upgrades together.
pub fn build_scenarios(
    base: &AnalysisResult,
    percentiles: &PercentileReference,
    pool: &[OutcomeRecord],
    applicant: &ApplicantProfile,
    config: &AnalysisConfig,
) -> Vec<ScenarioResult> {
    let min_n = config.scenario_min_n;
    let rerun = |lsat: f64, gpa: f64| {
        let adjusted = ApplicantProfile {
            lsat,
            gpa,
            ..*applicant
        };
        analyzer::analyze(&base.school, percentiles, pool, &adjusted, config)
    };

    let lsat_median = percentiles.lsat_50;
    let lsat_at_or_below_median = lsat_median.is_some_and(|median| applicant.lsat <= median);
    let gpa_upgrade = percentiles.gpa_25.filter(|_| base.below_gpa_25);

    let base_label = if base.at_lsat_median {
        "At Median LSAT"
    } else if lsat_at_or_below_median {
        "Below Median LSAT"
    } else {
        "Base"
    };
    let mut scenarios = vec![scenario(base_label, ScenarioKind::Base, base, min_n)];

    if let Some(median) = lsat_median.filter(|median| applicant.lsat < *median) {
        scenarios.push(scenario(
            "At Median LSAT",
            ScenarioKind::AtMedian,
            &rerun(median, applicant.gpa),
            min_n,
        ));
    }

    let median_plus = lsat_median
        .filter(|_| lsat_at_or_below_median)
        .map(|median| median + config.lsat_step);
    if let Some(lsat) = median_plus {
        scenarios.push(scenario(
            "Median+1 LSAT",
            ScenarioKind::MedianPlus,
            &rerun(lsat, applicant.gpa),
            min_n,
        ));
    }

    if let Some(gpa_25) = gpa_upgrade {
        scenarios.push(scenario(
            "25th–Med GPA",
            ScenarioKind::GpaComp,
            &rerun(applicant.lsat, gpa_25),
            min_n,
        ));
    }

    if let (Some(lsat), Some(gpa_25)) = (median_plus, gpa_upgrade) {
        scenarios.push(scenario(
            "Med+1 + 25th GPA",
            ScenarioKind::BothUpgrade,
            &rerun(lsat, gpa_25),
            min_n,
        ));
    }

    scenarios.sort_by(|a, b| compare_rates(a.best_estimate.rate, b.best_estimate.rate));
    scenarios
}

fn compare_rates(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
