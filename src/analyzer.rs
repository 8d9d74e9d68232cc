//! Competitive range analysis for one applicant at one school.
//!
//! The LSAT and GPA ranges form a box around the applicant relative to the
//! school's 25th percentile and median. Self-reported outcomes inside the box
//! are then counted through the cascade in [`crate::cascade`]. An applicant
//! whose GPA is under the 25th percentile but not under the floor also gets a
//! comparison cascade computed against the 25th-to-median GPA band.

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::cascade;
use crate::config::AnalysisConfig;
use crate::loader::{SchoolCatalog, SchoolEntry};
use crate::models::{
    AnalysisResult, ApplicantProfile, Cascade, Comparison, OutcomeRecord, PercentileReference,
    SchoolReport,
};
use crate::range;
use crate::scenarios;

pub const MISSING_PERCENTILES: &str = "Missing percentile data";

pub fn analyze(
    school: &str,
    percentiles: &PercentileReference,
    pool: &[OutcomeRecord],
    applicant: &ApplicantProfile,
    config: &AnalysisConfig,
) -> AnalysisResult {
    let lsat = range::build_lsat_range(
        applicant.lsat,
        percentiles.lsat_25,
        percentiles.lsat_50,
        pool,
        config.lsat_step,
    );
    let gpa = range::build_gpa_range(
        applicant.gpa,
        percentiles.gpa_25,
        percentiles.gpa_50,
        pool,
        config.gpa_median_epsilon,
    );

    let mut result = AnalysisResult {
        school: school.to_string(),
        lsat_range: lsat.range,
        gpa_range: gpa.range,
        lsat_25: percentiles.lsat_25,
        lsat_50: percentiles.lsat_50,
        gpa_25: percentiles.gpa_25,
        gpa_50: percentiles.gpa_50,
        at_lsat_median: lsat.at_median,
        below_gpa_floor: gpa.below_floor,
        below_gpa_25: gpa.below_25,
        cascade: Cascade::default(),
        kjd_label: applicant.kjd_label(),
        urm_label: applicant.urm_label(),
        comparison: None,
        warning: None,
    };

    let (Some(lsat_range), Some(gpa_range)) = (lsat.range, gpa.range) else {
        debug!(school, "skipping cascade, percentile data incomplete");
        result.warning = Some(MISSING_PERCENTILES.to_string());
        return result;
    };

    result.cascade = cascade::run_cascade(
        pool,
        lsat_range,
        gpa_range,
        applicant,
        config.on_time_cutoff,
    );

    if result.cascade.total.total < config.min_sample {
        result.warning = Some(format!(
            "Low sample size (n={})",
            result.cascade.total.total
        ));
    }

    if gpa.below_25 {
        if let (Some(p25), Some(median)) = (percentiles.gpa_25, percentiles.gpa_50) {
            let comparison_range = range::lower_band(p25, median, config.gpa_median_epsilon);
            result.comparison = Some(Comparison {
                gpa_range: comparison_range,
                cascade: cascade::run_cascade(
                    pool,
                    lsat_range,
                    comparison_range,
                    applicant,
                    config.on_time_cutoff,
                ),
            });
        }
    }

    debug!(
        school,
        total = result.cascade.total.total,
        accepted = result.cascade.total.accepted,
        "analysis complete"
    );
    result
}

/// Analyse every school independently, in parallel. Output follows the
/// order of `schools`; schools whose pool is not in the catalog are skipped.
pub fn analyze_schools(
    catalog: &SchoolCatalog,
    schools: &[&SchoolEntry],
    applicant: &ApplicantProfile,
    config: &AnalysisConfig,
) -> Vec<SchoolReport> {
    schools
        .par_iter()
        .filter_map(|entry| {
            let slug = entry.slug.as_deref()?;
            let Some(pool) = catalog.pool(slug) else {
                warn!(school = %entry.name, "no outcome pool loaded");
                return None;
            };
            let analysis = analyze(&entry.name, &entry.percentiles, pool, applicant, config);
            let scenarios =
                scenarios::build_scenarios(&analysis, &entry.percentiles, pool, applicant, config);
            Some(SchoolReport {
                rank: entry.rank,
                analysis,
                scenarios,
            })
        })
        .collect()
}
