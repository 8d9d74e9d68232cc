use crate::models::{OutcomeRecord, Range};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LsatBounds {
    pub range: Option<Range>,
    pub at_median: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpaBounds {
    pub range: Option<Range>,
    pub below_floor: bool,
    /// Below the 25th percentile but at or above the floor.
    pub below_25: bool,
}

/// Second-lowest accepted score, ignoring the single lowest admit as a
/// likely outlier. With one admit its score is returned; with none, `None`.
pub fn find_floor<F>(pool: &[OutcomeRecord], score: F) -> Option<f64>
where
    F: Fn(&OutcomeRecord) -> f64,
{
    let mut accepted: Vec<f64> = pool
        .iter()
        .filter(|record| record.is_accepted())
        .map(&score)
        .filter(|value| !value.is_nan())
        .collect();
    accepted.sort_by(|a, b| a.total_cmp(b));

    match accepted.as_slice() {
        [] => None,
        [only] => Some(*only),
        [_, second, ..] => Some(*second),
    }
}

pub fn lsat_floor(pool: &[OutcomeRecord]) -> Option<f64> {
    find_floor(pool, |record| record.lsat)
}

pub fn gpa_floor(pool: &[OutcomeRecord]) -> Option<f64> {
    find_floor(pool, |record| record.gpa)
}

/// Range used when the applicant sits between the 25th percentile and the
/// median: `[p25, median - eps]`, never narrower than the single point `p25`.
pub fn lower_band(p25: f64, median: f64, eps: f64) -> Range {
    Range::new(p25, (median - eps).max(p25))
}

/// Below the 25th percentile the interval runs from the applicant up to the
/// 25th percentile, or up to the floor when the applicant is under it.
/// Returns the range and whether the floor capped it.
fn below_p25_range(applicant: f64, p25: f64, floor: Option<f64>) -> (Range, bool) {
    match floor {
        Some(floor) if applicant < floor => (Range::new(applicant, floor), true),
        _ => (Range::new(applicant, p25), false),
    }
}

/// Competitive LSAT interval. `step` is the width of one LSAT score point.
pub fn build_lsat_range(
    applicant: f64,
    p25: Option<f64>,
    median: Option<f64>,
    pool: &[OutcomeRecord],
    step: f64,
) -> LsatBounds {
    let (Some(p25), Some(median)) = (p25, median) else {
        return LsatBounds {
            range: None,
            at_median: false,
        };
    };

    if applicant > median {
        return LsatBounds {
            range: Some(Range::new(median, applicant)),
            at_median: false,
        };
    }

    if applicant == median {
        return LsatBounds {
            range: Some(lower_band(p25, median, step)),
            at_median: true,
        };
    }

    if applicant >= p25 {
        return LsatBounds {
            range: Some(Range::new(p25, applicant)),
            at_median: false,
        };
    }

    let (range, _) = below_p25_range(applicant, p25, lsat_floor(pool));
    LsatBounds {
        range: Some(range),
        at_median: false,
    }
}

/// Competitive GPA interval. GPA is continuous, so sitting exactly on the
/// median folds into the `[p25, median - eps]` band.
pub fn build_gpa_range(
    applicant: f64,
    p25: Option<f64>,
    median: Option<f64>,
    pool: &[OutcomeRecord],
    eps: f64,
) -> GpaBounds {
    let (Some(p25), Some(median)) = (p25, median) else {
        return GpaBounds {
            range: None,
            below_floor: false,
            below_25: false,
        };
    };

    if applicant > median {
        return GpaBounds {
            range: Some(Range::new(median, applicant)),
            below_floor: false,
            below_25: false,
        };
    }

    if applicant >= p25 {
        return GpaBounds {
            range: Some(lower_band(p25, median, eps)),
            below_floor: false,
            below_25: false,
        };
    }

    let (range, below_floor) = below_p25_range(applicant, p25, gpa_floor(pool));
    GpaBounds {
        range: Some(range),
        below_floor,
        below_25: !below_floor,
    }
}
