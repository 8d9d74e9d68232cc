use chrono::{NaiveDate, NaiveTime};

use crate::models::{ApplicantProfile, Cascade, GroupStats, OutcomeRecord, Range, ResultCategory};

/// Records whose LSAT and GPA both fall inside the box, bounds inclusive.
pub fn in_box(pool: &[OutcomeRecord], lsat_range: Range, gpa_range: Range) -> Vec<&OutcomeRecord> {
    pool.iter()
        .filter(|record| lsat_range.contains(record.lsat) && gpa_range.contains(record.gpa))
        .collect()
}

/// True unless the earliest recorded activity falls after midnight on
/// `cutoff`. Activity later on the cutoff day itself is late.
pub fn is_on_time(record: &OutcomeRecord, cutoff: NaiveDate) -> bool {
    match record.earliest_activity() {
        Some(earliest) => earliest <= cutoff.and_time(NaiveTime::MIN),
        None => true,
    }
}

/// Filters the pool into the box and narrows it level by level:
/// decided, then KJD, then URM, then on-time. Each level is a subset of
/// the one before it.
///
/// KJD filtering is one-sided. A KJD applicant is compared only against KJD
/// records; a non-KJD applicant is compared against every decided record,
/// because "non-KJD" in self-reported data mostly means the work experience
/// field was left blank. Filtering symmetrically would shift rates.
pub fn run_cascade(
    pool: &[OutcomeRecord],
    lsat_range: Range,
    gpa_range: Range,
    applicant: &ApplicantProfile,
    on_time_cutoff: NaiveDate,
) -> Cascade {
    let decided: Vec<&OutcomeRecord> = in_box(pool, lsat_range, gpa_range)
        .into_iter()
        .filter(|record| record.result != ResultCategory::NoDecision)
        .collect();

    let kjd_slice: Vec<&OutcomeRecord> = if applicant.is_kjd {
        decided.iter().copied().filter(|record| record.is_kjd).collect()
    } else {
        decided.clone()
    };

    let urm_slice: Vec<&OutcomeRecord> = kjd_slice
        .iter()
        .copied()
        .filter(|record| record.is_urm == applicant.is_urm)
        .collect();

    let on_time_slice = urm_slice
        .iter()
        .copied()
        .filter(|record| is_on_time(record, on_time_cutoff));

    Cascade {
        total: GroupStats::count(decided.iter().copied()),
        kjd: GroupStats::count(kjd_slice.iter().copied()),
        urm: GroupStats::count(urm_slice.iter().copied()),
        on_time: GroupStats::count(on_time_slice),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn cutoff() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDateTime> {
        at(y, m, d, 0, 0)
    }

    fn at(y: i32, m: u32, d: u32, hour: u32, min: u32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(y, m, d).and_then(|day| day.and_hms_opt(hour, min, 0))
    }

    fn record(gpa: f64, lsat: f64, result: ResultCategory) -> OutcomeRecord {
        OutcomeRecord {
            gpa,
            lsat,
            result,
            is_urm: false,
            is_kjd: false,
            sent_at: None,
            received_at: None,
            complete_at: None,
        }
    }

    fn applicant(is_kjd: bool, is_urm: bool) -> ApplicantProfile {
        ApplicantProfile {
            gpa: 3.6,
            lsat: 165.0,
            is_urm,
            is_kjd,
        }
    }

    fn sample_pool() -> Vec<OutcomeRecord> {
        let mut pool = vec![
            OutcomeRecord {
                is_kjd: true,
                sent_at: date(2024, 10, 1),
                ..record(3.5, 162.0, ResultCategory::Accepted)
            },
            OutcomeRecord {
                is_kjd: true,
                is_urm: true,
                ..record(3.6, 163.0, ResultCategory::Accepted)
            },
            OutcomeRecord {
                is_kjd: true,
                sent_at: date(2025, 2, 10),
                received_at: date(2025, 2, 11),
                ..record(3.4, 161.0, ResultCategory::Rejected)
            },
            record(3.5, 164.0, ResultCategory::Waitlisted),
            record(3.5, 164.0, ResultCategory::Accepted),
            record(3.5, 162.0, ResultCategory::NoDecision),
        ];
        // Outside the box on each axis.
        pool.push(record(3.9, 162.0, ResultCategory::Accepted));
        pool.push(record(3.5, 170.0, ResultCategory::Accepted));
        pool
    }

    #[test]
    fn box_bounds_are_inclusive() {
        let pool = vec![
            record(3.3, 160.0, ResultCategory::Accepted),
            record(3.69, 164.0, ResultCategory::Accepted),
            record(3.7, 164.0, ResultCategory::Accepted),
            record(3.5, 159.0, ResultCategory::Accepted),
        ];
        let inside = in_box(&pool, Range::new(160.0, 164.0), Range::new(3.3, 3.69));
        assert_eq!(inside.len(), 2);
    }

    #[test]
    fn on_time_uses_earliest_present_date() {
        let late_but_early_sent = OutcomeRecord {
            sent_at: date(2024, 12, 20),
            complete_at: date(2025, 1, 15),
            ..record(3.5, 160.0, ResultCategory::Accepted)
        };
        assert!(is_on_time(&late_but_early_sent, cutoff()));

        let late = OutcomeRecord {
            received_at: date(2025, 1, 2),
            ..record(3.5, 160.0, ResultCategory::Accepted)
        };
        assert!(!is_on_time(&late, cutoff()));

        let on_cutoff = OutcomeRecord {
            complete_at: date(2025, 1, 1),
            ..record(3.5, 160.0, ResultCategory::Accepted)
        };
        assert!(is_on_time(&on_cutoff, cutoff()));

        assert!(is_on_time(&record(3.5, 160.0, ResultCategory::Accepted), cutoff()));
    }

    #[test]
    fn activity_later_on_cutoff_day_is_late() {
        let morning = OutcomeRecord {
            sent_at: at(2025, 1, 1, 8, 30),
            ..record(3.5, 160.0, ResultCategory::Accepted)
        };
        assert!(!is_on_time(&morning, cutoff()));

        let midnight = OutcomeRecord {
            sent_at: at(2025, 1, 1, 0, 0),
            ..record(3.5, 160.0, ResultCategory::Accepted)
        };
        assert!(is_on_time(&midnight, cutoff()));

        let eve = OutcomeRecord {
            sent_at: at(2024, 12, 31, 23, 59),
            complete_at: at(2025, 1, 1, 8, 30),
            ..record(3.5, 160.0, ResultCategory::Accepted)
        };
        assert!(is_on_time(&eve, cutoff()));
    }

    #[test]
    fn kjd_applicant_filters_to_kjd_records() {
        let cascade = run_cascade(
            &sample_pool(),
            Range::new(160.0, 164.0),
            Range::new(3.3, 3.69),
            &applicant(true, false),
            cutoff(),
        );

        assert_eq!(cascade.total, GroupStats { total: 5, accepted: 3 });
        assert_eq!(cascade.kjd, GroupStats { total: 3, accepted: 2 });
        assert_eq!(cascade.urm, GroupStats { total: 2, accepted: 1 });
        assert_eq!(cascade.on_time, GroupStats { total: 1, accepted: 1 });
    }

    #[test]
    fn non_kjd_applicant_keeps_every_decided_record() {
        let cascade = run_cascade(
            &sample_pool(),
            Range::new(160.0, 164.0),
            Range::new(3.3, 3.69),
            &applicant(false, false),
            cutoff(),
        );

        assert_eq!(cascade.kjd, cascade.total);
        assert_eq!(cascade.urm, GroupStats { total: 4, accepted: 2 });
        assert_eq!(cascade.on_time, GroupStats { total: 3, accepted: 2 });
    }

    #[test]
    fn urm_filter_applies_in_both_directions() {
        let cascade = run_cascade(
            &sample_pool(),
            Range::new(160.0, 164.0),
            Range::new(3.3, 3.69),
            &applicant(false, true),
            cutoff(),
        );

        assert_eq!(cascade.urm, GroupStats { total: 1, accepted: 1 });
    }

    #[test]
    fn levels_never_grow() {
        let pool = sample_pool();
        for (is_kjd, is_urm) in [(false, false), (false, true), (true, false), (true, true)] {
            let cascade = run_cascade(
                &pool,
                Range::new(150.0, 175.0),
                Range::new(3.0, 4.0),
                &applicant(is_kjd, is_urm),
                cutoff(),
            );
            let levels = [cascade.total, cascade.kjd, cascade.urm, cascade.on_time];
            for pair in levels.windows(2) {
                assert!(pair[1].total <= pair[0].total);
                assert!(pair[1].accepted <= pair[0].accepted);
            }
            for level in levels {
                assert!(level.accepted <= level.total);
                if let Some(rate) = level.rate() {
                    assert!((0.0..=100.0).contains(&rate));
                }
            }
        }
    }

    #[test]
    fn empty_box_gives_empty_levels() {
        let cascade = run_cascade(
            &sample_pool(),
            Range::new(120.0, 125.0),
            Range::new(2.0, 2.1),
            &applicant(true, true),
            cutoff(),
        );
        assert_eq!(cascade, Cascade::default());
        assert_eq!(cascade.total.rate(), None);
        assert_eq!(cascade.total.rate_label(), "N/A");
    }
}
