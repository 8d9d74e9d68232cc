use std::fmt::Write;

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{Applicant, GroupStats, SchoolReport, ScenarioKind, Verdict};
use crate::scenarios::format_range;

fn format_score(value: Option<f64>, is_lsat: bool) -> String {
    match value {
        None => "N/A".to_string(),
        Some(value) if is_lsat => format!("{value:.0}"),
        Some(value) => format!("{value:.2}"),
    }
}

fn rank_label(rank: Option<u32>) -> String {
    rank.map(|rank| format!("#{rank}"))
        .unwrap_or_else(|| "NR".to_string())
}

fn applicant_line(applicant: &Applicant) -> String {
    let label = applicant
        .name
        .as_deref()
        .map(|name| format!(" ({name})"))
        .unwrap_or_default();
    format!(
        "Applicant{}: GPA {:.2} / LSAT {:.0} / {} / {}",
        label,
        applicant.profile.gpa,
        applicant.profile.lsat,
        applicant.profile.kjd_label(),
        applicant.profile.urm_label()
    )
}

/// Verdict of the base scenario for the summary column.
pub fn base_verdict(report: &SchoolReport) -> Verdict {
    report
        .scenarios
        .iter()
        .find(|scenario| scenario.kind == ScenarioKind::Base)
        .map(|scenario| scenario.verdict)
        .unwrap_or(Verdict::LowData)
}

fn cascade_line(applicant: &Applicant, cutoff: NaiveDate) -> String {
    format!(
        "Cascade: Total (decided) > {} > {} > On-time (<= {})",
        applicant.profile.kjd_label(),
        applicant.profile.urm_label(),
        cutoff.format("%b %-d, %Y")
    )
}

fn stats_cells(stats: &GroupStats, width: usize) -> String {
    format!(
        "{:>width$} {:>4} {:>7}",
        stats.total,
        stats.accepted,
        stats.rate_label(),
        width = width
    )
}

/// Fixed-width table for the terminal.
pub fn render_table(applicant: &Applicant, reports: &[SchoolReport], cutoff: NaiveDate) -> String {
    let mut output = String::new();
    let kjd = applicant.profile.kjd_label();
    let urm = applicant.profile.urm_label();

    let _ = writeln!(output, "{}", applicant_line(applicant));
    let _ = writeln!(output, "{}", "=".repeat(150));

    if reports.is_empty() {
        let _ = writeln!(output, "No schools could be analyzed.");
        return output;
    }

    let header = format!(
        "{:>5} {:<42} {:>9}   {:>11}    {:>5} {:>5} {:>5} {:>4} {:>7} | {:>7} {:>4} {:>7} | {:>7} {:>4} {:>7} | {:>5} {:>4} {:>7} {:>12}",
        "Rank", "School", "LSAT Rng", "GPA Rng", "MedL", "MedG", "Tot", "A", "%", kjd, "A", "%",
        urm, "A", "%", "OnTm", "A", "%", "Verdict"
    );
    let _ = writeln!(output, "{header}");
    let _ = writeln!(output, "{}", "-".repeat(header.len()));

    for report in reports {
        let analysis = &report.analysis;
        let rank = rank_label(report.rank);
        if analysis.cascade.total.total == 0 {
            if let Some(warning) = &analysis.warning {
                let _ = writeln!(output, "{:>5} {:<42} {}", rank, analysis.school, warning);
                continue;
            }
        }

        let median_flag = if analysis.at_lsat_median { " *" } else { "" };
        let floor_flag = if analysis.below_gpa_floor { " **" } else { "" };
        let _ = writeln!(
            output,
            "{:>5} {:<42} {:>9}{:<2} {:>11}{:<3} {:>5} {:>5} {} | {} | {} | {} {:>12}",
            rank,
            analysis.school,
            format_range(analysis.lsat_range, true),
            median_flag,
            format_range(analysis.gpa_range, false),
            floor_flag,
            format_score(analysis.lsat_50, true),
            format_score(analysis.gpa_50, false),
            stats_cells(&analysis.cascade.total, 5),
            stats_cells(&analysis.cascade.kjd, 7),
            stats_cells(&analysis.cascade.urm, 7),
            stats_cells(&analysis.cascade.on_time, 5),
            base_verdict(report).to_string(),
        );
    }

    let _ = writeln!(output);
    if reports.iter().any(|report| report.analysis.at_lsat_median) {
        let _ = writeln!(
            output,
            "  * = applicant is at LSAT median (treated as below-median for range)"
        );
    }
    if reports.iter().any(|report| report.analysis.below_gpa_floor) {
        let _ = writeln!(
            output,
            " ** = applicant GPA is below the 2nd-lowest accepted GPA (range capped at floor)"
        );
    }
    let _ = writeln!(output, "{}", cascade_line(applicant, cutoff));

    let _ = writeln!(output);
    let _ = writeln!(output, "What-if scenarios (best estimate, lowest rate first):");
    for report in reports {
        let _ = writeln!(output, "  {}", report.analysis.school);
        for scenario in &report.scenarios {
            let estimate = &scenario.best_estimate;
            let rate = estimate
                .rate
                .map(|rate| format!("{rate:.1}%"))
                .unwrap_or_else(|| "N/A".to_string());
            let _ = writeln!(
                output,
                "    - {:<20} {:<32} {:>7} via {} (n={}) -> {}",
                scenario.label,
                scenario.description,
                rate,
                estimate.label,
                estimate.n,
                scenario.verdict
            );
        }
        if let Some(comparison) = &report.analysis.comparison {
            let _ = writeln!(
                output,
                "    GPA {} comparison: Total {} / {} {} / {} {} / On-time {}",
                format_range(Some(comparison.gpa_range), false),
                comparison.cascade.total.rate_label(),
                kjd,
                comparison.cascade.kjd.rate_label(),
                urm,
                comparison.cascade.urm.rate_label(),
                comparison.cascade.on_time.rate_label()
            );
        }
    }

    output
}

fn markdown_stats(stats: &GroupStats) -> String {
    format!("{} | {} | {}", stats.total, stats.accepted, stats.rate_label())
}

pub fn render_markdown(
    applicant: &Applicant,
    reports: &[SchoolReport],
    cutoff: NaiveDate,
) -> String {
    let mut output = String::new();
    let kjd = applicant.profile.kjd_label();
    let urm = applicant.profile.urm_label();

    let _ = writeln!(output, "# Admission Odds Report");
    let _ = writeln!(output, "{}", applicant_line(applicant));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Competitive Range Summary");

    if reports.is_empty() {
        let _ = writeln!(output, "No schools could be analyzed.");
        return output;
    }

    let _ = writeln!(
        output,
        "| Rank | School | LSAT Range | GPA Range | Med LSAT | Med GPA | Total | Adm | % | {kjd} | Adm | % | {urm} | Adm | % | On-time | Adm | % | Verdict |"
    );
    let _ = writeln!(output, "{}|", "| --- ".repeat(19));

    for report in reports {
        let analysis = &report.analysis;
        let median_flag = if analysis.at_lsat_median { " \\*" } else { "" };
        let floor_flag = if analysis.below_gpa_floor { " \\*\\*" } else { "" };
        let _ = writeln!(
            output,
            "| {} | {} | {}{} | {}{} | {} | {} | {} | {} | {} | {} | {} |",
            rank_label(report.rank),
            analysis.school,
            format_range(analysis.lsat_range, true),
            median_flag,
            format_range(analysis.gpa_range, false),
            floor_flag,
            format_score(analysis.lsat_50, true),
            format_score(analysis.gpa_50, false),
            markdown_stats(&analysis.cascade.total),
            markdown_stats(&analysis.cascade.kjd),
            markdown_stats(&analysis.cascade.urm),
            markdown_stats(&analysis.cascade.on_time),
            base_verdict(report),
        );
    }

    let _ = writeln!(output);
    if reports.iter().any(|report| report.analysis.at_lsat_median) {
        let _ = writeln!(
            output,
            "\\* = applicant at LSAT median, treated as below-median for range."
        );
    }
    if reports.iter().any(|report| report.analysis.below_gpa_floor) {
        let _ = writeln!(
            output,
            "\\*\\* = applicant GPA below the 2nd-lowest accepted GPA; range capped at floor."
        );
    }
    let _ = writeln!(output, "{}.", cascade_line(applicant, cutoff));

    let warnings: Vec<&SchoolReport> = reports
        .iter()
        .filter(|report| report.analysis.warning.is_some())
        .collect();
    if !warnings.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Warnings");
        for report in warnings {
            if let Some(warning) = &report.analysis.warning {
                let _ = writeln!(output, "- {}: {}", report.analysis.school, warning);
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Scenarios");
    for report in reports {
        let _ = writeln!(output);
        let _ = writeln!(output, "### {}", report.analysis.school);
        let _ = writeln!(output, "| Scenario | Range | Best Level | n | Rate | Verdict |");
        let _ = writeln!(output, "| --- | --- | --- | --- | --- | --- |");
        for scenario in &report.scenarios {
            let estimate = &scenario.best_estimate;
            let rate = estimate
                .rate
                .map(|rate| format!("{rate:.1}%"))
                .unwrap_or_else(|| "N/A".to_string());
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {} | {} |",
                scenario.label,
                scenario.description,
                estimate.label,
                estimate.n,
                rate,
                scenario.verdict
            );
        }
    }

    output
}

#[derive(Serialize)]
struct JsonReport<'a> {
    applicant: &'a Applicant,
    results: &'a [SchoolReport],
}

pub fn render_json(applicant: &Applicant, reports: &[SchoolReport]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&JsonReport {
        applicant,
        results: reports,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer;
    use crate::config::AnalysisConfig;
    use crate::models::{ApplicantProfile, OutcomeRecord, PercentileReference, ResultCategory};
    use crate::scenarios;

    fn applicant() -> Applicant {
        Applicant {
            name: Some("Avery".to_string()),
            profile: ApplicantProfile {
                gpa: 3.1,
                lsat: 165.0,
                is_urm: false,
                is_kjd: true,
            },
            schools: vec!["Test Law".to_string()],
        }
    }

    fn cutoff() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    fn sample_report() -> SchoolReport {
        let percentiles = PercentileReference {
            gpa_25: Some(3.3),
            gpa_50: Some(3.7),
            gpa_75: None,
            lsat_25: Some(160.0),
            lsat_50: Some(165.0),
            lsat_75: None,
        };
        // Admits at 3.0 and 3.05 put the GPA floor under the applicant.
        let pool: Vec<OutcomeRecord> = [3.0, 3.05, 3.2, 3.3, 3.4, 3.5]
            .into_iter()
            .enumerate()
            .map(|(i, gpa)| OutcomeRecord {
                gpa,
                lsat: 162.0,
                result: if i != 2 && i != 4 {
                    ResultCategory::Accepted
                } else {
                    ResultCategory::Rejected
                },
                is_urm: false,
                is_kjd: true,
                sent_at: None,
                received_at: None,
                complete_at: None,
            })
            .collect();
        let config = AnalysisConfig::default();
        let profile = applicant().profile;
        let analysis = analyzer::analyze("Test Law", &percentiles, &pool, &profile, &config);
        let scenarios =
            scenarios::build_scenarios(&analysis, &percentiles, &pool, &profile, &config);
        SchoolReport {
            rank: Some(12),
            analysis,
            scenarios,
        }
    }

    #[test]
    fn table_marks_flags_and_labels_levels() {
        let output = render_table(&applicant(), &[sample_report()], cutoff());
        assert!(output.starts_with("Applicant (Avery): GPA 3.10 / LSAT 165 / KJD / Non-URM"));
        assert!(output.contains("#12"));
        assert!(output.contains("160-164 *"));
        assert!(output.contains("* = applicant is at LSAT median"));
        assert!(output.contains("Cascade: Total (decided) > KJD > Non-URM > On-time (<= Jan 1, 2025)"));
        assert!(output.contains("Low Data"));
    }

    #[test]
    fn empty_results_render_a_notice() {
        let output = render_table(&applicant(), &[], cutoff());
        assert!(output.contains("No schools could be analyzed."));
        let markdown = render_markdown(&applicant(), &[], cutoff());
        assert!(markdown.contains("No schools could be analyzed."));
    }

    #[test]
    fn markdown_lists_warnings_and_scenarios() {
        let output = render_markdown(&applicant(), &[sample_report()], cutoff());
        assert!(output.contains("| #12 | Test Law | 160-164 \\* |"));
        assert!(output.contains("## Warnings"));
        assert!(output.contains("- Test Law: Low sample size (n="));
        assert!(output.contains("### Test Law"));
        assert!(output.contains("Median+1 LSAT"));
    }

    #[test]
    fn json_carries_scenarios_and_flags() {
        let json = render_json(&applicant(), &[sample_report()]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let result = &value["results"][0];
        assert_eq!(result["school"], "Test Law");
        assert_eq!(result["at_lsat_median"], true);
        assert_eq!(result["below_gpa_25"], true);
        assert_eq!(result["lsat_range"]["lower"], 160.0);
        assert_eq!(value["applicant"]["is_kjd"], true);
        assert!(result["scenarios"].as_array().unwrap().len() >= 2);
        assert!(result["comparison"].is_object());
    }
}
