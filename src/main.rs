use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod analyzer;
mod cascade;
mod config;
mod db;
mod loader;
mod models;
mod range;
mod report;
mod scenarios;

use config::Settings;
use loader::{PercentileTable, SchoolCatalog, SchoolEntry};
use models::{Applicant, ApplicantProfile};

#[derive(Parser)]
#[command(name = "admission-odds")]
#[command(about = "Estimate law school admission odds from competitive ranges", long_about = None)]
struct Cli {
    /// TOML config file (defaults to ./odds.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Source {
    /// Per-school outcome CSV files
    Csv,
    /// Outcomes imported into Postgres (needs DATABASE_URL)
    Db,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Import one school's outcome CSV into Postgres
    ImportOutcomes {
        /// School slug the outcomes belong to
        #[arg(long)]
        school: String,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Analyse one applicant against a list of schools
    #[command(group(
        ArgGroup::new("targets")
            .args(["schools", "tier"])
            .required(true)
            .multiple(false)
    ))]
    Analyze {
        #[arg(long, value_parser = parse_score)]
        gpa: f64,
        #[arg(long, value_parser = parse_score)]
        lsat: f64,
        /// Applicant is URM
        #[arg(long)]
        urm: bool,
        /// Applicant is KJD (no work experience)
        #[arg(long)]
        kjd: bool,
        #[arg(long, num_args = 1..)]
        schools: Vec<String>,
        /// t14, t20, t30, t50 or all
        #[arg(long)]
        tier: Option<String>,
        /// Save a markdown report to this path
        #[arg(long)]
        out: Option<PathBuf>,
        /// Print JSON instead of the table
        #[arg(long)]
        json: bool,
        #[arg(long, value_enum, default_value_t = Source::Csv)]
        source: Source,
    },
    /// Analyse every applicant in a CSV file
    Batch {
        #[arg(long)]
        csv: PathBuf,
        /// Directory for one markdown report per applicant
        #[arg(long)]
        out_dir: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = Source::Csv)]
        source: Source,
    },
    /// List schools that can be analysed
    Schools {
        #[arg(long)]
        tier: Option<String>,
    },
}

fn parse_score(value: &str) -> Result<f64, String> {
    let score: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("`{value}` is not a number"))?;
    if score.is_finite() {
        Ok(score)
    } else {
        Err(format!("`{value}` must be a finite number"))
    }
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

fn load_table(settings: &Settings) -> anyhow::Result<PercentileTable> {
    let path = &settings.data.percentiles_path;
    let table = PercentileTable::load(path)
        .with_context(|| format!("failed to load percentiles from {}", path.display()))?;
    info!(schools = table.entries().len(), "loaded percentile table");
    Ok(table)
}

async fn fill_pools(
    catalog: &mut SchoolCatalog,
    entries: &[SchoolEntry],
    settings: &Settings,
    source: Source,
) -> anyhow::Result<()> {
    match source {
        Source::Csv => catalog.load_pools_from_dir(entries, &settings.data.outcomes_dir),
        Source::Db => {
            let pool = connect().await?;
            db::load_pools(&pool, catalog, entries).await?;
        }
    }
    Ok(())
}

fn requested_schools(catalog: &SchoolCatalog, applicant: &Applicant) -> Vec<SchoolEntry> {
    catalog
        .resolve_all(&applicant.schools)
        .into_iter()
        .cloned()
        .collect()
}

fn write_markdown(
    path: &Path,
    applicant: &Applicant,
    reports: &[models::SchoolReport],
    settings: &Settings,
) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let markdown = report::render_markdown(applicant, reports, settings.analysis.on_time_cutoff);
    std::fs::write(path, markdown)
        .with_context(|| format!("failed to write report to {}", path.display()))?;
    println!("Report written to {}.", path.display());
    Ok(())
}

fn report_file_name(applicant: &Applicant, index: usize) -> String {
    let stem: String = applicant
        .name
        .as_deref()
        .unwrap_or("applicant")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    format!("{:02}-{}.md", index + 1, stem.trim_matches('-'))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::ImportOutcomes { school, csv } => {
            let pool = connect().await?;
            let inserted = db::import_outcomes(&pool, &school, &csv).await?;
            println!("Inserted {inserted} outcomes for {school} from {}.", csv.display());
        }
        Commands::Analyze {
            gpa,
            lsat,
            urm,
            kjd,
            schools,
            tier,
            out,
            json,
            source,
        } => {
            let table = load_table(&settings)?;
            let mut catalog = SchoolCatalog::new(table);

            let schools = match tier {
                Some(tier) => catalog
                    .table
                    .tier(&tier)?
                    .into_iter()
                    .map(|entry| entry.name.clone())
                    .collect(),
                None => schools,
            };
            let applicant = Applicant {
                name: None,
                profile: ApplicantProfile {
                    gpa,
                    lsat,
                    is_urm: urm,
                    is_kjd: kjd,
                },
                schools,
            };

            let entries = requested_schools(&catalog, &applicant);
            fill_pools(&mut catalog, &entries, &settings, source).await?;
            let targets: Vec<&SchoolEntry> = entries.iter().collect();
            let reports = analyzer::analyze_schools(
                &catalog,
                &targets,
                &applicant.profile,
                &settings.analysis,
            );

            if json {
                println!("{}", report::render_json(&applicant, &reports)?);
            } else {
                print!(
                    "{}",
                    report::render_table(&applicant, &reports, settings.analysis.on_time_cutoff)
                );
            }

            if let Some(path) = out {
                if reports.is_empty() {
                    warn!("no schools analysed, skipping markdown report");
                } else {
                    write_markdown(&path, &applicant, &reports, &settings)?;
                }
            }
        }
        Commands::Batch {
            csv,
            out_dir,
            source,
        } => {
            let applicants = loader::load_applicants(&csv)
                .with_context(|| format!("failed to read applicants from {}", csv.display()))?;
            if applicants.is_empty() {
                anyhow::bail!("no valid applicants found in {}", csv.display());
            }

            let mut catalog = SchoolCatalog::new(load_table(&settings)?);
            let mut entries: Vec<SchoolEntry> = Vec::new();
            for applicant in &applicants {
                for entry in requested_schools(&catalog, applicant) {
                    if !entries.iter().any(|seen| seen.name == entry.name) {
                        entries.push(entry);
                    }
                }
            }
            fill_pools(&mut catalog, &entries, &settings, source).await?;

            for (index, applicant) in applicants.iter().enumerate() {
                let targets = catalog.resolve_all(&applicant.schools);
                let reports = analyzer::analyze_schools(
                    &catalog,
                    &targets,
                    &applicant.profile,
                    &settings.analysis,
                );
                println!(
                    "{}",
                    report::render_table(applicant, &reports, settings.analysis.on_time_cutoff)
                );

                if let Some(dir) = &out_dir {
                    if !reports.is_empty() {
                        let path = dir.join(report_file_name(applicant, index));
                        write_markdown(&path, applicant, &reports, &settings)?;
                    }
                }
            }
        }
        Commands::Schools { tier } => {
            let table = load_table(&settings)?;
            let schools = match tier.as_deref() {
                Some(tier) => table.tier(tier)?,
                None => table.analyzable(),
            };

            if schools.is_empty() {
                println!("No schools available.");
                return Ok(());
            }

            for entry in schools {
                let rank = entry
                    .rank
                    .map(|rank| format!("#{rank}"))
                    .unwrap_or_else(|| "NR".to_string());
                println!(
                    "{:>5} {} (LSAT {}, GPA {})",
                    rank,
                    entry.name,
                    entry
                        .percentiles
                        .lsat_50
                        .map(|value| format!("{value:.0}"))
                        .unwrap_or_else(|| "N/A".to_string()),
                    entry
                        .percentiles
                        .gpa_50
                        .map(|value| format!("{value:.2}"))
                        .unwrap_or_else(|| "N/A".to_string()),
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_file_names_are_filesystem_safe() {
        let applicant = Applicant {
            name: Some("Avery Lee!".to_string()),
            profile: ApplicantProfile {
                gpa: 3.5,
                lsat: 165.0,
                is_urm: false,
                is_kjd: false,
            },
            schools: vec![],
        };
        assert_eq!(report_file_name(&applicant, 0), "01-avery-lee.md");
    }

    #[test]
    fn cli_requires_schools_or_tier() {
        let missing_targets =
            Cli::try_parse_from(["admission-odds", "analyze", "--gpa", "3.5", "--lsat", "165"]);
        assert!(missing_targets.is_err());
        let cli = Cli::try_parse_from([
            "admission-odds",
            "analyze",
            "--gpa",
            "3.5",
            "--lsat",
            "165",
            "--kjd",
            "--schools",
            "Yale",
            "Emory",
        ])
        .unwrap();
        match cli.command {
            Commands::Analyze { schools, kjd, urm, .. } => {
                assert_eq!(schools, vec!["Yale", "Emory"]);
                assert!(kjd);
                assert!(!urm);
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn cli_rejects_non_finite_scores() {
        for (flag, value) in [("--gpa", "NaN"), ("--lsat", "inf"), ("--gpa", "three")] {
            let mut args = vec!["admission-odds", "analyze", "--gpa", "3.5", "--lsat", "165"];
            let index = args.iter().position(|arg| *arg == flag).unwrap() + 1;
            args[index] = value;
            args.extend(["--schools", "Yale"]);
            assert!(Cli::try_parse_from(args).is_err(), "{flag} {value} was accepted");
        }
    }
}
