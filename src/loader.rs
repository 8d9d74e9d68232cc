//! Loading and cleaning of the two source datasets: the official percentile
//! table and the per-school self-reported outcome files. Also resolves
//! user-typed school names and reads applicant batch files.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{
    Applicant, ApplicantProfile, OutcomeRecord, PercentileReference, ResultCategory,
};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("malformed CSV data: {0}")]
    Parse(#[from] csv::Error),

    #[error("could not find school: {0}")]
    UnknownSchool(String),

    #[error("\"{query}\" matches several schools: {}", .candidates.join(", "))]
    AmbiguousSchool {
        query: String,
        candidates: Vec<String>,
    },

    #[error("{0} has no outcome data")]
    NoOutcomeData(String),

    #[error("unknown tier: {0} (expected t14, t20, t30, t50 or all)")]
    UnknownTier(String),
}

pub type LoadResult<T> = Result<T, LoadError>;

/// One row of the percentile table.
#[derive(Debug, Clone, PartialEq)]
pub struct SchoolEntry {
    pub name: String,
    /// File stem of the school's outcome CSV, when outcome data exists.
    pub slug: Option<String>,
    pub rank: Option<u32>,
    pub percentiles: PercentileReference,
}

#[derive(Debug, Deserialize)]
struct PercentileRow {
    #[serde(rename = "SchoolName", default)]
    school_name: Option<String>,
    #[serde(rename = "Slug", default)]
    slug: Option<String>,
    #[serde(rename = "Rank", default)]
    rank: Option<String>,
    #[serde(rename = "All25thPercentileUGPA", default)]
    gpa_25: Option<String>,
    #[serde(rename = "All50thPercentileUGPA", default)]
    gpa_50: Option<String>,
    #[serde(rename = "All75thPercentileUGPA", default)]
    gpa_75: Option<String>,
    #[serde(rename = "All25thPercentileLSAT", default)]
    lsat_25: Option<String>,
    #[serde(rename = "All50thPercentileLSAT", default)]
    lsat_50: Option<String>,
    #[serde(rename = "All75thPercentileLSAT", default)]
    lsat_75: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OutcomeRow {
    #[serde(default)]
    gpa: Option<String>,
    #[serde(default)]
    lsat: Option<String>,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    is_urm: Option<String>,
    #[serde(default)]
    work_experience: Option<String>,
    #[serde(default)]
    work_experience_label: Option<String>,
    #[serde(default)]
    sent_at: Option<String>,
    #[serde(default)]
    received_at: Option<String>,
    #[serde(default)]
    complete_at: Option<String>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Positive number or nothing. Zero, negatives and junk are unknown values.
pub fn parse_positive(value: Option<&str>) -> Option<f64> {
    non_empty(value)
        .and_then(|value| value.parse::<f64>().ok())
        .filter(|value| value.is_finite() && *value > 0.0)
}

fn parse_number(value: Option<&str>) -> Option<f64> {
    non_empty(value)
        .and_then(|value| value.parse::<f64>().ok())
        .filter(|value| value.is_finite())
}

pub fn parse_flag(value: Option<&str>, truthy: &[&str]) -> bool {
    non_empty(value)
        .map(|value| truthy.contains(&value.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time of day. RFC 3339
/// values are converted to UTC; a bare date means midnight.
pub fn parse_timestamp(value: Option<&str>) -> Option<NaiveDateTime> {
    let value = non_empty(value)?;
    if let Ok(stamp) = DateTime::parse_from_rfc3339(value) {
        return Some(stamp.naive_utc());
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .map(|day| day.and_time(NaiveTime::MIN))
        })
}

/// Zero years of work experience. The label column is only consulted when
/// the file has no `work_experience` column at all.
fn parse_kjd(
    work_experience: Option<&str>,
    label: Option<&str>,
    has_work_experience: bool,
) -> bool {
    if has_work_experience {
        return non_empty(work_experience)
            .and_then(|years| years.parse::<f64>().ok())
            .map(|years| years == 0.0)
            .unwrap_or(false);
    }
    non_empty(label)
        .map(|label| label.to_lowercase().contains("kjd"))
        .unwrap_or(false)
}

impl OutcomeRow {
    fn into_record(self, has_work_experience: bool) -> Option<OutcomeRecord> {
        let gpa = parse_number(self.gpa.as_deref())?;
        let lsat = parse_number(self.lsat.as_deref())?;
        Some(OutcomeRecord {
            gpa,
            lsat,
            result: ResultCategory::classify(non_empty(self.result.as_deref())),
            is_urm: parse_flag(self.is_urm.as_deref(), &["true", "1", "yes", "y", "urm"]),
            is_kjd: parse_kjd(
                self.work_experience.as_deref(),
                self.work_experience_label.as_deref(),
                has_work_experience,
            ),
            sent_at: parse_timestamp(self.sent_at.as_deref()),
            received_at: parse_timestamp(self.received_at.as_deref()),
            complete_at: parse_timestamp(self.complete_at.as_deref()),
        })
    }
}

/// Parse one school's outcome CSV. Rows missing GPA or LSAT are dropped.
pub fn read_outcomes<R: Read>(reader: R) -> LoadResult<Vec<OutcomeRecord>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let has_work_experience = reader
        .headers()?
        .iter()
        .any(|header| header.trim() == "work_experience");
    let mut records = Vec::new();
    let mut dropped = 0usize;

    for row in reader.deserialize::<OutcomeRow>() {
        match row?.into_record(has_work_experience) {
            Some(record) => records.push(record),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        debug!(dropped, kept = records.len(), "dropped outcome rows without GPA or LSAT");
    }
    Ok(records)
}

pub fn load_outcomes(path: &Path) -> LoadResult<Vec<OutcomeRecord>> {
    if !path.exists() {
        return Err(LoadError::MissingFile(path.to_path_buf()));
    }
    let file = std::fs::File::open(path).map_err(|err| LoadError::Csv {
        path: path.to_path_buf(),
        source: csv::Error::from(err),
    })?;
    read_outcomes(file).map_err(|err| match err {
        LoadError::Parse(source) => LoadError::Csv {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })
}

/// The official percentile table, in file order.
#[derive(Debug, Clone, Default)]
pub struct PercentileTable {
    entries: Vec<SchoolEntry>,
}

impl PercentileTable {
    #[cfg(test)]
    pub fn new(entries: Vec<SchoolEntry>) -> Self {
        PercentileTable { entries }
    }

    pub fn read<R: Read>(reader: R) -> LoadResult<Self> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let mut entries = Vec::new();

        for row in reader.deserialize::<PercentileRow>() {
            let row = row?;
            let Some(name) = non_empty(row.school_name.as_deref()).map(str::to_string) else {
                continue;
            };
            entries.push(SchoolEntry {
                name,
                slug: non_empty(row.slug.as_deref()).map(str::to_string),
                rank: non_empty(row.rank.as_deref()).and_then(|rank| rank.parse().ok()),
                percentiles: PercentileReference {
                    gpa_25: parse_positive(row.gpa_25.as_deref()),
                    gpa_50: parse_positive(row.gpa_50.as_deref()),
                    gpa_75: parse_positive(row.gpa_75.as_deref()),
                    lsat_25: parse_positive(row.lsat_25.as_deref()),
                    lsat_50: parse_positive(row.lsat_50.as_deref()),
                    lsat_75: parse_positive(row.lsat_75.as_deref()),
                },
            });
        }

        Ok(PercentileTable { entries })
    }

    pub fn load(path: &Path) -> LoadResult<Self> {
        if !path.exists() {
            return Err(LoadError::MissingFile(path.to_path_buf()));
        }
        let file = std::fs::File::open(path).map_err(|err| LoadError::Csv {
            path: path.to_path_buf(),
            source: csv::Error::from(err),
        })?;
        Self::read(file)
    }

    pub fn entries(&self) -> &[SchoolEntry] {
        &self.entries
    }

    /// Exact name, then slug, then a unique substring match, all
    /// case-insensitive.
    pub fn resolve(&self, query: &str) -> LoadResult<&SchoolEntry> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(LoadError::UnknownSchool(query.to_string()));
        }

        if let Some(entry) = self
            .entries
            .iter()
            .find(|entry| entry.name.to_lowercase() == needle)
        {
            return Ok(entry);
        }

        if let Some(entry) = self.entries.iter().find(|entry| {
            entry
                .slug
                .as_deref()
                .is_some_and(|slug| slug.to_lowercase() == needle)
        }) {
            return Ok(entry);
        }

        let matches: Vec<&SchoolEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.name.to_lowercase().contains(&needle))
            .collect();

        match matches.as_slice() {
            [] => Err(LoadError::UnknownSchool(query.to_string())),
            [only] => Ok(only),
            many => Err(LoadError::AmbiguousSchool {
                query: query.to_string(),
                candidates: many.iter().map(|entry| entry.name.clone()).collect(),
            }),
        }
    }

    /// Schools with outcome data, ordered by rank (unranked last) then name.
    pub fn analyzable(&self) -> Vec<&SchoolEntry> {
        let mut schools: Vec<&SchoolEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.slug.is_some())
            .collect();
        schools.sort_by(|a, b| {
            a.rank
                .unwrap_or(u32::MAX)
                .cmp(&b.rank.unwrap_or(u32::MAX))
                .then_with(|| a.name.cmp(&b.name))
        });
        schools
    }

    pub fn tier(&self, tier: &str) -> LoadResult<Vec<&SchoolEntry>> {
        let max_rank = match tier.trim().to_lowercase().as_str() {
            "t14" => Some(14),
            "t20" => Some(20),
            "t30" => Some(30),
            "t50" => Some(50),
            "all" => None,
            _ => return Err(LoadError::UnknownTier(tier.to_string())),
        };

        Ok(self
            .analyzable()
            .into_iter()
            .filter(|entry| match max_rank {
                Some(max) => entry.rank.is_some_and(|rank| rank <= max),
                None => true,
            })
            .collect())
    }
}

/// Read-only context for one run: the percentile table plus the outcome
/// pools of the schools being analysed.
#[derive(Debug, Clone, Default)]
pub struct SchoolCatalog {
    pub table: PercentileTable,
    pools: HashMap<String, Vec<OutcomeRecord>>,
}

impl SchoolCatalog {
    pub fn new(table: PercentileTable) -> Self {
        SchoolCatalog {
            table,
            pools: HashMap::new(),
        }
    }

    pub fn insert_pool(&mut self, slug: &str, pool: Vec<OutcomeRecord>) {
        self.pools.insert(slug.to_string(), pool);
    }

    pub fn pool(&self, slug: &str) -> Option<&[OutcomeRecord]> {
        self.pools.get(slug).map(Vec::as_slice)
    }

    pub fn has_pool(&self, slug: &str) -> bool {
        self.pools.contains_key(slug)
    }

    /// Resolve the requested names, skipping (and logging) the ones that
    /// cannot be analysed. Duplicates collapse onto the first occurrence.
    pub fn resolve_all<'a>(&'a self, names: &[String]) -> Vec<&'a SchoolEntry> {
        let mut resolved: Vec<&SchoolEntry> = Vec::new();
        for name in names {
            match self.table.resolve(name) {
                Ok(entry) if entry.slug.is_none() => {
                    warn!("{}", LoadError::NoOutcomeData(entry.name.clone()));
                }
                Ok(entry) => {
                    if !resolved.iter().any(|seen| seen.name == entry.name) {
                        resolved.push(entry);
                    }
                }
                Err(err) => warn!("{err}"),
            }
        }
        resolved
    }

    /// Load outcome CSVs from `dir` for every entry not yet loaded.
    pub fn load_pools_from_dir(&mut self, entries: &[SchoolEntry], dir: &Path) {
        for entry in entries {
            let Some(slug) = entry.slug.as_deref() else {
                continue;
            };
            if self.has_pool(slug) {
                continue;
            }
            let path = dir.join(format!("{slug}.csv"));
            match load_outcomes(&path) {
                Ok(pool) => {
                    debug!(school = %entry.name, records = pool.len(), "loaded outcome pool");
                    self.insert_pool(slug, pool);
                }
                Err(err) => warn!(school = %entry.name, "{err}"),
            }
        }
    }
}

/// Parse an applicant batch file. Header names are matched case-insensitively;
/// every column whose header starts with `school` contributes a school.
pub fn read_applicants<R: Read>(reader: R) -> LoadResult<Vec<Applicant>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|header| header.trim().trim_start_matches('\u{feff}').to_lowercase())
        .collect();

    let column = |candidates: &[&str]| {
        headers
            .iter()
            .position(|header| candidates.contains(&header.as_str()))
    };
    let name_col = column(&["username", "name"]);
    let lsat_col = column(&["lsat"]);
    let gpa_col = column(&["gpa"]);
    let urm_col = column(&["urm status", "urm"]);
    let kjd_col = column(&["kjd status", "kjd"]);
    let school_cols: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, header)| header.starts_with("school"))
        .map(|(idx, _)| idx)
        .collect();

    let mut applicants = Vec::new();
    for (idx, row) in reader.records().enumerate() {
        let row = row?;
        let field = |col: Option<usize>| col.and_then(|col| row.get(col));
        let name = non_empty(field(name_col))
            .map(str::to_string)
            .unwrap_or_else(|| format!("Row {}", idx + 2));

        let (Some(lsat), Some(gpa)) = (parse_number(field(lsat_col)), parse_number(field(gpa_col)))
        else {
            warn!(applicant = %name, "skipping applicant: can't parse GPA/LSAT");
            continue;
        };

        let schools: Vec<String> = school_cols
            .iter()
            .filter_map(|col| non_empty(row.get(*col)))
            .map(str::to_string)
            .collect();
        if schools.is_empty() {
            warn!(applicant = %name, "skipping applicant: no schools listed");
            continue;
        }

        applicants.push(Applicant {
            name: Some(name),
            profile: ApplicantProfile {
                gpa,
                lsat,
                is_urm: parse_flag(field(urm_col), &["urm", "y", "yes", "true"]),
                is_kjd: parse_flag(field(kjd_col), &["kjd", "y", "yes", "true"]),
            },
            schools,
        });
    }

    Ok(applicants)
}

pub fn load_applicants(path: &Path) -> LoadResult<Vec<Applicant>> {
    if !path.exists() {
        return Err(LoadError::MissingFile(path.to_path_buf()));
    }
    let file = std::fs::File::open(path).map_err(|err| LoadError::Csv {
        path: path.to_path_buf(),
        source: csv::Error::from(err),
    })?;
    read_applicants(file)
}
