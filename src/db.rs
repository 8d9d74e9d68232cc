use std::path::Path;

use anyhow::Context;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::loader::{self, SchoolCatalog, SchoolEntry};
use crate::models::{OutcomeRecord, ResultCategory};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Stable key per (school, row) so re-importing the same file is a no-op.
pub fn source_key(slug: &str, row: usize) -> String {
    format!("{slug}-{row:06}")
}

pub async fn import_outcomes(pool: &PgPool, slug: &str, csv_path: &Path) -> anyhow::Result<usize> {
    let records = loader::load_outcomes(csv_path)
        .with_context(|| format!("failed to load outcomes for {slug}"))?;
    let mut inserted = 0usize;

    for (row, record) in records.iter().enumerate() {
        let result = sqlx::query(
            r#"
            INSERT INTO admission_odds.outcomes
            (id, school_slug, gpa, lsat, result, is_urm, is_kjd,
             sent_at, received_at, complete_at, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(slug)
        .bind(record.gpa)
        .bind(record.lsat)
        .bind(record.result.as_str())
        .bind(record.is_urm)
        .bind(record.is_kjd)
        .bind(record.sent_at)
        .bind(record.received_at)
        .bind(record.complete_at)
        .bind(source_key(slug, row))
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    info!(school = slug, inserted, total = records.len(), "imported outcomes");
    Ok(inserted)
}

pub async fn fetch_pool(pool: &PgPool, slug: &str) -> anyhow::Result<Vec<OutcomeRecord>> {
    let rows = sqlx::query(
        "SELECT gpa, lsat, result, is_urm, is_kjd, sent_at, received_at, complete_at \
         FROM admission_odds.outcomes \
         WHERE school_slug = $1 \
         ORDER BY source_key",
    )
    .bind(slug)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to fetch outcomes for {slug}"))?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let result: String = row.get("result");
        records.push(OutcomeRecord {
            gpa: row.get("gpa"),
            lsat: row.get("lsat"),
            result: ResultCategory::from_stored(&result),
            is_urm: row.get("is_urm"),
            is_kjd: row.get("is_kjd"),
            sent_at: row.get("sent_at"),
            received_at: row.get("received_at"),
            complete_at: row.get("complete_at"),
        });
    }

    Ok(records)
}

/// Fill the catalog with pools from Postgres for every entry not yet loaded.
pub async fn load_pools(
    pool: &PgPool,
    catalog: &mut SchoolCatalog,
    entries: &[SchoolEntry],
) -> anyhow::Result<()> {
    for entry in entries {
        let Some(slug) = entry.slug.as_deref() else {
            continue;
        };
        if catalog.has_pool(slug) {
            continue;
        }
        let records = fetch_pool(pool, slug).await?;
        catalog.insert_pool(slug, records);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_keys_are_stable_and_sortable() {
        assert_eq!(source_key("yale", 7), "yale-000007");
        assert!(source_key("yale", 9) < source_key("yale", 10));
    }

    #[test]
    fn unrecognised_stored_result_is_unknown() {
        assert_eq!(ResultCategory::from_stored("no_decision"), ResultCategory::NoDecision);
        assert_eq!(ResultCategory::from_stored("Accepted"), ResultCategory::Unknown);
        assert_eq!(ResultCategory::from_stored(""), ResultCategory::Unknown);
    }
}
