//! # Document Sequences
//!
//! Allocates `PREFIX-YYYY-NNNNNN` numbers from one counter per prefix and
//! year. The counter is bumped inside the caller's transaction, so a
//! rolled-back document gives its number back.

use chrono::{DateTime, Datelike, Utc};
use sqlx::SqliteConnection;

use stockline_core::DocumentNumber;

use crate::error::DbResult;

/// Takes the next number for `prefix` in the year of `at`.
///
/// The upsert is the first write of a checkout, so it also claims SQLite's
/// write lock for the rest of the transaction.
pub async fn next_number(
    conn: &mut SqliteConnection,
    prefix: &str,
    at: DateTime<Utc>,
) -> DbResult<DocumentNumber> {
    let value: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO document_sequences (prefix, year, value)
        VALUES (?1, ?2, 1)
        ON CONFLICT(prefix, year) DO UPDATE SET value = value + 1
        RETURNING value
        "#,
    )
    .bind(prefix)
    .bind(at.year())
    .fetch_one(&mut *conn)
    .await?;

    Ok(DocumentNumber::for_date(prefix, at, value)?)
}
