//! # Document Numbering
//!
//! Business numbers for sales transactions and purchase orders:
//! `PREFIX-YYYY-NNNNNN`, e.g. `TRX-2026-000042`.
//!
//! The sequence value itself comes from the database; this module only
//! formats and parses.

use std::fmt;

use chrono::{DateTime, Datelike, Utc};

use crate::error::ValidationError;
use crate::validation::{validate_document_prefix, ValidationResult};

/// Width of the zero-padded sequence part.
pub const SEQUENCE_WIDTH: usize = 6;

/// A parsed document number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentNumber {
    pub prefix: String,
    pub year: i32,
    pub sequence: i64,
}

impl DocumentNumber {
    pub fn new(prefix: &str, year: i32, sequence: i64) -> ValidationResult<Self> {
        validate_document_prefix(prefix)?;
        if sequence < 1 {
            return Err(ValidationError::MustBePositive {
                field: "sequence".to_string(),
            });
        }
        Ok(DocumentNumber {
            prefix: prefix.to_string(),
            year,
            sequence,
        })
    }

    /// Builds a number for the year of `at`.
    pub fn for_date(prefix: &str, at: DateTime<Utc>, sequence: i64) -> ValidationResult<Self> {
        DocumentNumber::new(prefix, at.year(), sequence)
    }

    /// Parses `PREFIX-YYYY-NNNNNN`.
    pub fn parse(value: &str) -> ValidationResult<Self> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "document number".to_string(),
            reason: reason.to_string(),
        };

        let mut parts = value.split('-');
        let (Some(prefix), Some(year), Some(sequence), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid("expected PREFIX-YYYY-NNNNNN"));
        };

        if year.len() != 4 {
            return Err(invalid("year must have four digits"));
        }
        let year: i32 = year.parse().map_err(|_| invalid("year is not a number"))?;
        if sequence.len() < SEQUENCE_WIDTH {
            return Err(invalid("sequence is too short"));
        }
        let sequence: i64 = sequence
            .parse()
            .map_err(|_| invalid("sequence is not a number"))?;

        DocumentNumber::new(prefix, year, sequence)
    }
}

impl fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{:04}-{:0width$}",
            self.prefix,
            self.year,
            self.sequence,
            width = SEQUENCE_WIDTH
        )
    }
}
