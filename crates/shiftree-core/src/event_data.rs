//! Event-data records: the text form of an event configuration.
//!
//! # Format
//!
//! ```text
//! species1 species2 event_time param_1 ... param_k
//! ```
//!
//! - Fields are separated by any whitespace; one record per line.
//! - `species2 = NA` means "the node named `species1`"; otherwise the record
//!   sits on the branch of the MRCA of both species.
//! - `event_time` is the distance from the root.
//! - Blank lines and lines starting with `#` are skipped.

use std::fmt::Write as _;

use crate::rate::ParameterError;

/// Sentinel for "no species".
pub const NA: &str = "NA";

/// One parsed record. Parameter fields are kept raw until a model reads them.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    /// 1-based line number in the source.
    pub line: usize,
    pub species1: String,
    pub species2: Option<String>,
    pub event_time: f64,
    pub params: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EventDataError {
    #[error("line {line}: expected `species1 species2 time params...`, found {found} field(s)")]
    TooFewFields { line: usize, found: usize },

    #[error("line {line}: event time is not a number: '{value}'")]
    InvalidTime { line: usize, value: String },

    #[error(
        "line {line}: either both species are NA or only the second species is given \
         while reading the event data file"
    )]
    MissingSpecies { line: usize },

    #[error("line {line}: {source}")]
    Parameters {
        line: usize,
        #[source]
        source: ParameterError,
    },
}

/// Parse every record in `input`.
///
/// # Errors
///
/// Returns the first [`EventDataError`] encountered; no records are returned
/// on failure.
pub fn parse_event_data(input: &str) -> Result<Vec<EventRecord>, EventDataError> {
    let mut records = Vec::new();

    for (index, raw) in input.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        let [species1, species2, time, params @ ..] = fields.as_slice() else {
            return Err(EventDataError::TooFewFields {
                line,
                found: fields.len(),
            });
        };

        if *species1 == NA {
            return Err(EventDataError::MissingSpecies { line });
        }

        let event_time: f64 = time.parse().map_err(|_| EventDataError::InvalidTime {
            line,
            value: (*time).to_string(),
        })?;
        if !event_time.is_finite() {
            return Err(EventDataError::InvalidTime {
                line,
                value: (*time).to_string(),
            });
        }

        records.push(EventRecord {
            line,
            species1: (*species1).to_string(),
            species2: (*species2 != NA).then(|| (*species2).to_string()),
            event_time,
            params: params.iter().map(|p| (*p).to_string()).collect(),
        });
    }

    Ok(records)
}

/// Render one record as a tab-separated line (with trailing newline).
#[must_use]
pub fn format_record(
    species1: &str,
    species2: Option<&str>,
    event_time: f64,
    params: &[String],
) -> String {
    let mut out = format!("{species1}\t{}\t{event_time}", species2.unwrap_or(NA));
    for p in params {
        let _ = write!(out, "\t{p}");
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pairs_singletons_and_skips_comments() {
        let input = "# species1 species2 time lambda\n\
                     t1 t2 0.5 0.3\n\
                     \n\
                     t3   NA\t1.25 0.7\n";
        let records = parse_event_data(input).unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].line, 2);
        assert_eq!(records[0].species2.as_deref(), Some("t2"));
        assert!((records[0].event_time - 0.5).abs() < f64::EPSILON);
        assert_eq!(records[0].params, vec!["0.3".to_string()]);

        assert_eq!(records[1].line, 4);
        assert_eq!(records[1].species1, "t3");
        assert_eq!(records[1].species2, None);
    }

    #[test]
    fn both_na_is_malformed() {
        let err = parse_event_data("NA NA 0.5 0.1\n").unwrap_err();
        assert_eq!(err, EventDataError::MissingSpecies { line: 1 });

        let err = parse_event_data("t1 t2 0.1 1\nNA t2 0.5 0.1\n").unwrap_err();
        assert_eq!(err, EventDataError::MissingSpecies { line: 2 });
    }

    #[test]
    fn short_and_non_numeric_records_fail_with_line() {
        assert_eq!(
            parse_event_data("t1 t2\n").unwrap_err(),
            EventDataError::TooFewFields { line: 1, found: 2 }
        );
        assert!(matches!(
            parse_event_data("t1 NA soon 0.1\n").unwrap_err(),
            EventDataError::InvalidTime { line: 1, .. }
        ));
    }

    #[test]
    fn formatted_records_parse_back() {
        let line = format_record("t1", None, 0.1 + 0.2, &["1.5".into(), "-0.25".into()]);
        let records = parse_event_data(&line).unwrap();
        assert_eq!(records[0].species2, None);
        assert_eq!(records[0].event_time.to_bits(), (0.1_f64 + 0.2).to_bits());
        assert_eq!(records[0].params, vec!["1.5".to_string(), "-0.25".to_string()]);
    }
}
