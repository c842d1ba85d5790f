//! Source-to-destination column mapping with destination-keyed coercion.
//!
//! Mapping is a pure function over the row, the mapping table, and the clock:
//! no state is carried between rows. Coercion is keyed on the *destination*
//! column name rather than any inferred type — a small fixed set of
//! destination fields are parsed as dates or numbers, everything else copies
//! the raw cell text. Unparsable dates degrade to NULL with a warning instead
//! of failing the row.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;

use crate::import::groups::SourceRow;

/// Destination fields parsed as day/month/year dates.
pub const DATE_TARGETS: &[&str] = &["create_date", "due_date", "value_date", "maturity_date"];

/// Destination fields coerced to numbers (currency symbols and separators
/// stripped).
pub const NUMERIC_TARGETS: &[&str] = &[
    "principal_balance",
    "disbursed",
    "carrying_amount",
    "interest_rate",
    "tenor",
];

/// Timestamp columns appended to every mapped row.
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

/// A typed destination cell value, ready for parameter binding.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Null,
}

/// A mapped destination row, keyed by destination column name.
pub type MappedRow = HashMap<String, CellValue>;

/// Ordered source-column to destination-column association, applied uniformly
/// to every row of a job. Entries with an empty destination mean "skip".
#[derive(Debug, Clone, Default)]
pub struct ColumnMapping {
    entries: Vec<(String, String)>,
}

impl ColumnMapping {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(source, target)| (source.trim().to_string(), target.trim().to_string()))
            .collect();
        Self { entries }
    }

    /// Build from the job record's JSON object of `source -> target` pairs.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let entries = value
            .as_object()
            .map(|map| {
                map.iter()
                    .map(|(source, target)| {
                        (
                            source.clone(),
                            target.as_str().unwrap_or_default().to_string(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self::new(entries)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|(_, target)| target.is_empty())
    }

    /// Destination column list for insertion: non-empty targets in mapping
    /// order (first occurrence wins), plus the bookkeeping timestamps.
    pub fn target_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::with_capacity(self.entries.len() + 2);
        for (_, target) in &self.entries {
            if !target.is_empty() && !columns.iter().any(|c| c == target) {
                columns.push(target.clone());
            }
        }
        columns.push(CREATED_AT.to_string());
        columns.push(UPDATED_AT.to_string());
        columns
    }

    /// Map one source row to a destination row.
    ///
    /// Entries with an empty destination or an absent source key are skipped;
    /// the batch layer binds NULL for destination columns a row never set.
    pub fn map_row(&self, row: &SourceRow, now: DateTime<Utc>) -> MappedRow {
        let mut mapped = MappedRow::with_capacity(self.entries.len() + 2);

        for (source, target) in &self.entries {
            if target.is_empty() {
                continue;
            }
            let Some(raw) = row.get(source) else {
                continue;
            };

            let value = if DATE_TARGETS.contains(&target.as_str()) {
                coerce_date(raw)
            } else if NUMERIC_TARGETS.contains(&target.as_str()) {
                CellValue::Number(coerce_number(raw))
            } else {
                CellValue::Text(raw.clone())
            };
            mapped.insert(target.clone(), value);
        }

        mapped.insert(CREATED_AT.to_string(), CellValue::Timestamp(now));
        mapped.insert(UPDATED_AT.to_string(), CellValue::Timestamp(now));

        mapped
    }
}

/// Parse a date cell, preferring `dd/mm/yyyy`, falling back to general
/// date parsing. Unparsable input degrades to NULL with a warning.
fn coerce_date(raw: &str) -> CellValue {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return CellValue::Null;
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%d/%m/%Y") {
        return CellValue::Date(date);
    }

    match dateparser::parse(trimmed) {
        Ok(dt) => CellValue::Date(dt.with_timezone(&Utc).date_naive()),
        Err(e) => {
            log::warn!("failed to parse date `{}`: {}", trimmed, e);
            CellValue::Null
        }
    }
}

/// Coerce a numeric cell: strip everything but digits, decimal point, and
/// minus sign; empty after stripping means zero.
fn coerce_number(raw: &str) -> f64 {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<f64>() {
        return value;
    }

    let stripped: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    if stripped.is_empty() || stripped == "-" {
        return 0.0;
    }

    stripped.parse::<f64>().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> SourceRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn mapping(pairs: &[(&str, &str)]) -> ColumnMapping {
        ColumnMapping::new(
            pairs
                .iter()
                .map(|(s, t)| (s.to_string(), t.to_string()))
                .collect(),
        )
    }

    #[test]
    fn maps_exactly_the_non_empty_targets() {
        let mapping = mapping(&[
            ("Customer Name", "customer_name"),
            ("Ignored", ""),
            ("Principal Balance", "principal_balance"),
        ]);
        let row = row(&[
            ("Customer Name", "alice"),
            ("Ignored", "x"),
            ("Principal Balance", "1000"),
        ]);

        let now = Utc::now();
        let mapped = mapping.map_row(&row, now);

        assert_eq!(mapped.len(), 4); // two targets + timestamps
        assert_eq!(
            mapped.get("customer_name").unwrap(),
            &CellValue::Text("alice".to_string())
        );
        assert_eq!(
            mapped.get("principal_balance").unwrap(),
            &CellValue::Number(1000.0)
        );
        assert_eq!(mapped.get(CREATED_AT).unwrap(), &CellValue::Timestamp(now));
    }

    #[test]
    fn absent_source_keys_are_skipped() {
        let mapping = mapping(&[("Missing", "customer_name")]);
        let mapped = mapping.map_row(&row(&[("Other", "x")]), Utc::now());
        assert!(!mapped.contains_key("customer_name"));
        assert!(mapped.contains_key(CREATED_AT));
    }

    #[test]
    fn numeric_coercion_strips_noise() {
        assert_eq!(coerce_number("$1,234.50 doll"), 1234.50);
        assert_eq!(coerce_number(""), 0.0);
        assert_eq!(coerce_number("-"), 0.0);
        assert_eq!(coerce_number("  42  "), 42.0);
        assert_eq!(coerce_number("-3.5"), -3.5);
    }

    #[test]
    fn date_coercion_prefers_day_month_year() {
        assert_eq!(
            coerce_date("31/01/2024"),
            CellValue::Date(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap())
        );
        // General fallback for already-formatted dates.
        assert_eq!(
            coerce_date("2024-01-31"),
            CellValue::Date(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap())
        );
        assert_eq!(coerce_date("not a date"), CellValue::Null);
        assert_eq!(coerce_date(""), CellValue::Null);
    }

    #[test]
    fn target_columns_preserve_order_and_append_timestamps() {
        let mapping = mapping(&[
            ("A", "alpha"),
            ("B", ""),
            ("C", "gamma"),
            ("D", "alpha"),
        ]);
        assert_eq!(
            mapping.target_columns(),
            vec!["alpha", "gamma", CREATED_AT, UPDATED_AT]
        );
    }

    #[test]
    fn mapping_is_pure() {
        let mapping = mapping(&[("Due Date", "due_date")]);
        let row = row(&[("Due Date", "15/06/2024")]);
        let now = Utc::now();
        assert_eq!(mapping.map_row(&row, now), mapping.map_row(&row, now));
    }
}
