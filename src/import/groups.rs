//! Section-grouped file parsing.
//!
//! Some source files are not flat tables: a single sheet carries several named
//! record groups, each introduced by a section-marker row (for example
//! `Loan Type: 1050101-Agricultural Loans`) followed by its own column-header
//! row and data rows. This module reconstructs those groups from the flat row
//! stream produced by [`TabularReader`].
//!
//! Every non-empty row is classified with strict priority:
//!
//! 1. **Section boundary** — any cell matches the marker pattern. Seals the
//!    open group (if it collected data) and opens a new one.
//! 2. **Column header** — at least two of the first five non-empty cells
//!    contain a known header fragment. Recorded as the open group's headers.
//! 3. **Data row** — everything else. Zipped against the open group's headers
//!    and appended; dropped when no group or no headers are open yet.
//!
//! A boundary row is never reinterpreted as a header or data row, even when it
//! would also match those shapes. Fully empty rows are skipped before
//! classification, and a long run of them (50 by default) ends the scan early:
//! exports commonly pad hundreds of blank rows after the last section.

use crate::import::reader::{FileFormat, ReadError, TabularReader};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Keys added to every data row identifying its owning group.
pub const GROUP_CODE_KEY: &str = "group_code";
pub const GROUP_NAME_KEY: &str = "group_name";
pub const GROUP_FULL_KEY: &str = "group_full";

/// Code assigned when a marker row matches the boundary pattern but its
/// code/name split cannot be parsed.
pub const UNKNOWN_CODE: &str = "UNKNOWN";

/// Column-header fragments recognized in loan portfolio exports.
const HEADER_VOCABULARY: &[&str] = &[
    "customer",
    "name",
    "value",
    "maturity",
    "tenure",
    "interest",
    "approved",
    "disbursed",
    "principal",
    "collateral",
    "repayment",
    "total",
    "arrears",
    "days",
    "sr",
    "a/c",
    "national",
];

/// A data row keyed by column-header name (positional index for cells beyond
/// the header row's width), tagged with its owning group.
pub type SourceRow = HashMap<String, String>;

/// One sealed record group: a contiguous run of data rows sharing a marker
/// and one set of column headers.
#[derive(Debug, Clone)]
pub struct Group {
    pub code: String,
    pub name: String,
    pub full: String,
    pub headers: Option<Vec<String>>,
    pub rows: Vec<SourceRow>,
}

/// Summary view of a sealed group, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSummary {
    pub code: String,
    pub name: String,
    pub full: String,
    pub row_count: usize,
}

/// Tunables for the row classifier.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Label word(s) opening a section-marker row, e.g. `Loan Type`.
    pub section_label: String,
    /// Lowercased fragments that identify a column-header row.
    pub header_vocabulary: Vec<String>,
    /// Consecutive fully-empty rows tolerated before the scan stops.
    pub max_empty_rows: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            section_label: "Loan Type".to_string(),
            header_vocabulary: HEADER_VOCABULARY.iter().map(|s| s.to_string()).collect(),
            max_empty_rows: 50,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error("invalid section label `{label}`: {source}")]
    InvalidLabel {
        label: String,
        source: regex::Error,
    },
}

/// Reconstructs named groups from a flat row stream.
pub struct GroupExtractor {
    config: ExtractorConfig,
    marker_re: Regex,
    parse_re: Regex,
    label_lower: String,
}

impl GroupExtractor {
    pub fn new(config: ExtractorConfig) -> Result<Self, ExtractError> {
        // `Loan Type` matches with any (or no) whitespace between label words.
        let label_pattern = config
            .section_label
            .split_whitespace()
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(r"\s*");

        let marker_re = Regex::new(&format!(r"(?i){label_pattern}\s*:?\s*\d+")).map_err(|source| {
            ExtractError::InvalidLabel {
                label: config.section_label.clone(),
                source,
            }
        })?;
        let parse_re =
            Regex::new(&format!(r"(?i){label_pattern}\s*:\s*(\d+)-(.+)")).map_err(|source| {
                ExtractError::InvalidLabel {
                    label: config.section_label.clone(),
                    source,
                }
            })?;

        let label_lower = config.section_label.to_lowercase();

        Ok(Self {
            config,
            marker_re,
            parse_re,
            label_lower,
        })
    }

    pub fn with_defaults() -> Self {
        Self::new(ExtractorConfig::default()).expect("default section label compiles")
    }

    /// Run a full extraction pass over `path`.
    ///
    /// Stateless with respect to previous calls: re-running over an unchanged
    /// file yields identical output. Callers issuing several queries against
    /// the same file should expect one full scan per call.
    pub fn extract_path(&self, path: &Path, format: FileFormat) -> Result<Vec<Group>, ExtractError> {
        let reader = TabularReader::open(path, format)?;
        self.extract(reader)
    }

    /// Consume a row stream and return sealed groups in first-seen order.
    pub fn extract(&self, reader: TabularReader) -> Result<Vec<Group>, ExtractError> {
        let mut groups: Vec<Group> = Vec::new();
        let mut current: Option<Group> = None;
        let mut empty_run = 0usize;
        let mut row_index = 0usize;

        for row in reader {
            let cells = row?;
            row_index += 1;

            if cells.iter().all(|cell| cell.trim().is_empty()) {
                empty_run += 1;
                if empty_run > self.config.max_empty_rows {
                    log::info!(
                        "stopping scan at row {}: {} consecutive empty rows",
                        row_index,
                        empty_run
                    );
                    break;
                }
                continue;
            }
            empty_run = 0;

            // Boundary check always wins over the header and data shapes.
            if let Some(marker) = self.find_section_marker(&cells) {
                if let Some(group) = current.take() {
                    if !group.rows.is_empty() {
                        groups.push(group);
                    }
                }

                let (code, name) = self.parse_section_marker(&marker);
                log::debug!("row {}: section boundary `{}` (code {})", row_index, marker, code);
                current = Some(Group {
                    code,
                    name,
                    full: marker,
                    headers: None,
                    rows: Vec::new(),
                });
                continue;
            }

            if self.is_header_row(&cells) {
                if let Some(group) = current.as_mut() {
                    group.headers = Some(cells.iter().map(|c| c.trim().to_string()).collect());
                    log::debug!("row {}: column headers for group {}", row_index, group.code);
                }
                continue;
            }

            match current.as_mut() {
                Some(Group {
                    code,
                    name,
                    full,
                    headers: Some(headers),
                    rows,
                }) => {
                    let mut data: SourceRow = HashMap::with_capacity(cells.len() + 3);
                    for (index, cell) in cells.iter().enumerate() {
                        let key = headers
                            .get(index)
                            .filter(|h| !h.is_empty())
                            .cloned()
                            .unwrap_or_else(|| index.to_string());
                        data.insert(key, cell.clone());
                    }
                    data.insert(GROUP_CODE_KEY.to_string(), code.clone());
                    data.insert(GROUP_NAME_KEY.to_string(), name.clone());
                    data.insert(GROUP_FULL_KEY.to_string(), full.clone());
                    rows.push(data);
                }
                _ => {
                    // Data before any boundary or header row carries no column
                    // names to key by; drop it rather than guess.
                    log::trace!("row {}: skipped, no open group with headers", row_index);
                }
            }
        }

        if let Some(group) = current.take() {
            if !group.rows.is_empty() {
                groups.push(group);
            }
        }

        log::info!(
            "extraction complete: {} groups, {} rows",
            groups.len(),
            groups.iter().map(|g| g.rows.len()).sum::<usize>()
        );

        Ok(groups)
    }

    /// Group summaries for `path`, in first-seen order.
    pub fn group_summaries(
        &self,
        path: &Path,
        format: FileFormat,
    ) -> Result<Vec<GroupSummary>, ExtractError> {
        let groups = self.extract_path(path, format)?;
        Ok(groups
            .iter()
            .map(|g| GroupSummary {
                code: g.code.clone(),
                name: g.name.clone(),
                full: g.full.clone(),
                row_count: g.rows.len(),
            })
            .collect())
    }

    /// Column headers of the first sealed group with `code`.
    pub fn group_columns(
        &self,
        path: &Path,
        format: FileFormat,
        code: &str,
    ) -> Result<Vec<String>, ExtractError> {
        let groups = self.extract_path(path, format)?;
        Ok(groups
            .iter()
            .find(|g| g.code == code)
            .and_then(|g| g.headers.clone())
            .unwrap_or_default())
    }

    /// First `n` data rows of the first sealed group with `code`.
    pub fn group_sample(
        &self,
        path: &Path,
        format: FileFormat,
        code: &str,
        n: usize,
    ) -> Result<Vec<SourceRow>, ExtractError> {
        let groups = self.extract_path(path, format)?;
        Ok(groups
            .iter()
            .find(|g| g.code == code)
            .map(|g| g.rows.iter().take(n).cloned().collect())
            .unwrap_or_default())
    }

    fn find_section_marker(&self, cells: &[String]) -> Option<String> {
        cells.iter().find_map(|cell| {
            let value = cell.trim();
            if self.marker_re.is_match(value) {
                Some(value.to_string())
            } else {
                None
            }
        })
    }

    fn parse_section_marker(&self, marker: &str) -> (String, String) {
        match self.parse_re.captures(marker.trim()) {
            Some(caps) => (
                caps[1].trim().to_string(),
                caps[2].trim().to_string(),
            ),
            None => (UNKNOWN_CODE.to_string(), marker.trim().to_string()),
        }
    }

    fn is_header_row(&self, cells: &[String]) -> bool {
        let mut hits = 0;
        for cell in cells.iter().take(5) {
            let value = cell.trim().to_lowercase();
            if value.is_empty() || value.contains(&format!("{}:", self.label_lower)) {
                continue;
            }
            if self
                .config
                .header_vocabulary
                .iter()
                .any(|fragment| value.contains(fragment))
            {
                hits += 1;
            }
        }
        hits >= 2
    }
}
