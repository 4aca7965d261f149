//! Per-frame text report parsing.
//!
//! A report carries a free-form header, a horizontal rule, a two-column
//! `node value` block, and optionally a statistics footer:
//!
//! ```text
//!   Node Label        S.Mises
//! ---------------------------------
//!        1          12.5
//!        2          13.0
//!
//! Minimum           12.5
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use fmx_model::{NodeId, RawSample};

use crate::{FieldError, Result, SkipReason};

pub const REPORT_EXTENSION: &str = "rpt";

/// Shortest run of dashes accepted as the data delimiter.
pub const DELIMITER_MIN_LEN: usize = 10;

/// Footer lines that end the data block.
pub const SUMMARY_MARKERS: &[&str] = &["Minimum", "Maximum", "Total"];

/// Numeric content of one report.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedReport {
    pub samples: Vec<RawSample>,
    /// Lines inside the data block that failed numeric coercion.
    pub dropped_lines: usize,
    /// Whether the header mentions the requested data column.
    pub column_in_header: bool,
}

pub fn is_delimiter(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= DELIMITER_MIN_LEN && trimmed.bytes().all(|b| b == b'-')
}

pub fn is_summary_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    SUMMARY_MARKERS.iter().any(|m| trimmed.starts_with(m))
}

/// Parses the data block of a report.
pub fn parse_report(text: &str, data_column_name: &str) -> std::result::Result<ParsedReport, SkipReason> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines
        .iter()
        .position(|l| is_delimiter(l))
        .ok_or(SkipReason::NoDataBlock)?;
    let end = lines[start + 1..]
        .iter()
        .position(|l| is_summary_line(l))
        .map_or(lines.len(), |offset| start + 1 + offset);

    let mut report = ParsedReport {
        column_in_header: lines[..start].iter().any(|l| l.contains(data_column_name)),
        ..ParsedReport::default()
    };

    for line in &lines[start + 1..end] {
        if line.trim().is_empty() {
            continue;
        }
        match parse_data_line(line) {
            Some(sample) => report.samples.push(sample),
            None => report.dropped_lines += 1,
        }
    }

    if report.samples.is_empty() {
        return Err(SkipReason::NoValidRows);
    }
    Ok(report)
}

fn parse_data_line(line: &str) -> Option<RawSample> {
    let mut fields = line.split_whitespace();
    let node_id = parse_node_id(fields.next()?)?;
    let value = fields.next()?.parse::<f64>().ok()?;
    value.is_finite().then(|| RawSample::new(node_id, value))
}

/// Node labels are integers; integral floats such as `12.0` are accepted.
fn parse_node_id(field: &str) -> Option<NodeId> {
    if let Ok(id) = field.parse::<NodeId>() {
        return (id > 0).then_some(id);
    }
    let v = field.parse::<f64>().ok()?;
    (v.is_finite() && v >= 1.0 && v.fract() == 0.0 && v <= NodeId::MAX as f64)
        .then(|| v as NodeId)
}

/// Report files directly inside `dir` with extension `ext`
/// (case-insensitive), oldest first, ties broken by name.
pub fn discover_reports(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let mut found: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let matches_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(ext));
        if !matches_ext || !entry.file_type()?.is_file() {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        found.push((modified, path));
    }

    if found.is_empty() {
        return Err(FieldError::NoReportFiles {
            dir: dir.to_path_buf(),
            ext: ext.to_string(),
        });
    }

    found.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    Ok(found.into_iter().map(|(_, path)| path).collect())
}
