//! End-to-end runs: source adapter, reduction and consistency, assembly, CSV.

use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fmx_model::{FieldMatrix, Frame, StepNameRegistry};
use serde::Serialize;
use tracing::{info, warn};

use crate::archive::ResultArchive;
use crate::archive_reader::{ArchiveExtractOptions, extract_frames};
use crate::assemble::MatrixAssembler;
use crate::consistency::{ConsistencyGate, NodeCheck, collect_last_wins, reduce_at};
use crate::matrix_csv::write_matrix_file;
use crate::report_reader::{REPORT_EXTENSION, discover_reports, parse_report};
use crate::temporal::{ResolvedFrame, StepToken, report_frame};
use crate::{FieldError, Result, SkipReason, SkippedFrame};

const PROGRESS_EVERY: usize = 10;

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub output: PathBuf,
    pub frames_written: usize,
    pub nodes_written: usize,
    pub skipped: Vec<SkippedFrame>,
    pub elapsed: Duration,
}

impl Display for RunSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} frames written, {} nodes written",
            self.frames_written, self.nodes_written
        )
    }
}

/// Options for combining a directory of reports.
#[derive(Debug, Clone)]
pub struct ReportCombineOptions {
    /// Value column named in the report headers, e.g. `S.Mises`.
    pub data_column_name: String,
    pub extension: String,
    pub expected_node_count: Option<usize>,
    pub node_check: NodeCheck,
}

impl ReportCombineOptions {
    pub fn new(data_column_name: impl Into<String>) -> Self {
        Self {
            data_column_name: data_column_name.into(),
            extension: REPORT_EXTENSION.to_string(),
            expected_node_count: None,
            node_check: NodeCheck::NodeSet,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_column_name.trim().is_empty() {
            return Err(FieldError::InvalidOption(
                "data_column_name must not be empty".to_string(),
            ));
        }
        if self.extension.trim_start_matches('.').is_empty() {
            return Err(FieldError::InvalidOption(
                "extension must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// `<archive dir>/reports_csv/<archive stem>/<field name>.csv`
pub fn default_archive_output(archive_path: &Path, field_name: &str) -> PathBuf {
    let dir = archive_path.parent().unwrap_or_else(|| Path::new(""));
    let stem = archive_path
        .file_stem()
        .map_or_else(|| "archive".into(), |s| s.to_string_lossy());
    dir.join("reports_csv")
        .join(stem.as_ref())
        .join(format!("{field_name}.csv"))
}

/// `<report dir>/<data column name>.csv`
pub fn default_report_output(dir: &Path, data_column_name: &str) -> PathBuf {
    dir.join(format!("{data_column_name}.csv"))
}

/// Builds the field matrix of an archive. Frames are reduced with the
/// configured policy and checked against the first accepted frame.
pub fn assemble_archive<A: ResultArchive + ?Sized>(
    archive: &A,
    options: &ArchiveExtractOptions,
) -> Result<(FieldMatrix, Vec<SkippedFrame>)> {
    let extraction = extract_frames(archive, options)?;
    let mut skipped = extraction.skipped;
    let mut gate = ConsistencyGate::new(options.node_check, options.expected_node_count);
    let mut assembler = MatrixAssembler::new();

    if options.keep_empty_frames {
        for gap in skipped.iter().filter(|s| s.is_data_gap()) {
            if let Some(key) = gap.key {
                assembler.push_placeholder(Frame::new(key, gap.label.clone()));
            }
        }
    }

    for raw in extraction.frames {
        let (row, duplicates) = reduce_at(raw.position, &raw.samples, options.reduce_method);
        if duplicates > 0 {
            warn!(
                frame = %raw.frame.label,
                "{duplicates} repeated nodal ids, keeping the last value"
            );
        }
        match gate.admit(&raw.frame.label, &row) {
            Ok(()) => assembler.push_row(raw.frame, row),
            Err(reason) => {
                skipped.push(SkippedFrame::new(raw.frame.label, Some(raw.frame.key), reason))
            }
        }
    }

    let columns = gate.into_canonical().unwrap_or_default();
    Ok((assembler.finish(columns)?, skipped))
}

/// Archive export: assemble, then write the matrix to `output`.
pub fn export_archive<A: ResultArchive + ?Sized>(
    archive: &A,
    options: &ArchiveExtractOptions,
    output: &Path,
) -> Result<RunSummary> {
    let started = Instant::now();
    info!(
        archive = archive.name(),
        field = %options.field_name(),
        reduce = %options.reduce_method,
        "exporting field matrix"
    );
    let (matrix, skipped) = assemble_archive(archive, options)?;
    write_output(&matrix, output, skipped, started)
}

/// Combines the report files of `dir` into one matrix.
pub fn assemble_reports(
    dir: &Path,
    options: &ReportCombineOptions,
) -> Result<(FieldMatrix, Vec<SkippedFrame>)> {
    options.validate()?;
    let extension = options.extension.trim_start_matches('.');
    let paths = discover_reports(dir, extension)?;
    info!(dir = %dir.display(), files = paths.len(), "combining reports");

    // Keys are resolved in discovery order so symbolic ordinals follow it.
    let mut registry = StepNameRegistry::new();
    let mut resolved: Vec<(PathBuf, ResolvedFrame)> = paths
        .into_iter()
        .enumerate()
        .map(|(i, path)| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let frame = report_frame(&name, i, &mut registry);
            if frame.is_fallback() {
                warn!(file = %name, "file name does not match ...Step-<step>_<frame>; ordering it last");
            }
            (path, frame)
        })
        .collect();
    warn_on_mixed_tokens(&resolved);

    resolved.sort_by_key(|(_, r)| r.frame.key);

    let total = resolved.len();
    let mut skipped = Vec::new();
    let mut gate = ConsistencyGate::new(options.node_check, options.expected_node_count);
    let mut assembler = MatrixAssembler::new();

    for (n, (path, resolved)) in resolved.into_iter().enumerate() {
        if n > 0 && n % PROGRESS_EVERY == 0 {
            info!("processed {n}/{total} report files");
        }
        let frame = resolved.frame;
        let file = path.display().to_string();

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) => {
                let reason = SkipReason::Unreadable {
                    message: err.to_string(),
                };
                warn!(file = %file, "skipping report: {reason}");
                skipped.push(SkippedFrame::new(frame.label, Some(frame.key), reason));
                continue;
            }
        };

        let report = match parse_report(&text, &options.data_column_name) {
            Ok(report) => report,
            Err(reason) => {
                warn!(file = %file, "skipping report: {reason}");
                skipped.push(SkippedFrame::new(frame.label, Some(frame.key), reason));
                continue;
            }
        };
        if report.dropped_lines > 0 {
            warn!(file = %file, "dropped {} non-numeric data lines", report.dropped_lines);
        }
        if !report.column_in_header {
            warn!(
                file = %file,
                "header does not mention column '{}'",
                options.data_column_name
            );
        }

        let (row, duplicates) = collect_last_wins(&report.samples);
        if duplicates > 0 {
            warn!(file = %file, "{duplicates} repeated node ids, keeping the last value");
        }

        match gate.admit(&frame.label, &row) {
            Ok(()) => assembler.push_row(frame, row),
            Err(reason) => skipped.push(SkippedFrame::new(frame.label, Some(frame.key), reason)),
        }
    }

    let columns = gate.into_canonical().unwrap_or_default();
    Ok((assembler.finish(columns)?, skipped))
}

/// Report combination: assemble, then write to `output` or the default
/// location inside `dir`.
pub fn combine_reports(
    dir: &Path,
    options: &ReportCombineOptions,
    output: Option<&Path>,
) -> Result<RunSummary> {
    let started = Instant::now();
    let (matrix, skipped) = assemble_reports(dir, options)?;
    let output = output.map_or_else(
        || default_report_output(dir, &options.data_column_name),
        Path::to_path_buf,
    );
    write_output(&matrix, &output, skipped, started)
}

fn warn_on_mixed_tokens(resolved: &[(PathBuf, ResolvedFrame)]) {
    let numeric = resolved
        .iter()
        .any(|(_, r)| matches!(r.token, Some(StepToken::Numeric(_))));
    let symbolic = resolved
        .iter()
        .any(|(_, r)| matches!(r.token, Some(StepToken::Symbolic(_))));
    if numeric && symbolic {
        warn!("numeric and named steps are mixed; their frames may interleave");
    }
}

fn write_output(
    matrix: &FieldMatrix,
    output: &Path,
    skipped: Vec<SkippedFrame>,
    started: Instant,
) -> Result<RunSummary> {
    write_matrix_file(matrix, output)?;

    let summary = RunSummary {
        output: output.to_path_buf(),
        frames_written: matrix.frame_count(),
        nodes_written: matrix.node_count(),
        skipped,
        elapsed: started.elapsed(),
    };
    let secs = summary.elapsed.as_secs_f64();
    info!(output = %output.display(), "{summary}");
    if !summary.skipped.is_empty() {
        warn!("{} frames skipped", summary.skipped.len());
    }
    info!("elapsed {secs:.2} s ({:.2} min)", secs / 60.0);
    Ok(summary)
}
