//! Per-frame text report export.
//!
//! Writes one report per extracted archive frame in the layout the report
//! reader expects, so an archive can be dumped to reports and combined later.

use std::fs;
use std::path::{Path, PathBuf};

use fmx_model::{FieldRow, NodeValue};
use tracing::{info, warn};

use crate::archive::ResultArchive;
use crate::archive_reader::{ArchiveExtractOptions, extract_frames};
use crate::consistency::reduce_at;
use crate::report_reader::{DELIMITER_MIN_LEN, REPORT_EXTENSION};
use crate::{FieldError, Result};

/// Extracts, reduces and writes every frame as
/// `<variable>[_<invariant>]_Step-<step>_<frame>.rpt` under `out_dir`. Step
/// names that already start with `Step-` are not prefixed again.
pub fn write_field_reports<A: ResultArchive + ?Sized>(
    archive: &A,
    options: &ArchiveExtractOptions,
    out_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let extraction = extract_frames(archive, options)?;
    if extraction.frames.is_empty() {
        return Err(FieldError::NoFrames);
    }
    fs::create_dir_all(out_dir)?;

    let field_name = options.field_name();
    let mut written = Vec::with_capacity(extraction.frames.len());
    for raw in &extraction.frames {
        let (row, duplicates) = reduce_at(raw.position, &raw.samples, options.reduce_method);
        if duplicates > 0 {
            warn!(
                frame = %raw.frame.label,
                "{duplicates} repeated nodal ids, keeping the last value"
            );
        }
        let (step, frame_index) = split_label(&raw.frame.label);
        let file_name = format!(
            "{field_name}_{}_{frame_index}.{REPORT_EXTENSION}",
            step_file_token(step)
        );
        let path = out_dir.join(file_name);
        let header = ReportHeader {
            source: archive.name(),
            instance: &extraction.instance,
            step,
            frame_index,
            column: &field_name,
        };
        fs::write(&path, render_report(&header, &row))?;
        written.push(path);
    }

    info!(
        dir = %out_dir.display(),
        "wrote {} reports, skipped {} frames",
        written.len(),
        extraction.skipped.len()
    );
    Ok(written)
}

struct ReportHeader<'a> {
    source: &'a str,
    instance: &'a str,
    step: &'a str,
    frame_index: &'a str,
    column: &'a str,
}

fn render_report(header: &ReportHeader<'_>, row: &FieldRow) -> String {
    let rule = "-".repeat(DELIMITER_MIN_LEN.max(20 + header.column.len()));
    let mut out = format!(
        "{banner}\n\
         Field Output Report\n\
         \n\
         \x20  Source: {}\n\
         \x20  Instance: {}\n\
         \x20  Step: {}\n\
         \x20  Frame: {}\n\
         \n\
         {:>12}  {:>16}\n\
         {rule}\n",
        header.source,
        header.instance,
        header.step,
        header.frame_index,
        "Node Label",
        header.column,
        banner = "*".repeat(72),
    );

    for value in row.iter() {
        out.push_str(&format!("{:>12}  {:>16}\n", value.node_id, value.value));
    }

    if let Some((min, max, total)) = statistics(row) {
        out.push_str(&format!(
            "\n\
             Minimum   {:>22}\n\
             \x20         At Node {:>12}\n\
             Maximum   {:>22}\n\
             \x20         At Node {:>12}\n\
             Total     {:>22}\n",
            min.value, min.node_id, max.value, max.node_id, total
        ));
    }
    out
}

fn statistics(row: &FieldRow) -> Option<(&NodeValue, &NodeValue, f64)> {
    let mut values = row.iter();
    let first = values.next()?;
    let (mut min, mut max, mut total) = (first, first, first.value);
    for v in values {
        if v.value < min.value {
            min = v;
        }
        if v.value > max.value {
            max = v;
        }
        total += v.value;
    }
    Some((min, max, total))
}

/// Splits an archive label `<step>-frame<N>` into step name and frame index.
fn split_label(label: &str) -> (&str, &str) {
    match label.rsplit_once("-frame") {
        Some((step, index)) => (step, index),
        None => {
            warn!(label, "unexpected frame label");
            (label, "0")
        }
    }
}

/// Step part of a report file name, always carrying the `Step-` marker the
/// report reader keys on.
fn step_file_token(step: &str) -> String {
    let safe = file_safe(step);
    if safe.to_ascii_lowercase().starts_with("step-") {
        safe
    } else {
        format!("Step-{safe}")
    }
}

fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_whitespace() || matches!(c, '/' | '\\' | ':') { '-' } else { c })
        .collect()
}
