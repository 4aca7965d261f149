//! Comma-separated serialization of a [`FieldMatrix`].
//!
//! Layout: a header `FrameID,Node_<id>,...`, then one line per frame with the
//! frame label followed by one cell per node. Missing cells are empty; values
//! use the shortest representation that parses back to the same `f64`.

use std::fs;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use fmx_model::{FieldMatrix, Frame, FrameKey, NodeId};
use tracing::warn;

use crate::{FieldError, Result};

pub const FRAME_ID_COLUMN: &str = "FrameID";
pub const NODE_PREFIX: &str = "Node_";

pub fn write_matrix<W: Write>(matrix: &FieldMatrix, mut out: W) -> io::Result<()> {
    let mut header = String::from(FRAME_ID_COLUMN);
    for node in matrix.columns() {
        header.push(',');
        header.push_str(NODE_PREFIX);
        header.push_str(&node.to_string());
    }
    writeln!(out, "{header}")?;

    let mut line = String::new();
    for row in matrix.rows() {
        line.clear();
        line.push_str(&quote(&row.frame.label));
        for cell in &row.cells {
            line.push(',');
            if let Some(value) = cell {
                line.push_str(&value.to_string());
            }
        }
        writeln!(out, "{line}")?;
    }
    out.flush()
}

pub fn write_matrix_file(matrix: &FieldMatrix, path: impl AsRef<Path>) -> io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    write_matrix(matrix, BufWriter::new(fs::File::create(path)?))
}

/// Reads a matrix back. Rows get sequential keys in file order.
pub fn read_matrix<R: BufRead>(reader: R) -> Result<FieldMatrix> {
    let mut lines = reader.lines().enumerate();

    let (_, header) = lines.next().ok_or_else(|| FieldError::MalformedMatrix {
        line: 1,
        message: "empty file".to_string(),
    })?;
    let header = split_fields(header?.trim_end_matches('\r'));
    if header.len() < 2 {
        return Err(FieldError::MalformedMatrix {
            line: 1,
            message: "expected a frame column and at least one node column".to_string(),
        });
    }
    let columns = header[1..]
        .iter()
        .map(|name| {
            name.strip_prefix(NODE_PREFIX)
                .and_then(|id| id.parse::<NodeId>().ok())
                .ok_or_else(|| FieldError::MalformedMatrix {
                    line: 1,
                    message: format!("bad node column '{name}'"),
                })
        })
        .collect::<Result<Vec<NodeId>>>()?;

    let width = columns.len();
    let mut matrix = FieldMatrix::new(columns);
    let mut row_index = 0u32;
    for (i, line) in lines {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let line_no = i + 1;
        let fields = split_fields(line);
        if fields.len() != width + 1 {
            return Err(FieldError::MalformedMatrix {
                line: line_no,
                message: format!("expected {} fields, found {}", width + 1, fields.len()),
            });
        }
        let cells = fields[1..]
            .iter()
            .map(|cell| parse_cell(cell, line_no))
            .collect::<Result<Vec<Option<f64>>>>()?;
        let frame = Frame::new(FrameKey::new(0, row_index), fields[0].clone());
        matrix.push_row(frame, cells)?;
        row_index += 1;
    }
    Ok(matrix)
}

/// Reads a matrix file, optionally requiring a node column count.
pub fn read_matrix_file(path: impl AsRef<Path>, expected_nodes: Option<usize>) -> Result<FieldMatrix> {
    let path = path.as_ref();
    let matrix = read_matrix(BufReader::new(fs::File::open(path)?))?;
    if let Some(expected) = expected_nodes
        && matrix.node_count() != expected
    {
        warn!(
            path = %path.display(),
            "matrix has {} node columns, mesh has {expected}",
            matrix.node_count()
        );
        return Err(FieldError::NodeCount {
            expected,
            found: matrix.node_count(),
        });
    }
    Ok(matrix)
}

fn parse_cell(cell: &str, line: usize) -> Result<Option<f64>> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Ok(None);
    }
    cell.parse::<f64>()
        .map(Some)
        .map_err(|_| FieldError::MalformedMatrix {
            line,
            message: format!("'{cell}' is not a number"),
        })
}

fn quote(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}
