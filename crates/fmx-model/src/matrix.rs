use std::fmt::{Display, Formatter};

use crate::{Frame, NodeId};

/// One matrix row: a frame and one optional cell per column.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixRow {
    pub frame: Frame,
    pub cells: Vec<Option<f64>>,
}

/// Rectangular frame-by-node table.
///
/// Every row has exactly `columns().len()` cells. Rows keep the order in which
/// they were pushed; the assembler pushes them in ascending key order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldMatrix {
    columns: Vec<NodeId>,
    rows: Vec<MatrixRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixShapeError {
    pub label: String,
    pub expected: usize,
    pub found: usize,
}

impl Display for MatrixShapeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "row '{}' has {} cells, matrix has {} columns",
            self.label, self.found, self.expected
        )
    }
}

impl std::error::Error for MatrixShapeError {}

impl FieldMatrix {
    pub fn new(columns: Vec<NodeId>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, frame: Frame, cells: Vec<Option<f64>>) -> Result<(), MatrixShapeError> {
        if cells.len() != self.columns.len() {
            return Err(MatrixShapeError {
                label: frame.label,
                expected: self.columns.len(),
                found: cells.len(),
            });
        }
        self.rows.push(MatrixRow { frame, cells });
        Ok(())
    }

    pub fn columns(&self) -> &[NodeId] {
        &self.columns
    }

    pub fn rows(&self) -> &[MatrixRow] {
        &self.rows
    }

    pub fn frame_count(&self) -> usize {
        self.rows.len()
    }

    pub fn node_count(&self) -> usize {
        self.columns.len()
    }

    pub fn frame_labels(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.frame.label.as_str()).collect()
    }

    /// Values of one node over all frames, in row order.
    pub fn node_series(&self, node_id: NodeId) -> Option<Vec<Option<f64>>> {
        let col = self.columns.iter().position(|&n| n == node_id)?;
        Some(self.rows.iter().map(|r| r.cells[col]).collect())
    }

    pub fn cell(&self, row: usize, node_id: NodeId) -> Option<f64> {
        let col = self.columns.iter().position(|&n| n == node_id)?;
        self.rows.get(row).and_then(|r| r.cells[col])
    }

    /// Number of cells holding no value.
    pub fn missing_cells(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.cells.iter().filter(|c| c.is_none()).count())
            .sum()
    }
}
