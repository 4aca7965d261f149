//! Matrix assembly from accepted frames.

use std::collections::HashMap;

use fmx_model::{FieldMatrix, FieldRow, Frame, NodeId};
use tracing::warn;

use crate::{FieldError, Result};

#[derive(Debug, Clone)]
enum Entry {
    Row(FieldRow),
    /// Frame kept as an all-empty row.
    Placeholder,
}

/// Collects `(frame, row)` pairs and produces a sorted, rectangular matrix.
#[derive(Debug, Clone, Default)]
pub struct MatrixAssembler {
    entries: Vec<(Frame, Entry)>,
}

impl MatrixAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_row(&mut self, frame: Frame, row: FieldRow) {
        self.entries.push((frame, Entry::Row(row)));
    }

    pub fn push_placeholder(&mut self, frame: Frame) {
        self.entries.push((frame, Entry::Placeholder));
    }

    /// Number of frames carrying data.
    pub fn data_rows(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, e)| matches!(e, Entry::Row(_)))
            .count()
    }

    /// Sorts frames by key (stable, so equal keys keep push order) and lays
    /// every row out over `columns`. Nodes absent from a row become empty
    /// cells; nodes outside `columns` are dropped.
    pub fn finish(mut self, columns: Vec<NodeId>) -> Result<FieldMatrix> {
        if self.data_rows() == 0 || columns.is_empty() {
            return Err(FieldError::NoFrames);
        }

        self.entries.sort_by_key(|(frame, _)| frame.key);

        let slots: HashMap<NodeId, usize> =
            columns.iter().enumerate().map(|(i, &n)| (n, i)).collect();
        let width = columns.len();
        let mut matrix = FieldMatrix::new(columns);

        for (frame, entry) in self.entries {
            let mut cells = vec![None; width];
            if let Entry::Row(row) = entry {
                let mut outside = 0usize;
                for value in row.iter() {
                    match slots.get(&value.node_id) {
                        Some(&slot) => cells[slot] = Some(value.value),
                        None => outside += 1,
                    }
                }
                if outside > 0 {
                    warn!(
                        frame = %frame.label,
                        "{outside} nodes are not matrix columns and were dropped"
                    );
                }
            }
            matrix.push_row(frame, cells)?;
        }

        Ok(matrix)
    }
}
