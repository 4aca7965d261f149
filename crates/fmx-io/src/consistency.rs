//! Node reduction and cross-frame node consistency.
//!
//! Element-nodal samples are reduced per node with [`reduce_samples`]. Nodal
//! samples carry one value per node, so a repeated id overwrites the earlier
//! one. [`reduce_at`] picks between the two, and every reduced row passes a
//! [`ConsistencyGate`] before it reaches the assembler.

use std::collections::{HashMap, HashSet};

use fmx_model::{FieldRow, NodeId, NodeValue, Position, RawSample, ReduceMethod};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::SkipReason;

/// How strictly later frames must match the first accepted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCheck {
    /// Same set of node ids.
    #[default]
    NodeSet,
    /// Same number of node ids only.
    CountOnly,
}

struct Accumulator {
    node_id: NodeId,
    sum: f64,
    max: f64,
    count: u32,
}

/// Reduces raw samples to one value per node, in first-seen node order.
pub fn reduce_samples(samples: &[RawSample], method: ReduceMethod) -> FieldRow {
    let mut slots: HashMap<NodeId, usize> = HashMap::new();
    let mut acc: Vec<Accumulator> = Vec::new();

    for sample in samples {
        match slots.get(&sample.node_id) {
            Some(&slot) => {
                let a = &mut acc[slot];
                a.sum += sample.value;
                a.count += 1;
                if sample.value > a.max {
                    a.max = sample.value;
                }
            }
            None => {
                slots.insert(sample.node_id, acc.len());
                acc.push(Accumulator {
                    node_id: sample.node_id,
                    sum: sample.value,
                    max: sample.value,
                    count: 1,
                });
            }
        }
    }

    acc.into_iter()
        .map(|a| NodeValue {
            node_id: a.node_id,
            value: match method {
                ReduceMethod::Avg => a.sum / f64::from(a.count),
                ReduceMethod::Max => a.max,
            },
            source_multiplicity: a.count,
        })
        .collect()
}

/// Builds a row where a repeated node id overwrites the earlier value.
/// Returns the row and the number of overwritten entries.
pub fn collect_last_wins(samples: &[RawSample]) -> (FieldRow, usize) {
    let mut row = FieldRow::new();
    let mut duplicates = 0usize;
    for sample in samples {
        if row
            .insert(NodeValue::single(sample.node_id, sample.value))
            .is_some()
        {
            duplicates += 1;
        }
    }
    (row, duplicates)
}

/// Reduces samples read at `position`. Returns the row and the number of
/// overwritten nodal entries, which is always zero for element-nodal data.
pub fn reduce_at(position: Position, samples: &[RawSample], method: ReduceMethod) -> (FieldRow, usize) {
    match position {
        Position::Nodal => collect_last_wins(samples),
        Position::ElementNodal => (reduce_samples(samples, method), 0),
    }
}

/// Accepts rows whose node population matches the first accepted row.
#[derive(Debug, Clone)]
pub struct ConsistencyGate {
    check: NodeCheck,
    expected_node_count: Option<usize>,
    canonical: Option<Vec<NodeId>>,
    canonical_set: HashSet<NodeId>,
}

impl ConsistencyGate {
    pub fn new(check: NodeCheck, expected_node_count: Option<usize>) -> Self {
        Self {
            check,
            expected_node_count,
            canonical: None,
            canonical_set: HashSet::new(),
        }
    }

    /// Node ids of the first accepted row, in that row's order.
    pub fn canonical(&self) -> Option<&[NodeId]> {
        self.canonical.as_deref()
    }

    pub fn into_canonical(self) -> Option<Vec<NodeId>> {
        self.canonical
    }

    /// Checks `row` and, for the first non-empty row, fixes the canonical
    /// node list. A rejected row must be dropped whole.
    pub fn admit(&mut self, label: &str, row: &FieldRow) -> Result<(), SkipReason> {
        if row.is_empty() {
            return Err(SkipReason::NoValidRows);
        }

        if self.canonical.is_none() {
            if let Some(expected) = self.expected_node_count
                && expected != row.len()
            {
                warn!(
                    frame = label,
                    "first frame has {} nodes, expected {expected}",
                    row.len()
                );
            }
            let ids = row.node_ids();
            self.canonical_set = ids.iter().copied().collect();
            self.canonical = Some(ids);
            return Ok(());
        }

        let expected = self.canonical_set.len();
        if row.len() != expected {
            let reason = SkipReason::NodeCountMismatch {
                expected,
                found: row.len(),
            };
            error!(frame = label, "dropping frame: {reason}");
            return Err(reason);
        }

        if self.check == NodeCheck::NodeSet {
            let unexpected = row
                .iter()
                .filter(|v| !self.canonical_set.contains(&v.node_id))
                .count();
            if unexpected > 0 {
                // Equal counts, so every unexpected id displaces a canonical one.
                let reason = SkipReason::NodeSetMismatch {
                    missing: unexpected,
                    unexpected,
                };
                error!(frame = label, "dropping frame: {reason}");
                return Err(reason);
            }
        }

        Ok(())
    }
}
