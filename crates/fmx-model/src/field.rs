use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Frame;

/// Mesh node label, stable across frames of one mesh.
pub type NodeId = u64;

/// One raw contribution to a node, before reduction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub node_id: NodeId,
    pub value: f64,
}

impl RawSample {
    pub fn new(node_id: NodeId, value: f64) -> Self {
        Self { node_id, value }
    }
}

/// Where a field's values are located on the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Position {
    /// Exactly one value per node.
    Nodal,
    /// One contribution per adjoining element for every node.
    ElementNodal,
}

/// All raw samples an adapter produced for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub frame: Frame,
    /// Position the samples were read at; decides how they are reduced.
    pub position: Position,
    pub samples: Vec<RawSample>,
}

/// A reduced per-node value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeValue {
    pub node_id: NodeId,
    pub value: f64,
    /// Number of raw samples merged into `value`.
    pub source_multiplicity: u32,
}

impl NodeValue {
    pub fn single(node_id: NodeId, value: f64) -> Self {
        Self {
            node_id,
            value,
            source_multiplicity: 1,
        }
    }
}

/// Reduced node-to-value mapping for exactly one frame.
///
/// Node ids are unique; iteration follows insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldRow {
    values: Vec<NodeValue>,
    index: HashMap<NodeId, usize>,
}

impl FieldRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `value`, replacing (in place) any earlier value for the same
    /// node. Returns the replaced value.
    pub fn insert(&mut self, value: NodeValue) -> Option<NodeValue> {
        match self.index.get(&value.node_id) {
            Some(&slot) => Some(std::mem::replace(&mut self.values[slot], value)),
            None => {
                self.index.insert(value.node_id, self.values.len());
                self.values.push(value);
                None
            }
        }
    }

    pub fn get(&self, node_id: NodeId) -> Option<&NodeValue> {
        self.index.get(&node_id).map(|&slot| &self.values[slot])
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.index.contains_key(&node_id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeValue> {
        self.values.iter()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.values.iter().map(|v| v.node_id).collect()
    }
}

impl FromIterator<NodeValue> for FieldRow {
    fn from_iter<T: IntoIterator<Item = NodeValue>>(iter: T) -> Self {
        let mut row = FieldRow::new();
        for value in iter {
            row.insert(value);
        }
        row
    }
}

/// Policy for merging several samples that land on the same node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReduceMethod {
    /// Arithmetic mean of all contributions.
    #[default]
    Avg,
    /// Largest signed contribution; the first-seen one wins ties.
    Max,
}

impl ReduceMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ReduceMethod::Avg => "avg",
            ReduceMethod::Max => "max",
        }
    }
}

impl Display for ReduceMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseReduceMethodError(pub String);

impl Display for ParseReduceMethodError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown reduce method '{}' (expected avg or max)", self.0)
    }
}

impl std::error::Error for ParseReduceMethodError {}

impl FromStr for ReduceMethod {
    type Err = ParseReduceMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "avg" | "mean" | "average" => Ok(ReduceMethod::Avg),
            "max" => Ok(ReduceMethod::Max),
            _ => Err(ParseReduceMethodError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_in_place_and_keeps_order() {
        let mut row = FieldRow::new();
        assert!(row.insert(NodeValue::single(7, 1.0)).is_none());
        assert!(row.insert(NodeValue::single(3, 2.0)).is_none());
        let replaced = row.insert(NodeValue::single(7, 9.0));

        assert_eq!(replaced.map(|v| v.value), Some(1.0));
        assert_eq!(row.len(), 2);
        assert_eq!(row.node_ids(), vec![7, 3]);
        assert_eq!(row.get(7).map(|v| v.value), Some(9.0));
        assert!(!row.contains(4));
    }

    #[test]
    fn reduce_method_parses_case_insensitively() {
        assert_eq!("AVG".parse::<ReduceMethod>(), Ok(ReduceMethod::Avg));
        assert_eq!(" max ".parse::<ReduceMethod>(), Ok(ReduceMethod::Max));
        assert!("median".parse::<ReduceMethod>().is_err());
        assert_eq!(ReduceMethod::default(), ReduceMethod::Avg);
        assert_eq!(ReduceMethod::Max.to_string(), "max");
    }
}
