use serde::{Deserialize, Serialize};

/// Sortable temporal position of one analysis frame.
///
/// Ordering is lexicographic on `(step_id, frame_index)`, which is the row
/// order of an assembled matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FrameKey {
    pub step_id: u32,
    pub frame_index: u32,
}

impl FrameKey {
    /// Step id given to frames whose provenance could not be parsed.
    pub const FALLBACK_STEP: u32 = 9999;

    pub fn new(step_id: u32, frame_index: u32) -> Self {
        Self {
            step_id,
            frame_index,
        }
    }

    /// Key for an unparsable frame; sorts after well-formed frames and keeps
    /// discovery order among other fallbacks.
    pub fn fallback(discovery_index: usize) -> Self {
        Self::new(
            Self::FALLBACK_STEP,
            u32::try_from(discovery_index).unwrap_or(u32::MAX),
        )
    }

    pub fn is_fallback(&self) -> bool {
        self.step_id == Self::FALLBACK_STEP
    }
}

/// One analysis output state, tagged with its ordering key and display label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub key: FrameKey,
    pub label: String,
}

impl Frame {
    pub fn new(key: FrameKey, label: impl Into<String>) -> Self {
        Self {
            key,
            label: label.into(),
        }
    }
}

/// Dense ordinals for symbolic step names, assigned in first-seen order.
///
/// A registry lives for exactly one assembly run; create a fresh one per run
/// so ordinals depend only on that run's discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepNameRegistry {
    names: Vec<String>,
}

impl StepNameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the ordinal of `name`, registering it if unseen.
    pub fn ordinal(&mut self, name: &str) -> u32 {
        let index = match self.names.iter().position(|n| n == name) {
            Some(index) => index,
            None => {
                self.names.push(name.to_string());
                self.names.len() - 1
            }
        };
        u32::try_from(index).unwrap_or(u32::MAX)
    }

    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|index| u32::try_from(index).ok())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Registered names in ordinal order.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}
