//! Simulation-result archive abstraction.
//!
//! A [`ResultArchive`] is an already-open handle exposing steps in their
//! native order, an indexable frame list per step, and per-frame field
//! lookup. Fields can be sampled at two positions ([`Position`]).
//!
//! [`MemoryArchive`] is a JSON snapshot of an archive, used by the CLI and the
//! tests. [`ArchiveHandle`] owns an open archive and closes it when dropped.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::ops::Deref;
use std::path::{Path, PathBuf};

pub use fmx_model::Position;
use fmx_model::NodeId;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::tensor::{self, TensorComponents};
use crate::{FieldError, Result};

/// Pseudo-step holding the model definition; never contains results.
pub const INITIAL_STEP: &str = "Initial";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleData {
    Scalar(f64),
    Tensor(TensorComponents),
}

/// One raw value of a field at a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSample {
    pub node_label: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    pub data: SampleData,
    /// Extra named scalars carried by the sample (e.g. solver-specific
    /// invariants), reachable through custom invariants.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub components: BTreeMap<String, f64>,
}

impl FieldSample {
    pub fn scalar(node_label: NodeId, value: f64) -> Self {
        Self {
            node_label,
            instance: None,
            data: SampleData::Scalar(value),
            components: BTreeMap::new(),
        }
    }

    pub fn tensor(node_label: NodeId, components: TensorComponents) -> Self {
        Self {
            node_label,
            instance: None,
            data: SampleData::Tensor(components),
            components: BTreeMap::new(),
        }
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    pub fn with_component(mut self, name: impl Into<String>, value: f64) -> Self {
        self.components.insert(name.into(), value);
        self
    }

    /// Native scalar value; `None` for tensor samples.
    pub fn scalar_value(&self) -> Option<f64> {
        match self.data {
            SampleData::Scalar(v) => Some(v),
            SampleData::Tensor(_) => None,
        }
    }

    pub fn tensor_value(&self) -> Option<&TensorComponents> {
        match &self.data {
            SampleData::Tensor(t) => Some(t),
            SampleData::Scalar(_) => None,
        }
    }

    pub fn mises(&self) -> Option<f64> {
        self.tensor_value().map(tensor::mises)
    }

    pub fn max_principal(&self) -> Option<f64> {
        self.tensor_value().map(|t| tensor::principal_values(t).max)
    }

    pub fn min_principal(&self) -> Option<f64> {
        self.tensor_value().map(|t| tensor::principal_values(t).min)
    }

    pub fn tresca(&self) -> Option<f64> {
        self.tensor_value().map(tensor::tresca)
    }

    pub fn press(&self) -> Option<f64> {
        self.tensor_value().map(tensor::pressure)
    }

    pub fn component(&self, name: &str) -> Option<f64> {
        self.components.get(name).copied()
    }
}

/// A field output of one frame.
pub trait FieldOutput {
    /// Samples at `position`; `None` when the field cannot be expressed there.
    fn values_at(&self, position: Position) -> Option<Vec<FieldSample>>;
}

impl<T: FieldOutput + ?Sized> FieldOutput for &T {
    fn values_at(&self, position: Position) -> Option<Vec<FieldSample>> {
        (**self).values_at(position)
    }
}

pub trait ResultArchive {
    fn name(&self) -> &str;

    fn instance_names(&self) -> Vec<String>;

    /// All step names in archive order, including the initial pseudo-step.
    fn step_names(&self) -> Vec<String>;

    fn frame_count(&self, step: &str) -> usize;

    /// Field `variable` of frame `frame` in `step`. `Ok(None)` means the frame
    /// has no such field; `Err` means the frame could not be read.
    fn field(
        &self,
        step: &str,
        frame: usize,
        variable: &str,
    ) -> io::Result<Option<Box<dyn FieldOutput + '_>>>;

    /// Releases the underlying resource. Called once by [`ArchiveHandle`].
    fn close(&mut self) {}
}

/// Owns an open archive and closes it on every exit path.
#[derive(Debug)]
pub struct ArchiveHandle<A: ResultArchive> {
    archive: A,
}

impl<A: ResultArchive> ArchiveHandle<A> {
    pub fn new(archive: A) -> Self {
        Self { archive }
    }
}

impl<A: ResultArchive> Deref for ArchiveHandle<A> {
    type Target = A;

    fn deref(&self) -> &A {
        &self.archive
    }
}

impl<A: ResultArchive> Drop for ArchiveHandle<A> {
    fn drop(&mut self) {
        self.archive.close();
        debug!(archive = self.archive.name(), "closed result archive");
    }
}

/// Field samples keyed by position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryField(pub BTreeMap<Position, Vec<FieldSample>>);

impl FieldOutput for MemoryField {
    fn values_at(&self, position: Position) -> Option<Vec<FieldSample>> {
        self.0.get(&position).cloned()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryFrame {
    #[serde(default)]
    pub fields: BTreeMap<String, MemoryField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStep {
    pub name: String,
    #[serde(default)]
    pub frames: Vec<MemoryFrame>,
}

/// In-memory archive, persisted as a JSON snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryArchive {
    pub name: String,
    #[serde(default)]
    pub instances: Vec<String>,
    #[serde(default)]
    pub steps: Vec<MemoryStep>,
}

impl MemoryArchive {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Opens a snapshot. Failure here is fatal for a run.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let open_error = |message: String| FieldError::ArchiveOpen {
            path: PathBuf::from(path),
            message,
        };
        let bytes = fs::read(path).map_err(|err| open_error(err.to_string()))?;
        let archive: MemoryArchive =
            serde_json::from_slice(&bytes).map_err(|err| open_error(err.to_string()))?;
        debug!(archive = %archive.name, steps = archive.steps.len(), "opened result archive");
        Ok(archive)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    pub fn step_mut(&mut self, name: &str) -> &mut MemoryStep {
        let index = match self.steps.iter().position(|s| s.name == name) {
            Some(index) => index,
            None => {
                self.steps.push(MemoryStep {
                    name: name.to_string(),
                    frames: Vec::new(),
                });
                self.steps.len() - 1
            }
        };
        &mut self.steps[index]
    }

    /// Appends a frame to `step` (creating the step if needed) and returns it.
    pub fn push_frame(&mut self, step: &str) -> &mut MemoryFrame {
        let step = self.step_mut(step);
        step.frames.push(MemoryFrame::default());
        let last = step.frames.len() - 1;
        &mut step.frames[last]
    }

    fn step(&self, name: &str) -> Option<&MemoryStep> {
        self.steps.iter().find(|s| s.name == name)
    }
}

impl MemoryFrame {
    pub fn set_field(&mut self, variable: &str, position: Position, samples: Vec<FieldSample>) {
        self.fields
            .entry(variable.to_string())
            .or_default()
            .0
            .insert(position, samples);
    }
}

impl ResultArchive for MemoryArchive {
    fn name(&self) -> &str {
        &self.name
    }

    fn instance_names(&self) -> Vec<String> {
        self.instances.clone()
    }

    fn step_names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.name.clone()).collect()
    }

    fn frame_count(&self, step: &str) -> usize {
        self.step(step).map_or(0, |s| s.frames.len())
    }

    fn field(
        &self,
        step: &str,
        frame: usize,
        variable: &str,
    ) -> io::Result<Option<Box<dyn FieldOutput + '_>>> {
        let frame = self
            .step(step)
            .and_then(|s| s.frames.get(frame))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("frame {frame} of step '{step}' does not exist"),
                )
            })?;
        Ok(frame
            .fields
            .get(variable)
            .map(|f| Box::new(f) as Box<dyn FieldOutput + '_>))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn snapshot_roundtrip_preserves_archive() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("job.json");

        let mut archive = MemoryArchive::new("job");
        archive.instances.push("PART-1-1".to_string());
        archive.push_frame("Step-1").set_field(
            "S",
            Position::ElementNodal,
            vec![
                FieldSample::tensor(1, TensorComponents::new(1.0, 0.0, 0.0, 0.0, 0.0, 0.0))
                    .with_instance("PART-1-1"),
            ],
        );
        archive
            .push_frame("Step-1")
            .set_field("TEMP", Position::Nodal, vec![FieldSample::scalar(1, 20.5)]);

        archive.save(&path).expect("save should succeed");
        let loaded = MemoryArchive::open(&path).expect("open should succeed");
        assert_eq!(loaded, archive);
        assert_eq!(loaded.frame_count("Step-1"), 2);
    }

    #[test]
    fn open_fails_for_missing_or_invalid_snapshot() {
        let dir = tempfile::tempdir().expect("temp dir");
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            MemoryArchive::open(&missing),
            Err(FieldError::ArchiveOpen { .. })
        ));

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{not json").expect("write bad snapshot");
        assert!(matches!(
            MemoryArchive::open(&bad),
            Err(FieldError::ArchiveOpen { .. })
        ));
    }

    #[test]
    fn field_lookup_distinguishes_absent_field_from_bad_frame() {
        let mut archive = MemoryArchive::new("job");
        archive
            .push_frame("Step-1")
            .set_field("TEMP", Position::Nodal, vec![FieldSample::scalar(3, 1.0)]);

        let field = archive.field("Step-1", 0, "TEMP").expect("frame readable");
        let samples = field.expect("field present").values_at(Position::Nodal);
        assert_eq!(samples.map(|s| s.len()), Some(1));

        assert!(archive.field("Step-1", 0, "S").expect("frame readable").is_none());
        assert!(archive.field("Step-1", 5, "TEMP").is_err());
    }

    #[test]
    fn scalar_samples_have_no_tensor_invariants() {
        let s = FieldSample::scalar(1, 4.0).with_component("SENER", 0.5);
        assert_eq!(s.scalar_value(), Some(4.0));
        assert_eq!(s.mises(), None);
        assert_eq!(s.component("SENER"), Some(0.5));
    }

    struct Tracked {
        closed: Rc<Cell<u32>>,
    }

    impl ResultArchive for Tracked {
        fn name(&self) -> &str {
            "tracked"
        }
        fn instance_names(&self) -> Vec<String> {
            Vec::new()
        }
        fn step_names(&self) -> Vec<String> {
            Vec::new()
        }
        fn frame_count(&self, _step: &str) -> usize {
            0
        }
        fn field(
            &self,
            _step: &str,
            _frame: usize,
            _variable: &str,
        ) -> io::Result<Option<Box<dyn FieldOutput + '_>>> {
            Ok(None)
        }
        fn close(&mut self) {
            self.closed.set(self.closed.get() + 1);
        }
    }

    #[test]
    fn handle_closes_archive_exactly_once_on_drop() {
        let closed = Rc::new(Cell::new(0));
        {
            let handle = ArchiveHandle::new(Tracked {
                closed: Rc::clone(&closed),
            });
            assert_eq!(handle.name(), "tracked");
        }
        assert_eq!(closed.get(), 1);
    }
}
