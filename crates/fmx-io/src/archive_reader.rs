//! Frame extraction from an open result archive.

use fmx_model::{RawFrame, RawSample, ReduceMethod};
use tracing::{debug, info, warn};

use crate::archive::{FieldOutput, FieldSample, INITIAL_STEP, Position, ResultArchive};
use crate::consistency::NodeCheck;
use crate::invariant::{Invariant, sample_value};
use crate::temporal::archive_frame;
use crate::{FieldError, Result, SkipReason, SkippedFrame};

#[derive(Debug, Clone)]
pub struct ArchiveExtractOptions {
    /// Field output to read, e.g. `S` or `TEMP`.
    pub variable: String,
    /// Tensor invariant; `None` reads the native scalar.
    pub invariant: Option<Invariant>,
    /// Mesh instance; `None` selects the first.
    pub instance_name: Option<String>,
    /// Process only the first N non-initial steps.
    pub step_limit: Option<usize>,
    /// Sample every Nth frame of each step, starting at frame 0.
    pub frame_stride: usize,
    pub reduce_method: ReduceMethod,
    /// Keep frames without data as all-empty rows.
    pub keep_empty_frames: bool,
    pub expected_node_count: Option<usize>,
    pub node_check: NodeCheck,
}

impl ArchiveExtractOptions {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            invariant: None,
            instance_name: None,
            step_limit: None,
            frame_stride: 1,
            reduce_method: ReduceMethod::Avg,
            keep_empty_frames: false,
            expected_node_count: None,
            node_check: NodeCheck::NodeSet,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.variable.trim().is_empty() {
            return Err(FieldError::InvalidOption("variable must not be empty".to_string()));
        }
        if self.frame_stride == 0 {
            return Err(FieldError::InvalidOption(
                "frame_stride must be at least 1".to_string(),
            ));
        }
        if self.step_limit == Some(0) {
            return Err(FieldError::InvalidOption(
                "step_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// `<variable>` or `<variable>_<invariant>`, used for output naming.
    pub fn field_name(&self) -> String {
        match &self.invariant {
            Some(invariant) => format!("{}_{}", self.variable, invariant.name()),
            None => self.variable.clone(),
        }
    }
}

/// Frames pulled from an archive, before reduction.
#[derive(Debug, Clone, Default)]
pub struct ArchiveExtraction {
    pub instance: String,
    pub frames: Vec<RawFrame>,
    pub skipped: Vec<SkippedFrame>,
}

/// Where a field's data was found.
#[derive(Debug, Clone, PartialEq)]
pub enum SubsetLookup {
    Found(Position, Vec<FieldSample>),
    NoData,
}

/// Tries the per-node position first, then per-element-per-node. Samples
/// tagged with another instance are ignored, so a position holding only
/// foreign samples counts as empty.
pub fn locate_subset(field: &dyn FieldOutput, instance: &str) -> SubsetLookup {
    for position in [Position::Nodal, Position::ElementNodal] {
        let Some(values) = field.values_at(position) else {
            continue;
        };
        let values: Vec<FieldSample> = values
            .into_iter()
            .filter(|v| v.instance.as_deref().is_none_or(|i| i == instance))
            .collect();
        if !values.is_empty() {
            return SubsetLookup::Found(position, values);
        }
    }
    SubsetLookup::NoData
}

/// Picks the requested instance, or the first one.
pub fn select_instance<A: ResultArchive + ?Sized>(
    archive: &A,
    requested: Option<&str>,
) -> Result<String> {
    let instances = archive.instance_names();
    let Some(first) = instances.first() else {
        return Err(FieldError::NoInstances(archive.name().to_string()));
    };
    match requested {
        Some(name) if instances.iter().any(|i| i == name) => Ok(name.to_string()),
        Some(name) => {
            warn!(
                archive = archive.name(),
                "instance '{name}' not found, using '{first}'"
            );
            Ok(first.clone())
        }
        None => Ok(first.clone()),
    }
}

/// Non-initial steps in archive order, truncated to `step_limit`.
pub fn selected_steps<A: ResultArchive + ?Sized>(archive: &A, step_limit: Option<usize>) -> Vec<String> {
    let mut steps: Vec<String> = archive
        .step_names()
        .into_iter()
        .filter(|s| s != INITIAL_STEP)
        .collect();
    if let Some(limit) = step_limit {
        steps.truncate(limit);
    }
    steps
}

/// Walks the selected steps and frames and collects raw samples.
///
/// Per-frame problems are recorded in `skipped` and logged; only option
/// validation and a missing instance list are errors.
pub fn extract_frames<A: ResultArchive + ?Sized>(
    archive: &A,
    options: &ArchiveExtractOptions,
) -> Result<ArchiveExtraction> {
    options.validate()?;
    let instance = select_instance(archive, options.instance_name.as_deref())?;

    let all_steps = archive
        .step_names()
        .iter()
        .filter(|s| *s != INITIAL_STEP)
        .count();
    let steps = selected_steps(archive, options.step_limit);
    info!(
        archive = archive.name(),
        instance = %instance,
        "processing {} of {all_steps} non-initial steps",
        steps.len()
    );

    let mut extraction = ArchiveExtraction {
        instance,
        ..ArchiveExtraction::default()
    };

    for (step_position, step_name) in steps.iter().enumerate() {
        let frame_count = archive.frame_count(step_name);
        debug!(step = %step_name, frames = frame_count, "processing step");

        for frame_index in (0..frame_count).step_by(options.frame_stride) {
            let frame = archive_frame(step_position, step_name, frame_index);
            match read_frame(archive, step_name, frame_index, &extraction.instance, options) {
                Ok((position, samples)) => extraction.frames.push(RawFrame {
                    frame,
                    position,
                    samples,
                }),
                Err(reason) => {
                    warn!(frame = %frame.label, "skipping frame: {reason}");
                    extraction
                        .skipped
                        .push(SkippedFrame::new(frame.label, Some(frame.key), reason));
                }
            }
        }
    }

    info!(
        "extracted {} frames, skipped {}",
        extraction.frames.len(),
        extraction.skipped.len()
    );
    Ok(extraction)
}

fn read_frame<A: ResultArchive + ?Sized>(
    archive: &A,
    step: &str,
    frame_index: usize,
    instance: &str,
    options: &ArchiveExtractOptions,
) -> std::result::Result<(Position, Vec<RawSample>), SkipReason> {
    let field = archive
        .field(step, frame_index, &options.variable)
        .map_err(|err| SkipReason::Unreadable {
            message: err.to_string(),
        })?
        .ok_or_else(|| SkipReason::FieldMissing {
            variable: options.variable.clone(),
        })?;

    let SubsetLookup::Found(position, values) = locate_subset(field.as_ref(), instance) else {
        return Err(SkipReason::NoPositionData);
    };

    let mut samples = Vec::with_capacity(values.len());
    let mut dropped = 0usize;
    for value in &values {
        // Node labels start at 1.
        if value.node_label == 0 {
            dropped += 1;
            continue;
        }
        match sample_value(value, options.invariant.as_ref()) {
            Some(v) if v.is_finite() => samples.push(RawSample::new(value.node_label, v)),
            _ => dropped += 1,
        }
    }

    if dropped > 0 {
        warn!(
            step,
            frame = frame_index,
            "dropped {dropped} samples without a usable value"
        );
    }
    if samples.is_empty() {
        return Err(SkipReason::NoValues { dropped });
    }
    debug!(step, frame = frame_index, ?position, samples = samples.len(), "read frame");
    Ok((position, samples))
}
