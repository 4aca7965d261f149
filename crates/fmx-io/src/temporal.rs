//! Frame ordering keys and labels.
//!
//! Archive frames get their key from position: the step's index among
//! non-initial steps and the frame's raw index inside the step. Report files
//! get theirs from the file name, `...Step-<TOKEN>_<FRAME>.<ext>`, where a
//! numeric token is the step id and a symbolic token is mapped through a
//! [`StepNameRegistry`] in first-seen order. Step ids at or above
//! [`FrameKey::FALLBACK_STEP`] are reserved for unparsable names.

use fmx_model::{Frame, FrameKey, StepNameRegistry};
use tracing::warn;

const STEP_MARKER: &str = "step-";

/// Step part of a report file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepToken {
    Numeric(u32),
    Symbolic(String),
}

/// Key and label recovered from a report file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFrame {
    pub frame: Frame,
    /// `None` when the name did not follow the naming convention.
    pub token: Option<StepToken>,
}

impl ResolvedFrame {
    pub fn is_fallback(&self) -> bool {
        self.token.is_none()
    }
}

/// Frame of an archive step. `step_position` counts non-initial steps only.
pub fn archive_frame(step_position: usize, step_name: &str, frame_index: usize) -> Frame {
    let key = FrameKey::new(
        u32::try_from(step_position).unwrap_or(u32::MAX),
        u32::try_from(frame_index).unwrap_or(u32::MAX),
    );
    Frame::new(key, format!("{step_name}-frame{frame_index}"))
}

/// Splits `...Step-<TOKEN>_<FRAME>.<ext>` (marker matched case-insensitively).
pub fn parse_report_name(file_name: &str) -> Option<(StepToken, u32)> {
    let marker = file_name.to_ascii_lowercase().rfind(STEP_MARKER)?;
    let tail = &file_name[marker + STEP_MARKER.len()..];
    let (stem, ext) = tail.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    let (token, frame) = stem.rsplit_once('_')?;
    if token.is_empty() || frame.is_empty() || !frame.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let frame = frame.parse::<u32>().ok()?;

    let token = if token.bytes().all(|b| b.is_ascii_digit()) {
        StepToken::Numeric(token.parse::<u32>().ok()?)
    } else {
        StepToken::Symbolic(token.to_string())
    };
    Some((token, frame))
}

/// Resolves the frame of a report file. Unparsable names, and names whose
/// step id would reach the reserved range, get the fallback key
/// `(9999, discovery_index)` and the file stem as label.
pub fn report_frame(
    file_name: &str,
    discovery_index: usize,
    registry: &mut StepNameRegistry,
) -> ResolvedFrame {
    if let Some((token, frame_index)) = parse_report_name(file_name) {
        let (step_id, display) = match &token {
            StepToken::Numeric(n) => (*n, n.to_string()),
            StepToken::Symbolic(name) => (registry.ordinal(name), name.clone()),
        };
        if step_id < FrameKey::FALLBACK_STEP {
            return ResolvedFrame {
                frame: Frame::new(
                    FrameKey::new(step_id, frame_index),
                    format!("Step-{display}_Frame{frame_index}"),
                ),
                token: Some(token),
            };
        }
        warn!(
            file = file_name,
            step_id,
            "step id is not below {}, ordering the file as unparsable",
            FrameKey::FALLBACK_STEP
        );
    }

    let stem = file_name
        .rsplit_once('.')
        .map_or(file_name, |(stem, _)| stem);
    ResolvedFrame {
        frame: Frame::new(FrameKey::fallback(discovery_index), stem),
        token: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve_all(names: &[&str]) -> Vec<ResolvedFrame> {
        let mut registry = StepNameRegistry::new();
        names
            .iter()
            .enumerate()
            .map(|(i, n)| report_frame(n, i, &mut registry))
            .collect()
    }

    #[test]
    fn parses_numeric_and_symbolic_tokens() {
        assert_eq!(
            parse_report_name("S_Mises_Step-12_3.rpt"),
            Some((StepToken::Numeric(12), 3))
        );
        assert_eq!(
            parse_report_name("TEMP_step-Heat_Up_40.RPT"),
            Some((StepToken::Symbolic("Heat_Up".to_string()), 40))
        );
        assert_eq!(parse_report_name("TEMP_Step-1_x.rpt"), None);
        assert_eq!(parse_report_name("TEMP_Step-1_-2.rpt"), None);
        assert_eq!(parse_report_name("TEMP_Step-_2.rpt"), None);
        assert_eq!(parse_report_name("summary.rpt"), None);
        assert_eq!(parse_report_name("TEMP_Step-1_2"), None);
    }

    #[test]
    fn numeric_steps_order_numerically() {
        let mut frames: Vec<Frame> = resolve_all(&["Step-2_1.rpt", "Step-10_1.rpt", "Step-2_5.rpt"])
            .into_iter()
            .map(|r| r.frame)
            .collect();
        frames.sort_by_key(|f| f.key);
        let labels: Vec<&str> = frames.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, vec!["Step-2_Frame1", "Step-2_Frame5", "Step-10_Frame1"]);
    }

    #[test]
    fn symbolic_steps_get_ordinals_in_discovery_order() {
        let resolved = resolve_all(&["Step-Startup_1.rpt", "Step-Startup_2.rpt", "Step-Hold_1.rpt"]);
        let keys: Vec<FrameKey> = resolved.iter().map(|r| r.frame.key).collect();
        assert_eq!(
            keys,
            vec![FrameKey::new(0, 1), FrameKey::new(0, 2), FrameKey::new(1, 1)]
        );
        assert_eq!(resolved[2].frame.label, "Step-Hold_Frame1");
    }

    #[test]
    fn unparsable_names_fall_back_in_discovery_order() {
        let resolved = resolve_all(&["Step-3_0.rpt", "notes.rpt", "Step-1_0.rpt", "other.rpt"]);
        assert!(resolved[1].is_fallback());
        assert_eq!(resolved[1].frame.key, FrameKey::new(FrameKey::FALLBACK_STEP, 1));
        assert_eq!(resolved[1].frame.label, "notes");
        assert_eq!(resolved[3].frame.key, FrameKey::new(FrameKey::FALLBACK_STEP, 3));

        let mut keys: Vec<FrameKey> = resolved.iter().map(|r| r.frame.key).collect();
        keys.sort();
        assert_eq!(keys[0], FrameKey::new(1, 0));
        assert_eq!(keys[1], FrameKey::new(3, 0));
    }

    #[test]
    fn reserved_step_ids_are_ordered_with_unparsable_names() {
        let resolved = resolve_all(&[
            "NT11_Step-10000_0.rpt",
            "notes.rpt",
            "NT11_Step-9999_1.rpt",
            "NT11_Step-3_0.rpt",
        ]);
        assert!(resolved[0].is_fallback());
        assert!(resolved[2].is_fallback());
        assert_eq!(resolved[0].frame.key, FrameKey::new(FrameKey::FALLBACK_STEP, 0));
        assert_eq!(resolved[0].frame.label, "NT11_Step-10000_0");

        let mut frames: Vec<Frame> = resolved.into_iter().map(|r| r.frame).collect();
        frames.sort_by_key(|f| f.key);
        let labels: Vec<&str> = frames.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["Step-3_Frame0", "NT11_Step-10000_0", "notes", "NT11_Step-9999_1"]
        );
    }

    #[test]
    fn archive_frames_keep_raw_frame_index() {
        let frame = archive_frame(1, "Hold", 4);
        assert_eq!(frame.key, FrameKey::new(1, 4));
        assert_eq!(frame.label, "Hold-frame4");
    }
}
