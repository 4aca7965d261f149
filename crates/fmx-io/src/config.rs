//! JSON run files.
//!
//! ```json
//! { "source": "archive", "archive": "job.json", "variable": "S", "invariant": "mises" }
//! { "source": "reports", "directory": "rpt", "data_column_name": "S.Mises" }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use fmx_model::ReduceMethod;
use serde::{Deserialize, Serialize};

use crate::archive::{ArchiveHandle, MemoryArchive};
use crate::archive_reader::ArchiveExtractOptions;
use crate::consistency::NodeCheck;
use crate::invariant::Invariant;
use crate::pipeline::{
    ReportCombineOptions, RunSummary, combine_reports, default_archive_output, export_archive,
};
use crate::report_reader::REPORT_EXTENSION;
use crate::{FieldError, Result};

fn default_stride() -> usize {
    1
}

fn default_reduce() -> String {
    ReduceMethod::default().as_str().to_string()
}

fn default_extension() -> String {
    REPORT_EXTENSION.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum RunConfig {
    Archive {
        archive: PathBuf,
        variable: String,
        #[serde(default)]
        invariant: Option<String>,
        #[serde(default)]
        instance_name: Option<String>,
        #[serde(default)]
        step_limit: Option<usize>,
        #[serde(default = "default_stride")]
        frame_stride: usize,
        #[serde(default = "default_reduce")]
        reduce_method: String,
        #[serde(default)]
        keep_empty_frames: bool,
        #[serde(default)]
        expected_node_count: Option<usize>,
        #[serde(default)]
        node_check: NodeCheck,
        #[serde(default)]
        output: Option<PathBuf>,
    },
    Reports {
        directory: PathBuf,
        data_column_name: String,
        #[serde(default = "default_extension")]
        extension: String,
        #[serde(default)]
        expected_node_count: Option<usize>,
        #[serde(default)]
        node_check: NodeCheck,
        #[serde(default)]
        output: Option<PathBuf>,
    },
}

impl RunConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Archive options described by this config, validated.
    pub fn archive_options(&self) -> Result<Option<ArchiveExtractOptions>> {
        let RunConfig::Archive {
            variable,
            invariant,
            instance_name,
            step_limit,
            frame_stride,
            reduce_method,
            keep_empty_frames,
            expected_node_count,
            node_check,
            ..
        } = self
        else {
            return Ok(None);
        };

        let reduce_method = reduce_method
            .parse::<ReduceMethod>()
            .map_err(|err| FieldError::InvalidOption(err.to_string()))?;
        let options = ArchiveExtractOptions {
            variable: variable.clone(),
            invariant: invariant.as_deref().map(Invariant::from_name),
            instance_name: instance_name.clone(),
            step_limit: *step_limit,
            frame_stride: *frame_stride,
            reduce_method,
            keep_empty_frames: *keep_empty_frames,
            expected_node_count: *expected_node_count,
            node_check: *node_check,
        };
        options.validate()?;
        Ok(Some(options))
    }

    /// Validates every option, then executes the run.
    pub fn run(&self) -> Result<RunSummary> {
        match self {
            RunConfig::Archive {
                archive, output, ..
            } => {
                let Some(options) = self.archive_options()? else {
                    return Err(FieldError::InvalidOption("not an archive run".to_string()));
                };
                let output = output
                    .clone()
                    .unwrap_or_else(|| default_archive_output(archive, &options.field_name()));
                let handle = ArchiveHandle::new(MemoryArchive::open(archive)?);
                export_archive(&*handle, &options, &output)
            }
            RunConfig::Reports {
                directory,
                data_column_name,
                extension,
                expected_node_count,
                node_check,
                output,
            } => {
                let options = ReportCombineOptions {
                    data_column_name: data_column_name.clone(),
                    extension: extension.clone(),
                    expected_node_count: *expected_node_count,
                    node_check: *node_check,
                };
                options.validate()?;
                combine_reports(directory, &options, output.as_deref())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_config_applies_documented_defaults() {
        let config: RunConfig = serde_json::from_str(
            r#"{ "source": "archive", "archive": "job.json", "variable": "S", "invariant": "Max. Principal" }"#,
        )
        .expect("config parses");
        let options = config.archive_options().unwrap().expect("archive options");
        assert_eq!(options.frame_stride, 1);
        assert_eq!(options.reduce_method, ReduceMethod::Avg);
        assert_eq!(options.node_check, NodeCheck::NodeSet);
        assert!(matches!(options.invariant, Some(Invariant::MaxPrincipal)));
        assert!(!options.keep_empty_frames);
    }

    #[test]
    fn reports_config_defaults_extension() {
        let config: RunConfig = serde_json::from_str(
            r#"{ "source": "reports", "directory": "rpt", "data_column_name": "NT11", "node_check": "count_only" }"#,
        )
        .unwrap();
        match config {
            RunConfig::Reports {
                extension,
                node_check,
                ..
            } => {
                assert_eq!(extension, "rpt");
                assert_eq!(node_check, NodeCheck::CountOnly);
            }
            other => panic!("unexpected config {other:?}"),
        }
    }

    #[test]
    fn bad_options_fail_before_reading_data() {
        let config: RunConfig = serde_json::from_str(
            r#"{ "source": "archive", "archive": "/does/not/exist.json", "variable": "S", "reduce_method": "median" }"#,
        )
        .unwrap();
        assert!(matches!(config.run(), Err(FieldError::InvalidOption(_))));

        let config: RunConfig = serde_json::from_str(
            r#"{ "source": "archive", "archive": "/does/not/exist.json", "variable": "S", "frame_stride": 0 }"#,
        )
        .unwrap();
        assert!(matches!(config.run(), Err(FieldError::InvalidOption(_))));

        let config: RunConfig = serde_json::from_str(
            r#"{ "source": "archive", "archive": "/does/not/exist.json", "variable": "S" }"#,
        )
        .unwrap();
        assert!(matches!(config.run(), Err(FieldError::ArchiveOpen { .. })));
    }

    #[test]
    fn unknown_source_is_a_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        fs::write(&path, r#"{ "source": "database" }"#).unwrap();
        assert!(matches!(RunConfig::load(&path), Err(FieldError::Json(_))));
    }
}
