//! Archive export, end to end: snapshot → extraction → matrix → CSV.

use std::cell::Cell;
use std::fs;
use std::io;
use std::rc::Rc;

use fmx_io::archive::INITIAL_STEP;
use fmx_io::tensor::TensorComponents;
use fmx_io::{
    ArchiveExtractOptions, ArchiveHandle, CustomInvariant, FieldError, FieldOutput, FieldSample,
    Invariant, MemoryArchive, NodeCheck, Position, ResultArchive, RunConfig, SkipReason,
    export_archive, read_matrix_file,
};
use fmx_model::ReduceMethod;

fn scenario_archive() -> MemoryArchive {
    let mut archive = MemoryArchive::new("plate");
    archive.instances.push("PART-1-1".to_string());
    archive.step_mut(INITIAL_STEP);
    for (a, b) in [(1.5, 2.5), (1.6, 2.6)] {
        archive.push_frame("Step-1").set_field(
            "NT11",
            Position::Nodal,
            vec![FieldSample::scalar(10, a), FieldSample::scalar(20, b)],
        );
    }
    // Third frame carries no NT11 output.
    archive.push_frame("Step-1").set_field(
        "U",
        Position::Nodal,
        vec![FieldSample::scalar(10, 0.0), FieldSample::scalar(20, 0.0)],
    );
    archive
}

fn uniaxial(node: u64, sxx: f64) -> FieldSample {
    FieldSample::tensor(node, TensorComponents::new(sxx, 0.0, 0.0, 0.0, 0.0, 0.0))
}

#[test]
fn test_missing_field_frame_is_left_out() {
    let dir = tempfile::tempdir().expect("temp dir");
    let output = dir.path().join("NT11.csv");

    let summary = export_archive(&scenario_archive(), &ArchiveExtractOptions::new("NT11"), &output)
        .expect("export should succeed");

    let text = fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec![
            "FrameID,Node_10,Node_20",
            "Step-1-frame0,1.5,2.5",
            "Step-1-frame1,1.6,2.6"
        ]
    );
    assert_eq!(summary.to_string(), "2 frames written, 2 nodes written");
    assert_eq!(summary.skipped.len(), 1);
    assert_eq!(summary.skipped[0].label, "Step-1-frame2");
    assert_eq!(
        summary.skipped[0].reason,
        SkipReason::FieldMissing {
            variable: "NT11".to_string()
        }
    );
}

#[test]
fn test_keep_empty_frames_writes_blank_row() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("NT11.csv");
    let mut options = ArchiveExtractOptions::new("NT11");
    options.keep_empty_frames = true;

    let summary = export_archive(&scenario_archive(), &options, &output).unwrap();
    assert_eq!(summary.frames_written, 3);
    let text = fs::read_to_string(&output).unwrap();
    assert_eq!(text.lines().last(), Some("Step-1-frame2,,"));
}

#[test]
fn test_element_nodal_stress_reduced_per_node() {
    let mut archive = MemoryArchive::new("bracket");
    archive.instances.push("PART-1-1".to_string());
    archive.push_frame("Load").set_field(
        "S",
        Position::ElementNodal,
        vec![uniaxial(5, 1.0), uniaxial(5, 3.0), uniaxial(5, 2.0), uniaxial(6, 4.0)],
    );

    let dir = tempfile::tempdir().unwrap();
    let mut options = ArchiveExtractOptions::new("S");
    options.invariant = Some(Invariant::Mises);

    let avg_path = dir.path().join("avg.csv");
    export_archive(&archive, &options, &avg_path).unwrap();
    let avg = read_matrix_file(&avg_path, Some(2)).unwrap();
    assert_eq!(avg.rows()[0].cells, vec![Some(2.0), Some(4.0)]);

    options.reduce_method = ReduceMethod::Max;
    let max_path = dir.path().join("max.csv");
    export_archive(&archive, &options, &max_path).unwrap();
    let max = read_matrix_file(&max_path, None).unwrap();
    assert_eq!(max.rows()[0].cells, vec![Some(3.0), Some(4.0)]);
    assert_eq!(max.frame_labels(), vec!["Load-frame0"]);
}

#[test]
fn test_repeated_nodal_ids_keep_last_value() {
    let mut archive = MemoryArchive::new("job");
    archive.instances.push("PART-1-1".to_string());
    archive.push_frame("Step-1").set_field(
        "TEMP",
        Position::Nodal,
        vec![
            FieldSample::scalar(1, 1.0),
            FieldSample::scalar(2, 2.0),
            FieldSample::scalar(1, 9.0),
        ],
    );

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("TEMP.csv");
    let mut options = ArchiveExtractOptions::new("TEMP");
    options.reduce_method = ReduceMethod::Avg;
    export_archive(&archive, &options, &output).unwrap();
    let matrix = read_matrix_file(&output, Some(2)).unwrap();
    assert_eq!(matrix.rows()[0].cells, vec![Some(9.0), Some(2.0)]);
}

#[test]
fn test_frames_with_other_nodes_are_dropped() {
    let mut archive = MemoryArchive::new("job");
    archive.instances.push("PART-1-1".to_string());
    let populations: [&[u64]; 3] = [&[1, 2, 3], &[1, 2], &[1, 2, 4]];
    for nodes in populations {
        archive.push_frame("Step-1").set_field(
            "TEMP",
            Position::Nodal,
            nodes.iter().map(|&n| FieldSample::scalar(n, n as f64)).collect(),
        );
    }

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("TEMP.csv");
    let summary = export_archive(&archive, &ArchiveExtractOptions::new("TEMP"), &output).unwrap();
    assert_eq!(summary.frames_written, 1);
    assert_eq!(summary.nodes_written, 3);
    assert_eq!(
        summary.skipped.iter().map(|s| &s.reason).collect::<Vec<_>>(),
        vec![
            &SkipReason::NodeCountMismatch {
                expected: 3,
                found: 2
            },
            &SkipReason::NodeSetMismatch {
                missing: 1,
                unexpected: 1
            }
        ]
    );

    let mut loose = ArchiveExtractOptions::new("TEMP");
    loose.node_check = NodeCheck::CountOnly;
    let summary = export_archive(&archive, &loose, &output).unwrap();
    assert_eq!(summary.frames_written, 2);
    let matrix = read_matrix_file(&output, Some(3)).unwrap();
    assert_eq!(matrix.rows()[1].cells, vec![Some(1.0), Some(2.0), None]);
}

#[test]
fn test_custom_invariant_reads_named_component() {
    let mut archive = MemoryArchive::new("job");
    archive.instances.push("PART-1-1".to_string());
    archive.push_frame("Step-1").set_field(
        "S",
        Position::Nodal,
        vec![
            uniaxial(1, 10.0).with_component("TRIAX", 0.33),
            uniaxial(2, 20.0).with_component("TRIAX", 0.5),
        ],
    );

    let dir = tempfile::tempdir().unwrap();
    let mut options = ArchiveExtractOptions::new("S");
    options.invariant = Some(Invariant::from_name("TRIAX"));
    let summary = export_archive(&archive, &options, &dir.path().join("a.csv")).unwrap();
    assert_eq!(summary.nodes_written, 2);
    let matrix = read_matrix_file(dir.path().join("a.csv"), None).unwrap();
    assert_eq!(matrix.rows()[0].cells, vec![Some(0.33), Some(0.5)]);

    options.invariant = Some(Invariant::Custom(CustomInvariant::new("double_xx", |s| {
        s.tensor_value().map(|t| 2.0 * t.xx)
    })));
    export_archive(&archive, &options, &dir.path().join("b.csv")).unwrap();
    let matrix = read_matrix_file(dir.path().join("b.csv"), None).unwrap();
    assert_eq!(matrix.rows()[0].cells, vec![Some(20.0), Some(40.0)]);
}

#[test]
fn test_no_surviving_frames_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let err = export_archive(
        &scenario_archive(),
        &ArchiveExtractOptions::new("S"),
        &dir.path().join("S.csv"),
    )
    .expect_err("no frame has S");
    assert!(matches!(err, FieldError::NoFrames));
    assert!(!dir.path().join("S.csv").exists());
}

struct CountingArchive {
    inner: MemoryArchive,
    closed: Rc<Cell<u32>>,
}

impl ResultArchive for CountingArchive {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn instance_names(&self) -> Vec<String> {
        self.inner.instance_names()
    }

    fn step_names(&self) -> Vec<String> {
        self.inner.step_names()
    }

    fn frame_count(&self, step: &str) -> usize {
        self.inner.frame_count(step)
    }

    fn field(
        &self,
        step: &str,
        frame: usize,
        variable: &str,
    ) -> io::Result<Option<Box<dyn FieldOutput + '_>>> {
        self.inner.field(step, frame, variable)
    }

    fn close(&mut self) {
        self.closed.set(self.closed.get() + 1);
    }
}

#[test]
fn test_handle_released_on_success_and_failure() {
    let dir = tempfile::tempdir().unwrap();
    let closed = Rc::new(Cell::new(0));

    for variable in ["NT11", "S"] {
        let handle = ArchiveHandle::new(CountingArchive {
            inner: scenario_archive(),
            closed: Rc::clone(&closed),
        });
        let _ = export_archive(
            &*handle,
            &ArchiveExtractOptions::new(variable),
            &dir.path().join(format!("{variable}.csv")),
        );
    }
    assert_eq!(closed.get(), 2);
}

#[test]
fn test_run_file_uses_default_output_location() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("plate.json");
    scenario_archive().save(&snapshot).unwrap();

    let config_path = dir.path().join("run.json");
    fs::write(
        &config_path,
        format!(
            r#"{{ "source": "archive", "archive": {:?}, "variable": "NT11" }}"#,
            snapshot.display().to_string()
        ),
    )
    .unwrap();

    let summary = RunConfig::load(&config_path).unwrap().run().unwrap();
    let expected = dir.path().join("reports_csv").join("plate").join("NT11.csv");
    assert_eq!(summary.output, expected);
    assert_eq!(read_matrix_file(&expected, Some(2)).unwrap().frame_count(), 2);
}

#[test]
fn test_unreadable_snapshot_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ not json").unwrap();
    assert!(matches!(
        MemoryArchive::open(&path),
        Err(FieldError::ArchiveOpen { .. })
    ));
}
