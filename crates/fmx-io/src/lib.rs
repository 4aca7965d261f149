//! Field time-series assembly for finite-element results.
//!
//! This crate provides:
//! - **Result archive** abstraction with a JSON snapshot backend
//! - **Archive reader**: per-frame extraction with nodal / element-nodal fallback
//! - **Report reader**: delimiter-bounded text reports, one per frame
//! - **Temporal keys** for archive frames and report file names
//! - **Reduction and node consistency** shared by both sources
//! - **Matrix assembly** and CSV read/write
//! - **Report export** of archive frames, readable by the report reader
//! - **Tensor invariants** (von Mises, principal values, Tresca, pressure)

pub mod archive;
pub mod archive_reader;
pub mod assemble;
pub mod config;
pub mod consistency;
pub mod error;
pub mod invariant;
pub mod matrix_csv;
pub mod pipeline;
pub mod report_reader;
pub mod report_writer;
pub mod temporal;
pub mod tensor;

pub use archive::{
    ArchiveHandle, FieldOutput, FieldSample, MemoryArchive, Position, ResultArchive,
};
pub use archive_reader::{ArchiveExtractOptions, extract_frames};
pub use config::RunConfig;
pub use consistency::NodeCheck;
pub use error::{FieldError, Result, SkipReason, SkippedFrame};
pub use invariant::{CustomInvariant, Invariant};
pub use matrix_csv::{read_matrix, read_matrix_file, write_matrix, write_matrix_file};
pub use pipeline::{
    ReportCombineOptions, RunSummary, assemble_archive, assemble_reports, combine_reports,
    export_archive,
};
pub use report_writer::write_field_reports;
