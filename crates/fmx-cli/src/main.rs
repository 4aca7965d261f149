use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use fmx_io::pipeline::{default_archive_output, export_archive};
use fmx_io::{
    ArchiveExtractOptions, ArchiveHandle, FieldError, Invariant, MemoryArchive, NodeCheck,
    ReportCombineOptions, RunConfig, RunSummary, combine_reports, read_matrix_file,
    write_field_reports,
};
use fmx_model::{FieldMatrix, ReduceMethod};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fmx-cli")]
#[command(about = "Assemble finite-element field results into frame-by-node CSV matrices", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export one field of a result archive snapshot as a matrix
    Archive {
        /// Path to the archive snapshot (JSON)
        archive: PathBuf,
        #[command(flatten)]
        select: FieldSelection,
        /// Sample every Nth frame of each step
        #[arg(long, default_value_t = 1)]
        frame_stride: usize,
        /// Expected node count of the first frame (warning only)
        #[arg(long)]
        expected_nodes: Option<usize>,
        /// Compare node counts only, not node ids
        #[arg(long)]
        count_only: bool,
        /// Keep frames without data as empty rows
        #[arg(long)]
        keep_empty_frames: bool,
        /// Output CSV (defaults to <archive dir>/reports_csv/<stem>/<field>.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Combine a directory of per-frame text reports into a matrix
    Reports {
        /// Directory holding the report files
        dir: PathBuf,
        /// Value column named in the report headers
        #[arg(long)]
        column: String,
        /// Report file extension
        #[arg(long, default_value = "rpt")]
        extension: String,
        #[arg(long)]
        expected_nodes: Option<usize>,
        /// Compare node counts only, not node ids
        #[arg(long)]
        count_only: bool,
        /// Output CSV (defaults to <dir>/<column>.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Write one text report per archive frame
    ExportReports {
        /// Path to the archive snapshot (JSON)
        archive: PathBuf,
        #[command(flatten)]
        select: FieldSelection,
        /// Directory for the report files
        #[arg(long)]
        out_dir: PathBuf,
    },
    /// Execute a JSON run file
    Run {
        config: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Show the shape of a matrix CSV
    Inspect {
        matrix: PathBuf,
        /// Fail unless the matrix has this many node columns
        #[arg(long)]
        expected_nodes: Option<usize>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct FieldSelection {
    /// Field output name, e.g. S or TEMP
    #[arg(long)]
    variable: String,
    /// Tensor invariant, e.g. mises, "Max. Principal", tresca, pressure
    #[arg(long)]
    invariant: Option<String>,
    /// Mesh instance (defaults to the first)
    #[arg(long)]
    instance: Option<String>,
    /// Process only the first K non-initial steps
    #[arg(long)]
    step_limit: Option<usize>,
    /// Merge rule for several samples on one node
    #[arg(long, default_value = "avg")]
    reduce: ReduceMethod,
}

impl FieldSelection {
    fn options(&self) -> ArchiveExtractOptions {
        let mut options = ArchiveExtractOptions::new(self.variable.clone());
        options.invariant = self.invariant.as_deref().map(Invariant::from_name);
        options.instance_name = self.instance.clone();
        options.step_limit = self.step_limit;
        options.reduce_method = self.reduce;
        options
    }
}

fn node_check(count_only: bool) -> NodeCheck {
    if count_only {
        NodeCheck::CountOnly
    } else {
        NodeCheck::NodeSet
    }
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Archive {
            archive,
            select,
            frame_stride,
            expected_nodes,
            count_only,
            keep_empty_frames,
            output,
            json,
        } => {
            let mut options = select.options();
            options.frame_stride = frame_stride;
            options.expected_node_count = expected_nodes;
            options.node_check = node_check(count_only);
            options.keep_empty_frames = keep_empty_frames;
            cmd_archive(&archive, &options, output).map(|s| print_summary(&s, json))
        }
        Commands::Reports {
            dir,
            column,
            extension,
            expected_nodes,
            count_only,
            output,
            json,
        } => {
            let options = ReportCombineOptions {
                data_column_name: column,
                extension,
                expected_node_count: expected_nodes,
                node_check: node_check(count_only),
            };
            combine_reports(&dir, &options, output.as_deref()).map(|s| print_summary(&s, json))
        }
        Commands::ExportReports {
            archive,
            select,
            out_dir,
        } => cmd_export_reports(&archive, &select.options(), &out_dir),
        Commands::Run { config, json } => RunConfig::load(&config)
            .and_then(|c| c.run())
            .map(|s| print_summary(&s, json)),
        Commands::Inspect {
            matrix,
            expected_nodes,
            json,
        } => read_matrix_file(&matrix, expected_nodes).map(|m| print_matrix(&matrix, &m, json)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(1)
        }
    }
}

fn cmd_archive(
    archive_path: &Path,
    options: &ArchiveExtractOptions,
    output: Option<PathBuf>,
) -> Result<RunSummary, FieldError> {
    options.validate()?;
    let output =
        output.unwrap_or_else(|| default_archive_output(archive_path, &options.field_name()));
    let archive = ArchiveHandle::new(MemoryArchive::open(archive_path)?);
    export_archive(&*archive, options, &output)
}

fn cmd_export_reports(
    archive_path: &Path,
    options: &ArchiveExtractOptions,
    out_dir: &Path,
) -> Result<(), FieldError> {
    options.validate()?;
    let archive = ArchiveHandle::new(MemoryArchive::open(archive_path)?);
    let written = write_field_reports(&*archive, options, out_dir)?;
    println!("{} reports written to {}", written.len(), out_dir.display());
    Ok(())
}

fn print_summary(summary: &RunSummary, json: bool) {
    if json {
        match serde_json::to_string_pretty(summary) {
            Ok(text) => println!("{text}"),
            Err(err) => eprintln!("error: {err}"),
        }
        return;
    }
    println!("{summary}");
    println!("output: {}", summary.output.display());
    for skip in &summary.skipped {
        println!("skipped {}: {}", skip.label, skip.reason);
    }
    println!("elapsed: {:.2} s", summary.elapsed.as_secs_f64());
}

fn print_matrix(path: &Path, matrix: &FieldMatrix, json: bool) {
    let labels = matrix.frame_labels();
    if json {
        let value = serde_json::json!({
            "path": path.display().to_string(),
            "frames": matrix.frame_count(),
            "nodes": matrix.node_count(),
            "missing_cells": matrix.missing_cells(),
            "first_frame": labels.first(),
            "last_frame": labels.last(),
        });
        println!("{value:#}");
        return;
    }
    println!("matrix: {}", path.display());
    println!("frames: {}", matrix.frame_count());
    println!("nodes: {}", matrix.node_count());
    println!("missing_cells: {}", matrix.missing_cells());
    if let (Some(first), Some(last)) = (labels.first(), labels.last()) {
        println!("frame_range: {first} .. {last}");
    }
}
