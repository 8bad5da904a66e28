use std::path::PathBuf;
use std::time::Duration;

use co3d_dataset::config::Task;
use nvs_eval::aggregate::{CategoryResult, SubsetResult};
use nvs_eval::eval::BatchEvalResult;

pub enum ProcessMessage {
    /// A new evaluation run started.
    NewRun {
        task: Task,
        categories: Vec<String>,
    },
    /// One category index finished loading; its batches evaluate next.
    StartCategory {
        category: String,
        sequence_id: Option<i64>,
        num_batches: usize,
    },
    /// One eval batch was rendered and measured.
    BatchEvaluated {
        result: Box<BatchEvalResult>,
        index: usize,
        num_batches: usize,
    },
    /// A category run was summarized into buckets.
    CategoryDone {
        result: Box<CategoryResult>,
    },
    /// All categories finished, aggregated and written to disk.
    AggregateDone {
        results: Vec<SubsetResult>,
        export_file: PathBuf,
        total_elapsed: Duration,
    },
    /// A recoverable failure; the run continues with remaining categories.
    Warning {
        error: anyhow::Error,
    },
}
