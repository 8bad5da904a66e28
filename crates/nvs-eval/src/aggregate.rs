use std::collections::BTreeMap;
use std::fmt::Write;

use co3d_dataset::config::Task;
use serde::Serialize;

use crate::eval::BatchEvalResult;

/// Camera-difficulty thresholds splitting single-sequence results into
/// easy / medium / hard buckets.
pub const DIFFICULTY_BIN_BREAKS: [f32; 2] = [0.02, 0.1];

/// Metric means over one bucket of evaluated batches.
#[derive(Debug, Clone, Serialize)]
pub struct SubsetResult {
    pub subset: String,
    pub batch_count: usize,
    pub metrics: BTreeMap<String, f32>,
}

/// All buckets of one category/task run.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryResult {
    pub category: String,
    pub task: Task,
    pub results: Vec<SubsetResult>,
}

pub fn difficulty_bin(difficulty: f32) -> &'static str {
    if difficulty < DIFFICULTY_BIN_BREAKS[0] {
        "easy"
    } else if difficulty < DIFFICULTY_BIN_BREAKS[1] {
        "medium"
    } else {
        "hard"
    }
}

/// Average per-batch results into buckets. Every run gets an `all` bucket;
/// the single-sequence task adds per-difficulty buckets since its targets
/// revisit the captured trajectory at varying offsets.
pub fn summarize_eval_results(per_batch: &[BatchEvalResult], task: Task) -> Vec<SubsetResult> {
    let mut buckets: BTreeMap<&str, Vec<&BatchEvalResult>> = BTreeMap::new();
    for batch in per_batch {
        buckets.entry("all").or_default().push(batch);
        if task == Task::SingleSequence {
            buckets
                .entry(difficulty_bin(batch.camera_difficulty))
                .or_default()
                .push(batch);
        }
    }

    // Stable report order: the overall bucket first, then easiest to hardest.
    let order = ["all", "easy", "medium", "hard"];
    order
        .iter()
        .filter_map(|&name| {
            let batches = buckets.get(name)?;
            Some(SubsetResult {
                subset: name.to_owned(),
                batch_count: batches.len(),
                metrics: mean_metrics(batches.iter().map(|b| &b.metrics)),
            })
        })
        .collect()
}

/// Mean the per-category summaries into one table, bucket by bucket. Each
/// category contributes equally regardless of its batch count.
pub fn aggregate_results(categories: &[CategoryResult]) -> Vec<SubsetResult> {
    let mut buckets: BTreeMap<String, Vec<&SubsetResult>> = BTreeMap::new();
    for category in categories {
        for subset in &category.results {
            buckets
                .entry(subset.subset.clone())
                .or_default()
                .push(subset);
        }
    }

    let order = ["all", "easy", "medium", "hard"];
    order
        .iter()
        .filter_map(|&name| {
            let subsets = buckets.get(name)?;
            Some(SubsetResult {
                subset: name.to_owned(),
                batch_count: subsets.iter().map(|s| s.batch_count).sum(),
                metrics: mean_metrics(subsets.iter().map(|s| &s.metrics)),
            })
        })
        .collect()
}

fn mean_metrics<'a>(
    entries: impl Iterator<Item = &'a BTreeMap<String, f32>>,
) -> BTreeMap<String, f32> {
    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for metrics in entries {
        for (name, &value) in metrics {
            let entry = sums.entry(name.clone()).or_insert((0.0, 0));
            entry.0 += value as f64;
            entry.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(name, (sum, count))| (name, (sum / count as f64) as f32))
        .collect()
}

/// Render a bucket table as fixed-width text for the terminal.
pub fn pretty_print_results(heading: &str, results: &[SubsetResult]) -> String {
    let mut columns: Vec<&str> = results
        .iter()
        .flat_map(|r| r.metrics.keys().map(String::as_str))
        .collect();
    columns.sort_unstable();
    columns.dedup();

    let mut out = String::new();
    let _ = writeln!(out, "{heading}");
    let _ = write!(out, "{:<10} {:>6}", "subset", "n");
    for column in &columns {
        let _ = write!(out, " {column:>12}");
    }
    let _ = writeln!(out);

    for result in results {
        let _ = write!(out, "{:<10} {:>6}", result.subset, result.batch_count);
        for column in &columns {
            match result.metrics.get(*column) {
                Some(value) => {
                    let _ = write!(out, " {value:>12.4}");
                }
                None => {
                    let _ = write!(out, " {:>12}", "-");
                }
            }
        }
        let _ = writeln!(out);
    }
    out
}
