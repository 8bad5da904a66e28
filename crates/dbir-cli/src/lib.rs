#![recursion_limit = "256"]

use clap::{Error, Parser, error::ErrorKind};
use dbir_process::{config::ProcessArgs, message::ProcessMessage};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use nvs_eval::aggregate::pretty_print_results;
use std::time::Duration;
use tokio_stream::{Stream, StreamExt};

#[derive(Parser)]
#[command(
    author,
    version,
    arg_required_else_help = false,
    about = "Depth-based re-rendering baseline for CO3D novel view synthesis"
)]
pub struct Cli {
    /// Root directory of the dataset (one sub-directory per category).
    #[arg(id = "positional_dataset_root", value_name = "DATASET_ROOT")]
    pub dataset_root: Option<String>,

    #[clap(flatten)]
    pub process: ProcessArgs,
}

impl Cli {
    pub fn validate(mut self) -> Result<Self, Error> {
        if let Some(root) = self.dataset_root.take() {
            self.process.source_config.dataset.dataset_root = root;
        }
        if self.process.source_config.dataset.dataset_root.is_empty() {
            return Err(Error::raw(
                ErrorKind::MissingRequiredArgument,
                "A dataset root must be given, either positionally or with --dataset-root",
            ));
        }
        Ok(self)
    }
}

pub async fn eval_ui(
    stream: impl Stream<Item = anyhow::Result<ProcessMessage>>,
) -> Result<(), anyhow::Error> {
    let main_spinner = ProgressBar::new_spinner().with_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}")
            .expect("Invalid indicatif config")
            .tick_strings(&["◐", "◓", "◑", "◒"]),
    );

    let batch_progress = ProgressBar::new(0)
        .with_style(
            ProgressStyle::with_template(
                "[{elapsed}] {bar:40.cyan/blue} {pos:>5}/{len:5} {msg} ({per_sec}, {eta} remaining)",
            )
            .expect("Invalid indicatif config")
            .progress_chars("◍○○"),
        )
        .with_message("Batches");

    let stats_spinner = ProgressBar::new_spinner().with_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}")
            .expect("Invalid indicatif config")
            .tick_strings(&["ℹ️", "ℹ️"]),
    );

    let sp = MultiProgress::new();
    let main_spinner = sp.add(main_spinner);
    let batch_progress = sp.add(batch_progress);
    let stats_spinner = sp.add(stats_spinner);

    main_spinner.enable_steady_tick(Duration::from_millis(120));
    stats_spinner.set_message("Starting up");
    log::info!("Starting up");

    if cfg!(debug_assertions) {
        let _ =
            sp.println("ℹ️  running in debug mode, compile with --release for best performance");
    }

    let mut stream = std::pin::pin!(stream);
    let mut duration = Duration::from_secs(0);

    while let Some(msg) = stream.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(error) => {
                // Don't print the error here. It'll bubble up and be printed as output.
                let _ = sp.println("❌ Encountered an error");
                return Err(error);
            }
        };

        match msg {
            ProcessMessage::NewRun { task, categories } => {
                main_spinner.set_message(format!(
                    "Evaluating {} categories on task {task}",
                    categories.len()
                ));
            }
            ProcessMessage::StartCategory {
                category,
                sequence_id,
                num_batches,
            } => {
                let label = match sequence_id {
                    Some(id) => format!("{category}/{id}"),
                    None => category,
                };
                log::info!("Evaluating {label}: {num_batches} batches");
                main_spinner.set_message(format!("Evaluating {label}"));
                batch_progress.set_length(num_batches as u64);
                batch_progress.set_position(0);
            }
            ProcessMessage::BatchEvaluated {
                result,
                index,
                num_batches: _,
            } => {
                batch_progress.set_position(index as u64 + 1);
                if let Some(psnr) = result.metrics.get("psnr") {
                    stats_spinner.set_message(format!(
                        "{} frame {}: psnr {psnr:.2}",
                        result.sequence_name, result.frame_number
                    ));
                }
            }
            ProcessMessage::CategoryDone { result } => {
                let table = pretty_print_results(
                    &format!("category={} task={}", result.category, result.task),
                    &result.results,
                );
                let _ = sp.println(table);
            }
            ProcessMessage::AggregateDone {
                results,
                export_file,
                total_elapsed,
            } => {
                let _ = sp.println(pretty_print_results("aggregate", &results));
                let _ = sp.println(format!("Results written to {}", export_file.display()));
                duration = total_elapsed;
            }
            ProcessMessage::Warning { error } => {
                let _ = sp.println(format!("⚠️  {error:?}"));
            }
        }
    }

    let duration_secs = Duration::from_secs(duration.as_secs());
    let _ = sp.println(format!(
        "Evaluation took {}",
        humantime::format_duration(duration_secs)
    ));

    log::info!(
        "Done evaluating! Took {:?}.",
        humantime::format_duration(duration_secs)
    );

    Ok(())
}
