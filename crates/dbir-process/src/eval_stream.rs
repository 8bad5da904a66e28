use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use async_fn_stream::{TryStreamEmitter, try_fn_stream};
use burn::prelude::Backend;
use co3d_dataset::config::Task;
use co3d_dataset::data_source::DataSource;
use dbir_render::MainBackend;
use dbir_render::dbir::ModelDbir;
use glam::Vec3;
use lpips::{LpipsModel, LpipsModelConfig};
use nvs_eval::aggregate::{CategoryResult, aggregate_results, pretty_print_results, summarize_eval_results};
use nvs_eval::eval::eval_batch;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio_stream::Stream;

use crate::config::ProcessArgs;
use crate::emit_warnings::WarningEmitter;
use crate::export::export_results;
use crate::message::ProcessMessage;

/// Reference background color. Renders and ground truth composite over the
/// same constant so uncovered pixels compare fairly.
pub const BG_COLOR: Vec3 = Vec3::ZERO;

type Device = <MainBackend as Backend>::Device;

/// Run the full evaluation as a stream of progress messages. Category
/// failures are emitted as warnings and the run continues; failures to
/// export the final results end the stream with an error.
pub fn eval_stream(
    args: ProcessArgs,
    device: Device,
) -> impl Stream<Item = Result<ProcessMessage, anyhow::Error>> + 'static {
    try_fn_stream(|emitter| async move {
        let start = Instant::now();
        let task = args.source_config.task;
        let categories = args.process_config.categories.clone();

        log::info!("Using seed {}", args.process_config.seed);
        MainBackend::seed(args.process_config.seed);

        emitter
            .emit(ProcessMessage::NewRun { task, categories })
            .await;

        let model = args.model_config.init(BG_COLOR);
        let lpips = load_lpips(&args, &device)?;
        let source = DataSource::new(args.source_config.clone());
        let warner = WarningEmitter::new(&emitter);

        let mut category_results = vec![];
        for (category, sequence_id) in category_runs(&args) {
            let res = eval_category(
                &source,
                &category,
                sequence_id,
                &model,
                &lpips,
                args.process_config.seed,
                &emitter,
                &device,
            )
            .await;

            match res {
                Ok(result) => {
                    emitter
                        .emit(ProcessMessage::CategoryDone {
                            result: Box::new(result.clone()),
                        })
                        .await;
                    category_results.push(result);
                }
                Err(error) => {
                    warner.warn_category(&category, error).await;
                }
            }
        }

        let aggregate = aggregate_results(&category_results);
        log::info!(
            "{}",
            pretty_print_results(&format!("aggregate task={task}"), &aggregate)
        );
        let export_file =
            export_results(&args.process_config, task, &category_results, &aggregate).await?;

        emitter
            .emit(ProcessMessage::AggregateDone {
                results: aggregate,
                export_file,
                total_elapsed: start.elapsed(),
            })
            .await;
        Ok(())
    })
}

/// The (category, restricted sequence) pairs one run covers. The
/// single-sequence task evaluates each configured test sequence separately.
fn category_runs(args: &ProcessArgs) -> Vec<(String, Option<i64>)> {
    let mut runs = vec![];
    for category in &args.process_config.categories {
        match args.source_config.task {
            Task::SingleSequence => {
                for &id in &args.process_config.single_sequence_ids {
                    runs.push((category.clone(), Some(id)));
                }
            }
            Task::MultiSequence => runs.push((category.clone(), None)),
        }
    }
    runs
}

/// Every category evaluation starts from the same seed, so its results do
/// not depend on which other categories ran before it.
fn category_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

fn load_lpips(args: &ProcessArgs, device: &Device) -> anyhow::Result<LpipsModel<MainBackend>> {
    let model = LpipsModelConfig::new().init(device);
    match &args.process_config.lpips_weights {
        Some(path) => model
            .load_weights(Path::new(path))
            .context("Loading perceptual metric weights"),
        None => {
            log::warn!(
                "No perceptual metric weights given; lpips scores use untrained features"
            );
            Ok(model)
        }
    }
}

async fn eval_category(
    source: &DataSource,
    category: &str,
    sequence_id: Option<i64>,
    model: &ModelDbir,
    lpips: &LpipsModel<MainBackend>,
    seed: u64,
    emitter: &TryStreamEmitter<ProcessMessage, anyhow::Error>,
    device: &Device,
) -> anyhow::Result<CategoryResult> {
    let mut rng = category_rng(seed);
    let source = source.for_category(category, sequence_id);
    let task = source.task();
    let dataset = source
        .load_test()
        .await
        .context(format!("Loading index of category {category}"))?;

    // For the single-sequence task the target difficulty is judged against
    // every known camera of the test sequence, not just the batch sources.
    let source_cameras = match task {
        Task::SingleSequence => dataset
            .test_sequence_names()
            .first()
            .map(|seq| dataset.source_cameras(seq)),
        Task::MultiSequence => None,
    };

    let num_batches = dataset.eval_batches().len();
    emitter
        .emit(ProcessMessage::StartCategory {
            category: category.to_owned(),
            sequence_id,
            num_batches,
        })
        .await;

    let label = match sequence_id {
        Some(id) => format!("{category}/{id}"),
        None => category.to_owned(),
    };
    let max_sources = source.config.batch_max_sources;

    let mut per_batch = vec![];
    for (index, batch) in dataset.eval_batches().iter().enumerate() {
        let data = dataset
            .load_eval_batch(batch, max_sources)
            .await
            .context(format!("Loading eval batch {index} of {label}"))?;
        let target = data.target();

        let render = match &data.sequence_point_cloud {
            Some(cloud) => model.render_point_cloud::<MainBackend>(
                cloud.clone(),
                &target.camera,
                target.image.size,
                &mut rng,
                device,
            ),
            None => {
                let sources: Vec<_> = data
                    .known_sources()
                    .filter_map(|view| view.as_source_view())
                    .collect();
                model.render::<MainBackend>(
                    &sources,
                    &target.camera,
                    target.image.size,
                    &mut rng,
                    device,
                )
            }
        };

        let result = eval_batch(
            category,
            &data,
            &render,
            BG_COLOR,
            Some(lpips),
            source_cameras.as_deref(),
            device,
        )?;
        emitter
            .emit(ProcessMessage::BatchEvaluated {
                result: Box::new(result.clone()),
                index,
                num_batches,
            })
            .await;
        per_batch.push(result);
    }

    let results = summarize_eval_results(&per_batch, task);
    log::info!(
        "{}",
        pretty_print_results(&format!("category={label} task={task}"), &results)
    );
    Ok(CategoryResult {
        category: label,
        task,
        results,
    })
}
