use std::path::{Path, PathBuf};

use anyhow::Context;
use co3d_dataset::config::Task;
use nvs_eval::aggregate::{CategoryResult, SubsetResult};
use serde::Serialize;

use crate::config::ProcessConfig;

#[derive(Serialize)]
struct ResultsDump<'a> {
    task: Task,
    categories: &'a [CategoryResult],
    aggregate: &'a [SubsetResult],
}

/// Write the per-category and aggregated results as a JSON file under the
/// export path. Returns the written file path.
pub async fn export_results(
    process_config: &ProcessConfig,
    task: Task,
    categories: &[CategoryResult],
    aggregate: &[SubsetResult],
) -> anyhow::Result<PathBuf> {
    let export_name = process_config.export_name.replace("{task}", task.tag());
    let export_path = Path::new(&process_config.export_path).to_owned();
    tokio::fs::create_dir_all(&export_path)
        .await
        .context("Creating export directory")?;

    let dump = ResultsDump {
        task,
        categories,
        aggregate,
    };
    let json = serde_json::to_vec_pretty(&dump).context("Serializing results")?;
    let file = export_path.join(&export_name);
    tokio::fs::write(&file, json)
        .await
        .context(format!("Failed to write results {file:?}"))?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn writes_the_task_tagged_dump() {
        let dir = std::env::temp_dir().join("dbir_export_test");
        let config = ProcessConfig {
            seed: 42,
            categories: vec!["apple".to_owned()],
            single_sequence_ids: vec![0],
            lpips_weights: None,
            export_path: dir.to_string_lossy().into_owned(),
            export_name: "results_{task}.json".to_owned(),
        };

        let aggregate = vec![SubsetResult {
            subset: "all".to_owned(),
            batch_count: 1,
            metrics: BTreeMap::from([("psnr".to_owned(), 21.5)]),
        }];
        let file = export_results(&config, Task::MultiSequence, &[], &aggregate)
            .await
            .expect("export succeeds");

        assert!(file.ends_with("results_multisequence.json"));
        let text = tokio::fs::read_to_string(&file).await.expect("file written");
        let parsed: serde_json::Value = serde_json::from_str(&text).expect("valid json");
        assert_eq!(parsed["task"], "multisequence");
        assert_eq!(parsed["aggregate"][0]["metrics"]["psnr"], 21.5);
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
