use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};

/// Evaluation task, matching the CO3D challenge setups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lower")]
pub enum Task {
    /// Reconstruct one specific captured sequence from its known frames.
    SingleSequence,
    /// Generalize to unseen sequences of a category.
    MultiSequence,
}

impl Task {
    /// Tag used in index file names (`set_lists_<tag>.json`).
    pub fn tag(&self) -> &'static str {
        match self {
            Self::SingleSequence => "singlesequence",
            Self::MultiSequence => "multisequence",
        }
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Args)]
pub struct JsonIndexConfig {
    /// Root directory of the dataset (one sub-directory per category).
    #[arg(long, help_heading = "Dataset options", default_value = "")]
    pub dataset_root: String,

    /// Object category to evaluate.
    #[arg(long, help_heading = "Dataset options", default_value = "")]
    pub category: String,

    /// Load sequence point clouds alongside the frame depth maps.
    #[arg(long, help_heading = "Dataset options", default_value = "false")]
    pub load_point_clouds: bool,

    /// Restrict the test split to the nth test sequence (sorted by name).
    /// Negative keeps all sequences.
    #[arg(
        long,
        help_heading = "Dataset options",
        default_value = "-1",
        allow_hyphen_values = true
    )]
    pub test_restrict_sequence_id: i64,

    /// Max resolution of loaded images; larger images are downscaled.
    #[arg(long, help_heading = "Dataset options", default_value = "800")]
    pub max_resolution: u32,
}

impl Default for JsonIndexConfig {
    fn default() -> Self {
        Self {
            dataset_root: String::new(),
            category: String::new(),
            load_point_clouds: false,
            test_restrict_sequence_id: -1,
            max_resolution: 800,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Args)]
pub struct DataSourceConfig {
    #[clap(flatten)]
    pub dataset: JsonIndexConfig,

    /// Task the eval-batch index is built for.
    #[arg(
        long,
        help_heading = "Dataset options",
        value_enum,
        default_value = "multisequence"
    )]
    pub task: Task,

    /// Cap on known source frames loaded per eval batch.
    #[arg(long, help_heading = "Dataset options", default_value = "16")]
    pub batch_max_sources: usize,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            dataset: JsonIndexConfig::default(),
            task: Task::MultiSequence,
            batch_max_sources: 16,
        }
    }
}
