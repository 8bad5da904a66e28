use clap::{Args, Parser};
use co3d_dataset::config::DataSourceConfig;
use dbir_render::dbir::DbirConfig;

#[derive(Clone, Args)]
pub struct ProcessConfig {
    /// Random seed.
    #[arg(long, help_heading = "Process options", default_value = "42")]
    pub seed: u64,

    /// Categories to evaluate, comma separated.
    #[arg(
        long,
        help_heading = "Process options",
        value_delimiter = ',',
        default_value = "teddybear"
    )]
    pub categories: Vec<String>,

    /// Test sequence indices evaluated per category for the single-sequence
    /// task, comma separated.
    #[arg(
        long,
        help_heading = "Process options",
        value_delimiter = ',',
        default_values_t = [0i64, 1]
    )]
    pub single_sequence_ids: Vec<i64>,

    /// Trained perceptual-metric weights (safetensors). Without them the
    /// perceptual metric falls back to plain feature averaging.
    #[arg(long, help_heading = "Process options")]
    pub lpips_weights: Option<String>,

    /// Location to put result files. By default uses the cwd.
    ///
    /// This path can be set to be relative to the CWD.
    #[arg(long, help_heading = "Process options", default_value = ".")]
    pub export_path: String,

    /// Filename of the exported results dump.
    #[arg(
        long,
        help_heading = "Process options",
        default_value = "results_{task}.json"
    )]
    pub export_name: String,
}

#[derive(Parser, Clone)]
pub struct ProcessArgs {
    #[clap(flatten)]
    pub source_config: DataSourceConfig,
    #[clap(flatten)]
    pub model_config: DbirConfig,
    #[clap(flatten)]
    pub process_config: ProcessConfig,
}

impl Default for ProcessArgs {
    fn default() -> Self {
        Self::parse_from([""])
    }
}
