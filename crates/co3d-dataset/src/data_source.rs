use crate::DatasetError;
use crate::config::{DataSourceConfig, Task};
use crate::json_index::JsonIndexDataset;

/// Ties a [`DataSourceConfig`] to loadable datasets. The evaluation driver
/// clones one of these per category/sequence run.
#[derive(Debug, Clone)]
pub struct DataSource {
    pub config: DataSourceConfig,
}

impl DataSource {
    pub fn new(config: DataSourceConfig) -> Self {
        Self { config }
    }

    pub fn task(&self) -> Task {
        self.config.task
    }

    /// A copy of this source specialized to one category and, for the
    /// single-sequence task, one restricted test sequence.
    pub fn for_category(&self, category: &str, sequence_id: Option<i64>) -> Self {
        let mut config = self.config.clone();
        config.dataset.category = category.to_owned();
        if let Some(id) = sequence_id {
            config.dataset.test_restrict_sequence_id = id;
        }
        Self { config }
    }

    pub async fn load_test(&self) -> Result<JsonIndexDataset, DatasetError> {
        JsonIndexDataset::load(&self.config.dataset, self.config.task).await
    }
}
