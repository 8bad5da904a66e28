pub mod annotation;
pub mod config;
pub mod data_source;
pub mod frame_data;
pub mod json_index;
pub mod ply_import;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("IO error while loading dataset.")]
    Io(#[from] std::io::Error),

    #[error("Error decoding JSON annotation file.")]
    Json(#[from] serde_json::Error),

    #[error("Error decoding image data.")]
    Image(#[from] image::ImageError),

    #[error("Frame {1} of sequence {0} is not in the index.")]
    MissingFrame(String, i64),

    #[error("Invalid eval batch: {0}")]
    InvalidBatch(String),

    #[error("Sequence id {id} out of range: the test split has {count} sequences.")]
    SequenceOutOfRange { id: i64, count: usize },

    #[error("Expected a single test sequence, found {0}.")]
    NotSingleSequence(usize),

    #[error("Error loading point cloud: {0}")]
    PointCloud(String),
}
