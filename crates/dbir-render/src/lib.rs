pub mod camera;
pub mod dbir;
pub mod point_cloud;

/// Backend used for evaluation. The DBIR baseline is non-learned and all
/// rasterization happens on the CPU, so the ndarray backend is the default.
pub type MainBackend = burn::backend::NdArray;
