pub mod aggregate;
pub mod eval;
pub mod metrics;
pub mod ssim;

use co3d_dataset::DatasetError;

#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("rendered view size {got:?} does not match target size {expected:?}")]
    SizeMismatch { got: [usize; 2], expected: [usize; 2] },

    #[error("dataset error")]
    Dataset(#[from] DatasetError),
}
