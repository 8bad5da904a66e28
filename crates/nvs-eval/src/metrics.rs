use burn::prelude::Backend;
use burn::tensor::Tensor;

// Masked means guard against empty masks with a small epsilon, matching the
// convention of never producing NaN metrics for degenerate batches.
const EPS: f32 = 1e-4;

/// Mean squared error over an HWC image pair, optionally restricted to a mask.
pub fn mse<B: Backend>(
    img_a: Tensor<B, 3>,
    img_b: Tensor<B, 3>,
    mask: Option<Tensor<B, 2>>,
) -> Tensor<B, 1> {
    let err = (img_a - img_b).powf_scalar(2.0).mean_dim(2).squeeze_dims::<2>(&[2]);
    masked_mean(err, mask)
}

/// Peak signal-to-noise ratio in dB, from an MSE of [0, 1] images.
pub fn psnr<B: Backend>(mse: Tensor<B, 1>) -> Tensor<B, 1> {
    mse.clamp_min(1e-10).recip().log() * 10.0 / std::f32::consts::LN_10
}

/// Mean absolute color error, optionally restricted to a mask.
pub fn rgb_l1<B: Backend>(
    img_a: Tensor<B, 3>,
    img_b: Tensor<B, 3>,
    mask: Option<Tensor<B, 2>>,
) -> Tensor<B, 1> {
    let err = (img_a - img_b).abs().mean_dim(2).squeeze_dims::<2>(&[2]);
    masked_mean(err, mask)
}

/// Intersection over union of two soft masks, binarized at 0.5.
pub fn iou<B: Backend>(pred: Tensor<B, 2>, gt: Tensor<B, 2>) -> Tensor<B, 1> {
    let pred = pred.greater_elem(0.5).float();
    let gt = gt.greater_elem(0.5).float();
    let intersection = (pred.clone() * gt.clone()).sum();
    let union = (pred + gt).clamp_max(1.0).sum();
    intersection / (union + EPS)
}

/// Mean absolute depth error over pixels with valid ground-truth depth,
/// optionally restricted further by a mask.
pub fn depth_abs<B: Backend>(
    pred: Tensor<B, 2>,
    gt: Tensor<B, 2>,
    mask: Option<Tensor<B, 2>>,
) -> Tensor<B, 1> {
    let valid = gt.clone().greater_elem(0.0).float();
    let valid = match mask {
        Some(mask) => valid * mask,
        None => valid,
    };
    let err = (pred - gt).abs() * valid.clone();
    err.sum() / (valid.sum() + EPS)
}

fn masked_mean<B: Backend>(err: Tensor<B, 2>, mask: Option<Tensor<B, 2>>) -> Tensor<B, 1> {
    match mask {
        Some(mask) => (err * mask.clone()).sum() / (mask.sum() + EPS),
        None => err.mean(),
    }
}
