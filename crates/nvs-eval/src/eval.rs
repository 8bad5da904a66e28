use std::collections::BTreeMap;

use burn::prelude::Backend;
use burn::tensor::{ElementConversion, Tensor};
use co3d_dataset::frame_data::FrameData;
use dbir_render::camera::Camera;
use dbir_render::dbir::RenderedView;
use glam::Vec3;
use lpips::LpipsModel;
use serde::Serialize;

use crate::EvalError;
use crate::metrics;
use crate::ssim::Ssim;

/// Per-batch evaluation outcome: one evaluated target frame and its metrics.
#[derive(Debug, Clone, Serialize)]
pub struct BatchEvalResult {
    pub category: String,
    pub sequence_name: String,
    pub frame_number: i64,
    pub subset: String,
    /// How far the target viewpoint strays from the closest source camera,
    /// as one minus the best optical-axis alignment. 0 is a revisited view.
    pub camera_difficulty: f32,
    pub metrics: BTreeMap<String, f32>,
}

/// One minus the best cosine alignment between the target optical axis and
/// any source camera's optical axis.
pub fn camera_difficulty<'a>(
    target: &Camera,
    sources: impl IntoIterator<Item = &'a Camera>,
) -> f32 {
    let forward = target.forward();
    let best = sources
        .into_iter()
        .map(|camera| camera.forward().dot(forward))
        .fold(f32::NEG_INFINITY, f32::max);
    if best.is_finite() {
        (1.0 - best).clamp(0.0, 2.0)
    } else {
        // No sources to compare against.
        1.0
    }
}

/// Compare a rendered target view against its ground truth frame.
///
/// The ground truth is composited over the same background color the renderer
/// used, so uncovered background pixels compare fairly. Foreground-restricted
/// variants of the color metrics, mask IoU and foreground depth error are
/// added when the target frame carries the needed planes. The perceptual
/// distance is skipped when no model is given.
pub fn eval_batch<B: Backend>(
    category: &str,
    frame_data: &FrameData,
    render: &RenderedView<B>,
    bg_color: Vec3,
    lpips: Option<&LpipsModel<B>>,
    source_cameras: Option<&[Camera]>,
    device: &B::Device,
) -> Result<BatchEvalResult, EvalError> {
    frame_data.validate_eval_layout()?;
    let target = frame_data.target();

    let gt_rgb = target.image.rgb_tensor::<B>(device);
    let [h, w, _] = gt_rgb.dims();
    let [rh, rw, _] = render.rgb.dims();
    if [rh, rw] != [h, w] {
        return Err(EvalError::SizeMismatch {
            got: [rh, rw],
            expected: [h, w],
        });
    }

    let fg = target.image.fg_tensor::<B>(device);

    // Composite ground truth over the render background so pixels outside
    // the object compare against the same constant color.
    let gt_rgb = match &fg {
        Some(fg) => {
            let fg3 = fg.clone().unsqueeze_dim::<3>(2);
            let bg = Tensor::<B, 1>::from_floats(bg_color.to_array(), device)
                .reshape([1, 1, 3]);
            gt_rgb * fg3.clone() + bg * (fg3.neg() + 1.0)
        }
        None => gt_rgb,
    };

    let mut results = BTreeMap::new();
    let mut record = |name: &str, value: Tensor<B, 1>| {
        results.insert(name.to_owned(), value.into_scalar().elem::<f32>());
    };

    let rendered = render.rgb.clone();
    record(
        "psnr",
        metrics::psnr(metrics::mse(rendered.clone(), gt_rgb.clone(), None)),
    );
    record("rgb_l1", metrics::rgb_l1(rendered.clone(), gt_rgb.clone(), None));

    let ssim_measure = Ssim::new(11, 3, device);
    record("ssim", ssim_measure.ssim(rendered.clone(), gt_rgb.clone()).mean());

    if let Some(model) = lpips {
        record(
            "lpips",
            model.lpips(
                rendered.clone().unsqueeze_dim::<4>(0),
                gt_rgb.clone().unsqueeze_dim::<4>(0),
            ),
        );
    }

    if let Some(fg) = fg {
        record(
            "psnr_fg",
            metrics::psnr(metrics::mse(
                rendered.clone(),
                gt_rgb.clone(),
                Some(fg.clone()),
            )),
        );
        record(
            "rgb_l1_fg",
            metrics::rgb_l1(rendered, gt_rgb, Some(fg.clone())),
        );
        record("iou", metrics::iou(render.mask.clone(), fg.clone()));

        if let Some(gt_depth) = target.image.depth_tensor::<B>(device) {
            record(
                "depth_abs_fg",
                metrics::depth_abs(render.depth.clone(), gt_depth, Some(fg)),
            );
        }
    }

    let difficulty = match source_cameras {
        Some(cameras) => camera_difficulty(&target.camera, cameras),
        None => camera_difficulty(
            &target.camera,
            frame_data.known_sources().map(|view| &view.camera),
        ),
    };

    Ok(BatchEvalResult {
        category: category.to_owned(),
        sequence_name: target.sequence_name.clone(),
        frame_number: target.frame_number,
        subset: target.frame_type.as_str().to_owned(),
        camera_difficulty: difficulty,
        metrics: results,
    })
}
