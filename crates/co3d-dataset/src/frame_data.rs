use burn::prelude::Backend;
use burn::tensor::{Tensor, TensorData};
use dbir_render::camera::Camera;
use dbir_render::dbir::SourceView;
use dbir_render::point_cloud::PointCloud;
use glam::UVec2;
use half::f16;
use image::imageops::FilterType;

use crate::DatasetError;

/// Which set-list subset a frame belongs to. Known frames may be shown to the
/// model; unseen frames are evaluation targets only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    TrainKnown,
    TrainUnseen,
    TestKnown,
    TestUnseen,
}

impl FrameType {
    pub fn is_known(&self) -> bool {
        matches!(self, Self::TrainKnown | Self::TestKnown)
    }

    pub fn is_train(&self) -> bool {
        matches!(self, Self::TrainKnown | Self::TrainUnseen)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TrainKnown => "train_known",
            Self::TrainUnseen => "train_unseen",
            Self::TestKnown => "test_known",
            Self::TestUnseen => "test_unseen",
        }
    }

    pub fn from_subset(subset: &str) -> Option<Self> {
        match subset {
            "train_known" => Some(Self::TrainKnown),
            "train_unseen" => Some(Self::TrainUnseen),
            "test_known" => Some(Self::TestKnown),
            "test_unseen" => Some(Self::TestUnseen),
            _ => None,
        }
    }
}

/// Decoded image planes of one frame, all at the same resolution.
#[derive(Debug, Clone)]
pub struct ImageBuffers {
    pub size: UVec2,
    /// Interleaved HWC rgb in [0, 1].
    pub rgb: Vec<f32>,
    pub depth: Option<Vec<f32>>,
    pub depth_mask: Option<Vec<f32>>,
    pub fg_probability: Option<Vec<f32>>,
}

impl ImageBuffers {
    pub fn rgb_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 3> {
        let [w, h] = [self.size.x as usize, self.size.y as usize];
        Tensor::from_data(TensorData::new(self.rgb.clone(), [h, w, 3]), device)
    }

    pub fn depth_tensor<B: Backend>(&self, device: &B::Device) -> Option<Tensor<B, 2>> {
        Some(self.plane_tensor::<B>(self.depth.as_ref()?, device))
    }

    pub fn fg_tensor<B: Backend>(&self, device: &B::Device) -> Option<Tensor<B, 2>> {
        Some(self.plane_tensor::<B>(self.fg_probability.as_ref()?, device))
    }

    fn plane_tensor<B: Backend>(&self, plane: &[f32], device: &B::Device) -> Tensor<B, 2> {
        let [w, h] = [self.size.x as usize, self.size.y as usize];
        Tensor::from_data(TensorData::new(plane.to_vec(), [h, w]), device)
    }
}

/// One loaded frame of a batch.
#[derive(Debug, Clone)]
pub struct FrameView {
    pub sequence_name: String,
    pub frame_number: i64,
    pub frame_type: FrameType,
    pub camera: Camera,
    pub image: ImageBuffers,
}

impl FrameView {
    /// View this frame as renderer input. None when the frame has no depth.
    pub fn as_source_view(&self) -> Option<SourceView<'_>> {
        Some(SourceView {
            camera: &self.camera,
            size: self.image.size,
            rgb: &self.image.rgb,
            depth: self.image.depth.as_deref()?,
            depth_mask: self.image.depth_mask.as_deref(),
            fg_probability: self.image.fg_probability.as_deref(),
        })
    }
}

/// A collated eval batch: the target frame first, known sources after it.
#[derive(Debug, Clone)]
pub struct FrameData {
    pub views: Vec<FrameView>,
    /// Fused point cloud of the sequence, when the dataset loads them.
    pub sequence_point_cloud: Option<PointCloud>,
}

impl FrameData {
    pub fn collate(views: Vec<FrameView>, sequence_point_cloud: Option<PointCloud>) -> Self {
        Self {
            views,
            sequence_point_cloud,
        }
    }

    pub fn target(&self) -> &FrameView {
        &self.views[0]
    }

    pub fn known_sources(&self) -> impl Iterator<Item = &FrameView> {
        self.views
            .iter()
            .skip(1)
            .filter(|v| v.frame_type.is_known())
    }

    /// Eval batches must lead with an unseen target followed by known frames.
    pub fn validate_eval_layout(&self) -> Result<(), DatasetError> {
        let Some(target) = self.views.first() else {
            return Err(DatasetError::InvalidBatch("empty batch".to_owned()));
        };
        if target.frame_type.is_known() {
            return Err(DatasetError::InvalidBatch(format!(
                "target frame {} of {} is a known frame",
                target.frame_number, target.sequence_name
            )));
        }
        if let Some(bad) = self.views.iter().skip(1).find(|v| !v.frame_type.is_known()) {
            return Err(DatasetError::InvalidBatch(format!(
                "source frame {} of {} is not a known frame",
                bad.frame_number, bad.sequence_name
            )));
        }
        Ok(())
    }
}

/// Decode an rgb image, downscaling so neither side exceeds `max_resolution`.
pub(crate) fn decode_rgb(
    bytes: &[u8],
    max_resolution: u32,
) -> Result<(UVec2, Vec<f32>), DatasetError> {
    let mut img = image::load_from_memory(bytes)?;
    if img.width().max(img.height()) > max_resolution {
        img = img.resize(max_resolution, max_resolution, FilterType::Lanczos3);
    }
    let size = UVec2::new(img.width(), img.height());
    Ok((size, img.to_rgb32f().into_raw()))
}

/// Decode a CO3D depth PNG: 16-bit payload reinterpreted as f16 bits, scaled
/// to world units, resampled to the target size.
pub(crate) fn decode_depth(
    bytes: &[u8],
    scale_adjustment: f32,
    target_size: UVec2,
) -> Result<Vec<f32>, DatasetError> {
    let img = image::load_from_memory(bytes)?;
    let native = UVec2::new(img.width(), img.height());
    let depth: Vec<f32> = img
        .to_luma16()
        .into_raw()
        .into_iter()
        .map(|bits| {
            let d = f16::from_bits(bits).to_f32() * scale_adjustment;
            if d.is_finite() { d } else { 0.0 }
        })
        .collect();
    Ok(resample_nearest(&depth, native, target_size))
}

/// Decode an 8-bit probability/validity mask, resampled to the target size.
pub(crate) fn decode_mask(bytes: &[u8], target_size: UVec2) -> Result<Vec<f32>, DatasetError> {
    let img = image::load_from_memory(bytes)?;
    let native = UVec2::new(img.width(), img.height());
    let mask: Vec<f32> = img
        .to_luma8()
        .into_raw()
        .into_iter()
        .map(|v| v as f32 / 255.0)
        .collect();
    Ok(resample_nearest(&mask, native, target_size))
}

fn resample_nearest(src: &[f32], src_size: UVec2, dst_size: UVec2) -> Vec<f32> {
    if src_size == dst_size {
        return src.to_vec();
    }
    let (sw, sh) = (src_size.x as usize, src_size.y as usize);
    let (dw, dh) = (dst_size.x as usize, dst_size.y as usize);
    let mut out = Vec::with_capacity(dw * dh);
    for y in 0..dh {
        let sy = (y * sh / dh).min(sh - 1);
        for x in 0..dw {
            let sx = (x * sw / dw).min(sw - 1);
            out.push(src[sy * sw + sx]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec2, Vec3};
    use std::f64::consts::FRAC_PI_2;

    fn view(frame_type: FrameType, with_depth: bool) -> FrameView {
        let size = UVec2::new(2, 2);
        FrameView {
            sequence_name: "seq".to_owned(),
            frame_number: 1,
            frame_type,
            camera: Camera::new(
                Vec3::ZERO,
                Quat::IDENTITY,
                FRAC_PI_2,
                FRAC_PI_2,
                Vec2::new(0.5, 0.5),
            ),
            image: ImageBuffers {
                size,
                rgb: vec![0.0; 4 * 3],
                depth: with_depth.then(|| vec![1.0; 4]),
                depth_mask: None,
                fg_probability: None,
            },
        }
    }

    #[test]
    fn known_frame_types() {
        assert!(FrameType::TrainKnown.is_known());
        assert!(FrameType::TestKnown.is_known());
        assert!(!FrameType::TestUnseen.is_known());
        assert_eq!(
            FrameType::from_subset("test_unseen"),
            Some(FrameType::TestUnseen)
        );
        assert_eq!(FrameType::from_subset("bogus"), None);
    }

    #[test]
    fn eval_layout_requires_unseen_target() {
        let good = FrameData::collate(
            vec![view(FrameType::TestUnseen, false), view(FrameType::TestKnown, true)],
            None,
        );
        assert!(good.validate_eval_layout().is_ok(), "valid layout accepted");

        let bad = FrameData::collate(vec![view(FrameType::TestKnown, true)], None);
        assert!(
            bad.validate_eval_layout().is_err(),
            "known target must be rejected"
        );

        let bad_source = FrameData::collate(
            vec![
                view(FrameType::TestUnseen, false),
                view(FrameType::TrainUnseen, true),
            ],
            None,
        );
        assert!(
            bad_source.validate_eval_layout().is_err(),
            "unseen sources must be rejected"
        );
    }

    #[test]
    fn source_view_requires_depth() {
        assert!(view(FrameType::TestKnown, true).as_source_view().is_some());
        assert!(view(FrameType::TestKnown, false).as_source_view().is_none());
    }

    #[test]
    fn nearest_resampling_preserves_corners() {
        let src = vec![1.0, 2.0, 3.0, 4.0];
        let out = resample_nearest(&src, UVec2::new(2, 2), UVec2::new(4, 4));
        assert_eq!(out.len(), 16, "resampled to target size");
        assert_eq!(out[0], 1.0, "top-left preserved");
        assert_eq!(out[15], 4.0, "bottom-right preserved");
    }
}
