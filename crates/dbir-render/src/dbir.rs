use burn::config::Config;
use burn::prelude::Backend;
use burn::tensor::{Tensor, TensorData};
use clap::Args;
use glam::{UVec2, Vec3};
use rand::Rng;

use crate::camera::Camera;
use crate::point_cloud::PointCloud;

/// A known source frame the renderer can lift points from. Image buffers are
/// row-major, the rgb buffer is interleaved HWC.
pub struct SourceView<'a> {
    pub camera: &'a Camera,
    pub size: UVec2,
    pub rgb: &'a [f32],
    pub depth: &'a [f32],
    pub depth_mask: Option<&'a [f32]>,
    pub fg_probability: Option<&'a [f32]>,
}

/// The target view rendered by the baseline: color, depth along the optical
/// axis (0 where nothing was hit), and point coverage in [0, 1].
pub struct RenderedView<B: Backend> {
    pub rgb: Tensor<B, 3>,
    pub depth: Tensor<B, 2>,
    pub mask: Tensor<B, 2>,
}

#[derive(Config, Debug, Args)]
pub struct DbirConfig {
    /// Cap on the fused point cloud size before rasterization.
    #[arg(long, help_heading = "Model options", default_value = "100000")]
    #[config(default = 100000)]
    pub max_points: usize,
    /// Splat radius in pixels. 1 paints a single pixel per point.
    #[arg(long, help_heading = "Model options", default_value = "1")]
    #[config(default = 1)]
    pub point_radius: u32,
}

impl DbirConfig {
    pub fn init(&self, bg_color: Vec3) -> ModelDbir {
        ModelDbir {
            max_points: self.max_points,
            point_radius: self.point_radius.max(1),
            bg_color,
        }
    }
}

/// Depth-based image rendering baseline. Unprojects the depth maps of the
/// known source frames into a fused point cloud and re-renders it into the
/// target camera with z-buffered point splatting. No learned components.
pub struct ModelDbir {
    max_points: usize,
    point_radius: u32,
    bg_color: Vec3,
}

impl ModelDbir {
    pub fn render<B: Backend>(
        &self,
        sources: &[SourceView],
        target: &Camera,
        target_size: UVec2,
        rng: &mut impl Rng,
        device: &B::Device,
    ) -> RenderedView<B> {
        let mut cloud = PointCloud::default();
        for source in sources {
            cloud.extend(PointCloud::from_view(source));
        }
        log::debug!(
            "Rendering {} points from {} source views",
            cloud.len(),
            sources.len()
        );
        self.render_point_cloud(cloud, target, target_size, rng, device)
    }

    /// Render an already-fused point cloud, e.g. a captured sequence cloud,
    /// instead of lifting one from source depth maps.
    pub fn render_point_cloud<B: Backend>(
        &self,
        cloud: PointCloud,
        target: &Camera,
        target_size: UVec2,
        rng: &mut impl Rng,
        device: &B::Device,
    ) -> RenderedView<B> {
        let cloud = cloud.subsample(self.max_points, rng);

        let (w, h) = (target_size.x as usize, target_size.y as usize);
        let mut rgb = vec![0.0f32; w * h * 3];
        for pixel in rgb.chunks_exact_mut(3) {
            pixel.copy_from_slice(&self.bg_color.to_array());
        }
        let mut depth = vec![0.0f32; w * h];
        let mut mask = vec![0.0f32; w * h];
        let mut zbuf = vec![f32::INFINITY; w * h];

        let r = self.point_radius as i64 - 1;
        for (&pos, &color) in cloud.positions.iter().zip(&cloud.colors) {
            let Some((pixel, z)) = target.project(pos, target_size) else {
                continue;
            };
            let (px, py) = (pixel.x.floor() as i64, pixel.y.floor() as i64);
            for dy in -r..=r {
                for dx in -r..=r {
                    let (x, y) = (px + dx, py + dy);
                    if x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
                        continue;
                    }
                    let i = y as usize * w + x as usize;
                    if z >= zbuf[i] {
                        continue;
                    }
                    zbuf[i] = z;
                    depth[i] = z;
                    mask[i] = 1.0;
                    rgb[i * 3..i * 3 + 3].copy_from_slice(&color.to_array());
                }
            }
        }

        RenderedView {
            rgb: Tensor::from_data(TensorData::new(rgb, [h, w, 3]), device),
            depth: Tensor::from_data(TensorData::new(depth, [h, w]), device),
            mask: Tensor::from_data(TensorData::new(mask, [h, w]), device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MainBackend;
    use glam::{Quat, Vec2};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::f64::consts::FRAC_PI_2;

    type B = MainBackend;

    fn flat_view_camera() -> Camera {
        Camera::new(
            Vec3::ZERO,
            Quat::IDENTITY,
            FRAC_PI_2,
            FRAC_PI_2,
            Vec2::new(0.5, 0.5),
        )
    }

    /// Re-rendering a constant-depth source into its own camera must
    /// reproduce the source colors wherever points land.
    #[test]
    fn rerender_from_same_camera_reproduces_colors() {
        let device = Default::default();
        let camera = flat_view_camera();
        let size = UVec2::new(8, 8);
        let n = (size.x * size.y) as usize;

        let mut rgb = vec![0.0f32; n * 3];
        for p in rgb.chunks_exact_mut(3) {
            p.copy_from_slice(&[0.25, 0.5, 0.75]);
        }
        let depth = vec![2.0f32; n];

        let model = DbirConfig::new().init(Vec3::ZERO);
        let mut rng = StdRng::from_seed([7; 32]);
        let render = model.render::<B>(
            &[SourceView {
                camera: &camera,
                size,
                rgb: &rgb,
                depth: &depth,
                depth_mask: None,
                fg_probability: None,
            }],
            &camera,
            size,
            &mut rng,
            &device,
        );

        let mask = render.mask.into_data().to_vec::<f32>().expect("f32 data");
        let out = render.rgb.into_data().to_vec::<f32>().expect("f32 data");
        let covered = mask.iter().filter(|&&m| m > 0.5).count();
        assert!(covered > n / 2, "most pixels should be covered");

        for (i, &m) in mask.iter().enumerate() {
            if m > 0.5 {
                assert!(
                    (out[i * 3] - 0.25).abs() < 1e-6
                        && (out[i * 3 + 1] - 0.5).abs() < 1e-6
                        && (out[i * 3 + 2] - 0.75).abs() < 1e-6,
                    "covered pixels take the source color"
                );
            }
        }
    }

    #[test]
    fn background_pixels_take_bg_color() {
        let device = Default::default();
        let camera = flat_view_camera();
        let size = UVec2::new(4, 4);

        let model = DbirConfig::new().init(Vec3::new(1.0, 0.0, 0.0));
        let mut rng = StdRng::from_seed([7; 32]);
        // No sources at all: everything is background.
        let render = model.render::<B>(&[], &camera, size, &mut rng, &device);

        let out = render.rgb.into_data().to_vec::<f32>().expect("f32 data");
        for p in out.chunks_exact(3) {
            assert_eq!(p, &[1.0, 0.0, 0.0], "empty renders are pure background");
        }
        let depth = render.depth.into_data().to_vec::<f32>().expect("f32 data");
        assert!(
            depth.iter().all(|&d| d == 0.0),
            "background depth must be zero"
        );
    }

    /// The z-buffer must keep the closest point when two overlap.
    #[test]
    fn closer_points_win() {
        let device = Default::default();
        let camera = flat_view_camera();
        let size = UVec2::new(1, 1);

        // Two single-pixel views at different depths, red behind green.
        let red = SourceView {
            camera: &camera,
            size,
            rgb: &[1.0, 0.0, 0.0],
            depth: &[5.0],
            depth_mask: None,
            fg_probability: None,
        };
        let green = SourceView {
            camera: &camera,
            size,
            rgb: &[0.0, 1.0, 0.0],
            depth: &[1.0],
            depth_mask: None,
            fg_probability: None,
        };

        let model = DbirConfig::new().init(Vec3::ZERO);
        let mut rng = StdRng::from_seed([7; 32]);
        let render = model.render::<B>(&[red, green], &camera, size, &mut rng, &device);

        let out = render.rgb.into_data().to_vec::<f32>().expect("f32 data");
        assert_eq!(out, vec![0.0, 1.0, 0.0], "nearest point wins the pixel");
        let depth = render.depth.into_data().to_vec::<f32>().expect("f32 data");
        assert!((depth[0] - 1.0).abs() < 1e-6, "depth of the nearest point");
    }
}
