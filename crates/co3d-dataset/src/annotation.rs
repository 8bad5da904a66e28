//! Serde types for the CO3D-style JSON annotation index.
//!
//! Frame and sequence annotations are stored per category as
//! `frame_annotations.jgz` / `sequence_annotations.jgz` (gzip-compressed
//! JSON arrays) or their uncompressed `.json` equivalents.

use dbir_render::camera::{Camera, focal_to_fov};
use glam::{Mat3, UVec2, Vec2, Vec3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAnnotation {
    /// Image path relative to the dataset root.
    pub path: String,
    /// Image size as (height, width).
    pub size: [u32; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthAnnotation {
    /// 16-bit PNG whose u16 payload holds IEEE half-precision bits.
    pub path: String,
    #[serde(default)]
    pub mask_path: Option<String>,
    /// Multiplier correcting the stored depth to world units.
    #[serde(default = "default_scale_adjustment")]
    pub scale_adjustment: f32,
}

fn default_scale_adjustment() -> f32 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskAnnotation {
    /// 8-bit PNG of foreground probabilities.
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewpointAnnotation {
    /// World-to-camera rotation, row-major, in PyTorch3D axis conventions
    /// (+X left, +Y up, +Z into the screen).
    #[serde(rename = "R")]
    pub rotation: [[f32; 3]; 3],
    #[serde(rename = "T")]
    pub translation: [f32; 3],
    /// Focal length in NDC units.
    pub focal_length: [f32; 2],
    /// Principal point in NDC units.
    pub principal_point: [f32; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameAnnotation {
    pub sequence_name: String,
    pub frame_number: i64,
    #[serde(default)]
    pub frame_timestamp: f64,
    pub image: ImageAnnotation,
    #[serde(default)]
    pub depth: Option<DepthAnnotation>,
    #[serde(default)]
    pub mask: Option<MaskAnnotation>,
    pub viewpoint: ViewpointAnnotation,
}

impl FrameAnnotation {
    pub fn image_size(&self) -> UVec2 {
        UVec2::new(self.image.size[1], self.image.size[0])
    }

    /// Convert the annotated viewpoint into a pixel-space pinhole camera.
    pub fn camera(&self) -> Camera {
        let size = self.image_size();
        let half = size.min_element() as f32 / 2.0;

        let focal_px = Vec2::from(self.viewpoint.focal_length) * half;
        // NDC axes point left/up; image space points right/down.
        let center_px = Vec2::new(
            size.x as f32 / 2.0 - self.viewpoint.principal_point[0] * half,
            size.y as f32 / 2.0 - self.viewpoint.principal_point[1] * half,
        );

        // Annotated rows are R with x_cam = R^T x_world + T. Loading them as
        // glam columns transposes, giving the world-to-local matrix directly.
        let mut world_to_local = Mat3::from_cols(
            Vec3::from(self.viewpoint.rotation[0]),
            Vec3::from(self.viewpoint.rotation[1]),
            Vec3::from(self.viewpoint.rotation[2]),
        );
        let mut translation = Vec3::from(self.viewpoint.translation);
        // Flip x/y to move from PyTorch3D axes to image-space right/down.
        world_to_local.x_axis = Vec3::new(
            -world_to_local.x_axis.x,
            -world_to_local.x_axis.y,
            world_to_local.x_axis.z,
        );
        world_to_local.y_axis = Vec3::new(
            -world_to_local.y_axis.x,
            -world_to_local.y_axis.y,
            world_to_local.y_axis.z,
        );
        world_to_local.z_axis = Vec3::new(
            -world_to_local.z_axis.x,
            -world_to_local.z_axis.y,
            world_to_local.z_axis.z,
        );
        translation = Vec3::new(-translation.x, -translation.y, translation.z);

        Camera::from_world_to_local(
            world_to_local,
            translation,
            focal_to_fov(focal_px.x as f64, size.x),
            focal_to_fov(focal_px.y as f64, size.y),
            center_px / Vec2::new(size.x as f32, size.y as f32),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointCloudAnnotation {
    pub path: String,
    #[serde(default)]
    pub quality_score: Option<f32>,
    #[serde(default)]
    pub n_points: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceAnnotation {
    pub sequence_name: String,
    pub category: String,
    #[serde(default)]
    pub point_cloud: Option<PointCloudAnnotation>,
}
