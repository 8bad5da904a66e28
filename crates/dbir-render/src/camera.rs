use glam::{Mat3, Quat, UVec2, Vec2, Vec3};

pub fn fov_to_focal(fov_rad: f64, pixels: u32) -> f64 {
    0.5 * (pixels as f64) / (fov_rad * 0.5).tan()
}

pub fn focal_to_fov(focal: f64, pixels: u32) -> f64 {
    2.0 * ((pixels as f64) / (2.0 * focal)).atan()
}

/// A pinhole camera. +Z is the viewing direction in local space, pixel (0, 0)
/// is the top-left corner of the image.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub rotation: Quat,
    pub fov_x: f64,
    pub fov_y: f64,
    /// Principal point as a fraction of the image size. (0.5, 0.5) is centered.
    pub center_uv: Vec2,
}

impl Camera {
    pub fn new(position: Vec3, rotation: Quat, fov_x: f64, fov_y: f64, center_uv: Vec2) -> Self {
        Self {
            position,
            rotation,
            fov_x,
            fov_y,
            center_uv,
        }
    }

    /// Camera with a world-to-local rotation matrix and translation, as stored
    /// in CO3D viewpoint annotations.
    pub fn from_world_to_local(
        rotation: Mat3,
        translation: Vec3,
        fov_x: f64,
        fov_y: f64,
        center_uv: Vec2,
    ) -> Self {
        let cam_to_world = rotation.transpose();
        Self {
            position: -(cam_to_world * translation),
            rotation: Quat::from_mat3(&cam_to_world).normalize(),
            fov_x,
            fov_y,
            center_uv,
        }
    }

    pub fn focal(&self, img_size: UVec2) -> Vec2 {
        Vec2::new(
            fov_to_focal(self.fov_x, img_size.x) as f32,
            fov_to_focal(self.fov_y, img_size.y) as f32,
        )
    }

    pub fn center(&self, img_size: UVec2) -> Vec2 {
        self.center_uv * Vec2::new(img_size.x as f32, img_size.y as f32)
    }

    /// Viewing direction in world space.
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }

    pub fn world_to_local(&self, world: Vec3) -> Vec3 {
        self.rotation.inverse() * (world - self.position)
    }

    pub fn local_to_world(&self, local: Vec3) -> Vec3 {
        self.rotation * local + self.position
    }

    /// Project a world point to pixel coordinates. Returns the pixel position
    /// and the depth along the optical axis, or None for points behind the
    /// camera.
    pub fn project(&self, world: Vec3, img_size: UVec2) -> Option<(Vec2, f32)> {
        let local = self.world_to_local(world);
        if local.z <= 1e-6 {
            return None;
        }
        let pixel = self.focal(img_size) * (local.truncate() / local.z) + self.center(img_size);
        Some((pixel, local.z))
    }

    /// Lift a pixel at a given depth back to a world point.
    pub fn unproject(&self, pixel: Vec2, depth: f32, img_size: UVec2) -> Vec3 {
        let xy = (pixel - self.center(img_size)) / self.focal(img_size);
        self.local_to_world(Vec3::new(xy.x * depth, xy.y * depth, depth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn focal_fov_roundtrip() {
        let focal = fov_to_focal(FRAC_PI_2, 800);
        assert_approx_eq!(focal, 400.0, 1e-6);
        assert_approx_eq!(focal_to_fov(focal, 800), FRAC_PI_2, 1e-6);
    }

    #[test]
    fn project_unproject_roundtrip() {
        let camera = Camera::new(
            Vec3::new(0.5, -1.0, 2.0),
            Quat::from_rotation_y(0.3),
            FRAC_PI_2,
            FRAC_PI_2,
            Vec2::new(0.5, 0.5),
        );
        let size = UVec2::new(640, 480);

        let world = Vec3::new(0.2, 0.1, 5.0);
        let (pixel, depth) = camera.project(world, size).expect("point is in front");
        let back = camera.unproject(pixel, depth, size);

        assert_approx_eq!(back.x, world.x, 1e-4);
        assert_approx_eq!(back.y, world.y, 1e-4);
        assert_approx_eq!(back.z, world.z, 1e-4);
    }

    #[test]
    fn point_behind_camera_does_not_project() {
        let camera = Camera::new(
            Vec3::ZERO,
            Quat::IDENTITY,
            FRAC_PI_2,
            FRAC_PI_2,
            Vec2::new(0.5, 0.5),
        );
        assert!(
            camera
                .project(Vec3::new(0.0, 0.0, -1.0), UVec2::new(64, 64))
                .is_none(),
            "points behind the camera must be rejected"
        );
    }

    #[test]
    fn world_to_local_matches_annotation_convention() {
        // A camera looking down -X, built from its world-to-local matrix.
        let rotation = Mat3::from_rotation_y(FRAC_PI_2 as f32);
        let translation = Vec3::new(0.0, 0.0, 3.0);
        let camera = Camera::from_world_to_local(
            rotation,
            translation,
            FRAC_PI_2,
            FRAC_PI_2,
            Vec2::new(0.5, 0.5),
        );

        let world = Vec3::new(1.0, 0.5, -2.0);
        let expected = rotation * world + translation;
        let local = camera.world_to_local(world);
        assert_approx_eq!(local.x, expected.x, 1e-4);
        assert_approx_eq!(local.y, expected.y, 1e-4);
        assert_approx_eq!(local.z, expected.z, 1e-4);
    }
}
