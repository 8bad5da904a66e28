use glam::{Vec2, Vec3};
use rand::Rng;

use crate::dbir::SourceView;

/// An unstructured colored point cloud on the CPU.
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    pub positions: Vec<Vec3>,
    pub colors: Vec<Vec3>,
}

impl PointCloud {
    pub fn new(positions: Vec<Vec3>, colors: Vec<Vec3>) -> Self {
        assert_eq!(
            positions.len(),
            colors.len(),
            "each point needs exactly one color"
        );
        Self { positions, colors }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn extend(&mut self, other: Self) {
        self.positions.extend(other.positions);
        self.colors.extend(other.colors);
    }

    /// Unproject the valid depth pixels of a source view into world space.
    ///
    /// A pixel contributes a point when its depth is positive and both the
    /// depth validity mask and the foreground probability (where present)
    /// agree it is reliable.
    pub fn from_view(view: &SourceView) -> Self {
        let (w, h) = (view.size.x as usize, view.size.y as usize);
        let mut positions = vec![];
        let mut colors = vec![];

        for y in 0..h {
            for x in 0..w {
                let i = y * w + x;
                let depth = view.depth[i];
                if depth <= 0.0 || !depth.is_finite() {
                    continue;
                }
                if view.depth_mask.is_some_and(|m| m[i] < 0.5) {
                    continue;
                }
                if view.fg_probability.is_some_and(|m| m[i] < 0.5) {
                    continue;
                }

                // Sample the pixel center.
                let pixel = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                positions.push(view.camera.unproject(pixel, depth, view.size));
                colors.push(Vec3::new(
                    view.rgb[i * 3],
                    view.rgb[i * 3 + 1],
                    view.rgb[i * 3 + 2],
                ));
            }
        }

        Self { positions, colors }
    }

    /// Uniformly subsample to at most `max_points` points. Order of the kept
    /// points is unspecified but deterministic for a given rng state.
    pub fn subsample(self, max_points: usize, rng: &mut impl Rng) -> Self {
        if self.len() <= max_points {
            return self;
        }
        let keep = rand::seq::index::sample(rng, self.len(), max_points);
        let positions = keep.iter().map(|i| self.positions[i]).collect();
        let colors = keep.iter().map(|i| self.colors[i]).collect();
        Self { positions, colors }
    }
}
