use std::io::BufRead;
use std::path::{Path, PathBuf};

use dbir_render::point_cloud::PointCloud;
use glam::Vec3;
use ply_rs::parser::Parser;
use ply_rs::ply::{DefaultElement, Property};

use crate::DatasetError;

/// Load a sequence `pointcloud.ply` off the async runtime.
pub async fn load_point_cloud(path: PathBuf) -> Result<PointCloud, DatasetError> {
    tokio::task::spawn_blocking(move || read_ply_sync(&path))
        .await
        .map_err(|e| DatasetError::PointCloud(format!("point cloud load panicked: {e}")))?
}

fn read_ply_sync(path: &Path) -> Result<PointCloud, DatasetError> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    read_ply(&mut reader)
}

pub(crate) fn read_ply(reader: &mut impl BufRead) -> Result<PointCloud, DatasetError> {
    let ply = Parser::<DefaultElement>::new()
        .read_ply(reader)
        .map_err(|e| DatasetError::PointCloud(e.to_string()))?;

    let vertices = ply
        .payload
        .get("vertex")
        .ok_or_else(|| DatasetError::PointCloud("no vertex element".to_owned()))?;

    let mut positions = Vec::with_capacity(vertices.len());
    let mut colors = Vec::with_capacity(vertices.len());
    for vertex in vertices {
        positions.push(Vec3::new(
            prop_f32(vertex, "x")?,
            prop_f32(vertex, "y")?,
            prop_f32(vertex, "z")?,
        ));
        // Colors are optional; plain geometry plys render white.
        let color = match (
            prop_color(vertex, "red"),
            prop_color(vertex, "green"),
            prop_color(vertex, "blue"),
        ) {
            (Some(r), Some(g), Some(b)) => Vec3::new(r, g, b),
            _ => Vec3::ONE,
        };
        colors.push(color);
    }

    Ok(PointCloud::new(positions, colors))
}

fn prop_f32(vertex: &DefaultElement, name: &str) -> Result<f32, DatasetError> {
    match vertex.get(name) {
        Some(Property::Float(v)) => Ok(*v),
        Some(Property::Double(v)) => Ok(*v as f32),
        _ => Err(DatasetError::PointCloud(format!(
            "vertex property {name} missing or not a float"
        ))),
    }
}

fn prop_color(vertex: &DefaultElement, name: &str) -> Option<f32> {
    match vertex.get(name) {
        Some(Property::UChar(v)) => Some(*v as f32 / 255.0),
        Some(Property::Float(v)) => Some(*v),
        _ => None,
    }
}
