//! Shape exporter: one opaque shape to one web-renderable JSON artifact.
//!
//! The artifact layout is the three.js `BufferGeometry` JSON the in-browser
//! viewer consumes: `metadata`, `uuid`, `type`, and a flattened
//! `data.attributes.position` array of x,y,z triples.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConversionError;
use crate::kernel::{GeometryKernel, Shape};

/// Artifact format version understood by the viewer.
const GEOMETRY_FORMAT_VERSION: f64 = 4.4;

/// `generator` field stamped into every artifact.
const GENERATOR: &str = "cad2web";

/// Artifact `metadata` block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryMetadata {
    pub version: f64,
    #[serde(rename = "type")]
    pub kind: String,
    pub generator: String,
}

/// The `position` attribute: flattened x,y,z triples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionAttribute {
    #[serde(rename = "itemSize")]
    pub item_size: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub array: Vec<f32>,
}

/// `data.attributes` block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryAttributes {
    pub position: PositionAttribute,
}

/// `data` block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryData {
    pub attributes: GeometryAttributes,
}

/// Complete artifact document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryArtifact {
    pub metadata: GeometryMetadata,
    pub uuid: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: GeometryData,
}

/// Converts shapes to artifact JSON via the geometry kernel.
#[derive(Debug)]
pub struct ShapeExporter<'a> {
    kernel: &'a dyn GeometryKernel,
}

impl<'a> ShapeExporter<'a> {
    /// Create an exporter over a kernel.
    pub fn new(kernel: &'a dyn GeometryKernel) -> Self {
        Self { kernel }
    }

    /// Export one shape to artifact JSON.
    ///
    /// Curve-like shapes are discretized into ordered point runs; all other
    /// shapes are tessellated into triangle buffers.
    pub fn export(&self, shape: &Shape) -> Result<String, ConversionError> {
        let positions = if shape.kind.is_curve_like() {
            let points = match shape.kind {
                crate::kernel::ShapeKind::Edge => self.kernel.discretize_edge(shape)?,
                _ => self.kernel.discretize_wire(shape)?,
            };
            points
                .iter()
                .flat_map(|p| p.iter().map(|&c| c as f32))
                .collect()
        } else {
            self.kernel.tessellate(shape)?.positions
        };

        let artifact = GeometryArtifact {
            metadata: GeometryMetadata {
                version: GEOMETRY_FORMAT_VERSION,
                kind: "BufferGeometry".to_string(),
                generator: GENERATOR.to_string(),
            },
            uuid: Uuid::new_v4(),
            kind: "BufferGeometry".to_string(),
            data: GeometryData {
                attributes: GeometryAttributes {
                    position: PositionAttribute {
                        item_size: 3,
                        kind: "Float32Array".to_string(),
                        array: positions,
                    },
                },
            },
        };

        Ok(serde_json::to_string(&artifact)?)
    }
}
