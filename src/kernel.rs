//! Geometry-kernel collaborator boundary.
//!
//! The kernel performs import, tessellation, discretization, and bounding-box
//! computation; this crate never inspects geometry internals. Shapes cross
//! the boundary as opaque handles with explicit stable IDs assigned at
//! import — identity never relies on incidental object hashing.

use std::fmt;
use std::path::Path;

use uuid::Uuid;

use crate::error::ConversionError;

pub mod mock;

/// Stable opaque identifier for a kernel-owned shape.
pub type ShapeId = Uuid;

/// Topological class of a shape, as reported by the kernel at import.
///
/// The exporter only distinguishes curve-like shapes (discretized) from
/// everything else (tessellated).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    /// Closed solid.
    Solid,
    /// Open shell.
    Shell,
    /// Single face.
    Face,
    /// Curve loop.
    Wire,
    /// Single curve.
    Edge,
    /// Heterogeneous compound.
    Compound,
}

impl ShapeKind {
    /// Curve-like shapes are discretized into point runs instead of
    /// tessellated.
    pub fn is_curve_like(&self) -> bool {
        matches!(self, ShapeKind::Wire | ShapeKind::Edge)
    }
}

/// Opaque geometry handle owned by the external kernel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    /// Stable handle assigned by the kernel at import.
    pub id: ShapeId,
    /// Topological class.
    pub kind: ShapeKind,
}

/// Axis-aligned extrema of a shape, `(xmin, ymin, zmin, xmax, ymax, zmax)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub xmin: f64,
    pub ymin: f64,
    pub zmin: f64,
    pub xmax: f64,
    pub ymax: f64,
    pub zmax: f64,
}

impl BoundingBox {
    /// Construct from the kernel's 6-tuple ordering.
    pub fn new(xmin: f64, ymin: f64, zmin: f64, xmax: f64, ymax: f64, zmax: f64) -> Self {
        Self {
            xmin,
            ymin,
            zmin,
            xmax,
            ymax,
            zmax,
        }
    }

    /// Per-axis minimum of mins and maximum of maxes.
    pub fn merge(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            xmin: self.xmin.min(other.xmin),
            ymin: self.ymin.min(other.ymin),
            zmin: self.zmin.min(other.zmin),
            xmax: self.xmax.max(other.xmax),
            ymax: self.ymax.max(other.ymax),
            zmax: self.zmax.max(other.zmax),
        }
    }

    /// Largest axis-aligned extent, `max(Δx, Δy, Δz)`.
    pub fn max_extent(&self) -> f64 {
        let dx = self.xmax - self.xmin;
        let dy = self.ymax - self.ymin;
        let dz = self.zmax - self.zmin;
        dx.max(dy).max(dz)
    }
}

/// Flattened triangle vertex buffer, `[x0, y0, z0, x1, y1, z1, …]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleBuffer {
    /// Flattened vertex coordinates.
    pub positions: Vec<f32>,
}

/// External geometry kernel interface consumed by the pipeline.
///
/// All calls are blocking; the kernel supports neither cancellation nor
/// timeout.
pub trait GeometryKernel: Send + Sync + fmt::Debug {
    /// Import a geometry file, returning the contained shapes in source
    /// order.
    fn import(&self, path: &Path) -> Result<Vec<Shape>, ConversionError>;

    /// Tessellate a shape into a triangle vertex buffer.
    fn tessellate(&self, shape: &Shape) -> Result<TriangleBuffer, ConversionError>;

    /// Discretize an edge into an ordered point list.
    fn discretize_edge(&self, shape: &Shape) -> Result<Vec<[f64; 3]>, ConversionError>;

    /// Discretize a wire into an ordered point list over its ordered edges.
    fn discretize_wire(&self, shape: &Shape) -> Result<Vec<[f64; 3]>, ConversionError>;

    /// Compute the axis-aligned bounding box of a shape.
    fn bounding_box(&self, shape: &Shape) -> Result<BoundingBox, ConversionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_merge() {
        let a = BoundingBox::new(0.0, 0.0, 0.0, 1.0, 2.0, 3.0);
        let b = BoundingBox::new(-1.0, 0.5, 1.0, 0.5, 5.0, 2.0);
        let merged = a.merge(&b);
        assert_eq!(merged.xmin, -1.0);
        assert_eq!(merged.ymax, 5.0);
        assert_eq!(merged.zmax, 3.0);
    }

    #[test]
    fn test_max_extent_picks_largest_axis() {
        let bounds = BoundingBox::new(0.0, 0.0, 0.0, 1.0, 7.5, 3.0);
        assert_eq!(bounds.max_extent(), 7.5);
    }

    #[test]
    fn test_curve_like_kinds() {
        assert!(ShapeKind::Wire.is_curve_like());
        assert!(ShapeKind::Edge.is_curve_like());
        assert!(!ShapeKind::Solid.is_curve_like());
    }
}
