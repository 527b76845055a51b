//! In-memory mock of the geometry kernel for development and testing.
//!
//! Simulates import/tessellation/bounding-box behavior without a native
//! kernel. Fixtures are registered per path; call counters let tests assert
//! how much kernel work a pipeline run performed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

use crate::error::ConversionError;
use crate::kernel::{BoundingBox, GeometryKernel, Shape, ShapeId, ShapeKind, TriangleBuffer};

/// Geometry registered for one mock shape.
#[derive(Debug, Clone)]
pub struct ShapeFixture {
    /// Topological class reported at import.
    pub kind: ShapeKind,
    /// Flattened vertex coordinates returned by tessellation/discretization.
    pub positions: Vec<f32>,
    /// Bounding box; `None` marks a null/invalid shape whose tessellation
    /// and bounding-box queries fail.
    pub bounds: Option<BoundingBox>,
}

impl ShapeFixture {
    /// A valid solid fixture with the given bounds.
    pub fn solid(positions: Vec<f32>, bounds: BoundingBox) -> Self {
        Self {
            kind: ShapeKind::Solid,
            positions,
            bounds: Some(bounds),
        }
    }

    /// A null shape that fails tessellation and bounding-box queries.
    pub fn null_shape() -> Self {
        Self {
            kind: ShapeKind::Solid,
            positions: Vec::new(),
            bounds: None,
        }
    }
}

/// Mock kernel backed by per-path fixtures.
#[derive(Debug, Default)]
pub struct MockKernel {
    /// Registered fixtures keyed by import path.
    fixtures: Mutex<HashMap<PathBuf, Vec<ShapeFixture>>>,
    /// Fixtures keyed by file basename, for paths generated at runtime.
    by_basename: Mutex<HashMap<String, Vec<ShapeFixture>>>,
    /// Fixtures returned for any path without a per-path registration.
    fallback: Mutex<Option<Vec<ShapeFixture>>>,
    /// Geometry of imported shapes keyed by handle.
    imported: Mutex<HashMap<ShapeId, ShapeFixture>>,
    /// Number of `import` calls.
    pub import_calls: AtomicU64,
    /// Number of `tessellate` calls.
    pub tessellate_calls: AtomicU64,
    /// Number of `bounding_box` calls.
    pub bounding_box_calls: AtomicU64,
}

impl MockKernel {
    /// Create an empty mock kernel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the shapes an import of `path` will produce.
    pub fn register_file(&self, path: impl Into<PathBuf>, shapes: Vec<ShapeFixture>) {
        let mut fixtures = self.fixtures.lock().unwrap_or_else(|e| e.into_inner());
        fixtures.insert(path.into(), shapes);
    }

    /// Register a single valid solid with unit-cube-like bounds scaled by
    /// `extent`.
    pub fn register_solid(&self, path: impl Into<PathBuf>, extent: f64) {
        self.register_file(
            path,
            vec![ShapeFixture::solid(
                vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
                BoundingBox::new(0.0, 0.0, 0.0, extent, extent, extent),
            )],
        );
    }

    /// Register the shapes an import of any path with this basename will
    /// produce, regardless of its directory.
    pub fn register_basename(&self, name: impl Into<String>, shapes: Vec<ShapeFixture>) {
        let mut by_basename = self.by_basename.lock().unwrap_or_else(|e| e.into_inner());
        by_basename.insert(name.into(), shapes);
    }

    /// Register fixtures returned for imports of any unregistered path.
    /// Useful when the import path is generated at runtime.
    pub fn register_fallback(&self, shapes: Vec<ShapeFixture>) {
        let mut fallback = self.fallback.lock().unwrap_or_else(|e| e.into_inner());
        *fallback = Some(shapes);
    }

    /// Resolve fixtures by exact path, then basename, then fallback.
    fn lookup_fixtures(&self, path: &Path) -> Result<Vec<ShapeFixture>, ConversionError> {
        let fixtures = self.fixtures.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(specs) = fixtures.get(path) {
            return Ok(specs.clone());
        }
        drop(fixtures);

        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            let by_basename = self.by_basename.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(specs) = by_basename.get(name) {
                return Ok(specs.clone());
            }
        }

        let fallback = self.fallback.lock().unwrap_or_else(|e| e.into_inner());
        fallback.clone().ok_or_else(|| ConversionError::Kernel {
            message: format!("import failed for '{}'", path.display()),
        })
    }

    fn fixture_for(&self, shape: &Shape) -> Result<ShapeFixture, ConversionError> {
        let imported = self.imported.lock().unwrap_or_else(|e| e.into_inner());
        imported
            .get(&shape.id)
            .cloned()
            .ok_or_else(|| ConversionError::Kernel {
                message: format!("unknown shape handle {}", shape.id),
            })
    }
}

impl GeometryKernel for MockKernel {
    fn import(&self, path: &Path) -> Result<Vec<Shape>, ConversionError> {
        self.import_calls.fetch_add(1, Ordering::Relaxed);

        let specs = self.lookup_fixtures(path)?;

        let mut imported = self.imported.lock().unwrap_or_else(|e| e.into_inner());
        let mut shapes = Vec::with_capacity(specs.len());
        for spec in specs {
            let shape = Shape {
                id: Uuid::new_v4(),
                kind: spec.kind,
            };
            imported.insert(shape.id, spec);
            shapes.push(shape);
        }
        Ok(shapes)
    }

    fn tessellate(&self, shape: &Shape) -> Result<TriangleBuffer, ConversionError> {
        self.tessellate_calls.fetch_add(1, Ordering::Relaxed);

        let fixture = self.fixture_for(shape)?;
        if fixture.bounds.is_none() {
            return Err(ConversionError::InvalidShape {
                reason: "null shape".to_string(),
            });
        }
        Ok(TriangleBuffer {
            positions: fixture.positions,
        })
    }

    fn discretize_edge(&self, shape: &Shape) -> Result<Vec<[f64; 3]>, ConversionError> {
        let fixture = self.fixture_for(shape)?;
        Ok(fixture
            .positions
            .chunks_exact(3)
            .map(|p| [p[0] as f64, p[1] as f64, p[2] as f64])
            .collect())
    }

    fn discretize_wire(&self, shape: &Shape) -> Result<Vec<[f64; 3]>, ConversionError> {
        self.discretize_edge(shape)
    }

    fn bounding_box(&self, shape: &Shape) -> Result<BoundingBox, ConversionError> {
        self.bounding_box_calls.fetch_add(1, Ordering::Relaxed);

        let fixture = self.fixture_for(shape)?;
        fixture.bounds.ok_or_else(|| ConversionError::InvalidShape {
            reason: "null shape".to_string(),
        })
    }
}
