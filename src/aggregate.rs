//! Multi-shape aggregation.
//!
//! Converts an indexed sequence of shapes against the artifact cache,
//! accumulating artifact names and the merged bounding extent. The failure
//! policy decides whether a per-shape failure aborts the run or only skips
//! that shape.

use std::path::Path;

use tracing::{debug, warn};

use crate::cache::{ArtifactCache, CacheOutcome};
use crate::error::ConversionError;
use crate::exporter::ShapeExporter;
use crate::kernel::{GeometryKernel, Shape};
use crate::metrics::ConversionMetrics;

/// How per-shape failures are handled during aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// A recoverable per-shape failure skips the shape with a warning;
    /// remaining shapes still convert. Skipped indices stay unused, so the
    /// surviving artifact names keep their original sparse indices.
    Tolerant,
    /// Any per-shape failure aborts the whole conversion.
    Strict,
}

/// Result of a successful aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateOutcome {
    /// Basenames of the artifacts backing the surviving shapes, in index
    /// order.
    pub artifact_names: Vec<String>,
    /// Largest axis extent across the merged bounds of surviving shapes.
    pub max_dimension: f64,
}

/// Convert `shapes` (pairs of stable index and shape) into cached artifacts.
///
/// Each shape's bounding box is computed unconditionally so the descriptor
/// dimension stays correct even when every artifact is a cache hit. The
/// exporter only runs on cache misses.
///
/// Returns [`ConversionError::NoConvertibleShapes`] when no shape survives.
pub fn convert_shapes(
    kernel: &dyn GeometryKernel,
    cache: &ArtifactCache,
    metrics: &ConversionMetrics,
    content_hash: &str,
    shapes: &[(usize, Shape)],
    policy: FailurePolicy,
    source: &Path,
) -> Result<AggregateOutcome, ConversionError> {
    let exporter = ShapeExporter::new(kernel);

    let mut artifact_names = Vec::with_capacity(shapes.len());
    let mut merged_bounds = None;

    for (index, shape) in shapes {
        let result = convert_one(kernel, cache, &exporter, content_hash, *index, shape);
        match result {
            Ok((name, bounds, outcome)) => {
                match outcome {
                    CacheOutcome::Hit => metrics.record_cache_hit(),
                    CacheOutcome::Written => metrics.record_cache_miss(),
                }
                metrics.record_shape_converted();
                merged_bounds = Some(match merged_bounds {
                    Some(acc) => bounds.merge(&acc),
                    None => bounds,
                });
                artifact_names.push(name);
            }
            Err(err) if policy == FailurePolicy::Tolerant && err.is_recoverable_per_shape() => {
                warn!(
                    source = %source.display(),
                    index,
                    error = %err,
                    "Skipping shape"
                );
                metrics.record_shape_skipped();
            }
            Err(err) => return Err(err),
        }
    }

    if artifact_names.is_empty() {
        return Err(ConversionError::NoConvertibleShapes {
            source_file: source.display().to_string(),
        });
    }

    // merged_bounds is Some whenever artifact_names is non-empty.
    let max_dimension = merged_bounds
        .map(|b| b.max_extent())
        .unwrap_or_default();

    debug!(
        source = %source.display(),
        artifacts = artifact_names.len(),
        max_dimension,
        "Aggregated shapes"
    );

    Ok(AggregateOutcome {
        artifact_names,
        max_dimension,
    })
}

fn convert_one(
    kernel: &dyn GeometryKernel,
    cache: &ArtifactCache,
    exporter: &ShapeExporter<'_>,
    content_hash: &str,
    index: usize,
    shape: &Shape,
) -> Result<(String, crate::kernel::BoundingBox, CacheOutcome), ConversionError> {
    // Bounds are needed for the descriptor even on a cache hit.
    let bounds = kernel.bounding_box(shape)?;

    let artifact_path = cache.artifact_path(content_hash, index);
    let outcome = cache.convert_if_absent(&artifact_path, || exporter.export(shape))?;

    let name = artifact_path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| ConversionError::InvalidUtf8Path {
            path: artifact_path.clone(),
        })?;

    Ok((name, bounds, outcome))
}
