//! Conversion processor: the pipeline entry point.
//!
//! One [`ConversionProcessor::process`] call takes a request from source
//! acquisition through format dispatch, shape aggregation, and the final
//! descriptor write. Exactly one descriptor is written per successful
//! conversion, regardless of which converter ran.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::aggregate::{self, FailurePolicy};
use crate::cache::ArtifactCache;
use crate::config::ConversionConfig;
use crate::descriptor;
use crate::download::Downloader;
use crate::error::ConversionError;
use crate::filesystem::{FsUtils, ScratchDir};
use crate::freecad::FreecadIntrospector;
use crate::kernel::{GeometryKernel, Shape};
use crate::metrics::ConversionMetrics;
use crate::models::{CloneContext, ConversionRequest, ConversionSummary, FileType};
use crate::script::ScriptConverter;

/// Orchestrates the full conversion pipeline.
#[derive(Debug)]
pub struct ConversionProcessor {
    kernel: Arc<dyn GeometryKernel>,
    downloader: Option<Arc<dyn Downloader>>,
    config: ConversionConfig,
    cache: ArtifactCache,
    metrics: Arc<ConversionMetrics>,
}

impl ConversionProcessor {
    /// Create a processor over a kernel and configuration. The artifact
    /// cache directory is created if missing.
    pub fn new(
        kernel: Arc<dyn GeometryKernel>,
        config: ConversionConfig,
    ) -> Result<Self, ConversionError> {
        let cache = ArtifactCache::new(config.effective_cache_dir())?;
        Ok(Self {
            kernel,
            downloader: None,
            config,
            cache,
            metrics: Arc::new(ConversionMetrics::new()),
        })
    }

    /// Attach a downloader for remote sources.
    pub fn with_downloader(mut self, downloader: Arc<dyn Downloader>) -> Self {
        self.downloader = Some(downloader);
        self
    }

    /// Shared metrics collector.
    pub fn metrics(&self) -> Arc<ConversionMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run one conversion from source acquisition to descriptor write.
    pub async fn process(
        &self,
        request: &ConversionRequest,
    ) -> Result<ConversionSummary, ConversionError> {
        self.metrics.record_started();
        match self.run(request).await {
            Ok(summary) => {
                self.metrics.record_succeeded();
                info!(
                    source = %request.source,
                    descriptor = %summary.descriptor_path.display(),
                    artifacts = summary.artifact_names.len(),
                    "Conversion complete"
                );
                Ok(summary)
            }
            Err(e) => {
                self.metrics.record_failed();
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        request: &ConversionRequest,
    ) -> Result<ConversionSummary, ConversionError> {
        // The download scratch must outlive the conversion of its content.
        let mut download_scratch = None;
        let local_path = if request.is_remote() {
            let downloader =
                self.downloader
                    .as_ref()
                    .ok_or_else(|| ConversionError::Download {
                        url: request.source.clone(),
                        message: "no downloader configured".to_string(),
                    })?;
            let scratch = ScratchDir::create(&self.config.effective_scratch_root())?;
            let dest = scratch.path().join(filename_from_url(&request.source));
            downloader.fetch(&request.source, &dest).await?;
            download_scratch = Some(scratch);
            dest
        } else {
            PathBuf::from(&request.source)
        };

        let file_type = FileType::from_path(&local_path).ok_or_else(|| {
            ConversionError::UnknownFormat {
                extension: local_path
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or_default()
                    .to_ascii_lowercase(),
            }
        })?;

        let content_hash = ArtifactCache::content_hash(&local_path)?;

        let outcome = match file_type {
            t if t.is_flat_format() => self.convert_flat(&local_path, &content_hash)?,
            FileType::Stepzip => self.convert_stepzip(&local_path, &content_hash)?,
            FileType::Freecad => self.convert_freecad(&local_path, &content_hash)?,
            FileType::PythonScript => {
                let clone_context = if request.is_remote() {
                    CloneContext::from_source_url(&request.source)
                } else {
                    None
                };
                ScriptConverter::new(&self.config)
                    .convert(
                        self.kernel.as_ref(),
                        &self.cache,
                        &self.metrics,
                        &local_path,
                        &content_hash,
                        &request.target_dir,
                        clone_context.as_ref(),
                    )
                    .await?
            }
            // from_path only yields the variants matched above.
            _ => unreachable!("unhandled file type {:?}", file_type),
        };

        let descriptor_path = descriptor::write_descriptor(
            &local_path,
            &request.target_dir,
            &outcome.artifact_names,
            outcome.max_dimension,
        )?;

        if request.remove_original && !request.is_remote() {
            if let Err(e) = std::fs::remove_file(&local_path) {
                warn!(
                    source = %local_path.display(),
                    error = %e,
                    "Failed to remove source after conversion"
                );
            }
        }
        drop(download_scratch);

        Ok(ConversionSummary {
            descriptor_path,
            artifact_names: outcome.artifact_names,
            max_dimension: outcome.max_dimension,
        })
    }

    /// Flat exchange formats: every shape the kernel imports converts, any
    /// failure is fatal.
    fn convert_flat(
        &self,
        path: &Path,
        content_hash: &str,
    ) -> Result<aggregate::AggregateOutcome, ConversionError> {
        let shapes = self.kernel.import(path)?;
        let indexed: Vec<(usize, Shape)> = shapes.into_iter().enumerate().collect();
        aggregate::convert_shapes(
            self.kernel.as_ref(),
            &self.cache,
            &self.metrics,
            content_hash,
            &indexed,
            FailurePolicy::Strict,
            path,
        )
    }

    /// A stepzip wraps a single STEP file; extract it and convert it under
    /// the archive's content hash.
    fn convert_stepzip(
        &self,
        path: &Path,
        content_hash: &str,
    ) -> Result<aggregate::AggregateOutcome, ConversionError> {
        let scratch = ScratchDir::create(&self.config.effective_scratch_root())?;
        FsUtils::extract_zip(
            path,
            scratch.path(),
            self.config.max_zip_files,
            self.config.max_extracted_bytes,
        )?;
        let step_path = FsUtils::find_first_with_extensions(scratch.path(), &["step", "stp"])?
            .ok_or_else(|| ConversionError::MissingStepInArchive {
                path: path.to_path_buf(),
            })?;
        self.convert_flat(&step_path, content_hash)
    }

    /// FreeCAD containers convert only objects that are visible and carry a
    /// part file, keeping each object's declaration index. Per-object
    /// failures are tolerated.
    fn convert_freecad(
        &self,
        path: &Path,
        content_hash: &str,
    ) -> Result<aggregate::AggregateOutcome, ConversionError> {
        let introspector = FreecadIntrospector::new(&self.config);
        let container = introspector.open(path)?;

        let mut indexed: Vec<(usize, Shape)> = Vec::new();
        for (index, entry) in container.entries().iter().enumerate() {
            if !entry.is_visible() {
                continue;
            }
            let Some(part_path) = container.part_path(entry) else {
                continue;
            };
            match self.kernel.import(&part_path) {
                Ok(shapes) => {
                    if let Some(shape) = shapes.into_iter().next() {
                        indexed.push((index, shape));
                    }
                }
                Err(e) if e.is_recoverable_per_shape() => {
                    warn!(
                        source = %path.display(),
                        object = %entry.name,
                        error = %e,
                        "Skipping unreadable object"
                    );
                    self.metrics.record_shape_skipped();
                }
                Err(e) => return Err(e),
            }
        }

        aggregate::convert_shapes(
            self.kernel.as_ref(),
            &self.cache,
            &self.metrics,
            content_hash,
            &indexed,
            FailurePolicy::Tolerant,
            path,
        )
    }
}

fn filename_from_url(url: &str) -> String {
    url.split('?')
        .next()
        .unwrap_or(url)
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("download")
        .to_string()
}
