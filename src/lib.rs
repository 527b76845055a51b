//! # cad2web
//!
//! Converts CAD sources (STEP, IGES, B-rep, STL, FreeCAD documents, and
//! scripted parametric definitions) into web-renderable JSON geometry
//! artifacts plus a per-source descriptor the viewer loads.
//!
//! Geometry work is delegated to an external [`kernel::GeometryKernel`];
//! this crate orchestrates format dispatch, content-addressed artifact
//! caching, multi-shape aggregation, container introspection, and scripted
//! part/assembly resolution.
//!
//! ## Caching
//!
//! Artifacts are keyed by the SHA-1 of the source file's bytes and the
//! shape index, so re-submitting unchanged content performs no conversion
//! work. The cache directory never expires entries.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod descriptor;
pub mod download;
pub mod error;
pub mod exporter;
pub mod filesystem;
pub mod freecad;
pub mod kernel;
pub mod metrics;
pub mod models;
pub mod processor;
pub mod script;

pub use cache::{ArtifactCache, CacheOutcome};
pub use config::ConversionConfig;
pub use download::{Downloader, HttpDownloader};
pub use error::ConversionError;
pub use kernel::GeometryKernel;
pub use models::{ConversionRequest, ConversionSummary, FileType};
pub use processor::ConversionProcessor;
