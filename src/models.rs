//! Domain models: file types, conversion requests, container entries,
//! clone context derivation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Extension map macro
// ---------------------------------------------------------------------------

macro_rules! define_file_types {
    ($($variant:ident => $ext:literal),* $(,)?) => {
        static EXTENSION_MAP: LazyLock<HashMap<&'static str, FileType>> = LazyLock::new(|| {
            HashMap::from([$(($ext, FileType::$variant),)*])
        });

        impl FileType {
            /// All file extensions routed by the dispatcher.
            pub const SUPPORTED_EXTENSIONS: &'static [&'static str] = &[$($ext,)*];
        }
    };
}

define_file_types! {
    Freecad      => "fcstd",
    Step         => "step",
    StepAlt      => "stp",
    Iges         => "iges",
    IgesAlt      => "igs",
    Brep         => "brep",
    BrepAlt      => "brp",
    Stl          => "stl",
    PythonScript => "py",
    Stepzip      => "stepzip",
}

/// All recognized input file types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    /// FreeCAD document container (.fcstd / .FCStd)
    Freecad,
    /// STEP (.step)
    Step,
    /// STEP alternate extension (.stp)
    StepAlt,
    /// IGES (.iges)
    Iges,
    /// IGES alternate extension (.igs)
    IgesAlt,
    /// Raw B-rep (.brep)
    Brep,
    /// Raw B-rep alternate extension (.brp)
    BrepAlt,
    /// Stereolithography mesh (.stl)
    Stl,
    /// Scripted parametric part or assembly (.py)
    PythonScript,
    /// ZIP archive wrapping a single STEP file (.stepzip)
    Stepzip,
}

impl FileType {
    /// Determine the file type from a path's lowercased extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        EXTENSION_MAP.get(ext.as_str()).copied()
    }

    /// Returns `true` for archive container formats holding named
    /// sub-shapes plus per-object metadata.
    pub fn is_container_format(&self) -> bool {
        matches!(self, FileType::Freecad)
    }

    /// Returns `true` for flat neutral exchange formats whose shapes are
    /// imported directly by the kernel.
    pub fn is_flat_format(&self) -> bool {
        matches!(
            self,
            FileType::Step
                | FileType::StepAlt
                | FileType::Iges
                | FileType::IgesAlt
                | FileType::Brep
                | FileType::BrepAlt
                | FileType::Stl
        )
    }

    /// Returns `true` for scripted parametric definitions.
    pub fn is_scripted(&self) -> bool {
        matches!(self, FileType::PythonScript)
    }
}

// ---------------------------------------------------------------------------
// ConversionRequest
// ---------------------------------------------------------------------------

/// One conversion invocation: from source acquisition to descriptor write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRequest {
    /// Local path or retrieval URL of the source file.
    pub source: String,
    /// Directory receiving the descriptor and, for assembly fallback, the
    /// external repository checkout.
    pub target_dir: PathBuf,
    /// Whether to delete the local source file after a successful
    /// conversion.
    pub remove_original: bool,
}

impl ConversionRequest {
    /// Create a request for a local source file.
    pub fn new(source: impl Into<String>, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target_dir: target_dir.into(),
            remove_original: false,
        }
    }

    /// Whether the source is a retrieval URL rather than a local path.
    pub fn is_remote(&self) -> bool {
        self.source.starts_with("http://") || self.source.starts_with("https://")
    }
}

// ---------------------------------------------------------------------------
// Conversion summary
// ---------------------------------------------------------------------------

/// Outcome of a completed conversion, as reported to the embedder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionSummary {
    /// Path to the written descriptor file.
    pub descriptor_path: PathBuf,
    /// Artifact basenames, in shape-index order.
    pub artifact_names: Vec<String>,
    /// Largest axis-aligned extent across the converted shapes (or the
    /// fixed assembly placeholder).
    pub max_dimension: f64,
}

// ---------------------------------------------------------------------------
// FreeCAD container entries
// ---------------------------------------------------------------------------

/// One object declared in a FreeCAD document, joined with its view-provider
/// visibility. Ordered as declared; the declaration position is the shape
/// index, including for objects that are never exported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreecadObjectEntry {
    /// Declared object name.
    pub name: String,
    /// Relative path of the object's part file inside the archive, if the
    /// object carries a Shape property.
    pub data_file: Option<String>,
    /// Visibility from the GUI document; `None` when no view-provider entry
    /// matched.
    pub visible: Option<bool>,
}

impl FreecadObjectEntry {
    /// Only objects with resolved `true` visibility are ever exported;
    /// unresolved visibility counts as not visible.
    pub fn is_visible(&self) -> bool {
        self.visible == Some(true)
    }
}

// ---------------------------------------------------------------------------
// Clone context
// ---------------------------------------------------------------------------

/// External repository coordinates for the assembly fallback, derived from
/// the source's retrieval URL. Only the scripted converter receives this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneContext {
    /// Clone URL of the repository hosting the script.
    pub url: String,
    /// Branch to check out.
    pub branch: String,
}

impl CloneContext {
    /// Derive clone coordinates from a raw-file retrieval URL of the form
    /// `scheme://host/{owner}/{repo}/raw/branch/{branch}/{path…}`.
    pub fn from_source_url(source_url: &str) -> Option<Self> {
        let (scheme, rest) = source_url.split_once("://")?;
        let mut segments = rest.split('/');
        let host = segments.next()?;
        let owner = segments.next()?;
        let repo = segments.next()?;
        if segments.next()? != "raw" || segments.next()? != "branch" {
            return None;
        }
        let branch = segments.next()?;
        if host.is_empty() || owner.is_empty() || repo.is_empty() || branch.is_empty() {
            return None;
        }
        Some(Self {
            url: format!("{}://{}/{}/{}", scheme, host, owner, repo),
            branch: branch.to_string(),
        })
    }
}
