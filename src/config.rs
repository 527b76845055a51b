//! Configuration for the conversion pipeline.
//!
//! Embedders construct a [`ConversionConfig`] directly or load one from a
//! TOML file. All fields have serde defaults so an empty config section is
//! valid.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::ConversionError;

/// Configuration for the CAD-to-web conversion pipeline.
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Directory holding content-addressed geometry artifacts.
    ///
    /// Artifacts are never expired; this directory is the lifetime store.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Root directory for scratch working directories (archive extraction,
    /// script handoff files). Each job gets a uniquely named subdirectory.
    #[serde(default)]
    pub scratch_root: Option<PathBuf>,

    /// Python interpreter used for scripted part/assembly resolution.
    #[serde(default = "default_python_path")]
    pub python_path: PathBuf,

    /// git binary used for external assembly repository checkout.
    #[serde(default = "default_git_path")]
    pub git_path: PathBuf,

    /// Timeout in seconds for a single script subprocess invocation.
    #[serde(default = "default_script_timeout_seconds")]
    #[validate(range(min = 10, max = 3600))]
    pub script_timeout_seconds: u64,

    /// Maximum number of entries accepted in a container archive.
    #[serde(default = "default_max_zip_files")]
    pub max_zip_files: usize,

    /// Maximum total extracted size of a container archive, in bytes.
    #[serde(default = "default_max_extracted_bytes")]
    pub max_extracted_bytes: u64,

    /// Whether to capture script subprocess stdout/stderr for diagnostics.
    #[serde(default = "default_capture_script_output")]
    pub capture_script_output: bool,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            scratch_root: None,
            python_path: default_python_path(),
            git_path: default_git_path(),
            script_timeout_seconds: default_script_timeout_seconds(),
            max_zip_files: default_max_zip_files(),
            max_extracted_bytes: default_max_extracted_bytes(),
            capture_script_output: default_capture_script_output(),
        }
    }
}

fn default_python_path() -> PathBuf {
    PathBuf::from("python3")
}

fn default_git_path() -> PathBuf {
    PathBuf::from("git")
}

fn default_script_timeout_seconds() -> u64 {
    300
}

fn default_max_zip_files() -> usize {
    10_000
}

fn default_max_extracted_bytes() -> u64 {
    10 * 1024 * 1024 * 1024
}

fn default_capture_script_output() -> bool {
    true
}

impl ConversionConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConversionError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Resolve the effective artifact cache directory.
    pub fn effective_cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("data/cache/geometry"))
    }

    /// Resolve the effective scratch root directory.
    pub fn effective_scratch_root(&self) -> PathBuf {
        self.scratch_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("cad2web"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConversionConfig::default();
        assert_eq!(config.python_path, PathBuf::from("python3"));
        assert_eq!(config.git_path, PathBuf::from("git"));
        assert_eq!(config.script_timeout_seconds, 300);
        assert!(config.capture_script_output);
        assert!(config.cache_dir.is_none());
    }

    #[test]
    fn test_effective_dirs_fall_back() {
        let config = ConversionConfig::default();
        assert_eq!(
            config.effective_cache_dir(),
            PathBuf::from("data/cache/geometry")
        );
        assert!(
            config
                .effective_scratch_root()
                .ends_with("cad2web")
        );
    }

    #[test]
    fn test_toml_deserialization_empty() {
        let config: ConversionConfig = toml::from_str("").expect("parse toml");
        assert_eq!(config.script_timeout_seconds, 300);
        assert!(config.scratch_root.is_none());
    }

    #[test]
    fn test_toml_overrides() {
        let config: ConversionConfig = toml::from_str(
            "cache_dir = \"/var/lib/forge/geometry\"\nscript_timeout_seconds = 60\n",
        )
        .expect("parse toml");
        assert_eq!(
            config.effective_cache_dir(),
            PathBuf::from("/var/lib/forge/geometry")
        );
        assert_eq!(config.script_timeout_seconds, 60);
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = ConversionConfig {
            cache_dir: Some(PathBuf::from("/tmp/cache")),
            script_timeout_seconds: 120,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).expect("serialize");
        let deser: ConversionConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(deser.cache_dir, Some(PathBuf::from("/tmp/cache")));
        assert_eq!(deser.script_timeout_seconds, 120);
    }
}
