//! Filesystem utilities: archive extraction with security limits and
//! scratch-directory lifecycle.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;
use zip::ZipArchive;

use crate::error::ConversionError;

/// Filesystem utility functions.
pub struct FsUtils;

impl FsUtils {
    /// Buffer size for archive copy.
    const BUFFER_SIZE: usize = 64 * 1024;

    /// Extract filename as String; returns `"unknown_file"` for empty paths.
    pub fn extract_filename_str(path: &Path) -> String {
        path.file_name()
            .and_then(|f| f.to_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown_file".to_string())
    }

    /// Extract a ZIP archive into `extract_to` with entry-count and
    /// total-size limits.
    pub fn extract_zip(
        zip_path: &Path,
        extract_to: &Path,
        max_files: usize,
        max_extracted_bytes: u64,
    ) -> Result<(), ConversionError> {
        let file = File::open(zip_path)?;
        let mut archive = ZipArchive::new(file)?;

        if archive.len() > max_files {
            return Err(ConversionError::ZipTooManyFiles {
                count: archive.len(),
                limit: max_files,
            });
        }

        let mut total_size = 0u64;

        for i in 0..archive.len() {
            let mut zip_file = archive.by_index(i)?;

            let enclosed_name = match zip_file.enclosed_name() {
                Some(path) => path.to_path_buf(),
                None => continue,
            };

            let out_path = extract_to.join(&enclosed_name);

            total_size += zip_file.size();
            if total_size > max_extracted_bytes {
                return Err(ConversionError::ZipSizeExceeded {
                    limit: max_extracted_bytes,
                });
            }

            if zip_file.is_dir() {
                fs::create_dir_all(&out_path)?;
            } else {
                if let Some(p) = out_path.parent() {
                    fs::create_dir_all(p)?;
                }
                let mut outfile = File::create(&out_path)?;
                let mut buffer = vec![0u8; Self::BUFFER_SIZE];
                loop {
                    let n = zip_file.read(&mut buffer)?;
                    if n == 0 {
                        break;
                    }
                    outfile.write_all(&buffer[..n])?;
                }
            }
        }

        Ok(())
    }

    /// Find the first file under `dir` (recursively) whose lowercased
    /// extension matches one of `extensions`.
    pub fn find_first_with_extensions(
        dir: &Path,
        extensions: &[&str],
    ) -> Result<Option<PathBuf>, ConversionError> {
        let mut dirs_to_visit = vec![dir.to_path_buf()];

        while let Some(current) = dirs_to_visit.pop() {
            let mut entries: Vec<_> = fs::read_dir(&current)?.collect::<Result<_, _>>()?;
            entries.sort_by_key(|e| e.path());

            for entry in entries {
                let path = entry.path();
                if path.is_dir() {
                    dirs_to_visit.push(path);
                } else if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                    if extensions.contains(&ext.to_ascii_lowercase().as_str()) {
                        return Ok(Some(path));
                    }
                }
            }
        }

        Ok(None)
    }
}

/// Uniquely named scratch directory removed on drop.
///
/// Cleanup runs on every exit path, including partial failure.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create a fresh scratch directory under `root`.
    pub fn create(root: &Path) -> Result<Self, ConversionError> {
        let path = root.join(format!("job__{}", Uuid::now_v7().simple()));
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    /// Path of the scratch directory.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    scratch = %self.path.display(),
                    error = %e,
                    "Failed to clean up scratch directory"
                );
            }
        }
    }
}
