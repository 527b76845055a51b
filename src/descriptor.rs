//! Descriptor writer.
//!
//! The descriptor is the viewer's entry point for a converted source: the
//! first line is the bounding dimension with six decimal places, each
//! following line is one artifact basename in shape-index order.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ConversionError;
use crate::filesystem::FsUtils;

/// Write the descriptor for `source` into `target_dir`, returning its path.
///
/// The descriptor is named after the source's basename with a `.dat` suffix
/// appended, so `box.fcstd` yields `box.fcstd.dat`.
pub fn write_descriptor(
    source: &Path,
    target_dir: &Path,
    artifact_names: &[String],
    max_dimension: f64,
) -> Result<PathBuf, ConversionError> {
    let descriptor_name = format!("{}.dat", FsUtils::extract_filename_str(source));
    let descriptor_path = target_dir.join(descriptor_name);

    let mut content = format!("{:.6}\n", max_dimension);
    content.push_str(&artifact_names.join("\n"));

    fs::create_dir_all(target_dir)?;
    fs::write(&descriptor_path, content)?;

    debug!(
        descriptor = %descriptor_path.display(),
        artifacts = artifact_names.len(),
        "Descriptor written"
    );

    Ok(descriptor_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let names = vec!["abc_0.json".to_string(), "abc_2.json".to_string()];

        let path = write_descriptor(
            Path::new("/incoming/box.fcstd"),
            temp.path(),
            &names,
            12.5,
        )
        .expect("write");

        assert_eq!(
            FsUtils::extract_filename_str(&path),
            "box.fcstd.dat"
        );
        let content = fs::read_to_string(&path).expect("read");
        assert_eq!(content, "12.500000\nabc_0.json\nabc_2.json");
    }

    #[test]
    fn test_descriptor_overwrites_previous() {
        let temp = tempfile::tempdir().expect("tempdir");
        let source = Path::new("/incoming/part.step");

        write_descriptor(source, temp.path(), &["a_0.json".to_string()], 1.0)
            .expect("first write");
        let path = write_descriptor(source, temp.path(), &["b_0.json".to_string()], 2.0)
            .expect("second write");

        let content = fs::read_to_string(&path).expect("read");
        assert_eq!(content, "2.000000\nb_0.json");
    }
}
