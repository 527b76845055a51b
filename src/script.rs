//! Scripted part/assembly resolution.
//!
//! A `.py` source is a parametric definition executed by an external Python
//! interpreter, never by this process. A generated wrapper confines all
//! interpreter-global mutation (module search path, working directory) to
//! the child process and probes the script's capability contract:
//!
//! * Stage 1 probes `produces_part()`. A missing capability exits with a
//!   reserved status and triggers stage 2; any other failure is fatal.
//! * Stage 2 optionally checks out the script's host repository next to the
//!   target directory (assemblies reference sibling part files), then probes
//!   `produces_assembly()`. A missing capability here is a terminal error.
//!
//! Resolved shapes cross back as B-rep handoff files named `shape_<N>.brep`
//! in the scratch directory; `N` is the stable shape index.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::aggregate::{self, AggregateOutcome, FailurePolicy};
use crate::cache::{ArtifactCache, CacheOutcome};
use crate::config::ConversionConfig;
use crate::error::ConversionError;
use crate::exporter::ShapeExporter;
use crate::filesystem::ScratchDir;
use crate::kernel::{GeometryKernel, Shape};
use crate::metrics::ConversionMetrics;
use crate::models::CloneContext;

/// Reserved wrapper exit status: the probed capability is not defined.
const EXIT_NO_DEFINITION: i32 = 3;

/// Reported bounding dimension for assemblies. Assembly extents are not
/// computed; the viewer receives this fixed placeholder.
pub const ASSEMBLY_PLACEHOLDER_DIMENSION: f64 = 100.0;

/// Which capability a wrapper invocation probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capability {
    Part,
    Assembly,
}

impl Capability {
    fn function_name(&self) -> &'static str {
        match self {
            Capability::Part => "produces_part",
            Capability::Assembly => "produces_assembly",
        }
    }
}

/// Converts scripted parametric definitions via an external interpreter.
#[derive(Debug)]
pub struct ScriptConverter {
    python_path: PathBuf,
    git_path: PathBuf,
    scratch_root: PathBuf,
    timeout_seconds: u64,
    capture_output: bool,
}

impl ScriptConverter {
    /// Create a converter from the pipeline configuration.
    pub fn new(config: &ConversionConfig) -> Self {
        Self {
            python_path: config.python_path.clone(),
            git_path: config.git_path.clone(),
            scratch_root: config.effective_scratch_root(),
            timeout_seconds: config.script_timeout_seconds,
            capture_output: config.capture_script_output,
        }
    }

    /// Resolve a script into cached artifacts.
    ///
    /// Stage 1 resolves a single part; when the script exposes no part
    /// capability, stage 2 resolves an assembly, checking out the script's
    /// host repository first when `clone_context` is available.
    pub async fn convert(
        &self,
        kernel: &dyn GeometryKernel,
        cache: &ArtifactCache,
        metrics: &ConversionMetrics,
        script_path: &Path,
        content_hash: &str,
        target_dir: &Path,
        clone_context: Option<&CloneContext>,
    ) -> Result<AggregateOutcome, ConversionError> {
        let scratch = ScratchDir::create(&self.scratch_root)?;

        match self
            .run_stage(script_path, &scratch, Capability::Part, &[])
            .await
        {
            Ok(()) => {
                let nodes = import_handoffs(kernel, scratch.path())?;
                return aggregate::convert_shapes(
                    kernel,
                    cache,
                    metrics,
                    content_hash,
                    &nodes,
                    FailurePolicy::Strict,
                    script_path,
                );
            }
            Err(ConversionError::NoPartDefinition { .. }) => {
                debug!(
                    script = %script_path.display(),
                    "No part definition, attempting assembly resolution"
                );
            }
            Err(e) => return Err(e),
        }

        let mut extra_paths = Vec::new();
        if let Some(ctx) = clone_context {
            let clone_dir = self.checkout(ctx, target_dir).await?;
            extra_paths.push(clone_dir);
        } else {
            warn!(
                script = %script_path.display(),
                "No clone coordinates for assembly resolution, using script directory only"
            );
        }

        match self
            .run_stage(script_path, &scratch, Capability::Assembly, &extra_paths)
            .await
        {
            Ok(()) => {}
            Err(ConversionError::NoPartDefinition { script }) => {
                // Neither capability resolved.
                return Err(ConversionError::ScriptResolution { script });
            }
            Err(e) => return Err(e),
        }

        let nodes = import_handoffs(kernel, scratch.path())?;
        if nodes.is_empty() {
            return Err(ConversionError::ScriptResolution {
                script: script_path.to_path_buf(),
            });
        }

        let exporter = ShapeExporter::new(kernel);
        let mut artifact_names = Vec::with_capacity(nodes.len());
        for (index, shape) in &nodes {
            let artifact_path = cache.artifact_path(content_hash, *index);
            let outcome = cache.convert_if_absent(&artifact_path, || exporter.export(shape))?;
            match outcome {
                CacheOutcome::Hit => metrics.record_cache_hit(),
                CacheOutcome::Written => metrics.record_cache_miss(),
            }
            metrics.record_shape_converted();
            artifact_names.push(artifact_basename(&artifact_path)?);
        }

        info!(
            script = %script_path.display(),
            nodes = artifact_names.len(),
            "Assembly resolved"
        );

        Ok(AggregateOutcome {
            artifact_names,
            max_dimension: ASSEMBLY_PLACEHOLDER_DIMENSION,
        })
    }

    async fn run_stage(
        &self,
        script_path: &Path,
        scratch: &ScratchDir,
        capability: Capability,
        extra_search_paths: &[PathBuf],
    ) -> Result<(), ConversionError> {
        let wrapper_source = wrapper_source(script_path, capability, extra_search_paths)?;
        let wrapper_path = scratch.path().join(match capability {
            Capability::Part => "resolve_part.py",
            Capability::Assembly => "resolve_assembly.py",
        });
        std::fs::write(&wrapper_path, wrapper_source)?;

        let mut command = Command::new(&self.python_path);
        command
            .arg(&wrapper_path)
            .current_dir(scratch.path())
            .kill_on_drop(true)
            .stdin(Stdio::null());
        if self.capture_output {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }

        debug!(
            script = %script_path.display(),
            capability = capability.function_name(),
            "Running script wrapper"
        );

        let child = command.spawn()?;
        let output = tokio::time::timeout(
            Duration::from_secs(self.timeout_seconds),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| ConversionError::ScriptTimeout {
            timeout_seconds: self.timeout_seconds,
        })??;

        if output.status.success() {
            return Ok(());
        }

        let code = output.status.code().unwrap_or(-1);
        if code == EXIT_NO_DEFINITION {
            return Err(ConversionError::NoPartDefinition {
                script: script_path.to_path_buf(),
            });
        }

        Err(ConversionError::ScriptFailed {
            code,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }

    /// Shallow single-branch checkout of the script's host repository into
    /// the target directory. An existing checkout is reused as-is.
    async fn checkout(
        &self,
        ctx: &CloneContext,
        target_dir: &Path,
    ) -> Result<PathBuf, ConversionError> {
        let repo_name = ctx
            .url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("repository");
        let clone_dir = target_dir.join(repo_name);
        if clone_dir.exists() {
            debug!(clone_dir = %clone_dir.display(), "Reusing existing checkout");
            return Ok(clone_dir);
        }

        let output = Command::new(&self.git_path)
            .arg("clone")
            .arg("--depth")
            .arg("1")
            .arg("--branch")
            .arg(&ctx.branch)
            .arg(&ctx.url)
            .arg(&clone_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(ConversionError::CheckoutFailed {
                url: ctx.url.clone(),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        info!(url = %ctx.url, branch = %ctx.branch, "Checked out assembly repository");
        Ok(clone_dir)
    }
}

/// Generate the wrapper the interpreter runs. All paths are embedded with
/// forward slashes so the source is valid on any host.
fn wrapper_source(
    script_path: &Path,
    capability: Capability,
    extra_search_paths: &[PathBuf],
) -> Result<String, ConversionError> {
    let script_literal = path_literal(script_path)?;
    let script_dir = script_path.parent().unwrap_or(Path::new("."));
    let mut search_paths = vec![path_literal(script_dir)?];
    for p in extra_search_paths {
        search_paths.push(path_literal(p)?);
    }
    let inserts: String = search_paths
        .iter()
        .map(|p| format!("sys.path.insert(0, \"{}\")\n", p))
        .collect();

    let body = match capability {
        Capability::Part => "\
shape = producer()
shape.exportBrep(\"shape_0.brep\")
",
        Capability::Assembly => "\
for index, shape in enumerate(producer()):
    shape.exportBrep(\"shape_%d.brep\" % index)
",
    };

    Ok(format!(
        "\
import importlib.util
import sys

{inserts}
spec = importlib.util.spec_from_file_location(\"user_model\", \"{script}\")
module = importlib.util.module_from_spec(spec)
spec.loader.exec_module(module)

producer = getattr(module, \"{function}\", None)
if not callable(producer):
    sys.exit({exit_code})

{body}",
        inserts = inserts,
        script = script_literal,
        function = capability.function_name(),
        exit_code = EXIT_NO_DEFINITION,
        body = body,
    ))
}

fn artifact_basename(path: &Path) -> Result<String, ConversionError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| ConversionError::InvalidUtf8Path {
            path: path.to_path_buf(),
        })
}

fn path_literal(path: &Path) -> Result<String, ConversionError> {
    let s = path.to_str().ok_or_else(|| ConversionError::InvalidUtf8Path {
        path: path.to_path_buf(),
    })?;
    Ok(s.replace('\\', "/"))
}

/// Collect `shape_<N>.brep` handoff files in index order and import the
/// shape each carries.
fn import_handoffs(
    kernel: &dyn GeometryKernel,
    dir: &Path,
) -> Result<Vec<(usize, Shape)>, ConversionError> {
    let mut files: Vec<(usize, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(index) = parse_handoff_index(name) {
            files.push((index, path));
        }
    }
    files.sort_by_key(|(index, _)| *index);

    let mut nodes = Vec::with_capacity(files.len());
    for (index, path) in files {
        let mut shapes = kernel.import(&path)?;
        if shapes.is_empty() {
            return Err(ConversionError::InvalidShape {
                reason: format!("handoff file '{}' contains no shape", path.display()),
            });
        }
        nodes.push((index, shapes.remove(0)));
    }
    Ok(nodes)
}

fn parse_handoff_index(name: &str) -> Option<usize> {
    name.strip_prefix("shape_")?
        .strip_suffix(".brep")?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::mock::{MockKernel, ShapeFixture};
    use crate::kernel::BoundingBox;

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn test_config(scratch: &Path) -> ConversionConfig {
        ConversionConfig {
            scratch_root: Some(scratch.to_path_buf()),
            ..ConversionConfig::default()
        }
    }

    // A stand-in for the CAD scripting API: any object with exportBrep.
    const PART_SCRIPT: &str = "\
class FakeShape:
    def exportBrep(self, path):
        with open(path, \"wb\") as f:
            f.write(b\"brep-handoff\")

def produces_part():
    return FakeShape()
";

    const ASSEMBLY_SCRIPT: &str = "\
class FakeShape:
    def exportBrep(self, path):
        with open(path, \"wb\") as f:
            f.write(b\"brep-handoff\")

def produces_assembly():
    return [FakeShape(), FakeShape(), FakeShape()]
";

    const EMPTY_SCRIPT: &str = "VALUE = 42\n";

    #[test]
    fn test_wrapper_probes_capability() {
        let source = wrapper_source(
            Path::new("/work/gear.py"),
            Capability::Part,
            &[],
        )
        .expect("wrapper");
        assert!(source.contains("produces_part"));
        assert!(source.contains("sys.exit(3)"));
        assert!(source.contains("\"/work/gear.py\""));
        assert!(source.contains("sys.path.insert(0, \"/work\")"));
    }

    #[test]
    fn test_assembly_wrapper_includes_checkout_path() {
        let source = wrapper_source(
            Path::new("/work/rig.py"),
            Capability::Assembly,
            &[PathBuf::from("/target/widgets")],
        )
        .expect("wrapper");
        assert!(source.contains("produces_assembly"));
        assert!(source.contains("sys.path.insert(0, \"/target/widgets\")"));
        assert!(source.contains("shape_%d.brep"));
    }

    #[test]
    fn test_handoff_index_parsing() {
        assert_eq!(parse_handoff_index("shape_0.brep"), Some(0));
        assert_eq!(parse_handoff_index("shape_12.brep"), Some(12));
        assert_eq!(parse_handoff_index("shape_.brep"), None);
        assert_eq!(parse_handoff_index("shape_1.step"), None);
        assert_eq!(parse_handoff_index("resolve_part.py"), None);
    }

    #[tokio::test]
    async fn test_part_script_resolves_single_artifact() {
        if !python_available() {
            return;
        }
        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("gear.py");
        std::fs::write(&script, PART_SCRIPT).expect("write");

        let kernel = MockKernel::new();
        kernel.register_fallback(vec![ShapeFixture::solid(
            vec![0.0; 9],
            BoundingBox::new(0.0, 0.0, 0.0, 8.0, 2.0, 2.0),
        )]);
        let cache = ArtifactCache::new(temp.path().join("cache")).expect("cache");
        let metrics = ConversionMetrics::new();

        let converter = ScriptConverter::new(&test_config(temp.path()));
        let outcome = converter
            .convert(
                &kernel,
                &cache,
                &metrics,
                &script,
                "f00d",
                temp.path(),
                None,
            )
            .await
            .expect("convert");

        assert_eq!(outcome.artifact_names, vec!["f00d_0.json".to_string()]);
        assert_eq!(outcome.max_dimension, 8.0);
        assert!(cache.artifact_path("f00d", 0).exists());
    }

    #[tokio::test]
    async fn test_assembly_script_resolves_placeholder_dimension() {
        if !python_available() {
            return;
        }
        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("rig.py");
        std::fs::write(&script, ASSEMBLY_SCRIPT).expect("write");

        let kernel = MockKernel::new();
        kernel.register_fallback(vec![ShapeFixture::solid(
            vec![0.0; 9],
            BoundingBox::new(0.0, 0.0, 0.0, 1.0, 1.0, 1.0),
        )]);
        let cache = ArtifactCache::new(temp.path().join("cache")).expect("cache");
        let metrics = ConversionMetrics::new();

        let converter = ScriptConverter::new(&test_config(temp.path()));
        let outcome = converter
            .convert(
                &kernel,
                &cache,
                &metrics,
                &script,
                "beef",
                temp.path(),
                None,
            )
            .await
            .expect("convert");

        assert_eq!(
            outcome.artifact_names,
            vec![
                "beef_0.json".to_string(),
                "beef_1.json".to_string(),
                "beef_2.json".to_string(),
            ]
        );
        assert_eq!(outcome.max_dimension, ASSEMBLY_PLACEHOLDER_DIMENSION);
        assert_eq!(metrics.snapshot().shapes_converted, 3);
    }

    #[tokio::test]
    async fn test_script_with_neither_capability_is_terminal() {
        if !python_available() {
            return;
        }
        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("empty.py");
        std::fs::write(&script, EMPTY_SCRIPT).expect("write");

        let kernel = MockKernel::new();
        let cache = ArtifactCache::new(temp.path().join("cache")).expect("cache");
        let metrics = ConversionMetrics::new();

        let converter = ScriptConverter::new(&test_config(temp.path()));
        let result = converter
            .convert(
                &kernel,
                &cache,
                &metrics,
                &script,
                "dead",
                temp.path(),
                None,
            )
            .await;

        assert!(matches!(
            result,
            Err(ConversionError::ScriptResolution { .. })
        ));
    }

    #[tokio::test]
    async fn test_crashing_script_reports_failure() {
        if !python_available() {
            return;
        }
        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("broken.py");
        std::fs::write(&script, "raise RuntimeError(\"boom\")\n").expect("write");

        let kernel = MockKernel::new();
        let cache = ArtifactCache::new(temp.path().join("cache")).expect("cache");
        let metrics = ConversionMetrics::new();

        let converter = ScriptConverter::new(&test_config(temp.path()));
        let result = converter
            .convert(
                &kernel,
                &cache,
                &metrics,
                &script,
                "ffff",
                temp.path(),
                None,
            )
            .await;

        match result {
            Err(ConversionError::ScriptFailed { code, stderr, .. }) => {
                assert_ne!(code, EXIT_NO_DEFINITION);
                assert!(stderr.contains("boom"));
            }
            other => panic!("expected ScriptFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_hanging_script_times_out() {
        if !python_available() {
            return;
        }
        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("slow.py");
        std::fs::write(&script, "import time\ntime.sleep(60)\n").expect("write");

        let kernel = MockKernel::new();
        let cache = ArtifactCache::new(temp.path().join("cache")).expect("cache");
        let metrics = ConversionMetrics::new();

        let config = ConversionConfig {
            script_timeout_seconds: 1,
            ..test_config(temp.path())
        };
        let converter = ScriptConverter::new(&config);
        let result = converter
            .convert(
                &kernel,
                &cache,
                &metrics,
                &script,
                "abcd",
                temp.path(),
                None,
            )
            .await;

        assert!(matches!(
            result,
            Err(ConversionError::ScriptTimeout { timeout_seconds: 1 })
        ));
    }
}
