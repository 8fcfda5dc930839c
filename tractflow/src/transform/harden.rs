//! Per-file application of a registration transform over a cluster folder.

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::mesh::{count_cells, is_mesh_file};
use super::TransformError;
use crate::errors::ResolutionError;
use crate::tools::{InvocationOutcome, Tool, ToolInvoker, ToolchainLocator};

/// Applies a transform to a single mesh file.
#[async_trait]
pub trait MeshTransformer: Send + Sync {
    /// Checks that the transformer can run at all, before any file is touched.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying tool is not installed.
    fn ensure_ready(&self) -> Result<(), ResolutionError> {
        Ok(())
    }

    /// Writes `input` transformed by `transform` to `output`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transform could not be run at all.
    async fn transform(
        &self,
        input: &Path,
        output: &Path,
        transform: &Path,
        inverse: bool,
    ) -> Result<InvocationOutcome, TransformError>;
}

/// Transformer running the toolkit's harden script once per file.
///
/// The script works on folders, so each file is staged alone in a scratch
/// folder next to its output and the result is renamed into place. An
/// interrupted invocation never leaves a partial output behind.
pub struct ToolMeshTransformer {
    locator: Arc<ToolchainLocator>,
    invoker: Arc<dyn ToolInvoker>,
}

impl ToolMeshTransformer {
    /// Creates a transformer sharing the run's locator and invoker.
    #[must_use]
    pub fn new(locator: Arc<ToolchainLocator>, invoker: Arc<dyn ToolInvoker>) -> Self {
        Self { locator, invoker }
    }
}

#[async_trait]
impl MeshTransformer for ToolMeshTransformer {
    fn ensure_ready(&self) -> Result<(), ResolutionError> {
        self.locator.script(Tool::HardenTransform)?;
        self.locator.slicer().map(|_| ())
    }

    async fn transform(
        &self,
        input: &Path,
        output: &Path,
        transform: &Path,
        inverse: bool,
    ) -> Result<InvocationOutcome, TransformError> {
        let (Some(name), Some(parent)) = (input.file_name(), output.parent()) else {
            return Ok(InvocationOutcome::exited(1));
        };
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| TransformError::Io { path, source }
        };

        let scratch = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(parent)
            .map_err(io_err(parent))?;
        let staged_in = scratch.path().join("in");
        let staged_out = scratch.path().join("out");
        std::fs::create_dir(&staged_in).map_err(io_err(&staged_in))?;
        std::fs::create_dir(&staged_out).map_err(io_err(&staged_out))?;
        let staged = staged_in.join(name);
        if std::fs::hard_link(input, &staged).is_err() {
            std::fs::copy(input, &staged).map_err(io_err(&staged))?;
        }

        // inputDirectory outputDirectory Slicer -t <transform> [-i] -j 1
        let mut invocation = self
            .locator
            .invocation(Tool::HardenTransform)?
            .arg(&staged_in)
            .arg(&staged_out)
            .arg(self.locator.slicer()?)
            .arg("-t")
            .arg(transform);
        if inverse {
            invocation = invocation.arg("-i");
        }
        let invocation = invocation.args(["-j", "1"]);
        let outcome = self.invoker.invoke(&invocation).await?;

        let produced = staged_out.join(name);
        if outcome.success() && produced.is_file() {
            std::fs::rename(&produced, output).map_err(io_err(output))?;
        }
        Ok(outcome)
    }
}

/// Prefix of the per-file scratch folders created in an output folder.
const SCRATCH_PREFIX: &str = ".harden-";

/// Copies `input` to `output` through a temporary name, so `output` only
/// ever exists complete.
fn copy_into_place(input: &Path, output: &Path) -> Result<(), TransformError> {
    let partial = output.with_extension("partial");
    let io_err = |source| TransformError::Io {
        path: output.to_path_buf(),
        source,
    };
    std::fs::copy(input, &partial).map_err(io_err)?;
    std::fs::rename(&partial, output).map_err(io_err)
}

/// One transform pass from an input folder to an output folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HardenPass {
    /// Folder of meshes to transform.
    pub input_dir: PathBuf,
    /// Folder receiving the results.
    pub output_dir: PathBuf,
    /// Transform file.
    pub transform: PathBuf,
    /// Apply the inverse transform.
    pub inverse: bool,
}

impl HardenPass {
    /// Creates a pass applying the inverse of `transform`.
    #[must_use]
    pub fn inverse(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, transform: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            transform: transform.into(),
            inverse: true,
        }
    }
}

/// What happened to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOutcome {
    Transformed,
    CopiedEmpty,
    SkippedExisting,
    Failed,
}

/// Counts of a finished pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HardenSummary {
    /// Files written by the transform tool.
    pub transformed: usize,
    /// Zero-cell meshes copied through unchanged.
    pub copied_empty: usize,
    /// Files whose output already existed.
    pub skipped_existing: usize,
    /// Files the tool did not produce.
    pub failed: Vec<PathBuf>,
}

impl HardenSummary {
    /// Total number of input files seen.
    #[must_use]
    pub fn total(&self) -> usize {
        self.transformed + self.copied_empty + self.skipped_existing + self.failed.len()
    }

    fn record(&mut self, outcome: FileOutcome, input: PathBuf) {
        match outcome {
            FileOutcome::Transformed => self.transformed += 1,
            FileOutcome::CopiedEmpty => self.copied_empty += 1,
            FileOutcome::SkippedExisting => self.skipped_existing += 1,
            FileOutcome::Failed => self.failed.push(input),
        }
    }
}

/// Lists the mesh files of a folder in name order.
///
/// # Errors
///
/// Returns an error if the folder cannot be read.
pub fn list_meshes(dir: &Path) -> Result<Vec<PathBuf>, TransformError> {
    let entries = std::fs::read_dir(dir).map_err(|source| TransformError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_mesh_file(p))
        .collect();
    files.sort();
    Ok(files)
}

/// Runs one pass over a worker pool of `threads` concurrent files.
///
/// Existing outputs are kept, so an interrupted pass resumes where it
/// stopped. A missing input folder yields an empty summary; the stage's
/// checkpoint then reports what is missing.
///
/// # Errors
///
/// Returns an error if the tool is missing, a process cannot be launched,
/// the run is cancelled, or the output folder cannot be written.
pub async fn run_pass(
    pass: &HardenPass,
    transformer: &dyn MeshTransformer,
    threads: usize,
) -> Result<HardenSummary, TransformError> {
    transformer.ensure_ready()?;

    if !pass.input_dir.is_dir() {
        warn!(input = %pass.input_dir.display(), "Harden pass input folder is missing");
        return Ok(HardenSummary::default());
    }
    let files = list_meshes(&pass.input_dir)?;
    std::fs::create_dir_all(&pass.output_dir).map_err(|source| TransformError::Io {
        path: pass.output_dir.clone(),
        source,
    })?;

    info!(
        files = files.len(),
        threads,
        input = %pass.input_dir.display(),
        output = %pass.output_dir.display(),
        inverse = pass.inverse,
        "Applying transform"
    );

    let outcomes: Vec<(PathBuf, FileOutcome)> = stream::iter(files)
        .map(|input| async move {
            let outcome = harden_file(pass, transformer, &input).await?;
            Ok::<_, TransformError>((input, outcome))
        })
        .buffer_unordered(threads.max(1))
        .try_collect()
        .await?;

    let mut summary = HardenSummary::default();
    for (input, outcome) in outcomes {
        summary.record(outcome, input);
    }
    summary.failed.sort();
    Ok(summary)
}

async fn harden_file(
    pass: &HardenPass,
    transformer: &dyn MeshTransformer,
    input: &Path,
) -> Result<FileOutcome, TransformError> {
    let Some(name) = input.file_name() else {
        return Ok(FileOutcome::Failed);
    };
    let output = pass.output_dir.join(name);
    if output.exists() {
        return Ok(FileOutcome::SkippedExisting);
    }

    match count_cells(input) {
        Ok(0) => {
            debug!(file = %input.display(), "Copying empty mesh");
            copy_into_place(input, &output)?;
            return Ok(FileOutcome::CopiedEmpty);
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Could not inspect mesh; transforming anyway"),
    }

    let outcome = transformer
        .transform(input, &output, &pass.transform, pass.inverse)
        .await?;
    if output.is_file() {
        Ok(FileOutcome::Transformed)
    } else {
        warn!(file = %input.display(), exit = %outcome.exit, "Transform produced no output");
        Ok(FileOutcome::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::InvokeError;
    use crate::testing::fixtures::{write_empty_mesh, write_mesh, write_toolkit};
    use crate::testing::ScriptedInvoker;
    use crate::tools::ToolInvocation;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    /// Copies input to output and records each call.
    #[derive(Default)]
    struct CopyTransformer {
        calls: Mutex<Vec<(PathBuf, bool)>>,
        skip: Option<&'static str>,
    }

    #[async_trait]
    impl MeshTransformer for CopyTransformer {
        async fn transform(
            &self,
            input: &Path,
            output: &Path,
            _transform: &Path,
            inverse: bool,
        ) -> Result<InvocationOutcome, TransformError> {
            self.calls.lock().push((input.to_path_buf(), inverse));
            if self.skip.is_some_and(|s| input.ends_with(s)) {
                return Ok(InvocationOutcome::exited(1));
            }
            std::fs::copy(input, output).unwrap();
            Ok(InvocationOutcome::exited(0))
        }
    }

    struct CancelledTransformer;

    #[async_trait]
    impl MeshTransformer for CancelledTransformer {
        async fn transform(&self, _: &Path, _: &Path, _: &Path, _: bool) -> Result<InvocationOutcome, TransformError> {
            Err(InvokeError::Cancelled {
                command: "harden".to_string(),
                reason: "interrupted".to_string(),
            }
            .into())
        }
    }

    fn pass(root: &Path) -> HardenPass {
        HardenPass::inverse(root.join("in"), root.join("out"), root.join("t.tfm"))
    }

    #[tokio::test]
    async fn test_pass_transforms_copies_and_skips() {
        let root = tempfile::tempdir().unwrap();
        let pass = pass(root.path());
        write_mesh(&pass.input_dir.join("cluster_00001.vtp"));
        write_mesh(&pass.input_dir.join("cluster_00002.vtp"));
        write_empty_mesh(&pass.input_dir.join("cluster_00003.vtp"));
        write_mesh(&pass.input_dir.join("cluster_00004.vtp"));
        std::fs::write(pass.input_dir.join("notes.txt"), "x").unwrap();
        std::fs::create_dir_all(&pass.output_dir).unwrap();
        std::fs::write(pass.output_dir.join("cluster_00004.vtp"), "done").unwrap();

        let transformer = CopyTransformer::default();
        let summary = run_pass(&pass, &transformer, 4).await.unwrap();

        assert_eq!(
            summary,
            HardenSummary {
                transformed: 2,
                copied_empty: 1,
                skipped_existing: 1,
                failed: Vec::new(),
            }
        );
        assert_eq!(summary.total(), 4);
        assert_eq!(transformer.calls.lock().len(), 2);
        assert!(transformer.calls.lock().iter().all(|(_, inverse)| *inverse));
        assert_eq!(
            std::fs::read_to_string(pass.output_dir.join("cluster_00004.vtp")).unwrap(),
            "done"
        );
    }

    #[tokio::test]
    async fn test_empty_mesh_copied_byte_identical() {
        let root = tempfile::tempdir().unwrap();
        let pass = pass(root.path());
        let input = pass.input_dir.join("cluster_00042.vtp");
        write_empty_mesh(&input);

        let transformer = CopyTransformer::default();
        run_pass(&pass, &transformer, 1).await.unwrap();

        assert!(transformer.calls.lock().is_empty());
        assert_eq!(
            std::fs::read(&input).unwrap(),
            std::fs::read(pass.output_dir.join("cluster_00042.vtp")).unwrap()
        );
        assert!(!pass.output_dir.join("cluster_00042.partial").exists());
    }

    #[tokio::test]
    async fn test_missing_output_is_failed() {
        let root = tempfile::tempdir().unwrap();
        let pass = pass(root.path());
        write_mesh(&pass.input_dir.join("cluster_00001.vtp"));
        write_mesh(&pass.input_dir.join("cluster_00002.vtp"));

        let transformer = CopyTransformer {
            skip: Some("cluster_00002.vtp"),
            ..CopyTransformer::default()
        };
        let summary = run_pass(&pass, &transformer, 2).await.unwrap();
        assert_eq!(summary.transformed, 1);
        assert_eq!(summary.failed, vec![pass.input_dir.join("cluster_00002.vtp")]);
    }

    #[tokio::test]
    async fn test_missing_input_dir_is_empty_summary() {
        let root = tempfile::tempdir().unwrap();
        let summary = run_pass(&pass(root.path()), &CopyTransformer::default(), 2)
            .await
            .unwrap();
        assert_eq!(summary.total(), 0);
        assert!(!root.path().join("out").exists());
    }

    #[tokio::test]
    async fn test_cancellation_propagates() {
        let root = tempfile::tempdir().unwrap();
        let pass = pass(root.path());
        write_mesh(&pass.input_dir.join("cluster_00001.vtp"));

        let err = run_pass(&pass, &CancelledTransformer, 2).await.unwrap_err();
        assert!(matches!(err, TransformError::Invoke(InvokeError::Cancelled { .. })));
    }

    /// Writes a truncated result into the staged output folder, then dies.
    struct KilledMidWrite;

    #[async_trait]
    impl ToolInvoker for KilledMidWrite {
        async fn invoke(&self, invocation: &ToolInvocation) -> Result<InvocationOutcome, InvokeError> {
            let out = invocation.path_arg(2).unwrap();
            std::fs::write(out.join("cluster_00001.vtp"), "# vtk DataFile").unwrap();
            Ok(InvocationOutcome::exited(-9))
        }
    }

    fn entries(dir: &Path) -> Vec<PathBuf> {
        let mut found: Vec<PathBuf> = std::fs::read_dir(dir).unwrap().map(|e| e.unwrap().path()).collect();
        found.sort();
        found
    }

    #[tokio::test]
    async fn test_tool_transformer_stages_file_in_folder_form() {
        let root = tempfile::tempdir().unwrap();
        let locator = Arc::new(write_toolkit(&root.path().join("tk")));
        let invoker = Arc::new(ScriptedInvoker::new());
        let transformer = ToolMeshTransformer::new(Arc::clone(&locator), invoker.clone());
        let pass = pass(root.path());
        let input = pass.input_dir.join("cluster_00001.vtp");
        write_mesh(&input);

        let summary = run_pass(&pass, &transformer, 1).await.unwrap();
        assert_eq!(summary.transformed, 1);

        let calls = invoker.calls();
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert!(call.path_arg(1).unwrap().ends_with("in"));
        assert!(call.path_arg(2).unwrap().ends_with("out"));
        assert_eq!(call.path_arg(3), Some(locator.slicer().unwrap()));
        let flags: Vec<String> = call.arguments()[4..]
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            flags,
            vec!["-t".to_string(), pass.transform.display().to_string(), "-i".to_string(), "-j".to_string(), "1".to_string()]
        );

        assert_eq!(std::fs::read(&input).unwrap(), std::fs::read(pass.output_dir.join("cluster_00001.vtp")).unwrap());
        assert_eq!(entries(&pass.output_dir), vec![pass.output_dir.join("cluster_00001.vtp")]);
    }

    #[tokio::test]
    async fn test_killed_tool_leaves_no_partial_output() {
        let root = tempfile::tempdir().unwrap();
        let locator = Arc::new(write_toolkit(&root.path().join("tk")));
        let transformer = ToolMeshTransformer::new(locator, Arc::new(KilledMidWrite));
        let pass = pass(root.path());
        write_mesh(&pass.input_dir.join("cluster_00001.vtp"));

        let summary = run_pass(&pass, &transformer, 1).await.unwrap();
        assert_eq!(summary.failed, vec![pass.input_dir.join("cluster_00001.vtp")]);
        assert!(entries(&pass.output_dir).is_empty());

        // A rerun transforms the file instead of keeping a truncated result.
        let scripted = ToolMeshTransformer::new(
            Arc::new(write_toolkit(&root.path().join("tk"))),
            Arc::new(ScriptedInvoker::new()),
        );
        let summary = run_pass(&pass, &scripted, 1).await.unwrap();
        assert_eq!(summary.transformed, 1);
    }

    #[tokio::test]
    async fn test_missing_host_application_stops_pass() {
        let root = tempfile::tempdir().unwrap();
        let tk = write_toolkit(&root.path().join("tk"));
        let locator = Arc::new(ToolchainLocator::new(tk.interpreter(), tk.script_dir()));
        let transformer = ToolMeshTransformer::new(locator, Arc::new(ScriptedInvoker::new()));
        let pass = pass(root.path());
        write_mesh(&pass.input_dir.join("cluster_00001.vtp"));

        let err = run_pass(&pass, &transformer, 1).await.unwrap_err();
        assert!(matches!(err, TransformError::Resolution(ResolutionError::Script { .. })));
    }

    #[test]
    fn test_list_meshes_sorted() {
        let root = tempfile::tempdir().unwrap();
        for name in ["b.vtp", "a.vtk", "c.txt"] {
            std::fs::write(root.path().join(name), "x").unwrap();
        }
        let files = list_meshes(root.path()).unwrap();
        assert_eq!(files, vec![root.path().join("a.vtk"), root.path().join("b.vtp")]);
    }
}
