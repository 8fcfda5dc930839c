//! A tool invoker that fakes the toolkit's file outputs.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use super::fixtures::{write_clusters, write_mesh};
use crate::core::{ANATOMICAL_TRACT_COUNT, CLUSTER_COUNT};
use crate::errors::InvokeError;
use crate::tools::{InvocationOutcome, Tool, ToolInvocation, ToolInvoker};

/// Records invocations and writes the files each tool would produce.
///
/// Argument positions follow the command lines the pipeline builds; index
/// 0 is always the script.
#[derive(Debug)]
pub struct ScriptedInvoker {
    calls: Mutex<Vec<ToolInvocation>>,
    failing: HashSet<Tool>,
    cluster_count: usize,
    output_lines: HashMap<Tool, Vec<String>>,
}

impl Default for ScriptedInvoker {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: HashSet::new(),
            cluster_count: CLUSTER_COUNT,
            output_lines: HashMap::new(),
        }
    }
}

impl ScriptedInvoker {
    /// Creates an invoker where every tool succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `tool` exit 1 without writing anything.
    #[must_use]
    pub fn failing(mut self, tool: Tool) -> Self {
        self.failing.insert(tool);
        self
    }

    /// Number of cluster files the clustering tools write.
    #[must_use]
    pub fn with_cluster_count(mut self, count: usize) -> Self {
        self.cluster_count = count;
        self
    }

    /// Output lines a tool reports.
    #[must_use]
    pub fn with_output(mut self, tool: Tool, lines: &[&str]) -> Self {
        self.output_lines
            .insert(tool, lines.iter().map(ToString::to_string).collect());
        self
    }

    /// Every invocation received, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().clone()
    }

    /// Number of invocations of `tool`.
    #[must_use]
    pub fn count(&self, tool: Tool) -> usize {
        self.calls.lock().iter().filter(|c| c.tool() == tool).count()
    }

    /// Total number of invocations.
    #[must_use]
    pub fn total(&self) -> usize {
        self.calls.lock().len()
    }

    /// Invocations of tools other than the per-file transform.
    #[must_use]
    pub fn stage_calls(&self) -> Vec<ToolInvocation> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.tool() != Tool::HardenTransform)
            .cloned()
            .collect()
    }

    fn materialize(&self, inv: &ToolInvocation) {
        let arg = |i: usize| inv.path_arg(i).map(Path::to_path_buf).unwrap_or_default();
        let last = || inv.path_arg(inv.arguments().len() - 1).map(Path::to_path_buf).unwrap_or_default();

        match inv.tool() {
            Tool::RegisterToAtlas => {
                // -mode <m> <input> <atlas> <output root>
                let input = arg(3);
                let stem = file_stem(&input);
                let out = last().join(&stem).join("output_tractography");
                write_mesh(&out.join(format!("{stem}_reg.vtk")));
                write_mesh(&out.join(format!("itk_txform_{stem}.tfm")));
                write_mesh(&last().join(&stem).join("iteration_1").join("it.vtk"));
            }
            Tool::ClusterFromAtlas => {
                // -j N <registered> <atlas> <root> -norender
                let registered = arg(3);
                write_clusters(&arg(5).join(file_stem(&registered)), self.cluster_count);
            }
            Tool::RemoveOutliers => {
                // -j N <initial dir> <atlas> <root>
                let initial = arg(3);
                let name = format!("{}_outlier_removed", file_name(&initial));
                write_clusters(&arg(5).join(name), self.cluster_count);
            }
            Tool::AssessHemisphereLocation => {
                // -clusterLocationFile <file> <dir>
                let dir = arg(3);
                write_mesh(&dir.join("cluster_location_by_hemisphere.log"));
            }
            Tool::HardenTransform => {
                // <input dir> <output dir> <slicer> -t <transform> [-i] -j N
                let out = arg(2);
                std::fs::create_dir_all(&out).unwrap();
                for entry in std::fs::read_dir(arg(1)).unwrap() {
                    let input = entry.unwrap().path();
                    std::fs::copy(&input, out.join(file_name(&input))).unwrap();
                }
            }
            Tool::SeparateByHemisphere => {
                let root = arg(2);
                for group in ["commissural", "left_hemisphere", "right_hemisphere"] {
                    write_clusters(&root.join(format!("tracts_{group}")), self.cluster_count);
                }
            }
            Tool::AppendToAnatomicalTracts => {
                let dir = arg(3);
                for i in 1..=ANATOMICAL_TRACT_COUNT {
                    write_mesh(&dir.join(format!("T_tract_{i:02}.vtp")));
                }
            }
            Tool::DiffusionMeasurements => {
                let csv = arg(2);
                if let Some(parent) = csv.parent() {
                    std::fs::create_dir_all(parent).unwrap();
                }
                std::fs::write(csv, "Name,Num_Fibers\n").unwrap();
            }
        }
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[async_trait]
impl ToolInvoker for ScriptedInvoker {
    async fn invoke(&self, invocation: &ToolInvocation) -> Result<InvocationOutcome, InvokeError> {
        self.calls.lock().push(invocation.clone());

        if self.failing.contains(&invocation.tool()) {
            return Ok(InvocationOutcome::exited(1));
        }
        self.materialize(invocation);

        let mut outcome = InvocationOutcome::exited(0);
        if let Some(lines) = self.output_lines.get(&invocation.tool()) {
            outcome.output.clone_from(lines);
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use crate::testing::fixtures::write_toolkit;

    fn registered_output(root: &Path, stem: &str) -> PathBuf {
        root.join(stem)
            .join("output_tractography")
            .join(format!("{stem}_reg.vtk"))
    }

    #[tokio::test]
    async fn test_register_writes_registered_and_transform() {
        let dir = tempfile::tempdir().unwrap();
        let locator = write_toolkit(&dir.path().join("tk"));
        let out = dir.path().join("TractRegistration");
        let inv = locator
            .invocation(Tool::RegisterToAtlas)
            .unwrap()
            .args(["-mode", "affine"])
            .arg(dir.path().join("subj01.vtk"))
            .arg(dir.path().join("atlas.vtk"))
            .arg(&out);

        let invoker = ScriptedInvoker::new();
        assert!(invoker.invoke(&inv).await.unwrap().success());
        assert!(registered_output(&out, "subj01").is_file());
        assert!(out.join("subj01/output_tractography/itk_txform_subj01.tfm").is_file());
        assert_eq!(invoker.count(Tool::RegisterToAtlas), 1);
    }

    #[tokio::test]
    async fn test_failing_tool_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let locator = write_toolkit(&dir.path().join("tk"));
        let inv = locator
            .invocation(Tool::SeparateByHemisphere)
            .unwrap()
            .arg(dir.path().join("in"))
            .arg(dir.path().join("sep"));

        let invoker = ScriptedInvoker::new().failing(Tool::SeparateByHemisphere);
        let outcome = invoker.invoke(&inv).await.unwrap();
        assert!(!outcome.success());
        assert!(!dir.path().join("sep").exists());
    }
}
