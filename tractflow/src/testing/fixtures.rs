//! Test fixtures for atlas bundles, toolkits and meshes.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::config::{AtlasReference, RunConfiguration, CLUSTERING_ATLAS_DIR, CLUSTER_LOCATION_FILE, REGISTRATION_ATLAS_DIR};
use crate::core::RegistrationMode;
use crate::tools::{Tool, ToolchainLocator};

const MESH: &str = "# vtk DataFile Version 4.2\nvtk output\nASCII\nDATASET POLYDATA\nPOINTS 2 float\n0 0 0 1 1 1\nLINES 1 3\n2 0 1\n";
const EMPTY_MESH: &str = "# vtk DataFile Version 4.2\nvtk output\nASCII\nDATASET POLYDATA\nPOINTS 0 float\n";

fn write(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

/// Writes a one-line mesh.
pub fn write_mesh(path: &Path) {
    write(path, MESH);
}

/// Writes a mesh with no cells.
pub fn write_empty_mesh(path: &Path) {
    write(path, EMPTY_MESH);
}

/// Writes `count` cluster meshes `cluster_00001.vtp…` into `dir`.
pub fn write_clusters(dir: &Path, count: usize) {
    std::fs::create_dir_all(dir).unwrap();
    for i in 1..=count {
        write_mesh(&dir.join(format!("cluster_{i:05}.vtp")));
    }
}

/// Writes a minimal atlas bundle rooted at `dir`.
pub fn write_atlas_bundle(dir: &Path) {
    write(&dir.join(REGISTRATION_ATLAS_DIR).join("registration_atlas.vtk"), MESH);
    write(
        &dir.join(CLUSTERING_ATLAS_DIR).join(CLUSTER_LOCATION_FILE),
        "cluster_00001 c\n",
    );
}

/// Writes a fake toolkit under `dir` and returns its locator.
pub fn write_toolkit(dir: &Path) -> ToolchainLocator {
    let interpreter = dir.join("bin").join("PythonSlicer");
    write(&interpreter, "");
    let scripts = dir.join("lib").join("Python").join("bin");
    for tool in Tool::ALL {
        write(&scripts.join(tool.script_name()), "");
    }
    let cli = dir.join("cli-modules").join("FiberTractMeasurements");
    write(&cli, "");
    let slicer = dir.join("Slicer");
    write(&slicer, "");
    ToolchainLocator::new(interpreter, scripts)
        .with_measurement_cli(cli)
        .with_slicer(slicer)
}

/// A self-contained run environment in a temporary directory.
pub struct TestWorkspace {
    /// Owns the temporary directory.
    pub dir: TempDir,
    /// Input tractography.
    pub input: PathBuf,
    /// Output root.
    pub output: PathBuf,
    /// Atlas bundle.
    pub atlas: AtlasReference,
    /// Fake toolkit.
    pub locator: ToolchainLocator,
}

impl TestWorkspace {
    /// Creates a workspace whose input is `<case>.vtk`.
    #[must_use]
    pub fn new(case: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        let input = root.join("data").join(format!("{case}.vtk"));
        write_mesh(&input);
        let atlas_dir = root.join("atlas").join("ORG-Atlases-1.1.1");
        write_atlas_bundle(&atlas_dir);
        let atlas = AtlasReference::discover(atlas_dir.parent().unwrap()).unwrap();
        let locator = write_toolkit(&root.join("Slicer"));
        let output = root.join("out");

        Self {
            dir,
            input,
            output,
            atlas,
            locator,
        }
    }

    /// Run configuration with 4 threads.
    #[must_use]
    pub fn config(&self, mode: RegistrationMode, retain_intermediates: bool) -> RunConfiguration {
        RunConfiguration::new(&self.input, &self.output, mode, 4, retain_intermediates).unwrap()
    }
}
