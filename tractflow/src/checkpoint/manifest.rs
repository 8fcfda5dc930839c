//! Persistent per-run manifest of stage status.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::{CaseId, RegistrationMode, StageId, StageStatus};
use crate::utils::iso_timestamp;

/// Current manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

/// Errors reading or writing the run manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Filesystem error on the manifest file.
    #[error("Manifest I/O error at {path}: {source}")]
    Io {
        /// Manifest path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The manifest could not be parsed.
    #[error("Manifest at {path} is unreadable: {source}")]
    Parse {
        /// Manifest path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The manifest could not be serialized.
    #[error("Failed to serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Computes the fingerprint binding a manifest to its inputs.
///
/// Two runs share progress only if case, input path and mode all agree.
/// The input is expected in canonical form, as [`RunConfiguration`] holds it.
///
/// [`RunConfiguration`]: crate::config::RunConfiguration
#[must_use]
pub fn fingerprint(case: &CaseId, input: &Path, mode: RegistrationMode) -> String {
    let mut hasher = Sha256::new();
    hasher.update(case.as_str().as_bytes());
    hasher.update(b"\0");
    hasher.update(input.to_string_lossy().as_bytes());
    hasher.update(b"\0");
    hasher.update(mode.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Recorded state of one stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Last known status.
    pub status: StageStatus,
    /// Number of times the stage has been started.
    #[serde(default)]
    pub attempts: u32,
    /// When the last attempt started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    /// When the last attempt finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    /// Failure message of the last attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The manifest of one output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    /// Format version.
    pub version: u32,
    /// Identifier of the run that created the manifest.
    pub run_id: Uuid,
    /// Case being processed.
    pub case: CaseId,
    /// Registration mode.
    pub mode: RegistrationMode,
    /// Input tractography.
    pub input: PathBuf,
    /// Binding of case, input and mode.
    pub fingerprint: String,
    /// Creation time.
    pub created_at: String,
    /// Last save time.
    pub updated_at: String,
    /// Per-stage records.
    #[serde(default)]
    pub stages: BTreeMap<StageId, StageRecord>,
}

impl RunManifest {
    /// Creates an empty manifest for a run.
    #[must_use]
    pub fn new(case: CaseId, mode: RegistrationMode, input: impl Into<PathBuf>) -> Self {
        let input = input.into();
        let now = iso_timestamp();
        Self {
            version: MANIFEST_VERSION,
            run_id: Uuid::new_v4(),
            fingerprint: fingerprint(&case, &input, mode),
            case,
            mode,
            input,
            created_at: now.clone(),
            updated_at: now,
            stages: BTreeMap::new(),
        }
    }

    /// Reads a manifest if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Option<Self>, ManifestError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ManifestError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| ManifestError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Loads the manifest for this run, or starts a fresh one.
    ///
    /// A manifest written for a different case, input or mode, or one that
    /// cannot be parsed, is discarded. Artifact probes still decide what is
    /// reusable in that case.
    ///
    /// # Errors
    ///
    /// Returns an error only on unreadable (not unparsable) files.
    pub fn load_or_new(
        path: &Path,
        case: &CaseId,
        mode: RegistrationMode,
        input: &Path,
    ) -> Result<Self, ManifestError> {
        let expected = fingerprint(case, input, mode);
        match Self::load(path) {
            Ok(Some(existing)) if existing.fingerprint == expected => {
                debug!(path = %path.display(), run_id = %existing.run_id, "Resuming from manifest");
                Ok(existing)
            }
            Ok(Some(existing)) => {
                warn!(
                    path = %path.display(),
                    previous_case = %existing.case,
                    previous_mode = %existing.mode,
                    "Manifest belongs to a different run; starting fresh"
                );
                Ok(Self::new(case.clone(), mode, input))
            }
            Ok(None) => Ok(Self::new(case.clone(), mode, input)),
            Err(ManifestError::Parse { path, source }) => {
                warn!(path = %path.display(), error = %source, "Discarding unreadable manifest");
                Ok(Self::new(case.clone(), mode, input))
            }
            Err(e) => Err(e),
        }
    }

    /// Writes the manifest atomically (temp file then rename).
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be written.
    pub fn save(&mut self, path: &Path) -> Result<(), ManifestError> {
        self.updated_at = iso_timestamp();
        let json = serde_json::to_string_pretty(self)?;

        let io_err = |source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)
    }

    /// Recorded status of a stage (`Pending` when never recorded).
    #[must_use]
    pub fn status(&self, stage: StageId) -> StageStatus {
        self.stages
            .get(&stage)
            .map(|r| r.status)
            .unwrap_or_default()
    }

    /// Full record of a stage, if any.
    #[must_use]
    pub fn record(&self, stage: StageId) -> Option<&StageRecord> {
        self.stages.get(&stage)
    }

    /// Marks a stage as started.
    pub fn mark_running(&mut self, stage: StageId) {
        let record = self.stages.entry(stage).or_default();
        record.status = StageStatus::Running;
        record.attempts += 1;
        record.started_at = Some(iso_timestamp());
        record.finished_at = None;
        record.error = None;
    }

    /// Marks a stage as verified complete.
    pub fn mark_complete(&mut self, stage: StageId) {
        self.finish(stage, StageStatus::Complete, None);
    }

    /// Marks a stage as failed with a message.
    pub fn mark_failed(&mut self, stage: StageId, error: impl Into<String>) {
        self.finish(stage, StageStatus::Failed, Some(error.into()));
    }

    /// Marks a stage whose outputs were removed by cleanup.
    pub fn mark_pruned(&mut self, stage: StageId) {
        self.finish(stage, StageStatus::Pruned, None);
    }

    fn finish(&mut self, stage: StageId, status: StageStatus, error: Option<String>) {
        let record = self.stages.entry(stage).or_default();
        record.status = status;
        record.finished_at = Some(iso_timestamp());
        record.error = error;
    }

    /// Returns true if every stage finished successfully.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        StageId::ALL.iter().all(|s| self.status(*s).is_success())
    }
}
