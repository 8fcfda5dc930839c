//! Pipeline builder with validation.

use std::sync::Arc;

use super::executor::PipelineExecutor;
use super::stages::StagePlanner;
use crate::cancellation::CancellationToken;
use crate::config::{AtlasReference, RunConfiguration};
use crate::errors::InputError;
use crate::events::{EventSink, LoggingEventSink};
use crate::tools::{SubprocessInvoker, ToolInvoker, ToolchainLocator};
use crate::transform::{MeshTransformer, ToolMeshTransformer};

/// Builder for creating validated pipeline executors.
///
/// Only the run configuration, atlas and toolchain are required. Real
/// subprocesses, the per-file harden tool and a logging sink are used
/// unless replaced.
pub struct PipelineBuilder {
    config: RunConfiguration,
    atlas: AtlasReference,
    locator: Arc<ToolchainLocator>,
    invoker: Option<Arc<dyn ToolInvoker>>,
    transformer: Option<Arc<dyn MeshTransformer>>,
    sink: Arc<dyn EventSink>,
    cancel: Arc<CancellationToken>,
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("config", &self.config)
            .field("atlas", &self.atlas)
            .field("locator", &self.locator)
            .field("custom_invoker", &self.invoker.is_some())
            .field("custom_transformer", &self.transformer.is_some())
            .finish_non_exhaustive()
    }
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(
        config: RunConfiguration,
        atlas: AtlasReference,
        locator: impl Into<Arc<ToolchainLocator>>,
    ) -> Self {
        Self {
            config,
            atlas,
            locator: locator.into(),
            invoker: None,
            transformer: None,
            sink: Arc::new(LoggingEventSink::default()),
            cancel: Arc::new(CancellationToken::new()),
        }
    }

    /// Runs tools through `invoker` instead of real subprocesses.
    #[must_use]
    pub fn invoker(mut self, invoker: Arc<dyn ToolInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    /// Applies transforms through `transformer`.
    #[must_use]
    pub fn transformer(mut self, transformer: Arc<dyn MeshTransformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    /// Sends pipeline events to `sink`.
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Stops the run when `cancel` fires.
    #[must_use]
    pub fn cancellation(mut self, cancel: Arc<CancellationToken>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the configuration being built for.
    #[must_use]
    pub fn config(&self) -> &RunConfiguration {
        &self.config
    }

    /// Builds the executor.
    ///
    /// # Errors
    ///
    /// Returns an error if the atlas bundle is incomplete.
    pub fn build(self) -> Result<PipelineExecutor, InputError> {
        self.atlas.validate()?;

        let invoker = self.invoker.unwrap_or_else(|| {
            Arc::new(
                SubprocessInvoker::new(Arc::clone(&self.sink), Arc::clone(&self.cancel))
                    .with_timeout(self.config.tool_timeout()),
            )
        });
        let transformer = self.transformer.unwrap_or_else(|| {
            Arc::new(ToolMeshTransformer::new(
                Arc::clone(&self.locator),
                Arc::clone(&invoker),
            ))
        });
        let plans = StagePlanner::new(&self.config, self.atlas, self.locator);

        Ok(PipelineExecutor::new(
            self.config,
            plans,
            invoker,
            transformer,
            self.sink,
            self.cancel,
        ))
    }
}
