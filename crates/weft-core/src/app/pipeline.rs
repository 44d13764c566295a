//! Pipelines: stages that each consume the previous stage's value.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use super::manager::ConcurrencyManager;
use crate::domain::{ManagerError, TaskError, TaskOptions, TaskSpec, TaskValue};

type RunPipeline<T> =
    Box<dyn FnOnce(ConcurrencyManager) -> BoxFuture<'static, Result<T, ManagerError>> + Send>;

/// A chain of tasks. Stage `n + 1` is submitted only after stage `n`
/// completed, with stage `n`'s value as its input. Stage output types may
/// differ.
///
/// # Example
/// ```ignore
/// let pipeline = Pipeline::new(TaskSpec::new(|| async { Ok::<_, TaskError>(5) }))
///     .then(|x: i32| async move { Ok(x * 2) })
///     .then(|x: i32| async move { Ok(x.to_string()) });
/// assert_eq!(manager.execute_pipeline(pipeline).await?, "10");
/// ```
pub struct Pipeline<T> {
    run: RunPipeline<T>,
    stages: usize,
}

impl<T: TaskValue> Pipeline<T> {
    /// Start a pipeline with its first task.
    pub fn new(first: TaskSpec<T>) -> Self {
        Self {
            run: Box::new(move |manager| {
                Box::pin(async move { run_stage(&manager, 0, first).await })
            }),
            stages: 1,
        }
    }

    /// Append a stage with default task options.
    pub fn then<U, F, Fut>(self, stage: F) -> Pipeline<U>
    where
        U: TaskValue,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<U, TaskError>> + Send + 'static,
    {
        self.then_with(TaskOptions::default(), stage)
    }

    /// Append a stage. Every attempt of the stage receives a clone of the
    /// input value.
    pub fn then_with<U, F, Fut>(self, options: TaskOptions, stage: F) -> Pipeline<U>
    where
        U: TaskValue,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<U, TaskError>> + Send + 'static,
    {
        let index = self.stages;
        let previous = self.run;
        let stage = Arc::new(stage);
        Pipeline {
            run: Box::new(move |manager| {
                Box::pin(async move {
                    let input = previous(manager.clone()).await?;
                    let spec = TaskSpec::new(move || stage(input.clone())).with_options(options);
                    run_stage(&manager, index, spec).await
                })
            }),
            stages: index + 1,
        }
    }

    /// Number of stages. Never zero.
    pub fn stage_count(&self) -> usize {
        self.stages
    }
}

async fn run_stage<T: TaskValue>(
    manager: &ConcurrencyManager,
    stage: usize,
    spec: TaskSpec<T>,
) -> Result<T, ManagerError> {
    let handle = manager.submit(spec).await;
    let task_id = handle.id();
    debug!(stage, %task_id, "pipeline stage submitted");
    handle
        .wait()
        .await
        .into_result()
        .map_err(|source| ManagerError::PipelineStage {
            stage,
            task_id,
            source,
        })
}

impl ConcurrencyManager {
    /// Run a pipeline to completion.
    ///
    /// Fails with [`ManagerError::PipelineStage`] at the first stage that
    /// does not complete; later stages are never submitted.
    pub async fn execute_pipeline<T: TaskValue>(
        &self,
        pipeline: Pipeline<T>,
    ) -> Result<T, ManagerError> {
        debug!(stages = pipeline.stages, "executing pipeline");
        (pipeline.run)(self.clone()).await
    }
}
