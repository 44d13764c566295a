//! Composite operations built on `submit`.
//!
//! Task failures are data: every operation here reports them inside the
//! returned results, except `map_reduce`'s reduce step and `race`/`scatter`
//! argument errors.

use std::future::Future;
use std::sync::Arc;

use futures::future::{join_all, select_all};
use tracing::debug;

use super::handle::TaskHandle;
use super::manager::ConcurrencyManager;
use crate::domain::{ManagerError, TaskError, TaskResult, TaskSpec, TaskValue};

impl ConcurrencyManager {
    /// Submit every task; handles are returned in input order.
    pub async fn submit_batch<T: TaskValue>(
        &self,
        specs: impl IntoIterator<Item = TaskSpec<T>>,
    ) -> Vec<TaskHandle<T>> {
        let mut handles = Vec::new();
        for spec in specs {
            handles.push(self.submit(spec).await);
        }
        handles
    }

    /// Submit all tasks, then wait for all of them. Results follow input
    /// order regardless of completion order.
    pub async fn execute_parallel<T: TaskValue>(
        &self,
        specs: impl IntoIterator<Item = TaskSpec<T>>,
    ) -> Vec<TaskResult<T>> {
        let handles = self.submit_batch(specs).await;
        join_all(handles.iter().map(|handle| handle.wait())).await
    }

    /// Run tasks one after another. A failure does not stop the remaining
    /// tasks; callers that need to halt should inspect the results.
    pub async fn execute_sequential<T: TaskValue>(
        &self,
        specs: impl IntoIterator<Item = TaskSpec<T>>,
    ) -> Vec<TaskResult<T>> {
        let mut results = Vec::new();
        for spec in specs {
            let handle = self.submit(spec).await;
            results.push(handle.wait().await);
        }
        results
    }

    /// Resolve with the first task to reach any terminal state, then cancel
    /// the others. Losers are signalled, not awaited.
    pub async fn race<T: TaskValue>(
        &self,
        specs: impl IntoIterator<Item = TaskSpec<T>>,
    ) -> Result<TaskResult<T>, ManagerError> {
        let specs: Vec<_> = specs.into_iter().collect();
        if specs.is_empty() {
            return Err(ManagerError::EmptyRace);
        }

        let handles = self.submit_batch(specs).await;
        let (winner, index, _) =
            select_all(handles.iter().map(|handle| Box::pin(handle.wait()))).await;
        debug!(winner = %winner.task_id, status = %winner.status, "race decided");

        for (i, handle) in handles.iter().enumerate() {
            if i != index {
                self.cancel_task(handle.id()).await;
            }
        }
        Ok(winner)
    }

    /// Run `map` over every element as its own task, drop failed elements,
    /// then run `reduce` over the successful values as one more task.
    ///
    /// Fails with [`ManagerError::Reduce`] if the reduce task does not
    /// complete.
    pub async fn map_reduce<I, M, R, MF, MFut, RF, RFut>(
        &self,
        data: Vec<I>,
        map: MF,
        reduce: RF,
    ) -> Result<R, ManagerError>
    where
        I: TaskValue,
        M: TaskValue,
        R: TaskValue,
        MF: Fn(I) -> MFut + Send + Sync + 'static,
        MFut: Future<Output = Result<M, TaskError>> + Send + 'static,
        RF: Fn(Vec<M>) -> RFut + Send + Sync + 'static,
        RFut: Future<Output = Result<R, TaskError>> + Send + 'static,
    {
        let map = Arc::new(map);
        let specs = data.into_iter().map(|item| {
            let map = Arc::clone(&map);
            TaskSpec::new(move || map(item.clone()))
        });
        let mapped = self.execute_parallel(specs).await;
        let total = mapped.len();
        let values: Vec<M> = mapped
            .into_iter()
            .filter_map(|result| result.into_result().ok())
            .collect();
        debug!(total, succeeded = values.len(), "map phase finished");

        let reduce = Arc::new(reduce);
        let handle = self
            .submit(TaskSpec::new(move || reduce(values.clone())))
            .await;
        let task_id = handle.id();
        handle
            .wait()
            .await
            .into_result()
            .map_err(|source| ManagerError::Reduce { task_id, source })
    }

    /// Split `data` into `workers` contiguous chunks of near-equal size, run
    /// `process` once per chunk, and concatenate the successful outputs in
    /// chunk order. Failed chunks contribute nothing.
    pub async fn scatter<I, T, F, Fut>(
        &self,
        data: Vec<I>,
        workers: usize,
        process: F,
    ) -> Result<Vec<T>, ManagerError>
    where
        I: TaskValue,
        T: TaskValue,
        F: Fn(Vec<I>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<T>, TaskError>> + Send + 'static,
    {
        if workers == 0 {
            return Err(ManagerError::NoWorkers);
        }

        let process = Arc::new(process);
        let specs = partition(data, workers).into_iter().map(|chunk| {
            let process = Arc::clone(&process);
            TaskSpec::new(move || process(chunk.clone()))
        });
        let results = self.execute_parallel(specs).await;

        Ok(results
            .into_iter()
            .filter_map(|result| result.into_result().ok())
            .flatten()
            .collect())
    }
}

/// Balanced contiguous chunks: sizes differ by at most one, larger chunks
/// first. Empty chunks are omitted.
fn partition<I>(data: Vec<I>, workers: usize) -> Vec<Vec<I>> {
    let len = data.len();
    let base = len / workers;
    let extra = len % workers;

    let mut items = data.into_iter();
    (0..workers)
        .map(|i| if i < extra { base + 1 } else { base })
        .take_while(|&size| size > 0)
        .map(|size| items.by_ref().take(size).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::even(6, 3, vec![2, 2, 2])]
    #[case::remainder_goes_first(7, 3, vec![3, 2, 2])]
    #[case::more_workers_than_items(2, 5, vec![1, 1])]
    #[case::single_worker(4, 1, vec![4])]
    #[case::empty(0, 3, vec![])]
    fn partition_is_balanced(
        #[case] len: usize,
        #[case] workers: usize,
        #[case] sizes: Vec<usize>,
    ) {
        let data: Vec<usize> = (0..len).collect();
        let chunks = partition(data.clone(), workers);

        assert_eq!(chunks.iter().map(Vec::len).collect::<Vec<_>>(), sizes);
        assert_eq!(chunks.concat(), data);
    }
}
