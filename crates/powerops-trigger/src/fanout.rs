//! Bounded fan-out with structured cancellation.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::client::{Dispatch, TriggerResponse};
use crate::error::TriggerError;

/// Number of triggers allowed in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Run `f` over every item with at most `limit` futures in flight.
///
/// Results come back in input order. The first error cancels every task that
/// is still waiting or running and is returned as is. Cancelling `cancel`
/// from outside stops the group with [`TriggerError::Cancelled`].
pub async fn run_bounded<I, T, F, Fut>(
  items: Vec<I>,
  limit: usize,
  cancel: CancellationToken,
  f: F,
) -> Result<Vec<T>, TriggerError>
where
  T: Send + 'static,
  F: Fn(I) -> Fut,
  Fut: Future<Output = Result<T, TriggerError>> + Send + 'static,
{
  let semaphore = Arc::new(Semaphore::new(limit.max(1)));
  let group = cancel.child_token();
  let total = items.len();
  let mut tasks = JoinSet::new();

  for (index, item) in items.into_iter().enumerate() {
    let work = f(item);
    let semaphore = semaphore.clone();
    let group = group.clone();

    tasks.spawn(async move {
      let result = async {
        let _permit = tokio::select! {
          permit = semaphore.acquire_owned() => permit.map_err(|_| TriggerError::Cancelled)?,
          _ = group.cancelled() => return Err(TriggerError::Cancelled),
        };
        tokio::select! {
          result = work => result,
          _ = group.cancelled() => Err(TriggerError::Cancelled),
        }
      }
      .await;
      (index, result)
    });
  }

  let mut results: Vec<Option<T>> = (0..total).map(|_| None).collect();

  while let Some(joined) = tasks.join_next().await {
    let failure = match joined {
      Ok((index, Ok(value))) => {
        results[index] = Some(value);
        continue;
      }
      Ok((_, Err(e))) => e,
      Err(e) => TriggerError::Join {
        message: e.to_string(),
      },
    };

    warn!(error = %failure, "fan-out failed, cancelling remaining tasks");
    group.cancel();
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}
    return Err(failure);
  }

  Ok(results.into_iter().flatten().collect())
}

/// Trigger every run through `dispatcher`, [`DEFAULT_CONCURRENCY`] at a time.
pub async fn dispatch_all(
  dispatcher: Arc<dyn Dispatch>,
  runs: Vec<String>,
  cancel: CancellationToken,
) -> Result<Vec<TriggerResponse>, TriggerError> {
  run_bounded(runs, DEFAULT_CONCURRENCY, cancel, move |run| {
    let dispatcher = dispatcher.clone();
    async move { dispatcher.dispatch(&run).await }
  })
  .await
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  #[tokio::test]
  async fn test_results_keep_input_order() {
    let results = run_bounded(vec![30u64, 10, 20], 5, CancellationToken::new(), |ms| async move {
      tokio::time::sleep(Duration::from_millis(ms)).await;
      Ok(ms)
    })
    .await
    .unwrap();

    assert_eq!(results, vec![30, 10, 20]);
  }

  #[tokio::test]
  async fn test_concurrency_is_bounded() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let items: Vec<usize> = (0..12).collect();
    let (r, p) = (running.clone(), peak.clone());
    run_bounded(items, DEFAULT_CONCURRENCY, CancellationToken::new(), move |i| {
      let running = r.clone();
      let peak = p.clone();
      async move {
        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        running.fetch_sub(1, Ordering::SeqCst);
        Ok(i)
      }
    })
    .await
    .unwrap();

    assert!(peak.load(Ordering::SeqCst) <= DEFAULT_CONCURRENCY);
    assert!(peak.load(Ordering::SeqCst) >= 2);
  }

  #[tokio::test]
  async fn test_first_failure_cancels_the_rest() {
    let finished = Arc::new(AtomicUsize::new(0));
    let counter = finished.clone();

    let err = run_bounded((0..8).collect(), 8, CancellationToken::new(), move |i: u32| {
      let finished = counter.clone();
      async move {
        if i == 0 {
          return Err(TriggerError::Status {
            run: format!("RUN_{i}"),
            status: 500,
            body: "boom".to_string(),
          });
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
        finished.fetch_add(1, Ordering::SeqCst);
        Ok(i)
      }
    })
    .await
    .unwrap_err();

    assert!(matches!(err, TriggerError::Status { status: 500, .. }));
    assert_eq!(finished.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_external_cancel() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = run_bounded(vec![1], 1, cancel, |i| async move {
      tokio::time::sleep(Duration::from_secs(5)).await;
      Ok(i)
    })
    .await
    .unwrap_err();

    assert!(matches!(err, TriggerError::Cancelled));
  }

  #[tokio::test]
  async fn test_empty_input() {
    let results: Vec<u8> = run_bounded(Vec::<u8>::new(), 5, CancellationToken::new(), |i| async move { Ok(i) })
      .await
      .unwrap();
    assert!(results.is_empty());
  }
}
