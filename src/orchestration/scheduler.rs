//! Concurrency-limited, order-preserving map over a batch.
//!
//! Operations are admitted strictly in input order: a semaphore permit is
//! acquired before each operation is spawned, so item `i + 1` never starts
//! ahead of item `i`. Each operation runs as its own tokio task holding its
//! permit until it finishes. Results are collected by awaiting the join
//! handles in input order, so `output[i]` always belongs to `items[i]`.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinError;

use crate::error::SchedulerError;

/// Run `op(i, items[i])` for every item with at most `cap` in flight.
///
/// A panic in one operation is reported at its own index and never affects
/// its siblings. `cap == 0` is treated as 1.
pub async fn map_with_concurrency_limit<I, T, F, Fut>(
    items: Vec<I>,
    cap: usize,
    op: F,
) -> Vec<Result<T, SchedulerError>>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(usize, I) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
{
    let cap = cap.max(1);
    let semaphore = Arc::new(Semaphore::new(cap));
    let mut handles = Vec::with_capacity(items.len());

    for (index, item) in items.into_iter().enumerate() {
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                handles.push(None);
                continue;
            }
        };
        tracing::trace!(index, available = semaphore.available_permits(), "admitting operation");
        let fut = op(index, item);
        handles.push(Some(tokio::spawn(async move {
            let _permit = permit;
            fut.await
        })));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (index, handle) in handles.into_iter().enumerate() {
        let result = match handle {
            Some(handle) => handle.await.map_err(|e| join_error(index, e)),
            None => Err(SchedulerError::Cancelled { index }),
        };
        results.push(result);
    }
    results
}

fn join_error(index: usize, error: JoinError) -> SchedulerError {
    if error.is_panic() {
        let message = panic_message(error.into_panic());
        tracing::warn!(index, %message, "scheduled operation panicked");
        SchedulerError::Panicked { index, message }
    } else {
        SchedulerError::Cancelled { index }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn never_exceeds_cap() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = map_with_concurrency_limit((0..50).collect(), 5, |_, n: u64| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2 + n % 3)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                n
            }
        })
        .await;

        assert_eq!(results.len(), 50);
        assert!(peak.load(Ordering::SeqCst) <= 5);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn zero_cap_runs_one_at_a_time() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = map_with_concurrency_limit(vec![(); 6], 0, |i, ()| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                i
            }
        })
        .await;

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        let order: Vec<usize> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn panic_is_isolated_to_its_index() {
        let results = map_with_concurrency_limit(vec![1, 2, 3], 2, |i, n: i32| async move {
            if i == 1 {
                panic!("boom at {n}");
            }
            n * 10
        })
        .await;

        assert_eq!(results[0].as_ref().unwrap(), &10);
        assert_eq!(results[2].as_ref().unwrap(), &30);
        match &results[1] {
            Err(SchedulerError::Panicked { index, message }) => {
                assert_eq!(*index, 1);
                assert_eq!(message, "boom at 2");
            }
            other => panic!("expected panic at index 1, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_batch_yields_empty_output() {
        let results: Vec<Result<(), SchedulerError>> =
            map_with_concurrency_limit(Vec::<()>::new(), 4, |_, ()| async {}).await;
        assert!(results.is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn output_is_index_aligned(
            delays in proptest::collection::vec(0u64..5, 1..20),
            cap in 1usize..6,
        ) {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_time()
                .build()
                .unwrap();
            let expected = delays.clone();
            let results = rt.block_on(map_with_concurrency_limit(delays, cap, |i, delay| async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                (i, delay)
            }));

            prop_assert_eq!(results.len(), expected.len());
            for (i, result) in results.into_iter().enumerate() {
                let (index, delay) = result.unwrap();
                prop_assert_eq!(index, i);
                prop_assert_eq!(delay, expected[i]);
            }
        }
    }
}
