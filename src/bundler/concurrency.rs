//! Bounded parallel execution with per-item failure isolation.

use crate::bundler::error::{Error, Result};
use std::{future::Future, sync::Arc};
use tokio::sync::Semaphore;

/// Runs `op` over every item with at most `limit` operations in flight.
///
/// `None` means unbounded. Every item gets its own result slot: an error or a
/// panic in one operation never affects another. Results come back in input
/// order, paired with their item.
pub async fn run_bounded<T, R, F, Fut>(
    items: Vec<T>,
    limit: Option<usize>,
    op: F,
) -> Vec<(T, Result<R>)>
where
    T: Clone + Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    let semaphore = limit.map(|limit| Arc::new(Semaphore::new(limit.max(1))));

    let handles: Vec<_> = items
        .iter()
        .map(|item| {
            let semaphore = semaphore.clone();
            let operation = op(item.clone());
            tokio::spawn(async move {
                let _permit = match semaphore {
                    Some(semaphore) => Some(semaphore.acquire_owned().await.map_err(|_| {
                        Error::GenericError("concurrency limiter closed".to_string())
                    })?),
                    None => None,
                };
                operation.await
            })
        })
        .collect();

    let mut results = Vec::with_capacity(items.len());
    for (item, handle) in items.into_iter().zip(handles) {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(Error::GenericError(format!("packaging task failed: {e}"))),
        };
        results.push((item, result));
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    #[tokio::test]
    async fn in_flight_never_exceeds_limit() {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = run_bounded((0..20).collect(), Some(3), |n: u32| {
            let current = current.clone();
            let peak = peak.clone();
            async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                Ok(n * 2)
            }
        })
        .await;

        assert_eq!(results.len(), 20);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        for (n, result) in results {
            assert_eq!(result.unwrap(), n * 2);
        }
    }

    #[tokio::test]
    async fn failures_and_panics_stay_in_their_slot() {
        let results = run_bounded(vec![1, 2, 3], None, |n: u32| async move {
            match n {
                2 => Err(Error::GenericError("two".into())),
                3 => panic!("three"),
                _ => Ok(n),
            }
        })
        .await;

        assert_eq!(results[0].0, 1);
        assert_eq!(results[0].1.as_ref().unwrap(), &1);
        assert!(matches!(&results[1].1, Err(Error::GenericError(m)) if m == "two"));
        assert!(results[2].1.is_err());
    }

    #[tokio::test]
    async fn empty_input_yields_no_results() {
        let results = run_bounded(Vec::<u8>::new(), Some(1), |n| async move { Ok(n) }).await;
        assert!(results.is_empty());
    }
}
