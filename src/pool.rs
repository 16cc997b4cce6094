use std::future::Future;

use futures::stream::{self, StreamExt};

/// Runs `f` over every item with at most `workers` futures in flight,
/// collecting outputs in completion order. Completion order is
/// non-deterministic; callers that need a stable order sort afterwards.
pub async fn map_bounded<I, T, R, F, Fut>(workers: usize, items: I, f: F) -> Vec<R>
where
    I: IntoIterator<Item = T>,
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    stream::iter(items.into_iter().map(f))
        .buffer_unordered(workers.max(1))
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn processes_every_item() {
        let mut results = map_bounded(3, 0..20, |n| async move { n * 2 }).await;
        results.sort_unstable();
        assert_eq!(results, (0..20).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn never_exceeds_worker_count() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        map_bounded(4, 0..32, |_| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn zero_workers_still_makes_progress() {
        let results = map_bounded(0, vec![1, 2, 3], |n| async move { n }).await;
        assert_eq!(results.len(), 3);
    }
}
