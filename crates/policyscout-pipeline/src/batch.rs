//! Fixed-size concurrent batches with a pause between them.

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;

/// Apply `f` to `items` in chunks of `size`, running each chunk concurrently
/// and sleeping `pause` between chunks. Results keep the input order.
pub async fn in_batches<T, R, F, Fut>(items: Vec<T>, size: usize, pause: Duration, f: F) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let size = size.max(1);
    let mut results = Vec::with_capacity(items.len());
    let mut remaining = items.into_iter().peekable();
    let mut first = true;

    while remaining.peek().is_some() {
        if !first && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        first = false;
        let chunk: Vec<T> = remaining.by_ref().take(size).collect();
        results.extend(join_all(chunk.into_iter().map(&f)).await);
    }
    results
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::time::Instant;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn preserves_order_and_pauses_between_chunks() {
        let start = Instant::now();
        let out = in_batches((1..=7).collect(), 3, Duration::from_millis(200), |n: u32| async move {
            tokio::time::sleep(Duration::from_millis(u64::from(10 - n))).await;
            n * 10
        })
        .await;
        assert_eq!(out, vec![10, 20, 30, 40, 50, 60, 70]);
        // Three chunks: two pauses plus the slowest item of each chunk.
        assert_eq!(start.elapsed(), Duration::from_millis(400 + 9 + 6 + 3));
    }

    #[tokio::test(start_paused = true)]
    async fn bounds_concurrency() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        in_batches((0..10).collect(), 3, Duration::ZERO, |_: u32| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await;
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_input() {
        let out: Vec<u8> = in_batches(Vec::<u8>::new(), 3, Duration::from_secs(5), |x| async move { x }).await;
        assert!(out.is_empty());
    }
}
