//! Bounded fan-out with index-keyed result slots.

use std::future::Future;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Runs `worker` once per item with at most `limit` workers past the
/// semaphore at any moment.
///
/// The returned vector has one slot per input item, in input order,
/// whatever order the workers finish in. Workers that acquire a permit after
/// `cancel` fires never start and report [`Error::Cancelled`].
pub async fn run_bounded<'a, T, R, F, Fut>(
    items: &'a [T],
    limit: usize,
    cancel: &CancellationToken,
    worker: F,
) -> Vec<Result<R>>
where
    F: Fn(usize, &'a T) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let semaphore = Semaphore::new(limit.max(1));
    let mut slots: Vec<Option<Result<R>>> = items.iter().map(|_| None).collect();
    let mut pending = FuturesUnordered::new();

    for (index, item) in items.iter().enumerate() {
        let semaphore = &semaphore;
        let worker = &worker;
        pending.push(async move {
            let outcome = match semaphore.acquire().await {
                Ok(_permit) if !cancel.is_cancelled() => worker(index, item).await,
                _ => Err(Error::Cancelled),
            };
            (index, outcome)
        });
    }

    while let Some((index, outcome)) = pending.next().await {
        slots[index] = Some(outcome);
    }

    slots.into_iter().map(|slot| slot.unwrap_or(Err(Error::Cancelled))).collect()
}

/// Unwraps every slot, or returns the failure that stops the stage:
/// cancellation if the run was cancelled, otherwise the failure in the
/// lowest slot.
///
/// # Errors
///
/// Returns [`Error::Cancelled`] or the first slot's error.
pub fn collect_slots<R>(slots: Vec<Result<R>>, cancel: &CancellationToken) -> Result<Vec<R>> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    slots.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn results_follow_input_order_not_completion_order() {
        let delays = [40_u64, 10, 30, 20];
        let slots = run_bounded(&delays, 2, &CancellationToken::new(), |index, delay| async move {
            tokio::time::sleep(Duration::from_millis(*delay)).await;
            Ok(index * 10)
        })
        .await;

        let values: Vec<usize> = slots.into_iter().map(|slot| slot.unwrap()).collect();
        assert_eq!(values, vec![0, 10, 20, 30]);
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_the_limit() {
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let items: Vec<u64> = (0..12).collect();

        let slots = run_bounded(&items, 3, &CancellationToken::new(), |_, item| {
            let in_flight = &in_flight;
            let peak = &peak;
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5 + item % 4)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert_eq!(slots.len(), 12);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn first_failure_by_position_wins() {
        let items = [0, 1, 2];
        let slots = run_bounded(&items, 3, &CancellationToken::new(), |index, _| async move {
            if index == 0 {
                Ok(index)
            } else {
                Err(Error::Capability(format!("unit {index}")))
            }
        })
        .await;

        let err = collect_slots(slots, &CancellationToken::new()).expect_err("stage should fail");
        assert!(matches!(err, Error::Capability(msg) if msg == "unit 1"));
    }

    #[tokio::test]
    async fn cancelled_before_start_runs_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let started = AtomicUsize::new(0);
        let items = [(), ()];
        let slots = run_bounded(&items, 1, &cancel, |_, ()| {
            started.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await;

        assert_eq!(started.load(Ordering::SeqCst), 0);
        assert!(matches!(collect_slots(slots, &cancel), Err(Error::Cancelled)));
    }
}
