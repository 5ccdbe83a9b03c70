//! Bounded-concurrency fan-out.

use std::future::Future;

use futures_util::stream::{self, StreamExt};

use crate::Result;

/// What [`try_gather_bounded`] does when one unit of work fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Let every unit finish, then return the first error in input order.
    #[default]
    CompleteAll,
    /// Return the first error as soon as it is observed and drop the
    /// units still running.
    FailFast,
}

/// Run `futures` with at most `max_concurrency` in flight.
///
/// Output order matches input order. `max_concurrency` of 0 is treated as 1.
pub async fn gather_bounded<I, Fut, T>(max_concurrency: usize, futures: I) -> Vec<T>
where
    I: IntoIterator<Item = Fut>,
    Fut: Future<Output = T>,
{
    stream::iter(futures)
        .buffered(max_concurrency.max(1))
        .collect()
        .await
}

/// Fallible [`gather_bounded`] with an explicit [`FailurePolicy`].
pub async fn try_gather_bounded<I, Fut, T>(
    max_concurrency: usize,
    policy: FailurePolicy,
    futures: I,
) -> Result<Vec<T>>
where
    I: IntoIterator<Item = Fut>,
    Fut: Future<Output = Result<T>>,
{
    match policy {
        FailurePolicy::CompleteAll => gather_bounded(max_concurrency, futures)
            .await
            .into_iter()
            .collect(),
        FailurePolicy::FailFast => {
            let futures: Vec<Fut> = futures.into_iter().collect();
            let mut slots: Vec<Option<T>> = futures.iter().map(|_| None).collect();
            let mut running = stream::iter(
                futures
                    .into_iter()
                    .enumerate()
                    .map(|(i, fut)| async move { (i, fut.await) }),
            )
            .buffer_unordered(max_concurrency.max(1));

            while let Some((i, result)) = running.next().await {
                slots[i] = Some(result?);
            }
            Ok(slots.into_iter().flatten().collect())
        }
    }
}
