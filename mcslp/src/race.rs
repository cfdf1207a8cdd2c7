//! "First success wins" over a set of concurrent fallible tasks.

use std::future::Future;

use futures_util::{StreamExt, stream::FuturesUnordered};

use crate::Error;

/// Lets the race tell a cancelled task apart from a failed one.
pub trait MaybeCancelled {
    fn is_cancelled(&self) -> bool;
}

impl MaybeCancelled for Error {
    fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Why a race produced no winner.
#[derive(Debug, thiserror::Error)]
pub enum RaceError<E> {
    #[error("no tasks were given to race")]
    Empty,
    #[error("all {} tasks failed", .0.len())]
    AllFailed(Vec<E>),
    #[error("all tasks were cancelled")]
    AllCancelled,
}

/// The winning value, plus every task that had not finished yet.
///
/// The losers are handed back untouched. Whoever owns resources they may still
/// produce is responsible for cancelling and draining them.
pub struct Won<T, F> {
    pub value: T,
    pub losers: FuturesUnordered<F>,
}

impl<T: std::fmt::Debug, F> std::fmt::Debug for Won<T, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Won")
            .field("value", &self.value)
            .field("losers", &self.losers.len())
            .finish()
    }
}

/// Polls every task concurrently and returns the first `Ok`.
///
/// Failures are collected as they arrive; cancellations are dropped. Returns
/// as soon as one task succeeds, without waiting on the rest.
///
/// # Errors
/// [`RaceError::Empty`] for an empty input, [`RaceError::AllFailed`] with one
/// entry per failed task, or [`RaceError::AllCancelled`] if nothing failed
/// outright.
pub async fn race_first_success<I, F, T, E>(tasks: I) -> Result<Won<T, F>, RaceError<E>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
    E: MaybeCancelled,
{
    let mut remaining: FuturesUnordered<F> = tasks.into_iter().collect();
    if remaining.is_empty() {
        return Err(RaceError::Empty);
    }

    let mut failures = Vec::new();
    while let Some(outcome) = remaining.next().await {
        match outcome {
            Ok(value) => {
                return Ok(Won {
                    value,
                    losers: remaining,
                });
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => failures.push(e),
        }
    }

    if failures.is_empty() {
        Err(RaceError::AllCancelled)
    } else {
        Err(RaceError::AllFailed(failures))
    }
}
