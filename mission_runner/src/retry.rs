// retry.rs - One retry/poll primitive with fixed backoff, deadline and cancellation
//
// Join, begin and end waits all go through `retry_until_deadline`; `poll_until`
// is the same loop with "condition not yet true" as the retriable error.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Fixed-interval retry bounded by an optional deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    /// `None` waits for as long as the operation keeps failing retriably.
    pub deadline: Option<Duration>,
}

impl RetryPolicy {
    pub const fn bounded(interval: Duration, deadline: Duration) -> Self {
        Self {
            interval,
            deadline: Some(deadline),
        }
    }

    pub const fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }
}

/// A successful result plus how long it took to get there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    DeadlineExceeded {
        last: E,
        attempts: u32,
        elapsed: Duration,
    },

    Fatal { error: E, attempts: u32 },

    Cancelled,
}

/// Sleep for `duration` unless `cancel` fires first. Returns false when cancelled.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => true,
        () = cancel.cancelled() => false,
    }
}

/// Run `op` until it succeeds, fails fatally, the deadline passes or `cancel` fires.
///
/// The deadline is checked only after a failed attempt, so the loop ends no later
/// than one interval (plus one attempt) past it. `op` receives the 1-based attempt.
pub async fn retry_until_deadline<T, E, F, Fut, P>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
    is_retriable: P,
) -> Result<Retried<T>, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }
        attempts += 1;

        let error = match op(attempts).await {
            Ok(value) => {
                return Ok(Retried {
                    value,
                    attempts,
                    elapsed: started.elapsed(),
                })
            }
            Err(error) => error,
        };

        if !is_retriable(&error) {
            return Err(RetryError::Fatal { error, attempts });
        }

        let elapsed = started.elapsed();
        if matches!(policy.deadline, Some(deadline) if elapsed > deadline) {
            return Err(RetryError::DeadlineExceeded {
                last: error,
                attempts,
                elapsed,
            });
        }

        log::trace!("Attempt {} failed retriably, next in {:?}", attempts, policy.interval);
        if !sleep_or_cancel(policy.interval, cancel).await {
            return Err(RetryError::Cancelled);
        }
    }
}

/// How a poll ended when the probe itself never failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Satisfied { polls: u32, elapsed: Duration },
    DeadlineExceeded { polls: u32, elapsed: Duration },
    Cancelled,
}

enum Pending<E> {
    NotYet,
    Failed(E),
}

/// Poll `probe` until it reports true. Probe errors end the poll immediately.
pub async fn poll_until<E, F, Fut>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    mut probe: F,
) -> Result<PollOutcome, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    let result = retry_until_deadline(
        policy,
        cancel,
        |_| {
            let check = probe();
            async move {
                match check.await {
                    Ok(true) => Ok(()),
                    Ok(false) => Err(Pending::NotYet),
                    Err(e) => Err(Pending::Failed(e)),
                }
            }
        },
        |pending| matches!(pending, Pending::NotYet),
    )
    .await;

    match result {
        Ok(done) => Ok(PollOutcome::Satisfied {
            polls: done.attempts,
            elapsed: done.elapsed,
        }),
        Err(RetryError::DeadlineExceeded { attempts, elapsed, .. }) => {
            Ok(PollOutcome::DeadlineExceeded { polls: attempts, elapsed })
        }
        Err(RetryError::Fatal { error: Pending::Failed(e), .. }) => Err(e),
        // NotYet is always retriable, so it never comes back as fatal
        Err(RetryError::Fatal { error: Pending::NotYet, .. }) | Err(RetryError::Cancelled) => {
            Ok(PollOutcome::Cancelled)
        }
    }
}
