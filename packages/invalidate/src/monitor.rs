//! Polling an invalidation until the CDN reports it complete.

use std::time::Duration;

use futures::Stream;
use s3pub_models::InvalidationRequest;
use s3pub_store::CdnClient;
use tokio::time::Instant;

use crate::InvalidateError;

/// Minimum time between status queries.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Time between [`Waiting`] signals, so a spinner can animate.
pub const ANIMATE_INTERVAL: Duration = Duration::from_millis(200);

/// Emitted once per tick while the invalidation is still in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waiting;

/// Where a monitor is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// The CDN has not yet reported completion.
    Pending,
    /// Completion observed; no further polling happens.
    Completed,
}

/// Timing knobs for [`InvalidationMonitor`].
#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    /// Minimum time between status queries.
    pub poll_interval: Duration,
    /// Sleep between ticks.
    pub animate_interval: Duration,
    /// Give up after this long. `None` waits forever.
    pub deadline: Option<Duration>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            animate_interval: ANIMATE_INTERVAL,
            deadline: None,
        }
    }
}

/// `Pending -> Completed` state machine for one invalidation.
///
/// Each [`tick`](Self::tick) queries the CDN only if the poll interval has
/// elapsed since the previous query (the first tick always queries), then
/// sleeps for the animation interval. Dropping the monitor, or the stream
/// from [`into_stream`](Self::into_stream), cancels it.
pub struct InvalidationMonitor<'a> {
    cdn: &'a dyn CdnClient,
    distribution_id: String,
    request_id: String,
    options: WaitOptions,
    started: Instant,
    last_poll: Option<Instant>,
    state: MonitorState,
}

impl<'a> InvalidationMonitor<'a> {
    /// Creates a monitor for `request`.
    #[must_use]
    pub fn new(cdn: &'a dyn CdnClient, request: &InvalidationRequest, options: WaitOptions) -> Self {
        Self {
            cdn,
            distribution_id: request.distribution_id.clone(),
            request_id: request.request_id.clone(),
            options,
            started: Instant::now(),
            last_poll: None,
            state: MonitorState::Pending,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> MonitorState {
        self.state
    }

    /// Advances the state machine by one tick.
    ///
    /// Returns `Ok(Some(Waiting))` while pending and `Ok(None)` once
    /// completion has been observed.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidateError::Store`] if a status query fails and
    /// [`InvalidateError::Timeout`] once the deadline, if any, has passed.
    pub async fn tick(&mut self) -> Result<Option<Waiting>, InvalidateError> {
        if self.state == MonitorState::Completed {
            return Ok(None);
        }

        let now = Instant::now();
        let poll_due = self
            .last_poll
            .is_none_or(|last| now.duration_since(last) >= self.options.poll_interval);

        if poll_due {
            self.last_poll = Some(now);
            let status = self
                .cdn
                .invalidation_status(&self.distribution_id, &self.request_id)
                .await?;
            log::debug!("invalidation {}: {status:?}", self.request_id);

            if status.is_completed() {
                self.state = MonitorState::Completed;
                return Ok(None);
            }
        }

        if let Some(deadline) = self.options.deadline
            && self.started.elapsed() >= deadline
        {
            return Err(InvalidateError::Timeout {
                request_id: self.request_id.clone(),
                waited: deadline,
            });
        }

        tokio::time::sleep(self.options.animate_interval).await;
        Ok(Some(Waiting))
    }

    /// Turns the monitor into a lazy stream of [`Waiting`] signals that ends
    /// when the invalidation completes.
    pub fn into_stream(self) -> impl Stream<Item = Result<Waiting, InvalidateError>> + 'a {
        futures::stream::try_unfold(self, |mut monitor| async move {
            Ok(monitor.tick().await?.map(|waiting| (waiting, monitor)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{StreamExt, TryStreamExt};
    use s3pub_store::memory::ScriptedCdn;

    fn request() -> InvalidationRequest {
        InvalidationRequest {
            distribution_id: "D1".to_string(),
            request_id: "I1".to_string(),
            paths: vec!["/a".to_string()],
        }
    }

    fn immediate() -> WaitOptions {
        WaitOptions {
            poll_interval: Duration::ZERO,
            animate_interval: Duration::ZERO,
            deadline: None,
        }
    }

    #[tokio::test]
    async fn two_pending_polls_yield_two_signals() {
        let cdn = ScriptedCdn::new(&["D1"]).with_statuses(&["InProgress", "InProgress"]);

        let signals: Vec<Waiting> = InvalidationMonitor::new(&cdn, &request(), immediate())
            .into_stream()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(signals, vec![Waiting, Waiting]);
        assert_eq!(cdn.status_calls(), 3);
    }

    #[tokio::test]
    async fn already_complete_yields_nothing() {
        let cdn = ScriptedCdn::new(&["D1"]);
        let mut monitor = InvalidationMonitor::new(&cdn, &request(), immediate());

        assert_eq!(monitor.tick().await.unwrap(), None);
        assert_eq!(monitor.state(), MonitorState::Completed);
        assert_eq!(monitor.tick().await.unwrap(), None);
        assert_eq!(cdn.status_calls(), 1);
    }

    #[tokio::test]
    async fn consumer_can_stop_early() {
        let cdn = ScriptedCdn::new(&["D1"]).with_statuses(&["InProgress"; 10]);

        let taken: Vec<_> = InvalidationMonitor::new(&cdn, &request(), immediate())
            .into_stream()
            .take(1)
            .collect()
            .await;

        assert_eq!(taken.len(), 1);
        assert_eq!(cdn.status_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn polls_are_spaced_by_the_poll_interval() {
        let cdn = ScriptedCdn::new(&["D1"]).with_statuses(&["InProgress"]);
        let started = Instant::now();

        let signals: Vec<Waiting> =
            InvalidationMonitor::new(&cdn, &request(), WaitOptions::default())
                .into_stream()
                .try_collect()
                .await
                .unwrap();

        assert_eq!(cdn.status_calls(), 2);
        assert!(signals.len() > 1);
        assert!(started.elapsed() >= POLL_INTERVAL);
    }

    #[tokio::test]
    async fn deadline_turns_into_timeout() {
        let cdn = ScriptedCdn::new(&["D1"]).with_statuses(&["InProgress"; 5]);
        let options = WaitOptions {
            deadline: Some(Duration::ZERO),
            ..immediate()
        };

        let result: Result<Vec<Waiting>, _> = InvalidationMonitor::new(&cdn, &request(), options)
            .into_stream()
            .try_collect()
            .await;

        assert!(matches!(result, Err(InvalidateError::Timeout { .. })));
    }
}
