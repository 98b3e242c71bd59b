//! Completion detector
//!
//! Decides when a streaming reply has finished rendering. Pure length
//! polling cannot tell "still generating" from "idle" because rendering
//! updates coalesce, so completion requires a quiet-count of consecutive
//! unchanged polls with no stop-generating affordance. Added latency is
//! bounded by quiet_count * poll_interval.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{AutomationError, Result};
use crate::snapshot::DomSnapshot;

/// Where the detector reads page state from. The live implementation
/// injects a probe script through the command dispatcher; tests feed
/// scripted snapshots.
#[async_trait]
pub trait SnapshotSource {
    async fn snapshot(&mut self) -> Result<DomSnapshot>;

    /// The one extra read performed after the reply has settled.
    async fn final_text(&mut self) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Submitted,
    Generating,
    Settling,
    Complete,
    TimedOut,
}

#[derive(Debug, Clone, Copy)]
pub struct DetectorConfig {
    /// Sleep between consecutive snapshots
    pub poll_interval: Duration,
    /// Consecutive unchanged polls required before declaring completion
    pub quiet_count: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            quiet_count: 4,
        }
    }
}

pub struct CompletionDetector {
    config: DetectorConfig,
}

impl CompletionDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Polls until the reply settles or the deadline passes. On timeout no
    /// partial text is returned; the remote generation may continue unseen.
    ///
    /// A poll counts toward the quiet threshold only when the reply length
    /// is unchanged and no stop affordance is visible; any growth or a
    /// visible stop button resets the counter. A page that has not yet
    /// reacted to the submit at all stays in the submitted phase: quiet
    /// polls before the first observed generation never count, otherwise a
    /// slow first token would hand back the previous reply as this one.
    pub async fn wait_for_completion<S>(&self, source: &mut S, timeout: Duration) -> Result<String>
    where
        S: SnapshotSource + Send,
    {
        let deadline = Instant::now() + timeout;
        let mut phase = Phase::Submitted;
        let mut previous = source.snapshot().await?;
        let mut quiet = 0u32;
        let mut generated = false;
        trace!(?phase, length = previous.response_length, "baseline snapshot");

        loop {
            let next_poll = Instant::now() + self.config.poll_interval;
            if next_poll >= deadline {
                phase = Phase::TimedOut;
                debug!(?phase, ?timeout, "reply did not settle in time");
                return Err(AutomationError::Timeout(timeout));
            }
            tokio::time::sleep_until(next_poll).await;

            let current = source.snapshot().await?;
            if current.response_length != previous.response_length
                || current.stop_button_visible
            {
                phase = Phase::Generating;
                generated = true;
                quiet = 0;
            } else if generated {
                phase = Phase::Settling;
                quiet += 1;
            }
            trace!(?phase, quiet, length = current.response_length, "poll");
            previous = current;

            if quiet >= self.config.quiet_count {
                phase = Phase::Complete;
                debug!(?phase, length = previous.response_length, "reply settled");
                return source.final_text().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedSource {
        snapshots: Vec<DomSnapshot>,
        cursor: usize,
        polls: u32,
        reply: &'static str,
        fail_after: Option<u32>,
    }

    impl ScriptedSource {
        fn new(snapshots: Vec<DomSnapshot>, reply: &'static str) -> Self {
            Self {
                snapshots,
                cursor: 0,
                polls: 0,
                reply,
                fail_after: None,
            }
        }
    }

    #[async_trait]
    impl SnapshotSource for ScriptedSource {
        async fn snapshot(&mut self) -> Result<DomSnapshot> {
            if let Some(limit) = self.fail_after {
                if self.polls >= limit {
                    return Err(AutomationError::ConnectionLost(
                        "socket closed".to_string(),
                    ));
                }
            }
            let index = self.cursor.min(self.snapshots.len() - 1);
            self.cursor += 1;
            self.polls += 1;
            Ok(self.snapshots[index])
        }

        async fn final_text(&mut self) -> Result<String> {
            Ok(self.reply.to_string())
        }
    }

    fn snap(length: u64) -> DomSnapshot {
        DomSnapshot {
            response_length: length,
            stop_button_visible: false,
            input_populated: false,
        }
    }

    fn snap_generating(length: u64) -> DomSnapshot {
        DomSnapshot {
            response_length: length,
            stop_button_visible: true,
            input_populated: false,
        }
    }

    fn detector(quiet_count: u32) -> CompletionDetector {
        CompletionDetector::new(DetectorConfig {
            poll_interval: Duration::from_millis(500),
            quiet_count,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn completes_exactly_at_the_quiet_threshold() {
        // Baseline, two growing polls, then three unchanged polls.
        let mut source = ScriptedSource::new(
            vec![snap(0), snap(5), snap(9), snap(9), snap(9), snap(9)],
            "final",
        );
        let text = detector(3)
            .wait_for_completion(&mut source, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(text, "final");
        // 1 baseline + 2 growing + exactly quiet_count stable polls.
        assert_eq!(source.polls, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_stall_does_not_complete_early() {
        // A two-poll stall below the quiet threshold, then growth resumes.
        let mut source = ScriptedSource::new(
            vec![
                snap(0),
                snap(5),
                snap(5),
                snap(5),
                snap(9),
                snap(9),
                snap(9),
                snap(9),
            ],
            "final",
        );
        let text = detector(3)
            .wait_for_completion(&mut source, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(text, "final");
        // The stall polls were consumed and the counter reset on regrowth.
        assert_eq!(source.polls, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_affordance_keeps_the_detector_in_generating() {
        // Length is flat but the stop button stays visible for four polls.
        let mut source = ScriptedSource::new(
            vec![
                snap_generating(5),
                snap_generating(5),
                snap_generating(5),
                snap_generating(5),
                snap_generating(5),
                snap(5),
                snap(5),
            ],
            "final",
        );
        let text = detector(2)
            .wait_for_completion(&mut source, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(text, "final");
        assert_eq!(source.polls, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn flat_page_before_first_token_never_completes() {
        // The page shows the previous reply, unchanged from the baseline,
        // and the first token never arrives. Completing here would return
        // stale text as this question's answer.
        let mut source =
            ScriptedSource::new(vec![snap(100)], "previous answer, not this one");
        let err = detector(4)
            .wait_for_completion(&mut source, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, AutomationError::Timeout(_)));
        // It kept polling past the quiet threshold instead of completing.
        assert!(source.polls > 5);
    }

    #[tokio::test(start_paused = true)]
    async fn never_stabilizing_times_out_with_no_text() {
        struct GrowingSource {
            length: u64,
        }

        #[async_trait]
        impl SnapshotSource for GrowingSource {
            async fn snapshot(&mut self) -> Result<DomSnapshot> {
                self.length += 1;
                Ok(DomSnapshot {
                    response_length: self.length,
                    stop_button_visible: false,
                    input_populated: false,
                })
            }

            async fn final_text(&mut self) -> Result<String> {
                panic!("final text must never be read on the timeout path");
            }
        }

        let mut source = GrowingSource { length: 0 };
        let err = detector(4)
            .wait_for_completion(&mut source, Duration::from_secs(3))
            .await
            .unwrap_err();
        assert!(matches!(err, AutomationError::Timeout(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn connection_loss_mid_poll_is_not_a_timeout() {
        let mut source = ScriptedSource::new(vec![snap(0), snap(5)], "never");
        source.fail_after = Some(2);
        let err = detector(4)
            .wait_for_completion(&mut source, Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, AutomationError::ConnectionLost(_)));
    }
}
