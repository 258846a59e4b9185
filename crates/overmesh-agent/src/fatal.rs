//! Decides when renewal failures should terminate the agent

use std::time::Duration;

use tokio::time::Instant;

use crate::error::ClientError;

/// Default partition tolerance (30 minutes)
pub const DEFAULT_GRACE_DURATION: Duration = Duration::from_secs(30 * 60);

/// Tracks the last successful renewal and judges failures against a grace window
///
/// A non-retriable failure is always fatal. Any other failure is fatal once
/// no renewal has succeeded for the whole grace duration, which bounds how
/// long the host keeps routing on a lease the controller may have reclaimed.
#[derive(Debug)]
pub struct FatalErrorDetector {
    grace: Duration,
    last_success: Instant,
}

impl FatalErrorDetector {
    /// Start the grace window now
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            last_success: Instant::now(),
        }
    }

    pub fn got_success(&mut self) {
        self.last_success = Instant::now();
    }

    pub fn is_fatal(&self, err: &ClientError) -> bool {
        if err.kind().is_non_retriable() {
            return true;
        }
        self.last_success.elapsed() >= self.grace
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }
}

impl Default for FatalErrorDetector {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_DURATION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient() -> ClientError {
        ClientError::Api {
            status: 500,
            message: "boom".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_within_grace() {
        let detector = FatalErrorDetector::new(Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(!detector.is_fatal(&transient()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_at_grace_is_fatal() {
        let detector = FatalErrorDetector::new(Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(detector.is_fatal(&transient()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_window() {
        let mut detector = FatalErrorDetector::new(Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(8)).await;
        detector.got_success();
        tokio::time::advance(Duration::from_secs(8)).await;

        assert!(!detector.is_fatal(&transient()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_always_fatal() {
        let detector = FatalErrorDetector::new(Duration::from_secs(3600));

        assert!(detector.is_fatal(&ClientError::Rejected("lease mismatch".into())));
    }
}
