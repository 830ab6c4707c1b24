//! Rate-limit detection and backoff decisions for one job's fetch loop.
//!
//! Some sources answer over-quota callers with a normal 200 page carrying a
//! marker text instead of an HTTP 429. The fetcher flags that marker on the
//! [`RawDocument`]; this controller turns the flag into a decision:
//! wait-and-refetch, or give up.
//!
//! # States
//!
//! ```text
//! NORMAL --[marker seen]--> THROTTLED --[wait elapsed, re-fetch clean]--> NORMAL
//!                                |
//!                                +--[auto_resume off, or retries spent]--> give up
//! ```

use std::time::Duration;

use crate::config::ThrottlePolicy;
use crate::models::RawDocument;

/// Current state of one job's backoff controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffState {
    Normal,
    Throttled,
}

/// What the fetch loop should do with the document it just received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Document is clean; hand it to the extractor.
    Proceed,
    /// Throttle marker seen; suspend this job for the given duration, then
    /// re-fetch. Only the owning job's task sleeps.
    Wait(Duration),
    /// Throttle marker seen and policy forbids (further) retries; the job
    /// fails with `RateLimited`.
    GiveUp,
}

/// Per-job backoff controller. Not shared across jobs; each job's pipeline
/// owns one, so one job's waits never pause its siblings.
#[derive(Debug, Clone)]
pub struct BackoffController {
    policy: ThrottlePolicy,
    state: BackoffState,
    retries: u32,
}

impl BackoffController {
    pub fn new(policy: ThrottlePolicy) -> Self {
        Self {
            policy,
            state: BackoffState::Normal,
            retries: 0,
        }
    }

    pub fn state(&self) -> BackoffState {
        self.state
    }

    /// Throttle retries consumed so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Inspect a fetched document and decide how the job proceeds.
    pub fn observe(&mut self, doc: &RawDocument) -> ThrottleDecision {
        if !doc.throttled {
            self.state = BackoffState::Normal;
            return ThrottleDecision::Proceed;
        }

        self.state = BackoffState::Throttled;

        if !self.policy.auto_resume {
            return ThrottleDecision::GiveUp;
        }
        if self.retries >= self.policy.max_retries {
            return ThrottleDecision::GiveUp;
        }

        self.retries += 1;
        ThrottleDecision::Wait(self.policy.wait)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttled() -> RawDocument {
        RawDocument::throttled("You reached the limit of allowed queries")
    }

    #[test]
    fn test_clean_document_proceeds() {
        let mut ctl = BackoffController::new(ThrottlePolicy::default());
        assert_eq!(ctl.observe(&RawDocument::ok("<html/>")), ThrottleDecision::Proceed);
        assert_eq!(ctl.state(), BackoffState::Normal);
    }

    #[test]
    fn test_no_auto_resume_gives_up_immediately() {
        let mut ctl = BackoffController::new(ThrottlePolicy::default().with_auto_resume(false));
        assert_eq!(ctl.observe(&throttled()), ThrottleDecision::GiveUp);
        assert_eq!(ctl.state(), BackoffState::Throttled);
        assert_eq!(ctl.retries(), 0);
    }

    #[test]
    fn test_auto_resume_waits_then_recovers() {
        let policy = ThrottlePolicy::default()
            .with_auto_resume(true)
            .with_wait(Duration::from_secs(600));
        let mut ctl = BackoffController::new(policy);

        assert_eq!(
            ctl.observe(&throttled()),
            ThrottleDecision::Wait(Duration::from_secs(600))
        );
        assert_eq!(ctl.state(), BackoffState::Throttled);

        // A clean re-fetch returns the controller to normal.
        assert_eq!(ctl.observe(&RawDocument::ok("ok")), ThrottleDecision::Proceed);
        assert_eq!(ctl.state(), BackoffState::Normal);
    }

    #[test]
    fn test_retries_are_bounded() {
        let policy = ThrottlePolicy::default()
            .with_auto_resume(true)
            .with_max_retries(2)
            .with_wait(Duration::from_secs(1));
        let mut ctl = BackoffController::new(policy);

        assert!(matches!(ctl.observe(&throttled()), ThrottleDecision::Wait(_)));
        assert!(matches!(ctl.observe(&throttled()), ThrottleDecision::Wait(_)));
        assert_eq!(ctl.observe(&throttled()), ThrottleDecision::GiveUp);
        assert_eq!(ctl.retries(), 2);
    }

    #[test]
    fn test_zero_max_retries_gives_up_even_with_auto_resume() {
        let policy = ThrottlePolicy::default()
            .with_auto_resume(true)
            .with_max_retries(0);
        let mut ctl = BackoffController::new(policy);
        assert_eq!(ctl.observe(&throttled()), ThrottleDecision::GiveUp);
    }
}
