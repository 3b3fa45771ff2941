//! Pure poll state machine.
//!
//! `(state, fetch result) -> (state', next action)`. No timers, no I/O: the
//! runner feeds results in and sleeps for whatever delay comes out, which
//! keeps every backoff and termination rule testable in isolation.

use crate::config::PollPolicy;
use crate::error::FetchError;
use crate::model::{DocumentStatus, StatusRecord};
use std::time::Duration;

/// Why a poll loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// The server reported `complete`.
    Completed(StatusRecord),
    /// The server reported `failed`.
    Failed(StatusRecord),
    /// Too many consecutive fetch failures.
    Exhausted { attempts: u32, last_error: FetchError },
    /// The caller stopped the loop.
    Cancelled,
}

impl StopReason {
    pub fn describe(&self) -> &'static str {
        match self {
            StopReason::Completed(_) => "complete",
            StopReason::Failed(_) => "failed",
            StopReason::Exhausted { .. } => "exhausted",
            StopReason::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    Idle,
    Polling { consecutive_failures: u32 },
    Stopped(StopReason),
}

/// What the runner should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Fetch again after this delay.
    Schedule(Duration),
    /// Do not fetch again.
    Stop(StopReason),
}

#[derive(Debug, Clone)]
pub struct PollMachine {
    policy: PollPolicy,
    state: PollState,
    fetches: u32,
}

impl PollMachine {
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            state: PollState::Idle,
            fetches: 0,
        }
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    /// Number of fetch results applied so far.
    pub fn fetches(&self) -> u32 {
        self.fetches
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.state, PollState::Stopped(_))
    }

    /// Enter `Polling`. The first fetch goes out immediately.
    pub fn start(&mut self) -> Transition {
        match &self.state {
            PollState::Idle => {
                self.state = PollState::Polling {
                    consecutive_failures: 0,
                };
                Transition::Schedule(Duration::ZERO)
            }
            PollState::Polling { .. } => Transition::Schedule(Duration::ZERO),
            PollState::Stopped(reason) => Transition::Stop(reason.clone()),
        }
    }

    /// Apply one fetch result.
    ///
    /// A stopped machine ignores late results and repeats its stop reason.
    pub fn on_fetch(&mut self, result: Result<StatusRecord, FetchError>) -> Transition {
        let failures = match &self.state {
            PollState::Polling {
                consecutive_failures,
            } => *consecutive_failures,
            PollState::Stopped(reason) => return Transition::Stop(reason.clone()),
            PollState::Idle => 0,
        };
        self.fetches += 1;

        match result {
            Ok(record) => match record.status {
                DocumentStatus::Complete => self.stop(StopReason::Completed(record)),
                DocumentStatus::Failed => self.stop(StopReason::Failed(record)),
                _ => {
                    self.state = PollState::Polling {
                        consecutive_failures: 0,
                    };
                    Transition::Schedule(self.policy.interval)
                }
            },
            Err(error) => {
                let failures = failures + 1;
                if failures >= self.policy.max_consecutive_failures {
                    self.stop(StopReason::Exhausted {
                        attempts: failures,
                        last_error: error,
                    })
                } else {
                    self.state = PollState::Polling {
                        consecutive_failures: failures,
                    };
                    Transition::Schedule(backoff_delay(&self.policy, failures))
                }
            }
        }
    }

    /// Stop from any state.
    pub fn cancel(&mut self) -> Transition {
        match &self.state {
            PollState::Stopped(reason) => Transition::Stop(reason.clone()),
            _ => self.stop(StopReason::Cancelled),
        }
    }

    fn stop(&mut self, reason: StopReason) -> Transition {
        self.state = PollState::Stopped(reason.clone());
        Transition::Stop(reason)
    }
}

/// Delay after the `failures`-th consecutive failure (1-based):
/// `interval × 2^(failures − 1)`, capped at `max_backoff`.
pub fn backoff_delay(policy: &PollPolicy, failures: u32) -> Duration {
    let exp = failures.saturating_sub(1).min(16);
    policy
        .interval
        .saturating_mul(1u32 << exp)
        .min(policy.max_backoff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DocumentId, ProcessingOptions};
    use chrono::Utc;

    fn policy() -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(2),
            max_consecutive_failures: 3,
            max_backoff: Duration::from_secs(60),
        }
    }

    fn record(status: DocumentStatus) -> StatusRecord {
        StatusRecord {
            id: DocumentId::new("doc-1"),
            filename: "a.pdf".into(),
            status,
            processing_options: ProcessingOptions::default(),
            created_at: Utc::now(),
            completed_at: None,
            error_message: None,
            progress_stage: None,
            elapsed_time: None,
            download_url: None,
        }
    }

    fn net() -> FetchError {
        FetchError::Network("connection reset".into())
    }

    #[test]
    fn start_fetches_immediately() {
        let mut m = PollMachine::new(policy());
        assert_eq!(m.start(), Transition::Schedule(Duration::ZERO));
        assert_eq!(
            m.state(),
            &PollState::Polling {
                consecutive_failures: 0
            }
        );
    }

    #[test]
    fn non_terminal_reschedules_at_interval() {
        let mut m = PollMachine::new(policy());
        m.start();
        for status in [
            DocumentStatus::Queued,
            DocumentStatus::Processing,
            DocumentStatus::Finalizing,
        ] {
            assert_eq!(
                m.on_fetch(Ok(record(status))),
                Transition::Schedule(Duration::from_secs(2))
            );
        }
        assert_eq!(m.fetches(), 3);
    }

    #[test]
    fn terminal_statuses_stop() {
        let mut m = PollMachine::new(policy());
        m.start();
        let t = m.on_fetch(Ok(record(DocumentStatus::Complete)));
        assert!(matches!(t, Transition::Stop(StopReason::Completed(_))));
        assert!(m.is_stopped());

        let mut m = PollMachine::new(policy());
        m.start();
        let t = m.on_fetch(Ok(record(DocumentStatus::Failed)));
        assert!(matches!(t, Transition::Stop(StopReason::Failed(_))));
    }

    #[test]
    fn failures_back_off_exponentially_then_exhaust() {
        let mut m = PollMachine::new(policy());
        m.start();
        assert_eq!(m.on_fetch(Err(net())), Transition::Schedule(Duration::from_secs(2)));
        assert_eq!(m.on_fetch(Err(net())), Transition::Schedule(Duration::from_secs(4)));
        match m.on_fetch(Err(net())) {
            Transition::Stop(StopReason::Exhausted { attempts, last_error }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error, net());
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn success_resets_failure_counter() {
        let mut m = PollMachine::new(policy());
        m.start();
        m.on_fetch(Err(net()));
        m.on_fetch(Err(net()));
        m.on_fetch(Ok(record(DocumentStatus::Processing)));
        // Back to the base delay, and the budget is whole again.
        assert_eq!(m.on_fetch(Err(net())), Transition::Schedule(Duration::from_secs(2)));
        assert_eq!(m.on_fetch(Err(net())), Transition::Schedule(Duration::from_secs(4)));
        assert!(!m.is_stopped());
    }

    #[test]
    fn stopped_machine_ignores_late_results() {
        let mut m = PollMachine::new(policy());
        m.start();
        assert_eq!(m.cancel(), Transition::Stop(StopReason::Cancelled));
        let t = m.on_fetch(Ok(record(DocumentStatus::Complete)));
        assert_eq!(t, Transition::Stop(StopReason::Cancelled));
        assert_eq!(m.fetches(), 0);
        assert_eq!(m.start(), Transition::Stop(StopReason::Cancelled));
    }

    #[test]
    fn backoff_is_capped() {
        let p = PollPolicy {
            interval: Duration::from_secs(2),
            max_consecutive_failures: 100,
            max_backoff: Duration::from_secs(60),
        };
        assert_eq!(backoff_delay(&p, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(&p, 5), Duration::from_secs(32));
        assert_eq!(backoff_delay(&p, 6), Duration::from_secs(60));
        assert_eq!(backoff_delay(&p, 99), Duration::from_secs(60));
    }
}
