//! Status polling.
//!
//! ## Architecture
//!
//! ```text
//! PollMachine (pure)  ──Transition──▶  StatusPoller (async loop)
//!        ▲                                   │
//!        └──── Result<StatusRecord, _> ◀─────┤  DocumentService::fetch_status
//!                                            │  Scheduler::sleep
//!                                            ▼  StatusProgressCallback
//! ```
//!
//! [`machine`] holds every termination and backoff rule. [`runner`] owns the
//! timers and the network call. [`scheduler`] abstracts time so tests can
//! drive the loop without waiting.

pub mod machine;
pub mod runner;
pub mod scheduler;

pub use machine::{backoff_delay, PollMachine, PollState, StopReason, Transition};
pub use runner::{PollHandle, PollOutcome, StatusPoller};
pub use scheduler::{Clock, FixedClock, Scheduler, SystemClock, TokioScheduler};
