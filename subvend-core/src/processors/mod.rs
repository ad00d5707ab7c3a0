//! Periodic trigger loops.
//!
//! Each trigger is an independent interval loop: deposit polling, expiry
//! sweep, retention sweep, queue drain. A loop body runs to completion
//! before its next tick is taken (`MissedTickBehavior::Delay`), so
//! overlapping runs of the same trigger cannot happen.

pub mod deposit_poller;
pub mod queue_drain;
pub mod sweeper;

pub use deposit_poller::DepositPoller;
pub use queue_drain::QueueDrain;
pub use sweeper::{ExpirySweeper, RetentionSweeper};
