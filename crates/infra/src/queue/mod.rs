//! Queue intake runtime
//!
//! [`IntakeWorker`] pulls messages from a [`MessageSource`] and hands them to
//! a pipeline with bounded concurrency. [`ChannelMessageSource`] is an
//! in-process source for local runs and tests.
//!
//! [`MessageSource`]: hubrelay_core::MessageSource

mod channel_source;
mod intake_worker;

pub use channel_source::{ChannelMessageSource, QueueSender};
pub use intake_worker::{IntakeStats, IntakeWorker, IntakeWorkerConfig};
