//! Queue intake: turns inbound messages into pending integration records.

mod handler;
pub mod ports;

pub use handler::IntakeHandler;
pub use ports::{MessageSource, QueueMessage};
