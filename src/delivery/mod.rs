//! Reliable, ordered delivery over lossy, reordering frame channels.

mod config;
mod engine;
mod received;
pub mod sequence;

pub use config::DeliveryConfig;
pub use engine::DeliveryEngine;
pub use received::{ReceivedBatch, ReceivedMessage};
