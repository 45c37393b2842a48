//! Buffering queue for kb-sync.
//!
//! The queue sits between the change-notification source and the
//! coordinator. It debounces arrivals into batches, redelivers batches whose
//! invocation failed, moves exhausted messages to a dead-letter sink, and
//! lets the coordinator schedule delayed retry tokens, inspect depth and
//! purge redundant messages.
//!
//! ## Key Components
//!
//! - [`QueueClient`]: what the coordinator needs (enqueue, depth, purge, acknowledge)
//! - [`QueueConsumer`]: what the host loop needs (receive, release)
//! - [`BufferingQueue`]: in-memory implementation of both
//! - [`DeadLetter`]: a message retained after exhausting its deliveries

mod client;
mod config;
mod dead_letter;
mod error;
mod memory;

pub use client::{QueueClient, QueueConsumer, QueueDepth};
pub use config::{QueueConfig, DEFAULT_DEAD_LETTER_CAPACITY};
pub use dead_letter::DeadLetter;
pub use error::QueueError;
pub use memory::{BufferingQueue, QueueStats};
