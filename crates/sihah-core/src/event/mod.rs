//! Real-time event fan-out.
//!
//! `EventPublisher` is the best-effort publish port used by the pipeline;
//! `EventBus` implements it over a `tokio::sync::broadcast` channel.

pub mod bus;
pub mod publisher;

pub use bus::{EventBus, PublishedEvent};
pub use publisher::EventPublisher;
