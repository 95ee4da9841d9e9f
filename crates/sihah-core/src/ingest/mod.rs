//! Background document ingestion.
//!
//! Documents are submitted to a durable [`queue::WorkQueue`] and processed
//! by an [`worker::IngestWorkerPool`]. Delivery is at-least-once; workers are
//! idempotent because indexing replaces a document's chunks wholesale.

pub mod memory_queue;
pub mod queue;
pub mod worker;
