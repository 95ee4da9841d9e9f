//! Turn processing: the orchestrator state machine and its helpers.
//!
//! - `postprocess`: directionality marks, suggested actions, confidence
//! - `lease`: per-conversation serialization of turns
//! - `lifecycle`: construct / ready / shutdown states for long-lived components
//! - `orchestrator`: the end-to-end turn pipeline and conversation lifecycle ops

pub mod lease;
pub mod lifecycle;
pub mod orchestrator;
pub mod postprocess;
