//! Observability for Sihah: tracing subscriber setup and the GenAI semantic
//! convention attribute names used on turn and model spans.

pub mod genai_attrs;
pub mod tracing_setup;
