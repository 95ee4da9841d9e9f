//! Prompt assembly for one turn.

pub mod assembler;
