//! Lifecycle of long-lived pipeline components.
//!
//! `Constructed -> Ready -> ShuttingDown -> Stopped`, forward only. A
//! component accepts new work only while `Ready`.

use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Constructed,
    Ready,
    ShuttingDown,
    Stopped,
}

impl LifecycleState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LifecycleState::Constructed,
            1 => LifecycleState::Ready,
            2 => LifecycleState::ShuttingDown,
            _ => LifecycleState::Stopped,
        }
    }
}

/// Shared, lock-free lifecycle state.
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Constructed as u8),
        }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.state() == LifecycleState::Ready
    }

    /// Move forward to `next`. Returns false (and changes nothing) when
    /// `next` is not after the current state.
    pub fn advance(&self, next: LifecycleState) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (next as u8 > cur).then_some(next as u8)
            })
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moves_forward_only() {
        let lc = Lifecycle::new();
        assert_eq!(lc.state(), LifecycleState::Constructed);
        assert!(!lc.is_ready());
        assert!(lc.advance(LifecycleState::Ready));
        assert!(lc.is_ready());
        assert!(!lc.advance(LifecycleState::Constructed));
        assert!(lc.advance(LifecycleState::ShuttingDown));
        assert!(!lc.advance(LifecycleState::Ready));
        assert!(lc.advance(LifecycleState::Stopped));
        assert!(!lc.advance(LifecycleState::Stopped));
        assert_eq!(lc.state(), LifecycleState::Stopped);
    }

    #[test]
    fn can_skip_straight_to_stopped() {
        let lc = Lifecycle::new();
        assert!(lc.advance(LifecycleState::Stopped));
        assert!(!lc.is_ready());
    }
}
