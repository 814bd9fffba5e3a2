//! Round-robin load balancing strategy.

use std::sync::{Arc, Mutex, PoisonError};
use crate::load_balancer::{LoadBalancer, backend::Backend};

/// Round-robin selector.
///
/// The cursor moves forward one slot per call, whatever backend is returned.
/// Reading the cursor, advancing it and scanning for a live backend happen
/// under one lock so concurrent callers each get a distinct starting slot.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: Mutex<usize>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a given slot.
    pub fn starting_at(cursor: usize) -> Self {
        Self {
            cursor: Mutex::new(cursor),
        }
    }

    /// Current cursor value.
    pub fn cursor(&self) -> usize {
        *self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LoadBalancer for RoundRobin {
    fn next_server(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        if backends.is_empty() {
            return None;
        }

        let len = backends.len();
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        let start = *cursor % len;
        *cursor = (start + 1) % len;

        (0..len)
            .map(|i| &backends[(start + i) % len])
            .find(|backend| backend.is_alive())
            .cloned()
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}
