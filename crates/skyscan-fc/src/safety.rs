use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::handle::ManualAxis;

/// Per-axis limiter for manual stick nudges, so a stuck client button cannot
/// flood the autopilot with RC overrides.
#[derive(Debug)]
pub struct CommandRateLimit {
    last: HashMap<ManualAxis, Instant>,
    min_interval: Duration,
}

impl CommandRateLimit {
    pub fn new(min_interval: Duration) -> Self {
        Self { last: HashMap::new(), min_interval }
    }

    pub fn allow(&mut self, axis: ManualAxis) -> bool {
        self.allow_at(axis, Instant::now())
    }

    fn allow_at(&mut self, axis: ManualAxis, now: Instant) -> bool {
        if let Some(t) = self.last.get(&axis) {
            if now.duration_since(*t) < self.min_interval { return false; }
        }
        self.last.insert(axis, now);
        true
    }
}
