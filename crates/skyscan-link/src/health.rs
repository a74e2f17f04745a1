/// How well the operator console is keeping up with heartbeats.
#[derive(Debug, Clone)]
pub struct LinkHealth {
    pub quality: u8, // 0-100
    pub consecutive_missed: u32,
    pub heartbeats_sent: u64,
}

impl Default for LinkHealth {
    fn default() -> Self {
        Self { quality: 100, consecutive_missed: 0, heartbeats_sent: 0 }
    }
}

impl LinkHealth {
    /// Record whether the client acked during the last heartbeat window.
    pub fn on_window(&mut self, acked: bool) {
        if acked {
            self.consecutive_missed = 0;
            self.quality = (self.quality + 10).min(100);
        } else {
            self.consecutive_missed += 1;
            self.quality = self.quality.saturating_sub(20);
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.quality < 50
    }
}
