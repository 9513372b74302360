use std::time::Instant;

/// Logs the duration of a flow phase when dropped.
pub struct ScopedTimer {
    phase: &'static str,
    start: Instant,
}

impl ScopedTimer {
    pub fn new(phase: &'static str) -> Self {
        log::debug!("{} started", phase);
        Self {
            phase,
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        log::info!("{} took {} ms", self.phase, self.elapsed_ms());
    }
}
