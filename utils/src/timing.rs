// Monotonic timing helpers for the frame loop and log timestamps
use std::time::Instant;

lazy_static::lazy_static! {
    static ref START: Instant = Instant::now();
}

/// Milliseconds since program start. Monotonic, never steps backwards.
pub fn get_current_millis() -> u64 {
    START.elapsed().as_millis() as u64
}

/// A millisecond-resolution stopwatch for per-frame dt measurement.
#[derive(Copy, Clone, Debug)]
pub struct Stopwatch {
    sw_last: Instant,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self {
            sw_last: Instant::now(),
        }
    }

    /// Milliseconds since the last restart, fractional.
    pub fn elapsed_ms(&self) -> f64 {
        self.sw_last.elapsed().as_secs_f64() * 1000.0
    }

    /// Restart the watch and return the elapsed milliseconds.
    pub fn restart(&mut self) -> f64 {
        let dt = self.elapsed_ms();
        self.sw_last = Instant::now();
        dt
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}
