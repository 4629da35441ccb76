//! Render progress and status text.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct Progress {
    sample: u32,
    total_samples: u32,
    tiles_done: u32,
    tiles_total: u32,
    start: Option<Instant>,
    sample_time: Duration,
    status: String,
    substatus: String,
    cancel_message: Option<String>,
}

impl Progress {
    /// Forgets everything except the sample budget.
    pub fn reset(&mut self) {
        *self = Self {
            total_samples: self.total_samples,
            ..Self::default()
        };
    }

    /// Restarts counting samples, keeping the status text.
    pub fn reset_sample(&mut self) {
        self.sample = 0;
        self.tiles_done = 0;
        self.sample_time = Duration::ZERO;
    }

    pub fn set_total_samples(&mut self, total: u32) {
        self.total_samples = total;
    }

    pub fn set_tiles_total(&mut self, total: u32) {
        self.tiles_total = total;
    }

    /// Starts the render clock if it is not running yet.
    pub fn begin(&mut self) {
        self.start.get_or_insert_with(Instant::now);
    }

    pub fn add_tile(&mut self) {
        self.tiles_done += 1;
    }

    pub fn add_sample(&mut self, took: Duration) {
        self.sample += 1;
        self.tiles_done = 0;
        self.sample_time = took;
    }

    pub fn sample(&self) -> u32 {
        self.sample
    }

    pub fn total_samples(&self) -> u32 {
        self.total_samples
    }

    /// Samples and budget as seen by the tile scheduler.
    pub fn tile_sample_info(&self) -> (u32, u32) {
        (self.sample, self.total_samples)
    }

    /// Total render time and the time the last sample took.
    pub fn time(&self) -> (Duration, Duration) {
        let total = self.start.map(|s| s.elapsed()).unwrap_or_default();
        (total, self.sample_time)
    }

    /// Fraction of the budget done, counting finished tiles of the current
    /// sample.
    pub fn fraction(&self) -> f32 {
        if self.total_samples == 0 {
            return 0.0;
        }
        let partial = if self.tiles_total > 0 {
            self.tiles_done as f32 / self.tiles_total as f32
        } else {
            0.0
        };
        ((self.sample as f32 + partial) / self.total_samples as f32).min(1.0)
    }

    pub fn set_status(&mut self, status: impl Into<String>, substatus: impl Into<String>) {
        self.status = status.into();
        self.substatus = substatus.into();
    }

    pub fn set_substatus(&mut self, substatus: impl Into<String>) {
        self.substatus = substatus.into();
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn substatus(&self) -> &str {
        &self.substatus
    }

    /// Records a cancellation. The message becomes the substatus.
    pub fn set_cancel(&mut self, message: &str) {
        self.cancel_message = Some(message.to_string());
        self.set_status("Cancelled", message);
    }

    pub fn cancel_message(&self) -> Option<&str> {
        self.cancel_message.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction_counts_tiles() {
        let mut progress = Progress::default();
        progress.set_total_samples(4);
        progress.set_tiles_total(2);
        assert_eq!(progress.fraction(), 0.0);

        progress.add_tile();
        assert_eq!(progress.fraction(), 0.125);
        progress.add_sample(Duration::from_millis(5));
        assert_eq!(progress.fraction(), 0.25);
        assert_eq!(progress.tile_sample_info(), (1, 4));
        assert_eq!(progress.time().1, Duration::from_millis(5));
    }

    #[test]
    fn test_reset_keeps_budget() {
        let mut progress = Progress::default();
        progress.set_total_samples(8);
        progress.add_sample(Duration::ZERO);
        progress.set_cancel("user abort");
        progress.reset();
        assert_eq!(progress.sample(), 0);
        assert_eq!(progress.total_samples(), 8);
        assert_eq!(progress.cancel_message(), None);
    }

    #[test]
    fn test_cancel_sets_substatus() {
        let mut progress = Progress::default();
        progress.set_cancel("user abort");
        assert_eq!(progress.status(), "Cancelled");
        assert_eq!(progress.substatus(), "user abort");
        assert_eq!(progress.cancel_message(), Some("user abort"));
    }
}
