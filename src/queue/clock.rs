use std::time::{Duration, Instant};

/// Wall-clock bookkeeping for the position display of the current track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackClock {
    started_at: Option<Instant>,
    paused_total: Duration,
    paused_at: Option<Instant>,
}

impl PlaybackClock {
    pub fn start(&mut self, now: Instant) {
        *self = Self {
            started_at: Some(now),
            ..Default::default()
        };
    }

    pub fn pause(&mut self, now: Instant) {
        if self.started_at.is_some() && self.paused_at.is_none() {
            self.paused_at = Some(now);
        }
    }

    pub fn resume(&mut self, now: Instant) {
        if let Some(paused_at) = self.paused_at.take() {
            self.paused_total += now.saturating_duration_since(paused_at);
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        let Some(started_at) = self.started_at else {
            return Duration::ZERO;
        };

        let pending_pause = self
            .paused_at
            .map(|paused_at| now.saturating_duration_since(paused_at))
            .unwrap_or_default();

        now.saturating_duration_since(started_at)
            .saturating_sub(self.paused_total)
            .saturating_sub(pending_pause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: Duration = Duration::from_secs(1);

    #[test]
    fn not_started_is_zero() {
        let clock = PlaybackClock::default();
        assert_eq!(clock.elapsed(Instant::now()), Duration::ZERO);
    }

    #[test]
    fn excludes_finished_and_ongoing_pauses() {
        let t0 = Instant::now();
        let mut clock = PlaybackClock::default();
        clock.start(t0);

        clock.pause(t0 + 10 * SEC);
        clock.resume(t0 + 15 * SEC);
        assert_eq!(clock.elapsed(t0 + 20 * SEC), 15 * SEC);

        clock.pause(t0 + 30 * SEC);
        assert!(clock.is_paused());
        assert_eq!(clock.elapsed(t0 + 40 * SEC), 25 * SEC);
    }

    #[test]
    fn repeated_pause_keeps_first_timestamp() {
        let t0 = Instant::now();
        let mut clock = PlaybackClock::default();
        clock.start(t0);
        clock.pause(t0 + 2 * SEC);
        clock.pause(t0 + 5 * SEC);
        clock.resume(t0 + 6 * SEC);

        assert_eq!(clock.elapsed(t0 + 6 * SEC), 2 * SEC);
    }

    #[test]
    fn restart_forgets_pauses() {
        let t0 = Instant::now();
        let mut clock = PlaybackClock::default();
        clock.start(t0);
        clock.pause(t0 + SEC);

        clock.start(t0 + 5 * SEC);
        assert!(!clock.is_paused());
        assert_eq!(clock.elapsed(t0 + 7 * SEC), 2 * SEC);
    }
}
