use std::fmt;
use std::time::{Duration, Instant};

/// Estado de reproducción de una sesión. `Idle` siempre que la cola está
/// vacía.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing,
    Paused,
}

/// Reloj de la pista activa, descontando el tiempo en pausa.
///
/// Los métodos reciben `now` explícito para que el cálculo sea determinista
/// en tests; el actor siempre pasa `Instant::now()`.
#[derive(Debug, Default)]
pub struct PlaybackTimer {
    started_at: Option<Instant>,
    pause_started_at: Option<Instant>,
    accumulated_pause: Duration,
}

impl PlaybackTimer {
    pub fn start(&mut self, now: Instant) {
        self.started_at = Some(now);
        self.pause_started_at = None;
        self.accumulated_pause = Duration::ZERO;
    }

    pub fn pause(&mut self, now: Instant) {
        if self.pause_started_at.is_none() {
            self.pause_started_at = Some(now);
        }
    }

    pub fn resume(&mut self, now: Instant) {
        if let Some(pause_started) = self.pause_started_at.take() {
            self.accumulated_pause += now.saturating_duration_since(pause_started);
        }
    }

    pub fn reset(&mut self) {
        self.started_at = None;
        self.pause_started_at = None;
        self.accumulated_pause = Duration::ZERO;
    }

    /// Tiempo reproducido hasta `now`. Congelado mientras hay pausa activa.
    pub fn elapsed(&self, now: Instant) -> Duration {
        let Some(started) = self.started_at else {
            return Duration::ZERO;
        };

        let reference = self.pause_started_at.unwrap_or(now);
        reference
            .saturating_duration_since(started)
            .saturating_sub(self.accumulated_pause)
    }
}

/// Progreso de la pista activa, listo para formatear en una línea.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub elapsed: Duration,
    /// 0 = duración desconocida / en vivo.
    pub total_secs: u64,
}

fn fmt_clock(secs: u64) -> String {
    if secs >= 3600 {
        format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else {
        format!("{}:{:02}", secs / 60, secs % 60)
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let elapsed = fmt_clock(self.elapsed.as_secs());
        if self.total_secs == 0 {
            write!(f, "{elapsed} (unknown length)")
        } else {
            write!(f, "{elapsed} / {}", fmt_clock(self.total_secs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn elapsed_discounts_accumulated_pauses() {
        let t0 = Instant::now();
        let mut timer = PlaybackTimer::default();
        timer.start(t0);

        // 10s sonando, 4s en pausa, 6s sonando
        timer.pause(t0 + Duration::from_secs(10));
        timer.resume(t0 + Duration::from_secs(14));

        let elapsed = timer.elapsed(t0 + Duration::from_secs(20));
        assert_eq!(elapsed, Duration::from_secs(16));
    }

    #[test]
    fn elapsed_is_frozen_while_paused() {
        let t0 = Instant::now();
        let mut timer = PlaybackTimer::default();
        timer.start(t0);
        timer.pause(t0 + Duration::from_secs(30));

        let later = t0 + Duration::from_secs(300);
        assert_eq!(timer.elapsed(later), Duration::from_secs(30));
    }

    #[test]
    fn double_pause_does_not_shift_the_clock() {
        let t0 = Instant::now();
        let mut timer = PlaybackTimer::default();
        timer.start(t0);
        timer.pause(t0 + Duration::from_secs(5));
        timer.pause(t0 + Duration::from_secs(8));
        timer.resume(t0 + Duration::from_secs(10));

        assert_eq!(
            timer.elapsed(t0 + Duration::from_secs(12)),
            Duration::from_secs(7)
        );
    }

    #[test]
    fn progress_formats_known_and_unknown_lengths() {
        let known = Progress {
            elapsed: Duration::from_secs(83),
            total_secs: 296,
        };
        assert_eq!(known.to_string(), "1:23 / 4:56");

        let live = Progress {
            elapsed: Duration::from_secs(61),
            total_secs: 0,
        };
        assert_eq!(live.to_string(), "1:01 (unknown length)");

        let long = Progress {
            elapsed: Duration::from_secs(3661),
            total_secs: 7322,
        };
        assert_eq!(long.to_string(), "1:01:01 / 2:02:02");
    }
}
