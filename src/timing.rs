// Speed-scaled time maths for scene timers.
// Every timer tracks "work" in speed-1 milliseconds; real time remaining is
// (target - work) / speed. A speed change therefore rescales only what is left,
// and pausing freezes the work clock in place.

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// Tolerance for deciding that a countdown has run out.
const DUE_EPSILON_MS: f64 = 1e-6;

/// Playback speed multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Speed(f64);

impl Speed {
    pub const MIN: f64 = 0.25;
    pub const MAX: f64 = 4.0;

    /// Clamp to the supported range; non-finite or non-positive input means normal speed.
    pub fn new(multiplier: f64) -> Self {
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Speed(1.0);
        }
        Speed(multiplier.clamp(Self::MIN, Self::MAX))
    }

    pub fn normal() -> Self {
        Speed(1.0)
    }

    pub fn get(&self) -> f64 {
        self.0
    }
}

impl Default for Speed {
    fn default() -> Self {
        Speed::normal()
    }
}

/// Accumulates speed-1 milliseconds of progress against the host clock.
#[derive(Debug, Clone)]
pub struct WorkClock {
    work_ms: f64,
    mark: Timestamp,
    speed: f64,
    paused: bool,
}

impl WorkClock {
    pub fn start(now: Timestamp, speed: Speed) -> Self {
        WorkClock {
            work_ms: 0.0,
            mark: now,
            speed: speed.get(),
            paused: false,
        }
    }

    /// Progress accumulated up to `now`.
    pub fn work(&self, now: Timestamp) -> f64 {
        if self.paused {
            return self.work_ms;
        }
        self.work_ms + now.millis_since(self.mark) as f64 * self.speed
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    fn settle(&mut self, now: Timestamp) {
        self.work_ms = self.work(now);
        self.mark = now;
    }

    pub fn pause(&mut self, now: Timestamp) {
        if !self.paused {
            self.settle(now);
            self.paused = true;
        }
    }

    pub fn resume(&mut self, now: Timestamp) {
        if self.paused {
            self.mark = now;
            self.paused = false;
        }
    }

    pub fn set_speed(&mut self, speed: Speed, now: Timestamp) {
        self.settle(now);
        self.speed = speed.get();
    }

    /// Real milliseconds from `now` until `work` reaches `target`.
    fn real_until(&self, target: f64, now: Timestamp) -> f64 {
        ((target - self.work(now)) / self.speed).max(0.0)
    }
}

/// A one-shot timer measured in work.
#[derive(Debug, Clone)]
pub struct Countdown {
    clock: WorkClock,
    target_ms: f64,
    scales: bool,
}

impl Countdown {
    /// Runs `duration_ms` of work at the given speed.
    pub fn scaled(duration_ms: u64, speed: Speed, now: Timestamp) -> Self {
        Self::with_progress(duration_ms, 0.0, speed, now)
    }

    /// Like [`Countdown::scaled`] but with `done_ms` of the work already behind it.
    pub fn with_progress(duration_ms: u64, done_ms: f64, speed: Speed, now: Timestamp) -> Self {
        let mut clock = WorkClock::start(now, speed);
        clock.work_ms = done_ms.max(0.0);
        Countdown {
            clock,
            target_ms: duration_ms as f64,
            scales: true,
        }
    }

    /// Real-time delay that ignores speed changes (settle delays, timeouts).
    pub fn fixed(duration_ms: u64, now: Timestamp) -> Self {
        Countdown {
            clock: WorkClock::start(now, Speed::normal()),
            target_ms: duration_ms as f64,
            scales: false,
        }
    }

    /// Real milliseconds left at the current speed.
    pub fn remaining(&self, now: Timestamp) -> f64 {
        self.clock.real_until(self.target_ms, now)
    }

    pub fn is_due(&self, now: Timestamp) -> bool {
        !self.clock.paused && self.target_ms - self.clock.work(now) <= DUE_EPSILON_MS
    }

    /// When the countdown fires, or `None` while paused.
    pub fn deadline(&self, now: Timestamp) -> Option<Timestamp> {
        if self.clock.paused {
            return None;
        }
        Some(now.after(self.remaining(now)))
    }

    pub fn is_paused(&self) -> bool {
        self.clock.is_paused()
    }

    pub fn pause(&mut self, now: Timestamp) {
        self.clock.pause(now);
    }

    pub fn resume(&mut self, now: Timestamp) {
        self.clock.resume(now);
    }

    pub fn set_speed(&mut self, speed: Speed, now: Timestamp) {
        if self.scales {
            self.clock.set_speed(speed, now);
        }
    }
}

/// Progressive reveal of narration text at a fixed characters-per-second rate.
#[derive(Debug, Clone)]
pub struct TextReveal {
    clock: WorkClock,
    total_chars: usize,
    chars_per_sec: f64,
    shown: usize,
}

impl TextReveal {
    pub fn start(text: &str, chars_per_sec: f64, speed: Speed, now: Timestamp) -> Self {
        TextReveal {
            clock: WorkClock::start(now, speed),
            total_chars: text.chars().count(),
            chars_per_sec: chars_per_sec.max(1.0),
            shown: 0,
        }
    }

    fn due_chars(&self, now: Timestamp) -> usize {
        let chars = (self.clock.work(now) * self.chars_per_sec / 1000.0 + DUE_EPSILON_MS).floor();
        (chars as usize).min(self.total_chars)
    }

    /// Characters shown after the last [`TextReveal::advance`].
    pub fn shown(&self) -> usize {
        self.shown
    }

    pub fn is_complete(&self) -> bool {
        self.shown >= self.total_chars
    }

    /// Moves the reveal up to `now`; returns the new count if it changed.
    pub fn advance(&mut self, now: Timestamp) -> Option<usize> {
        let due = self.due_chars(now);
        if due > self.shown {
            self.shown = due;
            Some(due)
        } else {
            None
        }
    }

    /// When the next character is due, or `None` when complete or paused.
    pub fn deadline(&self, now: Timestamp) -> Option<Timestamp> {
        if self.is_complete() || self.clock.paused {
            return None;
        }
        let next_work = (self.shown + 1) as f64 * 1000.0 / self.chars_per_sec;
        Some(now.after(self.clock.real_until(next_work, now)))
    }

    pub fn pause(&mut self, now: Timestamp) {
        self.clock.pause(now);
    }

    pub fn resume(&mut self, now: Timestamp) {
        self.clock.resume(now);
    }

    /// Continue revealing only the unrevealed remainder at the new rate.
    pub fn set_speed(&mut self, speed: Speed, now: Timestamp) {
        self.clock.set_speed(speed, now);
    }
}
