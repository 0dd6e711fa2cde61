//! Wall-clock timing for the simulation loop
//!
//! `Clock` measures the delta between ticks, `Profiler` records how long each
//! phase of a tick took so the debug text can show it.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Clock {
    start: Instant,
    last: Instant,
    delta: f64,   // seconds since previous tick
    elapsed: f64, // seconds since creation
}

impl Clock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last: now,
            delta: 0.0,
            elapsed: 0.0,
        }
    }

    pub fn tick(&mut self) {
        let now = Instant::now();
        self.delta = now.duration_since(self.last).as_secs_f64();
        self.elapsed = now.duration_since(self.start).as_secs_f64();
        self.last = now;
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Named lap times within one tick
#[derive(Debug, Clone, Default)]
pub struct Profiler {
    started: Option<Instant>,
    laps: Vec<(&'static str, Duration)>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new round, dropping previous laps
    pub fn begin(&mut self) {
        self.laps.clear();
        self.started = Some(Instant::now());
    }

    /// Close the current lap under `name` and open the next one
    pub fn lap(&mut self, name: &'static str) {
        let now = Instant::now();
        let since = self.started.map_or(Duration::ZERO, |s| now.duration_since(s));
        self.laps.push((name, since));
        self.started = Some(now);
    }

    pub fn laps(&self) -> &[(&'static str, Duration)] {
        &self.laps
    }

    pub fn get(&self, name: &str) -> Option<Duration> {
        self.laps.iter().find(|(n, _)| *n == name).map(|(_, d)| *d)
    }

    pub fn total(&self) -> Duration {
        self.laps.iter().map(|(_, d)| *d).sum()
    }
}
