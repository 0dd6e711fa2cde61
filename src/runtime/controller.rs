//! Simulation thread for the threaded engine mode
//!
//! The thread owns the `Scenario` outright. The render side talks to it
//! through two channels only: parameter edits go in over an mpsc queue,
//! snapshots come out through a shared [`SnapshotBuffer`]. Shutdown is a
//! cooperative flag checked once per loop iteration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use ftlog::{debug, info, warn};

use crate::runtime::snapshot::SnapshotBuffer;
use crate::simulation::clock::Clock;
use crate::simulation::edits::ParameterEdit;
use crate::simulation::scenario::Scenario;

/// Ticks between two statistics lines in the log
const LOG_EVERY: u64 = 1000;

pub struct SimulationThread {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<Scenario>>,
    edits: Sender<ParameterEdit>,
    buffer: Arc<SnapshotBuffer>,
}

impl SimulationThread {
    /// Move `scenario` onto a new thread and start ticking it
    ///
    /// A first snapshot is published before the thread starts, so readers
    /// never see an empty buffer.
    pub fn spawn(scenario: Scenario) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let buffer = Arc::new(SnapshotBuffer::new());
        let (edits, inbox) = mpsc::channel();

        buffer.publish(|s| scenario.write_snapshot(s));

        let handle = {
            let running = Arc::clone(&running);
            let buffer = Arc::clone(&buffer);
            thread::Builder::new()
                .name("drapesim-sim".into())
                .spawn(move || simulation_loop(scenario, &running, &inbox, &buffer))?
        };

        info!("Simulation thread started");
        Ok(Self {
            running,
            handle: Some(handle),
            edits,
            buffer,
        })
    }

    /// Queue an edit for the next iteration; `false` once the thread is gone
    pub fn send(&self, edit: ParameterEdit) -> bool {
        self.edits.send(edit).is_ok()
    }

    pub fn buffer(&self) -> &Arc<SnapshotBuffer> {
        &self.buffer
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Raise the stop flag and join the thread
    ///
    /// Returns the scenario as the thread left it, or `None` if the thread
    /// was already stopped or panicked.
    pub fn stop(&mut self) -> Option<Scenario> {
        self.running.store(false, Ordering::Release);
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(scenario) => {
                info!("Simulation thread stopped after {} ticks", scenario.ticks());
                Some(scenario)
            }
            Err(_) => {
                warn!("Simulation thread panicked");
                None
            }
        }
    }
}

impl Drop for SimulationThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn simulation_loop(
    mut scenario: Scenario,
    running: &AtomicBool,
    inbox: &Receiver<ParameterEdit>,
    buffer: &SnapshotBuffer,
) -> Scenario {
    let period = scenario
        .engine
        .tick_rate
        .filter(|rate| *rate > 0.0)
        .map(|rate| Duration::from_secs_f64(1.0 / rate));
    let mut clock = Clock::new();

    while running.load(Ordering::Acquire) {
        let started = Instant::now();

        for edit in inbox.try_iter() {
            if let Err(e) = scenario.apply_edit(edit) {
                warn!("Rejected edit: {}", e);
            }
        }

        clock.tick();
        let report = scenario.tick_measured(clock.delta());
        buffer.publish(|s| scenario.write_snapshot(s));

        if scenario.ticks() % LOG_EVERY == 0 {
            debug!(
                "tick {}: t = {:.3}, dt = {:.5}, {} cell changes, {:.3} ms",
                scenario.ticks(),
                report.t,
                report.dt,
                report.changed_cells,
                scenario.profiler().total().as_secs_f64() * 1000.0
            );
        }

        if let Some(period) = period {
            let spent = started.elapsed();
            if spent < period {
                thread::sleep(period - spent);
            }
        }
    }
    scenario
}
