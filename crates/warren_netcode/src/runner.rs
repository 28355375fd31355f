//! The simulation thread.
//!
//! One dedicated thread owns the pacing of the whole backend: it calls
//! [`Simulation::update`] on every tick boundary and asks the heart
//! scheduler for a latency probe on every probe boundary. Deadlines are
//! absolute (advanced from the previous deadline, not from "now"), so a
//! slow tick is followed by catch-up instead of long-term drift.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::heart::{MultiPlayerHeart, Probe};
use crate::rollback::{now_millis, Simulation};
use crate::world::World;

/// Handle to the simulation thread. Dropping it stops the thread.
pub struct SimulationRunner {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SimulationRunner {
    /// Starts the simulation thread.
    ///
    /// `send_probe` is called from the simulation thread with every probe
    /// due for dispatch; it should hand the probe to the player's session
    /// without blocking for long.
    pub fn spawn<W, F>(
        simulation: Arc<Simulation<W>>,
        hearts: Arc<Mutex<MultiPlayerHeart>>,
        tick_interval: Duration,
        mut send_probe: F,
    ) -> std::io::Result<Self>
    where
        W: World + Send + 'static,
        F: FnMut(Probe) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name("warren-sim".into())
            .spawn(move || {
                tracing::info!("Simulation thread started ({:?}/tick)", tick_interval);
                let probe_interval = hearts.lock().probe_interval();
                let start = Instant::now();
                let mut next_tick = start;
                let mut next_probe = start;
                while !stop_flag.load(Ordering::Relaxed) {
                    let now = Instant::now();
                    if now >= next_tick {
                        simulation.update(now_millis());
                        while next_tick <= now {
                            next_tick += tick_interval;
                        }
                    }
                    if now >= next_probe {
                        if let Some(probe) = hearts.lock().next_probe(now_millis()) {
                            send_probe(probe);
                        }
                        while next_probe <= now {
                            next_probe += probe_interval;
                        }
                    }
                    let wake = next_tick.min(next_probe);
                    let now = Instant::now();
                    if wake > now {
                        std::thread::sleep(wake - now);
                    }
                }
                tracing::info!("Simulation thread stopped");
            })?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Stops the thread and waits for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SimulationRunner {
    fn drop(&mut self) {
        self.shutdown();
    }
}
