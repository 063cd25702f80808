//! Periodic worker skeleton shared by every node.
//!
//! Each node drives its producer loop through a [`Worker`]: a named
//! thread, an atomic running flag, and a fixed tick period. Tick errors
//! are logged (rate limited) and the loop keeps going; only `stop()` or
//! drop ends it. The tick sleep subtracts the time the tick itself took,
//! so a 10 ms loop stays close to 100 Hz under load.

use crate::error::Result;
use crate::ratelimit::LogEvery;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub struct Worker {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn a named thread that calls `tick` every `period` until
    /// stopped. The first tick runs immediately.
    pub fn spawn_periodic<F>(name: &str, period: Duration, mut tick: F) -> Worker
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let loop_name = name.to_string();

        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            let tick_faults = LogEvery::new(100);
            log::debug!("{} worker started", loop_name);
            while flag.load(Ordering::Relaxed) {
                let started = Instant::now();
                if let Err(e) = tick() {
                    if tick_faults.admit() {
                        log::error!(
                            "{} tick failed: {} ({} faults so far)",
                            loop_name,
                            e,
                            tick_faults.occurrences()
                        );
                    }
                }
                if let Some(remaining) = period.checked_sub(started.elapsed()) {
                    thread::sleep(remaining);
                }
            }
            log::debug!("{} worker stopped", loop_name);
        });

        match handle {
            Ok(handle) => Worker {
                running,
                handle: Some(handle),
            },
            Err(e) => {
                log::error!("failed to spawn {} worker: {}", name, e);
                running.store(false, Ordering::Relaxed);
                Worker {
                    running,
                    handle: None,
                }
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some() && self.running.load(Ordering::Relaxed)
    }

    /// Signal the loop and join the thread. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}
