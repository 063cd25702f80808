//! Shared binary plumbing: logging setup and signal-driven lifetime.
//!
//! Every node binary follows the same shape: init logging, build the bus
//! and its component, then park the main thread until SIGINT/SIGTERM and
//! tear down in order. The parts that are identical live here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Initialize env_logger with an `info` default filter.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// Block the calling thread until SIGINT or SIGTERM arrives.
///
/// The handler itself only flips a flag; all teardown happens back on
/// the main thread after this returns.
pub fn wait_for_shutdown() {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || {
        flag.store(false, Ordering::Relaxed);
    }) {
        log::error!("failed to install signal handler: {}", e);
        return;
    }

    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(200));
    }
    log::info!("shutdown signal received");
}

/// First CLI argument, used by every node as an optional config path.
pub fn config_arg() -> Option<String> {
    std::env::args().nth(1)
}
