//! Daemon node.

use samvaad::Bus;
use sarathi::daemon::Daemon;
use sarathi::process;
use std::process::ExitCode;

fn main() -> ExitCode {
    process::init_logging();
    log::info!("=== Sarathi daemon starting ===");

    let bus = Bus::new();
    let mut node = Daemon::new(bus.clone());
    if let Err(e) = node.start() {
        log::error!("failed to start daemon: {}", e);
        return ExitCode::FAILURE;
    }

    process::wait_for_shutdown();
    node.stop();
    bus.shutdown();
    ExitCode::SUCCESS
}
