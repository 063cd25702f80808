//! Map node.

use samvaad::Bus;
use sarathi::map::MapServer;
use sarathi::process;
use std::process::ExitCode;

fn main() -> ExitCode {
    process::init_logging();
    log::info!("=== Sarathi map starting ===");

    let bus = Bus::new();
    let mut node = MapServer::new(bus.clone());
    if let Err(e) = node.start() {
        log::error!("failed to start map: {}", e);
        return ExitCode::FAILURE;
    }

    process::wait_for_shutdown();
    node.stop();
    bus.shutdown();
    ExitCode::SUCCESS
}
