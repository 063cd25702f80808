//! Perception node.

use samvaad::Bus;
use sarathi::perception::Perception;
use sarathi::process;
use std::process::ExitCode;

fn main() -> ExitCode {
    process::init_logging();
    log::info!("=== Sarathi perception starting ===");

    let bus = Bus::new();
    let mut node = Perception::new(bus.clone());
    if let Err(e) = node.start() {
        log::error!("failed to start perception: {}", e);
        return ExitCode::FAILURE;
    }

    process::wait_for_shutdown();
    node.stop();
    bus.shutdown();
    ExitCode::SUCCESS
}
