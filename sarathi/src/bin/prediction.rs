//! Prediction node.

use samvaad::Bus;
use sarathi::prediction::Prediction;
use sarathi::process;
use std::process::ExitCode;

fn main() -> ExitCode {
    process::init_logging();
    log::info!("=== Sarathi prediction starting ===");

    let bus = Bus::new();
    let mut node = Prediction::new(bus.clone());
    if let Err(e) = node.start() {
        log::error!("failed to start prediction: {}", e);
        return ExitCode::FAILURE;
    }

    process::wait_for_shutdown();
    node.stop();
    bus.shutdown();
    ExitCode::SUCCESS
}
