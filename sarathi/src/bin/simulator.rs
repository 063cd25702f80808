//! Simulator node.

use samvaad::Bus;
use sarathi::config::NodeConfig;
use sarathi::process;
use sarathi::simulator::Simulator;
use std::process::ExitCode;

fn main() -> ExitCode {
    process::init_logging();
    log::info!("=== Sarathi simulator starting ===");

    let config = match NodeConfig::load(process::config_arg().as_deref()) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let bus = Bus::new();
    let mut node = Simulator::new(bus.clone(), config.simulator);
    if let Err(e) = node.start() {
        log::error!("failed to start simulator: {}", e);
        return ExitCode::FAILURE;
    }

    process::wait_for_shutdown();
    node.stop();
    bus.shutdown();
    ExitCode::SUCCESS
}
