//! Sensor node.

use samvaad::Bus;
use sarathi::config::NodeConfig;
use sarathi::process;
use sarathi::sensor::Sensor;
use std::process::ExitCode;

fn main() -> ExitCode {
    process::init_logging();
    log::info!("=== Sarathi sensor starting ===");

    let config = match NodeConfig::load(process::config_arg().as_deref()) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let bus = Bus::new();
    let mut node = Sensor::new(bus.clone(), config.sensor);
    if let Err(e) = node.start() {
        log::error!("failed to start sensor: {}", e);
        return ExitCode::FAILURE;
    }

    process::wait_for_shutdown();
    node.stop();
    bus.shutdown();
    ExitCode::SUCCESS
}
