//! Control node.

use samvaad::Bus;
use sarathi::config::NodeConfig;
use sarathi::control::Control;
use sarathi::process;
use std::process::ExitCode;

fn main() -> ExitCode {
    process::init_logging();
    log::info!("=== Sarathi control starting ===");

    let config = match NodeConfig::load(process::config_arg().as_deref()) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let bus = Bus::new();
    let mut node = Control::new(bus.clone(), config.control);
    if let Err(e) = node.start() {
        log::error!("failed to start control: {}", e);
        return ExitCode::FAILURE;
    }

    process::wait_for_shutdown();
    node.stop();
    bus.shutdown();
    ExitCode::SUCCESS
}
