//! Monitor node.
//!
//! Usage: `monitor [topics|nodes]` — defaults to the full dashboard.

use samvaad::Bus;
use sarathi::monitor::{Monitor, MonitorMode};
use sarathi::process;
use std::process::ExitCode;

fn main() -> ExitCode {
    process::init_logging();

    let mode = MonitorMode::from_arg(std::env::args().nth(1).as_deref());
    let bus = Bus::new();
    let mut node = Monitor::new(bus.clone(), mode);
    if let Err(e) = node.start() {
        log::error!("failed to start monitor: {}", e);
        return ExitCode::FAILURE;
    }

    process::wait_for_shutdown();
    node.stop();
    bus.shutdown();
    ExitCode::SUCCESS
}
