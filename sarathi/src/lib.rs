//! Sarathi — the multi-process autonomous-driving demonstrator.
//!
//! Ten independent node binaries built on the [`samvaad`] bus:
//!
//! - `simulator` owns the ground truth (vehicle physics + scenario)
//! - `sensor` synthesizes camera frames from it
//! - `perception` turns camera objects back into world obstacles
//! - `prediction` rolls obstacles forward at constant velocity
//! - `planning` draws Bézier paths to the user's target
//! - `control` tracks the plan with pure pursuit
//! - `map` serves the static lane geometry
//! - `visualizer` bridges everything to WebSocket front-ends
//! - `daemon` supervises node processes
//! - `monitor` shows a terminal dashboard
//!
//! Each module hosts one node component with the same `start`/`stop`
//! shape; the binaries under `src/bin/` are thin mains around them.

pub mod config;
pub mod control;
pub mod daemon;
pub mod map;
pub mod monitor;
pub mod perception;
pub mod planning;
pub mod prediction;
pub mod process;
pub mod sensor;
pub mod simulator;
pub mod visualizer;
