//! Map server: static lane geometry at 1 Hz.
//!
//! The map never changes, but it is re-published every second so late
//! joiners (the visualizer in particular) pick it up without a request
//! channel. The JSON is a few kilobytes and travels chunked.

use samvaad::{Bus, StatusReporter, Worker};
use sarathi_msgs::{topics, Lane, LaneMap, Point3};
use std::sync::Arc;
use std::time::Duration;

pub struct MapServer {
    bus: Bus,
    worker: Option<Worker>,
    reporter: Option<StatusReporter>,
}

impl MapServer {
    pub fn new(bus: Bus) -> MapServer {
        MapServer {
            bus,
            worker: None,
            reporter: None,
        }
    }

    pub fn start(&mut self) -> samvaad::Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let map = generate_lanes();
        log::info!("map: generated {} lanes", map.lanes.len());
        let payload = Arc::new(serde_json::to_vec(&map)?);

        let bus = self.bus.clone();
        self.worker = Some(Worker::spawn_periodic(
            "map",
            Duration::from_secs(1),
            move || bus.publish_large(topics::VISUALIZER_MAP, payload.as_slice()),
        ));

        self.reporter = Some(StatusReporter::start(self.bus.clone(), "MapNode"));
        log::info!("map started");
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(mut reporter) = self.reporter.take() {
            reporter.stop();
        }
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
        log::info!("map stopped");
    }
}

impl Drop for MapServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Two lanes over x in [-50, 100]: the straight demo lane and a sine
/// curve beside it.
fn generate_lanes() -> LaneMap {
    let xs = (-50..=100).step_by(2);

    let straight = Lane {
        id: 1,
        center_line: xs
            .clone()
            .map(|x| Point3 {
                x: x as f64,
                y: 0.0,
                z: 0.0,
            })
            .collect(),
    };

    let curved = Lane {
        id: 2,
        center_line: xs
            .map(|x| Point3 {
                x: x as f64,
                y: 10.0 * (x as f64 / 20.0).sin() + 15.0,
                z: 0.0,
            })
            .collect(),
    };

    LaneMap::new(vec![straight, curved])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_geometry() {
        let map = generate_lanes();
        assert!(map.is_valid());
        assert_eq!(map.lanes.len(), 2);
        assert_eq!(map.lanes[0].center_line.len(), 76);
        assert!(map.lanes[0].center_line.iter().all(|p| p.y == 0.0));
        // The sine lane stays within its 10 m amplitude around y=15.
        assert!(map.lanes[1]
            .center_line
            .iter()
            .all(|p| (p.y - 15.0).abs() <= 10.0));
    }

    #[test]
    fn test_map_payload_needs_chunking() {
        let map = generate_lanes();
        let json = serde_json::to_vec(&map).unwrap();
        assert!(json.len() > samvaad::chunk::EFFECTIVE_CHUNK_SIZE);
    }
}
