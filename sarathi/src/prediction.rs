//! Prediction: constant-velocity rollout of perceived obstacles.
//!
//! Keeps a short history per obstacle id, estimates velocity by finite
//! differences, and publishes a 5-second trajectory per obstacle at
//! 10 Hz. Histories that stop updating are evicted after 5 seconds so a
//! vanished obstacle does not haunt the prediction set.

use samvaad::{now_ms, Bus, StatusReporter, SubscriptionId, Worker};
use sarathi_msgs::{
    topics, ObstacleSet, Point2, PredictedObstacle, PredictedPoint, PredictionSet, Velocity,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How far into the future to roll obstacles, seconds.
const PREDICTION_HORIZON: f64 = 5.0;
/// Sample spacing of the predicted trajectory, seconds.
const TIME_STEP: f64 = 0.1;
/// Below this speed an obstacle is treated as stationary.
const MIN_SPEED_THRESHOLD: f64 = 0.1;
/// Histories idle longer than this are dropped, ms.
const HISTORY_TIMEOUT_MS: i64 = 5000;

#[derive(Debug, Clone, Copy, Default)]
struct ObstacleHistory {
    x: f64,
    y: f64,
    timestamp_ms: i64,
    vx: f64,
    vy: f64,
    speed: f64,
}

pub struct Prediction {
    bus: Bus,
    histories: Arc<Mutex<HashMap<u32, ObstacleHistory>>>,
    subscriptions: Vec<SubscriptionId>,
    worker: Option<Worker>,
    reporter: Option<StatusReporter>,
}

impl Prediction {
    pub fn new(bus: Bus) -> Prediction {
        Prediction {
            bus,
            histories: Arc::new(Mutex::new(HashMap::new())),
            subscriptions: Vec::new(),
            worker: None,
            reporter: None,
        }
    }

    pub fn start(&mut self) -> samvaad::Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let histories = Arc::clone(&self.histories);
        self.subscriptions.push(self.bus.subscribe(topics::PERCEPTION_OBSTACLES, move |msg| {
            let Ok(set) = serde_json::from_slice::<ObstacleSet>(&msg.payload) else {
                log::warn!("prediction: unparsable obstacle set");
                return;
            };
            if !set.is_valid() {
                return;
            }

            let now = now_ms();
            let mut histories = histories.lock().unwrap_or_else(|e| e.into_inner());
            for obstacle in &set.obstacles {
                update_history(
                    histories.entry(obstacle.id).or_default(),
                    obstacle.position.x,
                    obstacle.position.y,
                    now,
                );
            }
            histories.retain(|_, h| now - h.timestamp_ms <= HISTORY_TIMEOUT_MS);
        })?);

        let bus = self.bus.clone();
        let histories = Arc::clone(&self.histories);
        self.worker = Some(Worker::spawn_periodic(
            "prediction",
            Duration::from_millis(100),
            move || {
                let obstacles: Vec<PredictedObstacle> = {
                    let histories = histories.lock().unwrap_or_else(|e| e.into_inner());
                    histories
                        .iter()
                        .filter(|(_, h)| h.timestamp_ms != 0)
                        .map(|(&id, history)| PredictedObstacle {
                            id,
                            current_position: Point2::new(history.x, history.y),
                            velocity: Velocity {
                                vx: history.vx,
                                vy: history.vy,
                                speed: history.speed,
                            },
                            trajectory: predict_trajectory(history),
                        })
                        .collect()
                };

                // Publish even when empty so the front-end can tell the
                // module is alive.
                let set = PredictionSet::new(now_ms(), obstacles);
                let json = serde_json::to_vec(&set)?;
                bus.publish_large(topics::PREDICTION_TRAJECTORIES, &json)
            },
        ));

        self.reporter = Some(StatusReporter::start(self.bus.clone(), "PredictionNode"));
        log::info!("prediction started");
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(mut reporter) = self.reporter.take() {
            reporter.stop();
        }
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
        for id in self.subscriptions.drain(..) {
            self.bus.unsubscribe(id);
        }
        log::info!("prediction stopped");
    }
}

impl Drop for Prediction {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Fold one observation into the history, estimating velocity when the
/// time base is trustworthy (10 ms..5 s between samples).
fn update_history(history: &mut ObstacleHistory, x: f64, y: f64, timestamp_ms: i64) {
    if history.timestamp_ms != 0 {
        let dt = (timestamp_ms - history.timestamp_ms) as f64 / 1000.0;
        if dt > 0.01 && dt < 5.0 {
            history.vx = (x - history.x) / dt;
            history.vy = (y - history.y) / dt;
            history.speed = history.vx.hypot(history.vy);
        }
    }
    history.x = x;
    history.y = y;
    history.timestamp_ms = timestamp_ms;
}

/// Constant-velocity rollout. Stationary obstacles predict in place with
/// full confidence; moving ones decay toward 0.5 over the horizon with a
/// floor of 0.3.
fn predict_trajectory(history: &ObstacleHistory) -> Vec<PredictedPoint> {
    let stationary = history.speed < MIN_SPEED_THRESHOLD;
    let steps = (PREDICTION_HORIZON / TIME_STEP) as usize;
    (1..=steps)
        .map(|i| {
            let t = i as f64 * TIME_STEP;
            if stationary {
                PredictedPoint {
                    x: history.x,
                    y: history.y,
                    time_offset: t,
                    confidence: 1.0,
                }
            } else {
                PredictedPoint {
                    x: history.x + history.vx * t,
                    y: history.y + history.vy * t,
                    time_offset: t,
                    confidence: (1.0 - (t / PREDICTION_HORIZON) * 0.5).max(0.3),
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_velocity_from_two_observations() {
        let mut history = ObstacleHistory::default();
        update_history(&mut history, 0.0, 0.0, 1000);
        assert!(history.speed.abs() < f64::EPSILON);
        update_history(&mut history, 3.0, 4.0, 2000);
        assert!((history.vx - 3.0).abs() < 1e-9);
        assert!((history.vy - 4.0).abs() < 1e-9);
        assert!((history.speed - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_bogus_time_base_keeps_old_velocity() {
        let mut history = ObstacleHistory::default();
        update_history(&mut history, 0.0, 0.0, 1000);
        update_history(&mut history, 1.0, 0.0, 2000);
        let speed = history.speed;
        // Same-millisecond duplicate: position updates, velocity holds.
        update_history(&mut history, 50.0, 0.0, 2000);
        assert!((history.speed - speed).abs() < 1e-9);
        assert!((history.x - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_moving_obstacle_rolls_forward() {
        let history = ObstacleHistory {
            x: 10.0,
            y: 0.0,
            timestamp_ms: 1,
            vx: 2.0,
            vy: 0.0,
            speed: 2.0,
        };
        let trajectory = predict_trajectory(&history);
        assert_eq!(trajectory.len(), 50);
        let last = trajectory.last().unwrap();
        assert!((last.x - 20.0).abs() < 1e-9);
        assert!((last.time_offset - 5.0).abs() < 1e-9);
        assert!(last.confidence >= 0.3 && last.confidence < trajectory[0].confidence);
    }

    #[test]
    fn test_stationary_obstacle_predicts_in_place() {
        let history = ObstacleHistory {
            x: 7.0,
            y: -2.0,
            timestamp_ms: 1,
            speed: 0.01,
            ..ObstacleHistory::default()
        };
        let trajectory = predict_trajectory(&history);
        assert!(trajectory.iter().all(|p| p.x == 7.0 && p.y == -2.0));
        assert!(trajectory.iter().all(|p| (p.confidence - 1.0).abs() < f64::EPSILON));
    }
}
