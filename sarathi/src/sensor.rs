//! Camera sensor synthesis.
//!
//! Consumes the simulator's ground truth and renders what a front camera
//! would report: obstacles transformed into the camera frame, gated by
//! field of view and range, perturbed with Gaussian measurement noise,
//! plus a synthesized grayscale image. The frame is far larger than one
//! datagram, so it always goes out through the chunked path.

use crate::config::SensorConfig;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use samvaad::{now_ms, Bus, StatusReporter, SubscriptionId, Worker};
use sarathi_msgs::{topics, CameraFrame, CameraObject, WorldState};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const IMAGE_WIDTH: u32 = 160;
const IMAGE_HEIGHT: u32 = 120;

pub struct Sensor {
    bus: Bus,
    config: SensorConfig,
    latest_world: Arc<Mutex<Option<WorldState>>>,
    subscriptions: Vec<SubscriptionId>,
    worker: Option<Worker>,
    reporter: Option<StatusReporter>,
}

impl Sensor {
    pub fn new(bus: Bus, config: SensorConfig) -> Sensor {
        Sensor {
            bus,
            config,
            latest_world: Arc::new(Mutex::new(None)),
            subscriptions: Vec::new(),
            worker: None,
            reporter: None,
        }
    }

    pub fn start(&mut self) -> samvaad::Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let latest = Arc::clone(&self.latest_world);
        self.subscriptions.push(self.bus.subscribe(topics::VISUALIZER_DATA, move |msg| {
            if let Ok(world) = bincode::deserialize::<WorldState>(&msg.payload) {
                *latest.lock().unwrap_or_else(|e| e.into_inner()) = Some(world);
            }
        })?);

        let bus = self.bus.clone();
        let latest = Arc::clone(&self.latest_world);
        let config = self.config.clone();
        let image = synthesize_test_image();
        let mut rng = SmallRng::from_entropy();
        let period = Duration::from_millis(self.config.frame_rate_ms);

        self.worker = Some(Worker::spawn_periodic("sensor", period, move || {
            let world = latest.lock().unwrap_or_else(|e| e.into_inner()).clone();
            let Some(world) = world else {
                return Ok(());
            };

            let mut frame = build_camera_frame(&world, &config, &mut rng);
            frame.image_width = IMAGE_WIDTH;
            frame.image_height = IMAGE_HEIGHT;
            frame.image_format = "gray8".to_string();
            frame.image = image.clone();

            match bincode::serialize(&frame) {
                Ok(bytes) => bus.publish_large(topics::CAMERA_FRONT, &bytes),
                Err(e) => {
                    log::warn!("sensor: failed to serialize camera frame: {}", e);
                    Ok(())
                }
            }
        }));

        self.reporter = Some(StatusReporter::start(self.bus.clone(), "SensorNode"));
        log::info!("sensor started: camera at {} ms per frame", self.config.frame_rate_ms);
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
        log::info!("sensor stopped");
    }
}

impl Drop for Sensor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Transform every obstacle into the camera frame and keep the ones a
/// forward camera would see.
fn build_camera_frame<R: rand::Rng>(
    world: &WorldState,
    config: &SensorConfig,
    rng: &mut R,
) -> CameraFrame {
    let noise = match Normal::new(0.0, config.noise_sigma) {
        Ok(normal) => Some(normal),
        Err(_) => {
            log::warn!(
                "sensor: invalid noise sigma {}, measurements will be exact",
                config.noise_sigma
            );
            None
        }
    };

    let ego = &world.car;
    let (sin_h, cos_h) = (-ego.heading).sin_cos();
    let mut objects = Vec::new();

    for obstacle in &world.obstacles {
        // World -> ego: translate then rotate by -heading.
        let dx = obstacle.position.x - ego.position.x;
        let dy = obstacle.position.y - ego.position.y;
        let rel_x = dx * cos_h - dy * sin_h;
        let rel_y = dx * sin_h + dy * cos_h;

        // Ego -> camera: the camera sits ahead of the vehicle center.
        let cam_x = rel_x - config.mount_offset_x;
        let cam_y = rel_y - config.mount_offset_y;

        let angle_deg = cam_y.atan2(cam_x).to_degrees();
        let distance = cam_x.hypot(cam_y);
        let in_view =
            cam_x > 0.0 && angle_deg.abs() < config.fov / 2.0 && distance < config.max_distance;
        if !in_view {
            continue;
        }

        let (noise_x, noise_y) = match &noise {
            Some(normal) => (normal.sample(rng), normal.sample(rng)),
            None => (0.0, 0.0),
        };
        objects.push(CameraObject {
            id: obstacle.id,
            kind: obstacle.kind.clone(),
            rel_x: cam_x + noise_x,
            rel_y: cam_y + noise_y,
            width: 1.8,
            height: 1.6,
        });
    }

    CameraFrame {
        timestamp_ms: now_ms(),
        objects,
        ..CameraFrame::default()
    }
}

/// Deterministic grayscale test card: a gradient with a centered block,
/// enough texture to verify chunked image transfer end to end.
fn synthesize_test_image() -> Vec<u8> {
    let (w, h) = (IMAGE_WIDTH as usize, IMAGE_HEIGHT as usize);
    let mut image = vec![0u8; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut value = ((x * 255) / w) as u8 ^ ((y * 255) / h) as u8;
            if (w / 3..2 * w / 3).contains(&x) && (h / 3..2 * h / 3).contains(&y) {
                value = value.wrapping_add(96);
            }
            image[y * w + x] = value;
        }
    }
    image
}
