//! Camera frame and 2-D detection records (bincode on the wire).

use serde::{Deserialize, Serialize};

/// One object visible to the front camera, in camera coordinates
/// (x forward, y left, meters).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraObject {
    pub id: u32,
    pub kind: String,
    pub rel_x: f64,
    pub rel_y: f64,
    pub width: f64,
    pub height: f64,
}

/// Synthesized camera frame published on `sensor/camera/front`.
///
/// Carries both the detected object list and the raw image bytes; the
/// image pushes the record well past the datagram MTU, so this topic is
/// always published through the chunked path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CameraFrame {
    pub timestamp_ms: i64,
    pub objects: Vec<CameraObject>,
    pub image_width: u32,
    pub image_height: u32,
    /// Pixel format tag ("gray8" for the synthesized image).
    pub image_format: String,
    pub image: Vec<u8>,
}

/// Axis-aligned pixel box for the visualizer overlay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub label: String,
    pub score: f32,
}

/// Detections projected into image space, on `perception/detection_2d`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Detection2dArray {
    pub timestamp_ms: i64,
    pub boxes: Vec<BoundingBox>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_frame_round_trip_preserves_image() {
        let frame = CameraFrame {
            timestamp_ms: 1,
            objects: vec![CameraObject {
                id: 3,
                kind: "car".to_string(),
                rel_x: 12.0,
                rel_y: -0.5,
                width: 1.8,
                height: 1.6,
            }],
            image_width: 160,
            image_height: 120,
            image_format: "gray8".to_string(),
            image: (0..160 * 120).map(|i| (i % 256) as u8).collect(),
        };
        let bytes = bincode::serialize(&frame).unwrap();
        let back: CameraFrame = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back.image.len(), 160 * 120);
        assert_eq!(back.image, frame.image);
        assert_eq!(back.objects.len(), 1);
    }
}
