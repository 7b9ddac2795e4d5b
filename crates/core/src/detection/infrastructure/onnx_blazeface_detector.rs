/// BlazeFace face detector using ONNX Runtime via `ort`.
///
/// The lightweight option: a 128×128 short-range model producing boxes and
/// six coarse keypoints per face.
use std::path::Path;

use crate::detection::domain::face_detection::{BoundingBox, FaceDetection};
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::face_landmarks::{FaceLandmarks, LandmarkLayout};
use crate::shared::frame::Frame;

use super::execution_provider::load_session;
use super::math::{nms, sigmoid, RawDetection};

/// BlazeFace model input resolution.
const INPUT_SIZE: u32 = 128;

/// Default confidence threshold.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.3;

/// Number of BlazeFace anchors (short-range model).
const NUM_ANCHORS: usize = 896;

/// Values per anchor in the regressor output: box (4) + 6 keypoints × (x, y).
const REGRESSOR_STRIDE: usize = 16;

const NUM_KEYPOINTS: usize = 6;

/// BlazeFace face detector backed by an ONNX Runtime session.
pub struct OnnxBlazefaceDetector {
    session: ort::session::Session,
    confidence: f64,
    anchors: Vec<[f32; 2]>,
}

impl OnnxBlazefaceDetector {
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let session = load_session(model_path)?;
        Ok(Self {
            session,
            confidence,
            anchors: generate_anchors(),
        })
    }
}

impl FaceDetector for OnnxBlazefaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceDetection>, Box<dyn std::error::Error>> {
        let fw = frame.width() as f64;
        let fh = frame.height() as f64;

        let input_tensor = preprocess(frame, INPUT_SIZE);
        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;

        // regressors: [1, 896, 16], classificators: [1, 896, 1]
        if outputs.len() < 2 {
            return Err(
                format!("BlazeFace model expected 2 outputs, got {}", outputs.len()).into(),
            );
        }

        let regressors = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let reg_data = regressors.as_slice().ok_or("Cannot get regressor slice")?;
        let score_data = scores.as_slice().ok_or("Cannot get score slice")?;

        let num_anchors = self.anchors.len().min(NUM_ANCHORS);
        let mut raw_dets = Vec::new();
        for (i, &raw_score) in score_data.iter().enumerate().take(num_anchors) {
            let score = sigmoid(raw_score);
            if (score as f64) < self.confidence {
                continue;
            }
            let offset = i * REGRESSOR_STRIDE;
            let Some(reg) = reg_data.get(offset..offset + REGRESSOR_STRIDE) else {
                break;
            };
            raw_dets.push(decode_anchor(reg, &self.anchors[i], score as f64, fw, fh));
        }

        let detections = nms(raw_dets, NMS_IOU_THRESH)
            .into_iter()
            .map(|d| {
                let bbox = BoundingBox::from_corners(d.bbox[0], d.bbox[1], d.bbox[2], d.bbox[3]);
                let face = FaceDetection::new(bbox, d.score);
                match FaceLandmarks::new(LandmarkLayout::SixPoint, d.keypoints) {
                    Ok(lm) => face.with_landmarks(lm),
                    Err(_) => face,
                }
            })
            .collect();

        Ok(detections)
    }
}

/// Decodes one anchor's regressor slice into frame pixel coordinates.
fn decode_anchor(reg: &[f32], anchor: &[f32; 2], score: f64, fw: f64, fh: f64) -> RawDetection {
    let size = INPUT_SIZE as f32;
    let cx = anchor[0] + reg[0] / size;
    let cy = anchor[1] + reg[1] / size;
    let w = reg[2] / size;
    let h = reg[3] / size;

    let x1 = ((cx - w / 2.0) as f64 * fw).max(0.0);
    let y1 = ((cy - h / 2.0) as f64 * fh).max(0.0);
    let x2 = ((cx + w / 2.0) as f64 * fw).min(fw);
    let y2 = ((cy + h / 2.0) as f64 * fh).min(fh);

    let keypoints = (0..NUM_KEYPOINTS)
        .map(|k| {
            let kx = anchor[0] + reg[4 + k * 2] / size;
            let ky = anchor[1] + reg[4 + k * 2 + 1] / size;
            Some((kx as f64 * fw, ky as f64 * fh))
        })
        .collect();

    RawDetection {
        bbox: [x1, y1, x2, y2],
        score,
        keypoints,
    }
}

/// Resize frame to `size × size` and normalize to [0,1] NCHW float32.
fn preprocess(frame: &Frame, size: u32) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;
    let s = size as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));

    for y in 0..s {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / s as f64) as usize).min(src_h - 1);
        for x in 0..s {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / s as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    tensor
}

/// Short-range anchors: a 16×16 grid with 2 anchors per cell and an 8×8
/// grid with 6 per cell.
fn generate_anchors() -> Vec<[f32; 2]> {
    let strides = [(8, 2), (16, 6)]; // (stride, anchors_per_cell)
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);

    for &(stride, num) in &strides {
        let grid_size = INPUT_SIZE as usize / stride;
        for y in 0..grid_size {
            for x in 0..grid_size {
                let cx = (x as f32 + 0.5) / grid_size as f32;
                let cy = (y as f32 + 0.5) / grid_size as f32;
                for _ in 0..num {
                    anchors.push([cx, cy]);
                }
            }
        }
    }

    anchors
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_preprocess_shape_and_range() {
        let frame = Frame::filled(200, 100, [255, 255, 255], 0);
        let tensor = preprocess(&frame, 128);
        assert_eq!(tensor.shape(), &[1, 3, 128, 128]);
        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_generate_anchors_count() {
        // 16×16×2 + 8×8×6 = 512 + 384
        assert_eq!(generate_anchors().len(), NUM_ANCHORS);
    }

    #[test]
    fn test_anchors_in_unit_range() {
        for a in generate_anchors() {
            assert!(a[0] > 0.0 && a[0] < 1.0);
            assert!(a[1] > 0.0 && a[1] < 1.0);
        }
    }

    #[test]
    fn test_decode_anchor_centered_box_and_keypoints() {
        // Zero offsets, box 64×64 model pixels = half the input
        let mut reg = [0.0f32; REGRESSOR_STRIDE];
        reg[2] = 64.0;
        reg[3] = 64.0;
        let det = decode_anchor(&reg, &[0.5, 0.5], 0.9, 200.0, 100.0);
        assert_relative_eq!(det.bbox[0], 50.0, epsilon = 1e-4);
        assert_relative_eq!(det.bbox[1], 25.0, epsilon = 1e-4);
        assert_relative_eq!(det.bbox[2], 150.0, epsilon = 1e-4);
        assert_relative_eq!(det.bbox[3], 75.0, epsilon = 1e-4);
        assert_eq!(det.keypoints.len(), NUM_KEYPOINTS);
        let (kx, ky) = det.keypoints[0].unwrap();
        assert_relative_eq!(kx, 100.0, epsilon = 1e-4);
        assert_relative_eq!(ky, 50.0, epsilon = 1e-4);
    }

    #[test]
    fn test_decode_anchor_clamps_to_frame() {
        let mut reg = [0.0f32; REGRESSOR_STRIDE];
        reg[2] = 128.0;
        reg[3] = 128.0;
        let det = decode_anchor(&reg, &[0.1, 0.9], 0.9, 100.0, 100.0);
        assert_relative_eq!(det.bbox[0], 0.0);
        assert_relative_eq!(det.bbox[3], 100.0);
    }
}
