/// 68-point landmark network (PFLD-style) using ONNX Runtime via `ort`.
///
/// Runs on a square crop around each face box and maps the predicted
/// points back into frame coordinates.
use std::path::Path;

use crate::detection::domain::face_detection::BoundingBox;
use crate::detection::domain::face_landmarks::{FaceLandmarks, LandmarkLayout};
use crate::detection::domain::landmark_detector::LandmarkDetector;
use crate::shared::frame::Frame;

use super::execution_provider::load_session;

/// Fallback crop resolution when the model input shape is dynamic.
const DEFAULT_INPUT_SIZE: u32 = 112;

/// Crop side relative to the longer side of the face box.
const CROP_EXPANSION: f64 = 1.2;

const NUM_POINTS: usize = 68;

pub struct OnnxLandmark68Detector {
    session: ort::session::Session,
    input_size: u32,
}

impl OnnxLandmark68Detector {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let session = load_session(model_path)?;
        let input_size = session
            .inputs()
            .first()
            .and_then(|input| match input.dtype() {
                ort::value::ValueType::Tensor { shape, .. } if shape.len() >= 4 && shape[2] > 0 => {
                    Some(shape[2] as u32)
                }
                _ => None,
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);
        Ok(Self {
            session,
            input_size,
        })
    }
}

impl LandmarkDetector for OnnxLandmark68Detector {
    fn landmarks(
        &mut self,
        frame: &Frame,
        face: &BoundingBox,
    ) -> Result<FaceLandmarks, Box<dyn std::error::Error>> {
        let crop = square_crop(face, CROP_EXPANSION);
        if crop.width < 1.0 {
            return Err("Face box is empty".into());
        }
        let input_tensor = crop_tensor(frame, &crop, self.input_size);

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("Landmark model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;
        if data.len() < NUM_POINTS * 2 {
            return Err(format!(
                "Landmark model expected {} values, got {}",
                NUM_POINTS * 2,
                data.len()
            )
            .into());
        }

        let points = decode_points(&data[..NUM_POINTS * 2], &crop, self.input_size);
        Ok(FaceLandmarks::from_points(LandmarkLayout::SixtyEight, &points)?)
    }
}

/// Square box centred on `face` with side `max(w, h) * expansion`.
fn square_crop(face: &BoundingBox, expansion: f64) -> BoundingBox {
    let side = face.width.max(face.height) * expansion;
    let cx = face.x + face.width / 2.0;
    let cy = face.y + face.height / 2.0;
    BoundingBox {
        x: cx - side / 2.0,
        y: cy - side / 2.0,
        width: side,
        height: side,
    }
}

/// Samples `crop` (which may extend past the frame) into a NCHW tensor.
/// Out-of-frame pixels are left black.
fn crop_tensor(frame: &Frame, crop: &BoundingBox, size: u32) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let src_w = frame.width() as f64;
    let src_h = frame.height() as f64;
    let s = size as usize;
    let step = crop.width / s as f64;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));
    for y in 0..s {
        let sy = crop.y + (y as f64 + 0.5) * step;
        if sy < 0.0 || sy >= src_h {
            continue;
        }
        for x in 0..s {
            let sx = crop.x + (x as f64 + 0.5) * step;
            if sx < 0.0 || sx >= src_w {
                continue;
            }
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[sy as usize, sx as usize, c]] as f32 / 255.0;
            }
        }
    }
    tensor
}

/// Maps raw `(x, y)` pairs to frame pixels.
///
/// Models emit either crop-normalized coordinates in `[0, 1]` or pixels in
/// input space; values well above 1 are treated as the latter.
fn decode_points(raw: &[f32], crop: &BoundingBox, input_size: u32) -> Vec<(f64, f64)> {
    let pixel_space = raw.iter().any(|v| *v > 1.5);
    let norm = if pixel_space { input_size as f64 } else { 1.0 };
    raw.chunks_exact(2)
        .map(|p| {
            (
                crop.x + p[0] as f64 / norm * crop.width,
                crop.y + p[1] as f64 / norm * crop.height,
            )
        })
        .collect()
}
