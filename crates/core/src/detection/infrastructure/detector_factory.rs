use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::constants::{
    BLAZEFACE_MODEL_NAME, BUNDLED_MODELS_DIR, LANDMARK68_MODEL_NAME, YOLO_MODEL_NAME,
    YOLO_MODEL_URL,
};
use crate::shared::model_resolver::{self, ModelResolveError, ModelSpec, ProgressFn};

use super::landmark_augmented_detector::LandmarkAugmentedDetector;
use super::onnx_blazeface_detector::{self, OnnxBlazefaceDetector};
use super::onnx_landmark68_detector::OnnxLandmark68Detector;
use super::onnx_yolo_detector::{self, OnnxYoloDetector};

/// Which face detection network to run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DetectorKind {
    #[default]
    Yolo,
    /// Small, fast BlazeFace model.
    Blazeface,
}

impl DetectorKind {
    pub const ALL: [DetectorKind; 2] = [DetectorKind::Yolo, DetectorKind::Blazeface];

    pub fn model(self) -> ModelSpec<'static> {
        match self {
            DetectorKind::Yolo => ModelSpec {
                name: YOLO_MODEL_NAME,
                url: Some(YOLO_MODEL_URL),
            },
            DetectorKind::Blazeface => ModelSpec {
                name: BLAZEFACE_MODEL_NAME,
                url: None,
            },
        }
    }

    pub fn default_confidence(self) -> f64 {
        match self {
            DetectorKind::Yolo => onnx_yolo_detector::DEFAULT_CONFIDENCE,
            DetectorKind::Blazeface => onnx_blazeface_detector::DEFAULT_CONFIDENCE,
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DetectorKind::Yolo => "yolo",
            DetectorKind::Blazeface => "blazeface",
        })
    }
}

impl FromStr for DetectorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yolo" => Ok(DetectorKind::Yolo),
            "blazeface" | "tiny" => Ok(DetectorKind::Blazeface),
            other => Err(format!("unknown detector '{other}' (expected yolo or blazeface)")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DetectorOptions {
    pub kind: DetectorKind,
    /// `None` uses the detector's own default.
    pub confidence: Option<f64>,
    /// Refine every face with the 68-point landmark network.
    pub landmarks68: bool,
    pub bundled_dir: PathBuf,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            kind: DetectorKind::default(),
            confidence: None,
            landmarks68: false,
            bundled_dir: PathBuf::from(BUNDLED_MODELS_DIR),
        }
    }
}

/// Resolved model files for a detector configuration.
#[derive(Debug, PartialEq)]
pub struct ModelPaths {
    pub detector: PathBuf,
    pub landmarks68: Option<PathBuf>,
}

/// Locates (downloading if needed) every model `options` requires.
pub fn resolve_models(
    options: &DetectorOptions,
    cache_dir: &Path,
    progress: Option<ProgressFn>,
) -> Result<ModelPaths, ModelResolveError> {
    let bundled = Some(options.bundled_dir.as_path());
    let detector = model_resolver::resolve_in(cache_dir, options.kind.model(), bundled, progress)?;
    let landmarks68 = if options.landmarks68 {
        let spec = ModelSpec {
            name: LANDMARK68_MODEL_NAME,
            url: None,
        };
        Some(model_resolver::resolve_in(cache_dir, spec, bundled, None)?)
    } else {
        None
    };
    Ok(ModelPaths {
        detector,
        landmarks68,
    })
}

/// Resolves the models and builds the detector stack.
pub fn build_detector(
    options: &DetectorOptions,
    progress: Option<ProgressFn>,
) -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error>> {
    let cache_dir = model_resolver::model_cache_dir()?;
    let paths = resolve_models(options, &cache_dir, progress)?;
    let confidence = options
        .confidence
        .unwrap_or_else(|| options.kind.default_confidence());

    log::info!(
        "Loading {} detector from {} (confidence {confidence})",
        options.kind,
        paths.detector.display()
    );
    let base: Box<dyn FaceDetector> = match options.kind {
        DetectorKind::Yolo => Box::new(OnnxYoloDetector::new(&paths.detector, confidence)?),
        DetectorKind::Blazeface => {
            Box::new(OnnxBlazefaceDetector::new(&paths.detector, confidence)?)
        }
    };

    match paths.landmarks68 {
        Some(path) => {
            log::info!("Loading 68-point landmarks from {}", path.display());
            let landmarker = OnnxLandmark68Detector::new(&path)?;
            Ok(Box::new(LandmarkAugmentedDetector::new(base, Box::new(landmarker))))
        }
        None => Ok(base),
    }
}
