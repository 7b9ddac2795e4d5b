use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use landmark_cam_core::camera::infrastructure::ffmpeg_camera;
use landmark_cam_core::detection::infrastructure::detector_factory::DetectorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Detector {
    Yolo,
    Blazeface,
}

impl Detector {
    pub const ALL: &[Detector] = &[Detector::Yolo, Detector::Blazeface];
}

impl std::fmt::Display for Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Detector::Yolo => write!(f, "YOLO"),
            Detector::Blazeface => write!(f, "BlazeFace (tiny)"),
        }
    }
}

impl From<Detector> for DetectorKind {
    fn from(detector: Detector) -> Self {
        match detector {
            Detector::Yolo => DetectorKind::Yolo,
            Detector::Blazeface => DetectorKind::Blazeface,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Appearance {
    Dark,
    Light,
}

impl Appearance {
    pub const ALL: &[Appearance] = &[Appearance::Dark, Appearance::Light];
}

impl std::fmt::Display for Appearance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Appearance::Dark => write!(f, "Dark"),
            Appearance::Light => write!(f, "Light"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub device: String,
    #[serde(default)]
    pub input_format: Option<String>,
    pub detector: Detector,
    #[serde(default)]
    pub landmarks68: bool,
    /// Percent, 1-100.
    pub confidence: u32,
    pub interval_ms: u32,
    #[serde(default = "default_appearance")]
    pub appearance: Appearance,
}

fn default_appearance() -> Appearance {
    Appearance::Dark
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device: ffmpeg_camera::default_device_name().to_string(),
            input_format: None,
            detector: Detector::Yolo,
            landmarks68: false,
            confidence: 50,
            interval_ms: 100,
            appearance: default_appearance(),
        }
    }
}

impl Settings {
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("Landmark Cam").join("settings.json"))
    }

    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    pub fn save(&self) {
        if let Some(path) = Self::config_path() {
            if let Err(e) = self.save_to(&path) {
                log::warn!("Failed to save settings to {}: {e}", path.display());
            }
        }
    }

    /// Missing or unreadable files yield the defaults.
    pub fn load_from(path: &Path) -> Self {
        fs::read_to_string(path)
            .ok()
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default()
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn confidence_fraction(&self) -> f64 {
        self.confidence.clamp(1, 100) as f64 / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = Settings {
            device: "/dev/video2".into(),
            detector: Detector::Blazeface,
            landmarks68: true,
            confidence: 70,
            interval_ms: 250,
            ..Default::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path), settings);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            Settings::load_from(&dir.path().join("absent.json")),
            Settings::default()
        );
    }

    #[test]
    fn test_corrupt_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
    }

    #[test]
    fn test_older_file_without_optional_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"device":"0","detector":"yolo","confidence":40,"interval_ms":100}"#,
        )
        .unwrap();
        let settings = Settings::load_from(&path);
        assert_eq!(settings.device, "0");
        assert!(!settings.landmarks68);
        assert_eq!(settings.appearance, Appearance::Dark);
    }

    #[test]
    fn test_confidence_fraction_is_clamped() {
        let mut settings = Settings::default();
        settings.confidence = 0;
        assert!((settings.confidence_fraction() - 0.01).abs() < f64::EPSILON);
        settings.confidence = 250;
        assert!((settings.confidence_fraction() - 1.0).abs() < f64::EPSILON);
    }
}
