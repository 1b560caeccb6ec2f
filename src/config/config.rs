use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Error};
use serde::{Deserialize, Serialize};

/// Settings passed to the face detector on every call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FaceDetectionConfig {
    /// 0 selects the short-range model, 1 the full-range (higher recall) model.
    pub model_selection: u8,
    pub min_detection_confidence: f32,
}

impl FaceDetectionConfig {
    pub fn new() -> Self {
        FaceDetectionConfig {
            model_selection: 1,
            min_detection_confidence: 0.5,
        }
    }
}

impl Default for FaceDetectionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings passed to the landmark engine on every call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FaceMeshConfig {
    pub static_image_mode: bool,
    pub refine_landmarks: bool,
    pub min_detection_confidence: f32,
}

impl FaceMeshConfig {
    pub fn new() -> Self {
        FaceMeshConfig {
            static_image_mode: true,
            refine_landmarks: true,
            min_detection_confidence: 0.5,
        }
    }
}

impl Default for FaceMeshConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    /// Empty means any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_upload_bytes: 20 * 1024 * 1024,
            cors_origins: vec![],
        }
    }
}

/// Where the detection models are served and how their inputs are prepared.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TritonConfig {
    pub url: String,
    pub timeout: u64,
    pub short_range_model: String,
    pub full_range_model: String,
    /// Short-range detector input as (width, height).
    pub short_range_imsize: (u32, u32),
    /// Full-range detector input as (width, height).
    pub detection_imsize: (u32, u32),
    pub detection_mean: f32,
    pub detection_scale: f32,
    pub face_mesh_model: String,
    pub face_mesh_refined_model: String,
    pub face_mesh_imsize: (u32, u32),
    pub face_mesh_mean: f32,
    pub face_mesh_scale: f32,
}

impl Default for TritonConfig {
    fn default() -> Self {
        TritonConfig {
            url: "http://127.0.0.1:8001".to_string(),
            timeout: 20,
            short_range_model: "face_detection_short_range".to_string(),
            full_range_model: "face_detection_full_range".to_string(),
            short_range_imsize: (128, 128),
            detection_imsize: (192, 192),
            detection_mean: 127.5,
            detection_scale: 1.0 / 127.5,
            face_mesh_model: "face_landmark".to_string(),
            face_mesh_refined_model: "face_landmark_with_attention".to_string(),
            face_mesh_imsize: (192, 192),
            face_mesh_mean: 0.0,
            face_mesh_scale: 1.0 / 255.0,
        }
    }
}

impl TritonConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub triton: TritonConfig,
}

impl ServiceConfig {
    /// Reads a TOML file; a missing file yields the defaults. Environment
    /// variables `FACE_API_HOST`, `FACE_API_PORT` and `TRITON_URL` win over both.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                let config = Self::from_toml(&content)
                    .with_context(|| format!("failed to parse config {}", path.display()))?;
                tracing::info!("loaded configuration from {}", path.display());
                config
            }
            Some(path) => {
                tracing::warn!("configuration file {} not found, using defaults", path.display());
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, Error> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env<F>(&mut self, var: F) -> Result<(), Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = var("FACE_API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("FACE_API_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("FACE_API_PORT is not a port number: {port:?}"))?;
        }
        if let Some(url) = var("TRITON_URL") {
            self.triton.url = url;
        }
        Ok(())
    }
}
