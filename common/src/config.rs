use serde::Deserialize;
use std::cmp::Ordering;
use std::path::Path;

/// Highest fetch rate accepted for a polling camera.
pub const MAX_POLL_FPS: f64 = 60.0;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub camera: CameraConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    pub upload: UploadConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    /// `mjpeg` for a multipart stream, `polling` for a single-frame endpoint.
    #[serde(default = "default_camera_mode")]
    pub mode: String,
    pub url: String,
    /// Fetch rate in polling mode, up to [`MAX_POLL_FPS`].
    #[serde(default = "default_fps")]
    pub fps: f64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    /// Summed |dR| + |dG| + |dB| a neighbor pair must exceed to count as an edge.
    #[serde(default = "default_edge_threshold")]
    pub edge_threshold: u32,
    #[serde(default = "default_min_edge_ratio")]
    pub min_edge_ratio: f64,
    #[serde(default = "default_max_edge_ratio")]
    pub max_edge_ratio: f64,
    /// Consecutive positive classifications required before capture.
    #[serde(default = "default_confirm_frames")]
    pub confirm_frames: u32,
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval_ms(),
            edge_threshold: default_edge_threshold(),
            min_edge_ratio: default_min_edge_ratio(),
            max_edge_ratio: default_max_edge_ratio(),
            confirm_frames: default_confirm_frames(),
            settle_ms: default_settle_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub base_url: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_health_endpoint")]
    pub health_endpoint: String,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl UploadConfig {
    pub fn upload_url(&self) -> String {
        join_url(&self.base_url, &self.endpoint)
    }

    pub fn health_url(&self) -> String {
        join_url(&self.base_url, &self.health_endpoint)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.detection;
        if d.min_edge_ratio.partial_cmp(&d.max_edge_ratio) != Some(Ordering::Less) {
            return Err(ConfigError::Invalid(format!(
                "detection.min_edge_ratio ({}) must be below detection.max_edge_ratio ({})",
                d.min_edge_ratio, d.max_edge_ratio
            )));
        }
        if d.confirm_frames == 0 {
            return Err(ConfigError::Invalid(
                "detection.confirm_frames must be at least 1".into(),
            ));
        }
        if d.sample_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "detection.sample_interval_ms must be at least 1".into(),
            ));
        }
        if !(1..=100).contains(&self.upload.jpeg_quality) {
            return Err(ConfigError::Invalid(format!(
                "upload.jpeg_quality must be in 1..=100, got {}",
                self.upload.jpeg_quality
            )));
        }
        let fps = self.camera.fps;
        if self.camera.mode == "polling" && !(fps > 0.0 && fps <= MAX_POLL_FPS) {
            return Err(ConfigError::Invalid(format!(
                "camera.fps must be in (0, {MAX_POLL_FPS}] in polling mode, got {fps}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

// Default value functions
fn default_camera_mode() -> String {
    "mjpeg".into()
}
fn default_fps() -> f64 {
    10.0
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_sample_interval_ms() -> u64 {
    200
}
fn default_edge_threshold() -> u32 {
    50
}
fn default_min_edge_ratio() -> f64 {
    0.02
}
fn default_max_edge_ratio() -> f64 {
    0.35
}
fn default_confirm_frames() -> u32 {
    10
}
fn default_settle_ms() -> u64 {
    1000
}
fn default_endpoint() -> String {
    "/api/leer-dni".into()
}
fn default_health_endpoint() -> String {
    "/api/health".into()
}
fn default_jpeg_quality() -> u8 {
    95
}
fn default_timeout() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".into()
}
