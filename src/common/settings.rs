use serde::Deserialize;
use std::path::Path;
use url::Url;

pub const SETTINGS_FILE: &str = "config/settings.yaml";
pub const ENV_PREFIX: &str = "LOOKALIKE";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Cannot load settings: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Invalid endpoint url {url}: {source}")]
    InvalidEndpoint {
        url: String,
        source: url::ParseError,
    },
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub endpoint: EndpointSettings,
    #[serde(default)]
    pub camera: CameraSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Where photos are sent for matching.
#[derive(Debug, Deserialize, Clone)]
pub struct EndpointSettings {
    pub url: String,
    /// Multipart field the image is sent under.
    #[serde(default = "default_field_name")]
    pub field_name: String,
}

impl EndpointSettings {
    pub fn parsed_url(&self) -> Result<Url, SettingsError> {
        Url::parse(&self.url).map_err(|source| SettingsError::InvalidEndpoint {
            url: self.url.clone(),
            source,
        })
    }
}

/// Capture device configuration, fed to ffmpeg as `-f <input_format> -i <device>`.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CameraSettings {
    /// ffmpeg executable, looked up on `PATH` unless it is a path.
    pub ffmpeg: String,
    pub device: String,
    pub input_format: String,
    pub width: u32,
    pub height: u32,
    /// JPEG quality 1..=100 for captured frames.
    pub jpeg_quality: u8,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            device: "/dev/video0".to_string(),
            input_format: "v4l2".to_string(),
            width: 640,
            height: 480,
            jpeg_quality: 80,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn default_field_name() -> String {
    "file".to_string()
}

/// Values given on the command line, applied on top of every other source.
#[derive(Debug, Default, Clone)]
pub struct SettingsOverrides {
    pub endpoint_url: Option<String>,
    pub camera_device: Option<String>,
}

/// Load settings from `.env`, `config/settings.yaml` and `LOOKALIKE__*` environment variables,
/// later sources overriding earlier ones.
pub fn load_settings(overrides: SettingsOverrides) -> Result<Settings, SettingsError> {
    dotenv::from_path(".env").ok();
    load_settings_from(Path::new(SETTINGS_FILE), overrides)
}

pub fn load_settings_from(
    config_path: &Path,
    overrides: SettingsOverrides,
) -> Result<Settings, SettingsError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(config_path).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .set_override_option("endpoint.url", overrides.endpoint_url)?
        .set_override_option("camera.device", overrides.camera_device)?;

    let settings = builder.build()?.try_deserialize::<Settings>()?;
    settings.endpoint.parsed_url()?;
    Ok(settings)
}
