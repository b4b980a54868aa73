use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_SERVER: &str = "10.0.0.2";
pub const DEFAULT_PORT: u16 = 1883;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine config directory, pass --config explicitly")]
    NoConfigDir,
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Which notification program renders `osd` text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotifyBackend {
    #[default]
    Osd,
    Dunst,
}

impl NotifyBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyBackend::Osd => "osd",
            NotifyBackend::Dunst => "dunst",
        }
    }
}

impl std::str::FromStr for NotifyBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "osd" => Ok(NotifyBackend::Osd),
            "dunst" => Ok(NotifyBackend::Dunst),
            other => Err(format!("Invalid notify backend: {}", other)),
        }
    }
}

/// Appearance of the `osd_cat` overlay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OsdSettings {
    /// Pixel size used both for the font and for placement
    #[serde(default = "default_font_size")]
    pub font_size: u32,

    /// XLFD family component, `*` lets the X server pick
    #[serde(default = "default_font")]
    pub font: String,

    #[serde(default = "default_colour")]
    pub colour: String,

    /// Seconds the overlay stays visible
    #[serde(default = "default_delay")]
    pub delay: u32,
}

fn default_font_size() -> u32 {
    32
}

fn default_font() -> String {
    "*".to_string()
}

fn default_colour() -> String {
    "green".to_string()
}

fn default_delay() -> u32 {
    3
}

impl Default for OsdSettings {
    fn default() -> Self {
        Self {
            font_size: default_font_size(),
            font: default_font(),
            colour: default_colour(),
            delay: default_delay(),
        }
    }
}

/// One `[[topics]]` entry as written in the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicConfig {
    pub topic: String,
    pub payload: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub osd: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_server")]
    pub server: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// MQTT keepalive in seconds
    #[serde(default = "default_keepalive")]
    pub keepalive: u64,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default)]
    pub notify: NotifyBackend,

    /// Log actions instead of performing them
    #[serde(default)]
    pub dry_run: bool,

    #[serde(default)]
    pub osd: OsdSettings,

    #[serde(default)]
    pub topics: Vec<TopicConfig>,
}

fn default_server() -> String {
    DEFAULT_SERVER.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_keepalive() -> u64 {
    10
}

fn default_client_id() -> String {
    "mqtt-saver".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: default_server(),
            port: default_port(),
            keepalive: default_keepalive(),
            client_id: default_client_id(),
            notify: NotifyBackend::default(),
            dry_run: false,
            osd: OsdSettings::default(),
            topics: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from the default location when `None`
    ///
    /// Unlike a desktop app there is nothing sensible to fall back to: a
    /// missing or broken file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => config_path().ok_or(ConfigError::NoConfigDir)?,
        };

        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        let settings = Self::from_toml_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;

        tracing::info!(path = %path.display(), topics = settings.topics.len(), "loaded config");
        Ok(settings)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}

/// `~/.config/mqtt-saver/config.toml` on Linux
pub fn config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "mqtt-saver").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// `~/.local/share/mqtt-saver/mqtt-saver.log` on Linux
pub fn default_log_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "mqtt-saver").map(|dirs| dirs.data_local_dir().join("mqtt-saver.log"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
server = "broker.lan"
notify = "dunst"

[osd]
font_size = 48

[[topics]]
topic = "/motion/office"
payload = "away"
command = "xset dpms force off"

[[topics]]
topic = "/alert"
payload = "fire"
osd = "FIRE!"
"#;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server, DEFAULT_SERVER);
        assert_eq!(settings.port, 1883);
        assert_eq!(settings.notify, NotifyBackend::Osd);
        assert!(!settings.dry_run);
        assert!(settings.topics.is_empty());
    }

    #[test]
    fn test_parse_sample() {
        let settings = Settings::from_toml_str(SAMPLE).unwrap();
        assert_eq!(settings.server, "broker.lan");
        assert_eq!(settings.port, DEFAULT_PORT);
        assert_eq!(settings.notify, NotifyBackend::Dunst);
        assert_eq!(settings.osd.font_size, 48);
        assert_eq!(settings.osd.colour, "green");
        assert_eq!(settings.topics.len(), 2);
        assert_eq!(
            settings.topics[0].command.as_deref(),
            Some("xset dpms force off")
        );
        assert_eq!(settings.topics[0].osd, None);
        assert_eq!(settings.topics[1].osd.as_deref(), Some("FIRE!"));
    }

    #[test]
    fn test_notify_defaults_to_osd() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings.notify, NotifyBackend::Osd);
    }

    #[test]
    fn test_unknown_notify_backend_rejected() {
        assert!(Settings::from_toml_str(r#"notify = "growl""#).is_err());
        assert!("growl".parse::<NotifyBackend>().is_err());
        assert_eq!("dunst".parse::<NotifyBackend>(), Ok(NotifyBackend::Dunst));
    }

    #[test]
    fn test_topic_without_payload_rejected() {
        let result = Settings::from_toml_str(
            r#"
[[topics]]
topic = "/motion/office"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.topics.len(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_reports_parse_error_with_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"port = \"not a number\"").unwrap();

        let err = Settings::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }
}
