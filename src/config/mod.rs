use crate::models::{PluginFolders, Settings};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::fs;

/// Default configuration directory, relative to the working directory
pub const DEFAULT_CONFIG_DIR: &str = "ModSync Data";

/// Prefix of environment variables that override settings, e.g. `MODSYNC__DEVICE__HOST`
pub const DEFAULT_ENV_PREFIX: &str = "MODSYNC";

/// Configuration manager for loading and saving `Settings.yaml`.
///
/// Loading layers environment variables over the file: `MODSYNC__DEVICE__HOST=10.0.0.2`
/// overrides `device.host`. Overrides are never written back.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
    env_prefix: String,
}

/// Settings that can be overridden from the environment
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsOverrides {
    device: DeviceOverrides,
    folders: FolderOverrides,
    releases: ReleaseOverrides,
    debug_mode: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DeviceOverrides {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    lv2_dir: Option<String>,
    connect_timeout_secs: Option<u64>,
    inactivity_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FolderOverrides {
    vst3: Option<Utf8PathBuf>,
    clap: Option<Utf8PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReleaseOverrides {
    owner: Option<String>,
    base_url: Option<String>,
    http_timeout_secs: Option<u64>,
}

impl SettingsOverrides {
    fn apply(self, settings: &mut Settings) {
        let device = &mut settings.device;
        if let Some(host) = self.device.host {
            device.host = host;
        }
        if let Some(port) = self.device.port {
            device.port = port;
        }
        if let Some(username) = self.device.username {
            device.username = username;
        }
        if let Some(password) = self.device.password {
            device.password = password;
        }
        if let Some(lv2_dir) = self.device.lv2_dir {
            device.lv2_dir = lv2_dir;
        }
        if let Some(secs) = self.device.connect_timeout_secs {
            device.connect_timeout_secs = secs;
        }
        if let Some(secs) = self.device.inactivity_timeout_secs {
            device.inactivity_timeout_secs = secs;
        }

        if let Some(vst3) = self.folders.vst3 {
            settings.folders.vst3 = Some(vst3);
        }
        if let Some(clap) = self.folders.clap {
            settings.folders.clap = Some(clap);
        }

        if let Some(owner) = self.releases.owner {
            settings.releases.owner = owner;
        }
        if let Some(base_url) = self.releases.base_url {
            settings.releases.base_url = base_url;
        }
        if let Some(secs) = self.releases.http_timeout_secs {
            settings.releases.http_timeout_secs = secs;
        }

        if let Some(debug_mode) = self.debug_mode {
            settings.debug_mode = debug_mode;
        }
    }
}

impl ConfigManager {
    /// Create a new ConfigManager, creating `config_dir` if needed.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            settings_path: config_dir.join("Settings.yaml"),
            config_dir,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        })
    }

    /// Read overrides from `<PREFIX>__*` instead of `MODSYNC__*`
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }

    /// Load settings from the file alone, or defaults if it doesn't exist
    pub fn load_file_settings(&self) -> Result<Settings> {
        if !self.settings_path.exists() {
            tracing::warn!("Settings file not found at {}, using defaults", self.settings_path);
            return Ok(Settings::default());
        }

        let file_contents = fs::read_to_string(&self.settings_path)
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?;

        let settings: Settings = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        tracing::info!("Loaded settings from {}", self.settings_path);
        Ok(settings)
    }

    /// Load settings with environment overrides applied
    pub fn load_user_config(&self) -> Result<Settings> {
        let mut settings = self.load_file_settings()?;
        self.env_overrides()?.apply(&mut settings);
        Ok(settings)
    }

    fn env_overrides(&self) -> Result<SettingsOverrides> {
        let source = config::Environment::with_prefix(&self.env_prefix)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true);

        config::Config::builder()
            .add_source(source)
            .build()
            .context("Failed to read environment overrides")?
            .try_deserialize()
            .with_context(|| format!("Invalid {}__* environment override", self.env_prefix))
    }

    pub fn save_user_config(&self, settings: &Settings) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }

    /// Persist folder overrides without touching anything else in the file
    pub fn save_plugin_folders(&self, folders: &PluginFolders) -> Result<()> {
        let mut settings = self.load_file_settings()?;
        settings.folders = folders.clone();
        self.save_user_config(&settings)
    }
}
