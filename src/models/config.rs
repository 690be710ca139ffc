use crate::models::plugins::{ModPlatform, ModPlugins, PluginFolders, PluginFormat, PluginInventory, PluginSet};
use serde::{Deserialize, Serialize};

/// User settings from `Settings.yaml`
///
/// Every section falls back to its defaults when absent, so a partial file is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub device: DeviceSettings,
    pub folders: PluginFolders,
    pub session: SessionSettings,
    pub releases: ReleaseSettings,
    pub catalog: PluginCatalog,
    pub debug_mode: bool,
}

/// Connection details of the MOD device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Bundle directory on the device, relative to the login directory
    pub lv2_dir: String,
    pub connect_timeout_secs: u64,
    pub inactivity_timeout_secs: u64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            host: "192.168.51.1".to_string(),
            port: 22,
            username: "root".to_string(),
            password: "mod".to_string(),
            lv2_dir: ".lv2".to_string(),
            connect_timeout_secs: 4,
            inactivity_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub formats: Vec<PluginFormat>,
    pub mod_platform: ModPlatform,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            formats: PluginFormat::ALL.to_vec(),
            mod_platform: ModPlatform::default(),
        }
    }
}

/// Where release archives are downloaded from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseSettings {
    pub owner: String,
    pub base_url: String,
    pub http_timeout_secs: u64,
}

impl Default for ReleaseSettings {
    fn default() -> Self {
        Self {
            owner: "davemollen".to_string(),
            base_url: "https://github.com".to_string(),
            http_timeout_secs: 30,
        }
    }
}

/// Plugins that can be installed, per format and MOD platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginCatalog {
    #[serde(rename = "VST3")]
    pub vst3: PluginSet,
    #[serde(rename = "CLAP")]
    pub clap: PluginSet,
    #[serde(rename = "MOD Audio")]
    pub mod_audio: ModPlugins,
}

impl Default for PluginCatalog {
    fn default() -> Self {
        let names = |list: &[&str]| list.iter().map(|n| n.to_string()).collect::<PluginSet>();
        Self {
            vst3: names(&["dm-Stutter", "dm-Whammy"]),
            clap: names(&["dm-Stutter", "dm-Whammy"]),
            mod_audio: ModPlugins {
                duo: names(&["dm-LFO"]),
                duo_x: PluginSet::new(),
                dwarf: names(&["dm-LFO", "dm-Stutter"]),
            },
        }
    }
}

impl PluginCatalog {
    pub fn plugins(&self, format: PluginFormat, platform: ModPlatform) -> &PluginSet {
        match format {
            PluginFormat::Vst3 => &self.vst3,
            PluginFormat::Clap => &self.clap,
            PluginFormat::ModAudio => self.mod_audio.get(platform),
        }
    }

    pub fn contains(&self, format: PluginFormat, platform: ModPlatform, name: &str) -> bool {
        self.plugins(format, platform).contains(name)
    }

    /// Installable inventory for the requested formats, every MOD platform included.
    ///
    /// Connectivity stays unknown; the caller decides whether the device was probed.
    pub fn installable(&self, formats: &[PluginFormat]) -> PluginInventory {
        let mut inventory = PluginInventory {
            vst3: self.vst3.clone(),
            clap: self.clap.clone(),
            mod_audio: self.mod_audio.clone(),
            mod_is_connected: None,
        };
        inventory.retain_formats(formats);
        inventory
    }
}
