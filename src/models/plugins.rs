use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ordered, de-duplicated set of plugin names.
pub type PluginSet = IndexSet<String>;

/// Plugin packaging format.
///
/// Serialized with the labels the device tooling uses (`"VST3"`, `"CLAP"`, `"MOD Audio"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PluginFormat {
    #[serde(rename = "VST3")]
    Vst3,
    #[serde(rename = "CLAP")]
    Clap,
    #[serde(rename = "MOD Audio")]
    ModAudio,
}

impl PluginFormat {
    pub const ALL: [PluginFormat; 3] = [PluginFormat::Vst3, PluginFormat::Clap, PluginFormat::ModAudio];

    /// Extension of the bundle directory for this format, without the dot
    pub fn bundle_extension(self) -> &'static str {
        match self {
            Self::Vst3 => "vst3",
            Self::Clap => "clap",
            Self::ModAudio => "lv2",
        }
    }

    /// Bundle directory name for a plugin, e.g. `dm-Stutter.vst3`
    pub fn bundle_name(self, plugin: &str) -> String {
        format!("{}.{}", plugin, self.bundle_extension())
    }

    /// Strip this format's bundle suffix from a directory name, if present.
    pub fn plugin_name<'a>(self, bundle: &'a str) -> Option<&'a str> {
        bundle
            .strip_suffix(self.bundle_extension())
            .and_then(|rest| rest.strip_suffix('.'))
            .filter(|name| !name.is_empty())
    }

    /// VST3 and CLAP live in folders on this machine, MOD Audio lives on the device.
    pub fn is_local(self) -> bool {
        !matches!(self, Self::ModAudio)
    }
}

impl fmt::Display for PluginFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vst3 => "VST3",
            Self::Clap => "CLAP",
            Self::ModAudio => "MOD Audio",
        })
    }
}

impl FromStr for PluginFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vst3" | "vst" => Ok(Self::Vst3),
            "clap" => Ok(Self::Clap),
            "mod" | "mod audio" | "mod-audio" | "modaudio" | "lv2" => Ok(Self::ModAudio),
            other => Err(format!("Unknown plugin format: {}", other)),
        }
    }
}

/// MOD hardware platform. Exactly one is active per session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModPlatform {
    Duo,
    DuoX,
    #[default]
    Dwarf,
}

impl ModPlatform {
    pub const ALL: [ModPlatform; 3] = [ModPlatform::Duo, ModPlatform::DuoX, ModPlatform::Dwarf];
}

impl fmt::Display for ModPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Duo => "Duo",
            Self::DuoX => "DuoX",
            Self::Dwarf => "Dwarf",
        })
    }
}

impl FromStr for ModPlatform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace([' ', '-', '_'], "").as_str() {
            "duo" => Ok(Self::Duo),
            "duox" => Ok(Self::DuoX),
            "dwarf" => Ok(Self::Dwarf),
            other => Err(format!("Unknown MOD platform: {}", other)),
        }
    }
}

/// Whether the session installs plugins or removes installed ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    Install,
    Uninstall,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Install => "Install",
            Self::Uninstall => "Uninstall",
        })
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "install" => Ok(Self::Install),
            "uninstall" => Ok(Self::Uninstall),
            other => Err(format!("Unknown mode: {}", other)),
        }
    }
}

/// MOD Audio plugin names keyed by platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModPlugins {
    #[serde(rename = "Duo")]
    pub duo: PluginSet,
    #[serde(rename = "DuoX")]
    pub duo_x: PluginSet,
    #[serde(rename = "Dwarf")]
    pub dwarf: PluginSet,
}

impl ModPlugins {
    /// Only `platform` populated, every other platform empty
    pub fn only(platform: ModPlatform, plugins: PluginSet) -> Self {
        let mut result = Self::default();
        *result.get_mut(platform) = plugins;
        result
    }

    pub fn get(&self, platform: ModPlatform) -> &PluginSet {
        match platform {
            ModPlatform::Duo => &self.duo,
            ModPlatform::DuoX => &self.duo_x,
            ModPlatform::Dwarf => &self.dwarf,
        }
    }

    pub fn get_mut(&mut self, platform: ModPlatform) -> &mut PluginSet {
        match platform {
            ModPlatform::Duo => &mut self.duo,
            ModPlatform::DuoX => &mut self.duo_x,
            ModPlatform::Dwarf => &mut self.dwarf,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModPlatform, &PluginSet)> {
        ModPlatform::ALL.into_iter().map(|platform| (platform, self.get(platform)))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().all(|(_, plugins)| plugins.is_empty())
    }

    pub fn len(&self) -> usize {
        self.iter().map(|(_, plugins)| plugins.len()).sum()
    }
}

/// Authoritative plugin listing returned by a fetch.
///
/// `mod_is_connected` is tri-state: `None` while unknown, `Some(false)` when the
/// device could not be reached. A disconnected device hides the MOD Audio branch
/// regardless of what it contains.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginInventory {
    #[serde(rename = "VST3")]
    pub vst3: PluginSet,
    #[serde(rename = "CLAP")]
    pub clap: PluginSet,
    #[serde(rename = "MOD Audio")]
    pub mod_audio: ModPlugins,
    #[serde(rename = "modIsConnected")]
    pub mod_is_connected: Option<bool>,
}

impl PluginInventory {
    /// Empty inventory for an unreachable device
    pub fn disconnected() -> Self {
        Self {
            mod_is_connected: Some(false),
            ..Self::default()
        }
    }

    pub fn is_mod_disconnected(&self) -> bool {
        self.mod_is_connected == Some(false)
    }

    /// Names of `format`; `platform` picks the MOD Audio branch.
    pub fn plugins(&self, format: PluginFormat, platform: ModPlatform) -> &PluginSet {
        match format {
            PluginFormat::Vst3 => &self.vst3,
            PluginFormat::Clap => &self.clap,
            PluginFormat::ModAudio => self.mod_audio.get(platform),
        }
    }

    pub fn plugins_mut(&mut self, format: PluginFormat, platform: ModPlatform) -> &mut PluginSet {
        match format {
            PluginFormat::Vst3 => &mut self.vst3,
            PluginFormat::Clap => &mut self.clap,
            PluginFormat::ModAudio => self.mod_audio.get_mut(platform),
        }
    }

    /// Names that should be shown for `format`. MOD Audio is empty while disconnected.
    pub fn visible(&self, format: PluginFormat, platform: ModPlatform) -> Option<&PluginSet> {
        if format == PluginFormat::ModAudio && self.is_mod_disconnected() {
            None
        } else {
            Some(self.plugins(format, platform))
        }
    }

    pub fn contains(&self, format: PluginFormat, platform: ModPlatform, name: &str) -> bool {
        self.visible(format, platform)
            .is_some_and(|plugins| plugins.contains(name))
    }

    /// Drop every format that was not requested.
    pub fn retain_formats(&mut self, formats: &[PluginFormat]) {
        if !formats.contains(&PluginFormat::Vst3) {
            self.vst3.clear();
        }
        if !formats.contains(&PluginFormat::Clap) {
            self.clap.clear();
        }
        if !formats.contains(&PluginFormat::ModAudio) {
            self.mod_audio = ModPlugins::default();
        }
    }
}

/// The user's chosen subset of an inventory.
///
/// Only the active platform of the MOD Audio branch is ever populated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionState {
    #[serde(rename = "VST3")]
    pub vst3: PluginSet,
    #[serde(rename = "CLAP")]
    pub clap: PluginSet,
    #[serde(rename = "MOD Audio")]
    pub mod_audio: ModPlugins,
}

impl SelectionState {
    pub fn plugins(&self, format: PluginFormat, platform: ModPlatform) -> &PluginSet {
        match format {
            PluginFormat::Vst3 => &self.vst3,
            PluginFormat::Clap => &self.clap,
            PluginFormat::ModAudio => self.mod_audio.get(platform),
        }
    }

    pub fn plugins_mut(&mut self, format: PluginFormat, platform: ModPlatform) -> &mut PluginSet {
        match format {
            PluginFormat::Vst3 => &mut self.vst3,
            PluginFormat::Clap => &mut self.clap,
            PluginFormat::ModAudio => self.mod_audio.get_mut(platform),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vst3.is_empty() && self.clap.is_empty() && self.mod_audio.is_empty()
    }

    pub fn len(&self) -> usize {
        self.vst3.len() + self.clap.len() + self.mod_audio.len()
    }

    /// Every `(format, platform, name)` triple in the selection.
    pub fn entries(&self) -> Vec<(PluginFormat, ModPlatform, String)> {
        let mut entries: Vec<_> = self
            .vst3
            .iter()
            .map(|name| (PluginFormat::Vst3, ModPlatform::default(), name.clone()))
            .chain(
                self.clap
                    .iter()
                    .map(|name| (PluginFormat::Clap, ModPlatform::default(), name.clone())),
            )
            .collect();

        for (platform, plugins) in self.mod_audio.iter() {
            entries.extend(
                plugins
                    .iter()
                    .map(|name| (PluginFormat::ModAudio, platform, name.clone())),
            );
        }

        entries
    }
}

/// Optional overrides for the VST3 and CLAP install folders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginFolders {
    pub vst3: Option<Utf8PathBuf>,
    pub clap: Option<Utf8PathBuf>,
}

impl PluginFolders {
    pub fn get(&self, format: PluginFormat) -> Option<&Utf8Path> {
        match format {
            PluginFormat::Vst3 => self.vst3.as_deref(),
            PluginFormat::Clap => self.clap.as_deref(),
            PluginFormat::ModAudio => None,
        }
    }

    /// Set or clear an override. Returns true if the value changed.
    pub fn set(&mut self, format: PluginFormat, folder: Option<Utf8PathBuf>) -> bool {
        let slot = match format {
            PluginFormat::Vst3 => &mut self.vst3,
            PluginFormat::Clap => &mut self.clap,
            PluginFormat::ModAudio => return false,
        };
        let folder = folder.filter(|path| !path.as_str().trim().is_empty());
        if *slot == folder {
            return false;
        }
        *slot = folder;
        true
    }
}
