use crate::models::{PluginFolders, PluginFormat};
use crate::services::transport::TransportError;
use camino::Utf8PathBuf;

/// Standard install location of `format` on this OS.
///
/// `None` for MOD Audio, for unsupported systems, and on Linux when the home
/// directory is unknown or not valid UTF-8.
pub fn default_plugin_folder(format: PluginFormat) -> Option<Utf8PathBuf> {
    let folder = match format {
        PluginFormat::ModAudio => return None,
        PluginFormat::Vst3 => "VST3",
        PluginFormat::Clap => "CLAP",
    };

    if cfg!(target_os = "macos") {
        Some(Utf8PathBuf::from("/Library/Audio/Plug-Ins").join(folder))
    } else if cfg!(target_os = "windows") {
        Some(Utf8PathBuf::from("C:/Program Files/Common Files").join(folder))
    } else if cfg!(target_os = "linux") {
        let home = dirs::home_dir().and_then(|home| Utf8PathBuf::from_path_buf(home).ok())?;
        Some(home.join(format!(".{}", format.bundle_extension())))
    } else {
        None
    }
}

/// Folder to use for `format`: the override when set, otherwise the OS default
pub fn resolve(format: PluginFormat, folders: &PluginFolders) -> Result<Utf8PathBuf, TransportError> {
    folders
        .get(format)
        .map(|folder| folder.to_path_buf())
        .or_else(|| default_plugin_folder(format))
        .ok_or(TransportError::NoPluginFolder(format))
}
