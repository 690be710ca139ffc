use crate::config::DEFAULT_CONFIG_DIR;
use crate::models::{Mode, ModPlatform, PluginFormat};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "modsync", version)]
#[command(about = "Install and uninstall VST3, CLAP and MOD Audio plugins", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Plugin formats to work on, comma separated (vst3,clap,mod)
    #[arg(short, long, global = true, value_delimiter = ',')]
    pub formats: Option<Vec<PluginFormat>>,

    /// Active MOD platform (duo, duox, dwarf)
    #[arg(short, long, global = true)]
    pub platform: Option<ModPlatform>,

    /// Directory holding Settings.yaml and the logs
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_DIR)]
    pub config_dir: Utf8PathBuf,

    /// Debug logging, also echoed to stderr
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List installable or installed plugins
    List {
        #[arg(short, long, default_value_t = Mode::Install)]
        mode: Mode,
    },
    /// Install plugins; all installable ones unless names are given
    Install {
        names: Vec<String>,
    },
    /// Uninstall plugins; all installed ones unless names are given
    Uninstall {
        names: Vec<String>,
    },
    /// Upload LV2 bundle folders to the MOD device
    Upload {
        #[arg(required = true)]
        bundles: Vec<Utf8PathBuf>,
    },
    /// Remove plugins one by one, concurrently
    Remove {
        #[arg(long, default_value_t = PluginFormat::ModAudio)]
        format: PluginFormat,

        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Show or change the VST3 and CLAP folders. An empty path restores the default.
    Folders {
        #[arg(long)]
        vst3: Option<Utf8PathBuf>,

        #[arg(long)]
        clap: Option<Utf8PathBuf>,
    },
}
