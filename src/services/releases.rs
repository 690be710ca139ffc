use crate::models::{ModPlatform, ReleaseSettings};
use crate::services::transport::TransportError;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// Desktop operating systems that have VST3/CLAP release builds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesktopOs {
    MacOs,
    Windows,
    Ubuntu,
}

impl DesktopOs {
    /// The OS this binary was built for, if releases exist for it
    pub fn current() -> Option<Self> {
        if cfg!(target_os = "macos") {
            Some(Self::MacOs)
        } else if cfg!(target_os = "windows") {
            Some(Self::Windows)
        } else if cfg!(target_os = "linux") {
            Some(Self::Ubuntu)
        } else {
            None
        }
    }

    fn slug(self) -> &'static str {
        match self {
            Self::MacOs => "macos",
            Self::Windows => "windows",
            Self::Ubuntu => "ubuntu",
        }
    }
}

/// What a release archive was built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseTarget {
    /// VST3 and CLAP bundles for a desktop OS
    Desktop(DesktopOs),
    /// LV2 bundle for a MOD platform
    Mod(ModPlatform),
}

impl ReleaseTarget {
    /// Name of the release asset, e.g. `dm-LFO-moddwarf-new.zip`
    pub fn asset_name(self, plugin: &str) -> String {
        let suffix = match self {
            Self::Desktop(os) => format!("vst-and-clap-{}", os.slug()),
            Self::Mod(ModPlatform::Duo) => "modduo-new".to_string(),
            Self::Mod(ModPlatform::DuoX) => "modduox-new".to_string(),
            Self::Mod(ModPlatform::Dwarf) => "moddwarf-new".to_string(),
        };
        format!("{}-{}.zip", plugin, suffix)
    }
}

impl fmt::Display for ReleaseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Desktop(os) => write!(f, "{}", os.slug()),
            Self::Mod(platform) => write!(f, "MOD {}", platform),
        }
    }
}

/// Where plugin release archives come from
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Raw bytes of the latest release archive of `plugin` for `target`
    async fn download(&self, plugin: &str, target: ReleaseTarget) -> Result<Vec<u8>, TransportError>;
}

/// Downloads the latest release assets from GitHub
pub struct GithubReleases {
    client: reqwest::Client,
    settings: ReleaseSettings,
}

impl GithubReleases {
    pub fn new(settings: ReleaseSettings) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(settings.http_timeout_secs.max(1)))
            .build()
            .map_err(|e| TransportError::Download(e.to_string()))?;

        Ok(Self { client, settings })
    }

    pub fn asset_url(&self, plugin: &str, target: ReleaseTarget) -> String {
        format!(
            "{}/{}/{}/releases/latest/download/{}",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.owner,
            plugin,
            target.asset_name(plugin)
        )
    }
}

#[async_trait]
impl ReleaseSource for GithubReleases {
    async fn download(&self, plugin: &str, target: ReleaseTarget) -> Result<Vec<u8>, TransportError> {
        let url = self.asset_url(plugin, target);
        tracing::debug!("Downloading {}", url);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/octet-stream")
            .send()
            .await
            .map_err(|e| TransportError::Download(format!("{}: {}", url, e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(TransportError::Download(format!(
                "{} has no release for {}",
                plugin, target
            )));
        }
        if !status.is_success() {
            return Err(TransportError::Download(format!(
                "HTTP error: {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Download(e.to_string()))?;

        tracing::info!("Downloaded {} ({} bytes)", target.asset_name(plugin), bytes.len());
        Ok(bytes.to_vec())
    }
}
