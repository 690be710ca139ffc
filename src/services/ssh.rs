use crate::models::DeviceSettings;
use crate::services::shell::{RemoteShell, ShellError};
use async_trait::async_trait;
use russh::client::{self, Handle, Handler};
use russh::{ChannelMsg, Disconnect};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Accepts any host key. MOD devices ship with generated keys on a private link.
struct DeviceHandler;

impl Handler for DeviceHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh::keys::ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// [`RemoteShell`] over a password-authenticated SSH session.
///
/// The session is opened on first use and reused until it fails with a
/// connectivity error, after which the next command reconnects.
pub struct SshShell {
    settings: DeviceSettings,
    session: Mutex<Option<Arc<Handle<DeviceHandler>>>>,
}

impl SshShell {
    pub fn new(settings: DeviceSettings) -> Self {
        Self {
            settings,
            session: Mutex::new(None),
        }
    }

    fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.connect_timeout_secs.max(1))
    }

    async fn connect(&self) -> Result<Handle<DeviceHandler>, ShellError> {
        let config = Arc::new(client::Config {
            inactivity_timeout: Some(Duration::from_secs(self.settings.inactivity_timeout_secs.max(1))),
            ..Default::default()
        });
        let address = (self.settings.host.as_str(), self.settings.port);

        tracing::debug!("Connecting to {}:{}", self.settings.host, self.settings.port);

        let mut handle = timeout(self.connect_timeout(), client::connect(config, address, DeviceHandler))
            .await
            .map_err(|_| ShellError::Timeout)?
            .map_err(|e| ShellError::Connect(e.to_string()))?;

        let auth = timeout(
            self.connect_timeout(),
            handle.authenticate_password(&self.settings.username, &self.settings.password),
        )
        .await
        .map_err(|_| ShellError::Timeout)?
        .map_err(classify)?;

        if !auth.success() {
            return Err(ShellError::Auth(self.settings.username.clone()));
        }

        tracing::info!("Connected to MOD device at {}", self.settings.host);
        Ok(handle)
    }

    async fn session(&self) -> Result<Arc<Handle<DeviceHandler>>, ShellError> {
        let mut cached = self.session.lock().await;
        if let Some(handle) = cached.as_ref().filter(|handle| !handle.is_closed()) {
            return Ok(Arc::clone(handle));
        }

        let handle = Arc::new(self.connect().await?);
        *cached = Some(Arc::clone(&handle));
        Ok(handle)
    }

    async fn run(&self, command: &str, input: Option<&[u8]>) -> Result<String, ShellError> {
        let handle = self.session().await?;

        let result = execute(&handle, command, input).await;
        if let Err(e) = &result {
            if e.is_connectivity() {
                tracing::warn!("Dropping SSH session after failure: {}", e);
                self.session.lock().await.take();
            }
        }
        result
    }
}

async fn execute(
    handle: &Handle<DeviceHandler>,
    command: &str,
    input: Option<&[u8]>,
) -> Result<String, ShellError> {
    tracing::debug!("Executing remote command: {}", command);

    let mut channel = handle.channel_open_session().await.map_err(classify)?;
    channel.exec(true, command).await.map_err(classify)?;

    if let Some(data) = input {
        channel.data(data).await.map_err(classify)?;
    }
    channel.eof().await.map_err(classify)?;

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut exit_status = None;

    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
            ChannelMsg::ExtendedData { ref data, ext } if ext == 1 => stderr.extend_from_slice(data),
            ChannelMsg::ExitStatus { exit_status: status } => exit_status = Some(status),
            _ => {}
        }
    }

    match exit_status {
        Some(0) => Ok(String::from_utf8_lossy(&stdout).into_owned()),
        Some(status) => Err(ShellError::Command {
            command: command.to_string(),
            status,
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        }),
        None => Err(ShellError::NoExitStatus(command.to_string())),
    }
}

fn classify(err: russh::Error) -> ShellError {
    match err {
        russh::Error::ConnectionTimeout
        | russh::Error::InactivityTimeout
        | russh::Error::KeepaliveTimeout => ShellError::Timeout,
        russh::Error::Disconnect | russh::Error::HUP | russh::Error::IO(_) => {
            ShellError::Disconnected(err.to_string())
        }
        other => ShellError::Connect(other.to_string()),
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn exec(&self, command: &str) -> Result<String, ShellError> {
        self.run(command, None).await
    }

    async fn exec_with_input(&self, command: &str, input: &[u8]) -> Result<String, ShellError> {
        self.run(command, Some(input)).await
    }

    async fn disconnect(&self) -> Result<(), ShellError> {
        if let Some(handle) = self.session.lock().await.take() {
            handle
                .disconnect(Disconnect::ByApplication, "", "English")
                .await
                .map_err(classify)?;
            tracing::debug!("Closed SSH session");
        }
        Ok(())
    }
}
