//! Blocking SSH transport built on russh.
//!
//! russh is async; the engine core is blocking. The transport owns a private
//! current-thread tokio runtime (created in `open()`) and drives every russh
//! future to completion on it. Do not call into this transport from inside
//! another tokio runtime; use [`AsyncDriver`](crate::driver::AsyncDriver),
//! which runs the session on its own worker thread.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, trace, warn};
use russh::client::{self, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use russh::{Channel, ChannelMsg};
use secrecy::ExposeSecret;
use tokio::runtime::Runtime;

use super::Transport;
use super::config::{AuthMethod, HostKeyVerification, SshConfig};
use crate::error::TransportError;

/// SSH transport wrapping a russh client session and one PTY shell channel.
pub struct SshTransport {
    config: SshConfig,
    runtime: Option<Runtime>,
    session: Option<Handle<SshHandler>>,
    channel: Option<Channel<Msg>>,
    eof: bool,
}

impl SshTransport {
    /// Create an unopened transport.
    pub fn new(config: SshConfig) -> Self {
        Self {
            config,
            runtime: None,
            session: None,
            channel: None,
            eof: false,
        }
    }

    /// Connect to the SSH server and authenticate.
    async fn connect(
        config: &SshConfig,
    ) -> Result<(Handle<SshHandler>, Channel<Msg>), TransportError> {
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: None,
            ..Default::default()
        });

        let host_key_error: Arc<Mutex<Option<TransportError>>> = Arc::new(Mutex::new(None));

        let handler = SshHandler {
            host: config.host.clone(),
            port: config.port,
            host_key_verification: config.host_key_verification.clone(),
            known_hosts_path: config.known_hosts_path.clone(),
            host_key_error: host_key_error.clone(),
        };

        let mut session = tokio::time::timeout(
            config.timeout,
            client::connect(ssh_config, (config.host.as_str(), config.port), handler),
        )
        .await
        .map_err(|_| TransportError::Timeout(config.timeout))?
        .map_err(|e| {
            // Prefer the detailed host-key error over russh's generic one
            let stored = host_key_error
                .lock()
                .ok()
                .and_then(|mut slot| slot.take());
            stored.unwrap_or(TransportError::Ssh(e))
        })?;

        Self::authenticate(&mut session, config).await?;

        let channel = session.channel_open_session().await?;
        channel
            .request_pty(
                true,
                "xterm",
                config.terminal_width,
                config.terminal_height,
                0,
                0,
                &[],
            )
            .await?;
        channel.request_shell(true).await?;

        Ok((session, channel))
    }

    /// Authenticate with the server.
    async fn authenticate(
        session: &mut Handle<SshHandler>,
        config: &SshConfig,
    ) -> Result<(), TransportError> {
        let success = match &config.auth {
            AuthMethod::None => session
                .authenticate_none(&config.username)
                .await?
                .success(),
            AuthMethod::Password(password) => session
                .authenticate_password(&config.username, password.expose_secret())
                .await?
                .success(),
            AuthMethod::PrivateKey { path, passphrase } => {
                let key = load_secret_key(path, passphrase.as_ref().map(|p| p.expose_secret()))
                    .map_err(|e| TransportError::Key(e.to_string()))?;

                let hash_alg = session.best_supported_rsa_hash().await?.flatten();

                session
                    .authenticate_publickey(
                        &config.username,
                        PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                    )
                    .await?
                    .success()
            }
        };

        if !success {
            return Err(TransportError::AuthenticationFailed {
                user: config.username.clone(),
            });
        }

        Ok(())
    }
}

impl Transport for SshTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        if self.session.is_some() {
            return Ok(());
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        debug!("ssh: connecting to {}", self.config.socket_addr());
        let (session, channel) = runtime.block_on(Self::connect(&self.config))?;

        self.runtime = Some(runtime);
        self.session = Some(session);
        self.channel = Some(channel);
        self.eof = false;
        Ok(())
    }

    fn close(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };

        runtime.block_on(async {
            if let Some(channel) = self.channel.take() {
                if let Err(e) = channel.eof().await {
                    debug!("ssh: sending eof failed: {}", e);
                }
            }
            if let Some(session) = self.session.take() {
                if let Err(e) = session
                    .disconnect(russh::Disconnect::ByApplication, "", "en")
                    .await
                {
                    debug!("ssh: disconnect failed: {}", e);
                }
            }
        });
        self.eof = true;
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let (Some(runtime), Some(channel)) = (self.runtime.as_ref(), self.channel.as_ref()) else {
            return Err(TransportError::NotOpened);
        };
        trace!("ssh: write {} bytes", data.len());
        runtime.block_on(channel.data(data))?;
        Ok(())
    }

    fn read(&mut self, wait: Duration) -> Result<Vec<u8>, TransportError> {
        if self.eof {
            return Err(TransportError::Disconnected);
        }
        let (Some(runtime), Some(channel)) = (self.runtime.as_ref(), self.channel.as_mut()) else {
            return Err(TransportError::NotOpened);
        };

        let msg = match runtime.block_on(async { tokio::time::timeout(wait, channel.wait()).await })
        {
            Err(_) => return Ok(Vec::new()),
            Ok(msg) => msg,
        };

        match msg {
            Some(ChannelMsg::Data { data }) => Ok(data.to_vec()),
            Some(ChannelMsg::ExtendedData { data, .. }) => Ok(data.to_vec()),
            Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                self.eof = true;
                Err(TransportError::Disconnected)
            }
            Some(other) => {
                trace!("ssh: ignoring channel message {:?}", other);
                Ok(Vec::new())
            }
        }
    }

    fn is_alive(&self) -> bool {
        !self.eof
            && self.channel.is_some()
            && self.session.as_ref().is_some_and(|s| !s.is_closed())
    }

    fn host(&self) -> &str {
        &self.config.host
    }

    fn port(&self) -> u16 {
        self.config.port
    }
}

impl Drop for SshTransport {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!(
                "SshTransport for {} dropped while open; closing",
                self.config.socket_addr()
            );
            self.close();
        }
    }
}

/// SSH client handler for russh.
struct SshHandler {
    host: String,
    port: u16,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    /// Detailed host-key error for connect() to surface.
    host_key_error: Arc<Mutex<Option<TransportError>>>,
}

impl SshHandler {
    /// Check the host key against known_hosts.
    ///
    /// Returns `Ok(true)` if matched, `Ok(false)` if host not found.
    fn check_known_hosts(&self, pubkey: &PublicKey) -> Result<bool, TransportError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::check_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::check_known_hosts(&self.host, self.port, pubkey)
        };

        match result {
            Ok(matched) => Ok(matched),
            Err(russh::keys::Error::KeyChanged { line }) => Err(TransportError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            }),
            Err(e) => Err(TransportError::KnownHosts(e.to_string())),
        }
    }

    /// Save a new host key to known_hosts.
    fn learn_host_key(&self, pubkey: &PublicKey) -> Result<(), TransportError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::known_hosts::learn_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::known_hosts::learn_known_hosts(&self.host, self.port, pubkey)
        };

        result.map_err(|e| TransportError::KnownHosts(e.to_string()))
    }

    fn reject(&self, error: TransportError) -> bool {
        if let Ok(mut slot) = self.host_key_error.lock() {
            *slot = Some(error);
        }
        false
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let accepted = match self.host_key_verification {
            HostKeyVerification::Disabled => true,
            HostKeyVerification::AcceptNew => match self.check_known_hosts(server_public_key) {
                Ok(true) => true,
                Ok(false) => {
                    if let Err(e) = self.learn_host_key(server_public_key) {
                        warn!("Failed to save host key: {}", e);
                    }
                    true
                }
                Err(e) => self.reject(e),
            },
            HostKeyVerification::Strict => match self.check_known_hosts(server_public_key) {
                Ok(true) => true,
                Ok(false) => self.reject(TransportError::HostKeyUnknown {
                    host: self.host.clone(),
                    port: self.port,
                }),
                Err(e) => self.reject(e),
            },
        };
        Ok(accepted)
    }
}
