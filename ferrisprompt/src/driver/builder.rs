//! Builder for creating device drivers.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use super::async_driver::AsyncDriver;
use super::backoff::PollConfig;
use super::generic::GenericDriver;
use crate::channel::{ChannelConfig, InputHandling, SessionRecorder};
use crate::error::{DriverError, Result};
use crate::platform::{PlatformDefinition, PlatformRegistry};
use crate::transport::config::{AuthMethod, HostKeyVerification, SshConfig};
use crate::transport::{SshTransport, Transport};

/// Builder for constructing device drivers.
///
/// # Example
///
/// ```rust,no_run
/// use ferrisprompt::driver::DriverBuilder;
///
/// # fn example() -> Result<(), ferrisprompt::Error> {
/// let mut driver = DriverBuilder::new("192.168.1.1")
///     .username("admin")
///     .password("secret")
///     .platform("linux")
///     .build()?;
/// driver.open()?;
/// # Ok(())
/// # }
/// ```
pub struct DriverBuilder {
    host: String,
    port: u16,
    username: Option<String>,
    auth: AuthMethod,
    secondary_secret: Option<SecretString>,
    platform_name: Option<String>,
    custom_platform: Option<PlatformDefinition>,
    channel: ChannelConfig,
    connect_timeout: Duration,
    input_handling: InputHandling,
    recorder: Option<SessionRecorder>,
    transport: Option<Box<dyn Transport>>,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    terminal_size: Option<(u32, u32)>,
    poll: PollConfig,
}

impl DriverBuilder {
    /// Create a new driver builder for the specified host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: None,
            auth: AuthMethod::None,
            secondary_secret: None,
            platform_name: None,
            custom_platform: None,
            channel: ChannelConfig::default(),
            connect_timeout: Duration::from_secs(30),
            input_handling: InputHandling::default(),
            recorder: None,
            transport: None,
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
            terminal_size: None,
            poll: PollConfig::default(),
        }
    }

    /// Set the SSH port (default: 22).
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the username for authentication.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set password authentication.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.auth = AuthMethod::Password(SecretString::from(password.into()));
        self
    }

    /// Set private key authentication.
    pub fn private_key(mut self, key_path: impl Into<PathBuf>) -> Self {
        self.auth = AuthMethod::PrivateKey {
            path: key_path.into(),
            passphrase: None,
        };
        self
    }

    /// Set private key authentication with passphrase.
    pub fn private_key_with_passphrase(
        mut self,
        key_path: impl Into<PathBuf>,
        passphrase: impl Into<String>,
    ) -> Self {
        self.auth = AuthMethod::PrivateKey {
            path: key_path.into(),
            passphrase: Some(SecretString::from(passphrase.into())),
        };
        self
    }

    /// Secret answered at escalation password prompts (`enable`, `sudo`).
    pub fn secondary_secret(mut self, secret: impl Into<String>) -> Self {
        self.secondary_secret = Some(SecretString::from(secret.into()));
        self
    }

    /// Set the platform name (e.g., "linux", "cisco_iosxe").
    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.platform_name = Some(platform.into());
        self
    }

    /// Set a custom platform definition.
    pub fn custom_platform(mut self, platform: PlatformDefinition) -> Self {
        self.custom_platform = Some(platform);
        self
    }

    /// Set the default operation timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.channel.timeout = timeout;
        self
    }

    /// Set the SSH connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// How many trailing bytes prompt searches look at.
    pub fn search_depth(mut self, depth: usize) -> Self {
        self.channel.search_depth = depth;
        self
    }

    /// Override the platform's pagination marker.
    pub fn paging_indicator(mut self, indicator: impl Into<String>) -> Self {
        self.channel.paging_indicator = Some(indicator.into());
        self
    }

    /// What to send when the pagination marker shows up (default: a space).
    pub fn paging_escape(mut self, escape: impl Into<String>) -> Self {
        self.channel.paging_escape = escape.into();
        self
    }

    /// Appended to every input (default: `\n`).
    pub fn return_char(mut self, return_char: impl Into<String>) -> Self {
        self.channel.return_char = return_char.into();
        self
    }

    /// Strip ANSI escapes from results (default: true).
    pub fn strip_ansi(mut self, strip: bool) -> Self {
        self.channel.strip_ansi = strip;
        self
    }

    /// Upper bound on one blocking transport read.
    pub fn read_poll_interval(mut self, interval: Duration) -> Self {
        self.channel.read_poll_interval = interval;
        self
    }

    /// Default echo policy.
    pub fn input_handling(mut self, handling: InputHandling) -> Self {
        self.input_handling = handling;
        self
    }

    /// Mirror session bytes to a recorder.
    pub fn recorder(mut self, recorder: SessionRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Use this transport instead of SSH.
    pub fn transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Host key verification mode.
    pub fn host_key_verification(mut self, mode: HostKeyVerification) -> Self {
        self.host_key_verification = mode;
        self
    }

    /// Path to a known_hosts file.
    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    /// Set terminal dimensions (default: the platform's).
    pub fn terminal_size(mut self, width: u32, height: u32) -> Self {
        self.terminal_size = Some((width, height));
        self
    }

    /// Backoff for the async driver's waits.
    pub fn poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    fn resolve_platform(&mut self) -> Result<PlatformDefinition> {
        if let Some(custom) = self.custom_platform.take() {
            return Ok(custom);
        }
        match self.platform_name.take() {
            Some(name) => PlatformRegistry::lookup(&name),
            None => Err(DriverError::InvalidOptions {
                message: "platform must be specified".to_string(),
            }
            .into()),
        }
    }

    /// Build the driver.
    ///
    /// This creates the driver but does not connect. Call `open()` on the
    /// returned driver to establish the connection.
    pub fn build(mut self) -> Result<GenericDriver> {
        let platform = self.resolve_platform()?;

        let transport = match self.transport.take() {
            Some(transport) => transport,
            None => {
                let username = self.username.ok_or_else(|| DriverError::InvalidOptions {
                    message: "username is required".to_string(),
                })?;
                let (terminal_width, terminal_height) = self
                    .terminal_size
                    .unwrap_or((platform.terminal_width, platform.terminal_height));
                let ssh_config = SshConfig {
                    host: self.host,
                    port: self.port,
                    username,
                    auth: self.auth,
                    timeout: self.connect_timeout,
                    terminal_width,
                    terminal_height,
                    host_key_verification: self.host_key_verification,
                    known_hosts_path: self.known_hosts_path,
                };
                Box::new(SshTransport::new(ssh_config))
            }
        };

        let mut driver = GenericDriver::new(transport, platform, self.channel)?;
        driver.set_secondary_secret(self.secondary_secret);
        driver.set_input_handling(self.input_handling);
        driver.set_recorder(self.recorder);
        Ok(driver)
    }

    /// Build a driver that runs on a worker thread behind async handles.
    pub fn build_async(self) -> Result<AsyncDriver> {
        let poll = self.poll;
        AsyncDriver::new(self.build()?, poll)
    }
}

impl std::fmt::Debug for DriverBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverBuilder")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("platform", &self.platform_name)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_platform() {
        let err = DriverBuilder::new("10.0.0.1")
            .username("admin")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("platform must be specified"));
    }

    #[test]
    fn test_missing_username_for_ssh() {
        let err = DriverBuilder::new("10.0.0.1")
            .platform("linux")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("username is required"));
    }

    #[test]
    fn test_unknown_platform() {
        let err = DriverBuilder::new("10.0.0.1")
            .username("admin")
            .platform("no_such_os")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Unknown platform"));
    }

    #[test]
    fn test_builds_unopened_ssh_driver() {
        let driver = DriverBuilder::new("10.0.0.1")
            .port(2222)
            .username("admin")
            .password("secret")
            .platform("arista_eos")
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        assert!(!driver.is_open());
        assert_eq!(driver.host(), "10.0.0.1");
        assert_eq!(driver.port(), 2222);
        assert_eq!(driver.timeout(), Duration::from_secs(5));
        assert_eq!(driver.platform().name, "arista_eos");
    }
}
