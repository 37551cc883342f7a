//! Arista EOS named configuration session.
//!
//! `configure session <name>` gives an isolated candidate configuration.
//! The session prompt is its own privilege level, registered on the driver
//! for the lifetime of the guard and removed again on commit or abort.
//!
//! # Example
//!
//! ```rust,no_run
//! use ferrisprompt::DriverBuilder;
//! use ferrisprompt::platform::vendors::arista::AristaConfigSession;
//!
//! # fn example() -> Result<(), ferrisprompt::Error> {
//! let mut driver = DriverBuilder::new("switch.example.com")
//!     .username("admin")
//!     .password("secret")
//!     .platform("arista_eos")
//!     .build()?;
//! driver.open()?;
//!
//! let mut session = AristaConfigSession::new(&mut driver, "my-changes")?;
//! session.send_command("interface Ethernet1")?;
//! session.send_command("description uplink")?;
//! println!("{}", session.diff()?);
//! session.commit()?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use log::{debug, warn};

use super::platform::PLATFORM_NAME;
use crate::driver::{GenericDriver, Response};
use crate::error::{DriverError, Result};
use crate::platform::PrivilegeLevel;

/// Arista EOS named configuration session guard.
///
/// Holds `&mut GenericDriver`, so nothing else can drive the session while
/// the guard is alive. `commit`, `abort` and `detach` consume it.
///
/// After [`detach`](Self::detach) the session stays open on the device and
/// its privilege level stays registered; calling [`new`](Self::new) with the
/// same name re-attaches.
pub struct AristaConfigSession<'a> {
    driver: &'a mut GenericDriver,
    session_name: String,
    original_privilege: String,
    session_priv_name: String,
    consumed: bool,
}

impl<'a> AristaConfigSession<'a> {
    /// Create or re-attach to a named configuration session.
    pub fn new(driver: &'a mut GenericDriver, session_name: impl Into<String>) -> Result<Self> {
        let session_name = session_name.into();

        if driver.platform().name != PLATFORM_NAME {
            return Err(DriverError::InvalidOptions {
                message: format!(
                    "AristaConfigSession requires an Arista EOS platform, got '{}'",
                    driver.platform().name
                ),
            }
            .into());
        }

        let original_privilege = driver
            .current_privilege()
            .map(str::to_string)
            .unwrap_or_else(|| driver.platform().default_privilege.clone());
        let session_priv_name = format!("config_session_{}", session_name);

        if !driver.has_privilege_level(&session_priv_name) {
            driver.register_privilege_level(session_level(&session_priv_name, &session_name)?)?;
        }

        driver.acquire_privilege(&session_priv_name)?;
        debug!("entered configuration session '{}'", session_name);

        Ok(Self {
            driver,
            session_name,
            original_privilege,
            session_priv_name,
            consumed: false,
        })
    }

    /// The session name.
    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    /// Send a command inside the session.
    pub fn send_command(&mut self, cmd: &str) -> Result<Response> {
        self.driver.send_command(cmd)
    }

    /// Show uncommitted changes.
    pub fn diff(&mut self) -> Result<String> {
        Ok(self.driver.send_command("show session-config diffs")?.result)
    }

    /// Commit with an automatic rollback timer; confirm later with a plain commit.
    pub fn commit_confirmed(&mut self, timeout: Duration) -> Result<()> {
        self.driver.send_command(&commit_timer_command(timeout)?)?;
        Ok(())
    }

    /// Commit the session and leave it.
    pub fn commit(mut self) -> Result<()> {
        self.consumed = true;
        self.driver.send_command("commit")?;
        self.cleanup()
    }

    /// Discard the session and leave it.
    pub fn abort(mut self) -> Result<()> {
        self.consumed = true;
        self.driver.send_command("abort")?;
        self.cleanup()
    }

    /// Release the guard without ending the session on the device.
    pub fn detach(mut self) -> Result<()> {
        self.consumed = true;
        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        self.driver.remove_privilege_level(&self.session_priv_name);
        self.driver.acquire_privilege(&self.original_privilege)
    }
}

impl Drop for AristaConfigSession<'_> {
    fn drop(&mut self) {
        if !self.consumed {
            warn!(
                "AristaConfigSession '{}' dropped without commit/abort/detach",
                self.session_name
            );
        }
    }
}

/// Privilege level for a named session.
///
/// EOS shows only the first six characters of the name in the prompt.
fn session_level(level_name: &str, session_name: &str) -> Result<PrivilegeLevel> {
    Ok(PrivilegeLevel::new(level_name, &session_prompt_pattern(session_name))?
        .with_parent("privilege_exec")
        .with_escalate(format!("configure session {}", session_name))
        .with_deescalate("end"))
}

fn session_prompt_pattern(session_name: &str) -> String {
    let first6: String = session_name.chars().take(6).collect();
    format!(
        r"(?mi)^[\w.\-@()/: ]{{1,63}}\(config\-s\-{}[\w.\-@/:+]{{0,64}}\)#\s?$",
        regex::escape(&first6)
    )
}

fn commit_timer_command(timeout: Duration) -> Result<String> {
    let total = timeout.as_secs();
    if total < 60 {
        return Err(DriverError::InvalidOptions {
            message: format!("Arista commit timer minimum is 1 minute, got {} seconds", total),
        }
        .into());
    }
    Ok(format!(
        "commit timer {:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60,
    ))
}
