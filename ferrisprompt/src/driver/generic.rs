//! Generic driver implementation that works with any platform.

use std::time::Duration;

use log::{debug, info, warn};
use secrecy::{ExposeSecret, SecretString};

use super::Driver;
use super::interactive::InteractiveEvent;
use super::operation::{Operation, OperationKind};
use super::options::{PromptedInput, SendOptions};
use super::privilege::{Hop, PrivilegeManager};
use super::response::{MultiResponse, Response, ResponseContext, detect_failure};
use crate::channel::{
    ChannelConfig, ChannelOutput, HIDDEN_INPUT, InputHandling, InputOptions, PtyChannel,
    ReadCallback, SessionRecorder,
};
use crate::error::{DriverError, Result};
use crate::platform::{PlatformDefinition, PrivilegeLevel, SessionHook};
use crate::transport::Transport;

/// Sees every sub-result as it is recorded.
pub(crate) type OperationObserver = Box<dyn FnMut(&str, &ChannelOutput, Option<String>) + Send>;

/// Generic driver that works with any platform definition.
///
/// Owns one channel and the platform's mode table, and handles:
/// - Session open/close with platform hooks
/// - Input execution with prompt detection and failure indicators
/// - Privilege level navigation
/// - Batches, configuration batches and interactive exchanges
pub struct GenericDriver {
    /// Platform definition.
    platform: PlatformDefinition,

    /// The interactive channel.
    channel: PtyChannel,

    /// Privilege level manager.
    privilege_manager: PrivilegeManager,

    /// Secret sent at escalation password prompts.
    secondary_secret: Option<SecretString>,

    /// Echo policy when a call does not choose one.
    input_handling: InputHandling,

    /// Metadata stamped on every response.
    context: ResponseContext,

    /// Mirror of sub-results for the async front end.
    observer: Option<OperationObserver>,

    opened: bool,
}

impl GenericDriver {
    /// Create a new generic driver over `transport`.
    pub fn new(
        transport: Box<dyn Transport>,
        platform: PlatformDefinition,
        mut config: ChannelConfig,
    ) -> Result<Self> {
        platform.validate()?;

        let privilege_manager = PrivilegeManager::new(platform.privilege_levels.clone());
        let prompt_pattern = privilege_manager.combined_pattern()?;
        if config.paging_indicator.is_none() {
            config.paging_indicator = platform.paging_indicator.clone();
        }

        let context = ResponseContext {
            host: transport.host().to_string(),
            port: transport.port(),
            textfsm_platform: platform.textfsm_platform.clone(),
            genie_platform: platform.genie_platform.clone(),
        };

        Ok(Self {
            channel: PtyChannel::new(transport, config, prompt_pattern),
            platform,
            privilege_manager,
            secondary_secret: None,
            input_handling: InputHandling::default(),
            context,
            observer: None,
            opened: false,
        })
    }

    /// Set the secret sent at escalation password prompts.
    pub fn set_secondary_secret(&mut self, secret: Option<SecretString>) {
        self.secondary_secret = secret;
    }

    /// Set the echo policy used when a call does not choose one.
    pub fn set_input_handling(&mut self, handling: InputHandling) {
        self.input_handling = handling;
    }

    /// Attach a session recorder.
    pub fn set_recorder(&mut self, recorder: Option<SessionRecorder>) {
        self.channel.set_recorder(recorder);
    }

    /// Get a reference to the platform definition.
    pub fn platform(&self) -> &PlatformDefinition {
        &self.platform
    }

    /// Get the privilege manager.
    pub fn privilege_manager(&self) -> &PrivilegeManager {
        &self.privilege_manager
    }

    /// The underlying channel.
    pub fn channel(&mut self) -> &mut PtyChannel {
        &mut self.channel
    }

    pub fn host(&self) -> &str {
        &self.context.host
    }

    pub fn port(&self) -> u16 {
        self.context.port
    }

    /// Get the default timeout.
    pub fn timeout(&self) -> Duration {
        self.channel.timeout()
    }

    /// Set the default timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.channel.set_timeout(timeout);
    }

    /// Whether a level with this name is known.
    pub fn has_privilege_level(&self, name: &str) -> bool {
        self.privilege_manager.contains(name)
    }

    /// Add a privilege level at runtime and rebuild the prompt pattern.
    pub fn register_privilege_level(&mut self, level: PrivilegeLevel) -> Result<()> {
        self.privilege_manager.register_dynamic_level(level)?;
        self.rebuild_prompt_pattern()
    }

    /// Remove a runtime privilege level and rebuild the prompt pattern.
    pub fn remove_privilege_level(&mut self, name: &str) -> Option<PrivilegeLevel> {
        let removed = self.privilege_manager.remove_dynamic_level(name)?;
        if let Err(e) = self.rebuild_prompt_pattern() {
            warn!("failed to rebuild prompt pattern: {}", e);
        }
        Some(removed)
    }

    pub(crate) fn set_observer(&mut self, observer: Option<OperationObserver>) {
        self.observer = observer;
    }

    fn record(
        &mut self,
        op: &mut Operation,
        input: &str,
        output: &ChannelOutput,
        failure: Option<String>,
    ) {
        if let Some(observer) = self.observer.as_mut() {
            observer(input, output, failure.clone());
        }
        op.record(input, output, failure);
    }

    fn rebuild_prompt_pattern(&mut self) -> Result<()> {
        let pattern = self.privilege_manager.combined_pattern()?;
        self.channel.set_prompt_pattern(pattern);
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.opened {
            Ok(())
        } else {
            Err(DriverError::NotOpened.into())
        }
    }

    /// Run `f` with the channel timeout overridden, restoring it afterwards.
    fn scoped_timeout<T>(
        &mut self,
        timeout: Option<Duration>,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let Some(timeout) = timeout else {
            return f(self);
        };
        let previous = self.channel.timeout();
        self.channel.set_timeout(timeout);
        let result = f(self);
        self.channel.set_timeout(previous);
        result
    }

    fn input_options(&self, options: &SendOptions) -> InputOptions {
        options.input_options(self.input_handling)
    }

    /// Record the mode the trailing prompt belongs to.
    fn track_prompt(&mut self, prompt: &str) {
        if prompt.is_empty() {
            return;
        }
        match self.privilege_manager.determine_from_prompt(prompt) {
            Some(level) => {
                if self.privilege_manager.current_name() != Some(level.as_str()) {
                    debug!("now in privilege level '{}'", level);
                }
                if let Err(e) = self.privilege_manager.set_current(&level) {
                    warn!("could not track privilege level '{}': {}", level, e);
                }
            }
            None => self.privilege_manager.clear_current(),
        }
    }

    fn failure_in(&self, output: &ChannelOutput, options: &SendOptions) -> Option<String> {
        if let Some(indicators) = &options.failed_when_contains {
            return detect_failure(&output.result, indicators);
        }
        let level_indicators = self
            .privilege_manager
            .current()
            .map(|l| l.failed_when_contains.as_slice())
            .unwrap_or_default();
        detect_failure(
            &output.result,
            self.platform.failed_when_contains.iter().chain(level_indicators),
        )
    }

    /// Send one input and append it to `op`. Returns true if it failed.
    fn send_one(&mut self, op: &mut Operation, input: &str, options: &SendOptions) -> Result<bool> {
        let input_options = self.input_options(options);
        let output = self.channel.send_input(input, None, &input_options)?;
        self.track_prompt(&output.prompt);
        let failure = self.failure_in(&output, options);
        if let Some(indicator) = &failure {
            debug!("input {:?} failed: output contains {:?}", input, indicator);
        }
        let failed = failure.is_some();
        self.record(op, input, &output, failure);
        Ok(failed)
    }

    /// Open the session: connect, read the first prompt, run on-open hooks.
    pub fn open(&mut self) -> Result<()> {
        if self.opened {
            return Err(DriverError::AlreadyOpened.into());
        }
        info!("opening session to {}:{}", self.host(), self.port());
        self.channel.open()?;
        self.opened = true;

        if let Err(e) = self.on_open() {
            self.channel.close();
            self.opened = false;
            return Err(e);
        }
        Ok(())
    }

    fn on_open(&mut self) -> Result<()> {
        let prompt = self.get_prompt()?;
        self.track_prompt(&prompt);
        let hooks = self.platform.on_open.clone();
        self.run_hooks(&hooks)
    }

    /// Run on-close hooks and close the session. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if !self.opened {
            return Ok(());
        }
        let hooks = self.platform.on_close.clone();
        if let Err(e) = self.run_hooks(&hooks) {
            warn!("on-close hook failed: {}", e);
        }
        self.channel.close();
        self.opened = false;
        self.privilege_manager.clear_current();
        info!("closed session to {}:{}", self.host(), self.port());
        Ok(())
    }

    fn run_hooks(&mut self, hooks: &[SessionHook]) -> Result<()> {
        for hook in hooks {
            match hook {
                SessionHook::Commands(commands) => {
                    for command in commands {
                        self.send_command(command)?;
                    }
                }
                SessionHook::Custom(f) => f(self)?,
            }
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.opened
    }

    /// Open and the transport still alive.
    pub fn is_alive(&self) -> bool {
        self.opened && self.channel.is_alive()
    }

    /// Name of the last observed privilege level.
    pub fn current_privilege(&self) -> Option<&str> {
        self.privilege_manager.current_name()
    }

    /// Send a bare return and return the prompt.
    pub fn get_prompt(&mut self) -> Result<String> {
        self.ensure_open()?;
        self.channel.get_prompt()
    }

    /// [`get_prompt`](Self::get_prompt) with a timeout for this call only.
    pub fn get_prompt_with_timeout(&mut self, timeout: Duration) -> Result<String> {
        self.scoped_timeout(Some(timeout), |d| d.get_prompt())
    }

    /// Move the session to `target`.
    ///
    /// The current level is re-derived from the live prompt before every
    /// hop, and exactly one hop runs per round. Gives up with
    /// `CouldNotAcquirePrivilegeLevel` after twice as many hops as there
    /// are levels.
    pub fn acquire_privilege(&mut self, target: &str) -> Result<()> {
        self.ensure_open()?;
        if !self.privilege_manager.contains(target) {
            return Err(DriverError::UnknownMode {
                name: target.to_string(),
            }
            .into());
        }

        let budget = 2 * self.privilege_manager.len();
        let mut attempts = 0;
        let mut last_hop_from: Option<String> = None;
        loop {
            let prompt = match self.channel.observed_prompt() {
                Some(prompt) => prompt.to_string(),
                None => self.channel.get_prompt()?,
            };
            let matched = self.privilege_manager.modes_for_prompt(&prompt);

            if matched.iter().any(|m| m == target) {
                self.privilege_manager.set_current(target)?;
                return Ok(());
            }
            if attempts == budget {
                warn!(
                    "giving up on privilege level '{}' after {} attempts, prompt {:?}",
                    target, attempts, prompt
                );
                return Err(DriverError::CouldNotAcquirePrivilegeLevel {
                    target: target.to_string(),
                    attempts,
                }
                .into());
            }
            attempts += 1;

            let Some(current) = matched.into_iter().next() else {
                warn!("prompt {:?} matches no known privilege level", prompt);
                self.privilege_manager.clear_current();
                self.channel.get_prompt()?;
                continue;
            };
            self.privilege_manager.set_current(&current)?;
            if last_hop_from.as_deref() == Some(current.as_str()) {
                warn!("hop from '{}' did not change the prompt {:?}", current, prompt);
            }

            let hop = self.privilege_manager.next_hop(&current, target)?;
            self.execute_hop(&hop)?;
            last_hop_from = Some(current);
        }
    }

    /// [`acquire_privilege`](Self::acquire_privilege) with a timeout for this call only.
    pub fn enter_mode(&mut self, target: &str, timeout: Option<Duration>) -> Result<()> {
        self.scoped_timeout(timeout, |d| d.acquire_privilege(target))
    }

    fn execute_hop(&mut self, hop: &Hop) -> Result<()> {
        debug!(
            "{:?} '{}' -> '{}' with {:?}",
            hop.direction, hop.from, hop.to, hop.command
        );
        let options = InputOptions {
            handling: self.input_handling,
            ..Default::default()
        };

        let Some(auth_prompt) = &hop.auth_prompt else {
            let output = self.channel.send_input(&hop.command, None, &options)?;
            self.track_prompt(&output.prompt);
            return Ok(());
        };

        let Some(secret) = self.secondary_secret.as_ref() else {
            warn!(
                "privilege level '{}' may ask for a password but no secondary secret is set",
                hop.to
            );
            let output = self.channel.send_input(&hop.command, None, &options)?;
            self.track_prompt(&output.prompt);
            return Ok(());
        };

        let secret = secret.expose_secret().to_string();
        let prompt_pattern = self.channel.prompt_pattern().clone();
        self.channel.write_input(&hop.command, false)?;
        let (_, matched) = self
            .channel
            .read_until_first_of(&[auth_prompt, &prompt_pattern])?;
        if matched == 0 {
            debug!("answering password prompt for '{}'", hop.to);
            self.channel.write_input(&secret, true)?;
            self.channel.read_until(&prompt_pattern)?;
        }
        Ok(())
    }

    /// Send one input with default options.
    pub fn send_command(&mut self, command: &str) -> Result<Response> {
        self.send_input(command, &SendOptions::default())
    }

    /// Send one input and read to the prompt.
    pub fn send_input(&mut self, input: &str, options: &SendOptions) -> Result<Response> {
        self.ensure_open()?;
        self.scoped_timeout(options.timeout, |d| {
            if let Some(mode) = &options.requested_mode {
                d.acquire_privilege(mode)?;
            }
            let mut op = Operation::new(OperationKind::SendInput);
            d.send_one(&mut op, input, options)?;
            op.finish();
            Ok(op.to_response(&d.context))
        })
    }

    /// Send inputs one after another, stopping at the first failure if asked.
    pub fn send_inputs(&mut self, inputs: &[&str], options: &SendOptions) -> Result<MultiResponse> {
        self.ensure_open()?;
        self.scoped_timeout(options.timeout, |d| {
            if let Some(mode) = &options.requested_mode {
                d.acquire_privilege(mode)?;
            }
            let mut op = Operation::new(OperationKind::SendInput);
            for input in inputs {
                if d.send_one(&mut op, input, options)? && options.stop_on_failed {
                    debug!("stopping batch after failed input {:?}", input);
                    break;
                }
            }
            op.finish();
            Ok(op.to_responses(&d.context))
        })
    }

    /// Send configuration inputs in the platform's configuration mode.
    ///
    /// When an input fails and `stop_on_failed` is set, the platform's
    /// abort-config inputs run before the session returns to the default
    /// mode.
    pub fn send_configs(
        &mut self,
        configs: &[&str],
        options: &SendOptions,
    ) -> Result<MultiResponse> {
        self.ensure_open()?;
        let config_mode = options
            .requested_mode
            .clone()
            .or_else(|| self.platform.default_config_privilege.clone())
            .ok_or_else(|| DriverError::InvalidOptions {
                message: format!(
                    "platform '{}' has no configuration privilege level",
                    self.platform.name
                ),
            })?;

        self.scoped_timeout(options.timeout, |d| {
            d.acquire_privilege(&config_mode)?;

            let mut op = Operation::new(OperationKind::SendInput);
            let mut failed = false;
            for config in configs {
                if d.send_one(&mut op, config, options)? {
                    failed = true;
                    if options.stop_on_failed {
                        break;
                    }
                }
            }
            op.finish();

            if failed && options.stop_on_failed {
                d.abort_config()?;
            }
            let default_mode = d.platform.default_privilege.clone();
            d.acquire_privilege(&default_mode)?;
            Ok(op.to_responses(&d.context))
        })
    }

    /// Send one configuration input.
    pub fn send_config(&mut self, config: &str, options: &SendOptions) -> Result<Response> {
        let responses = self.send_configs(&[config], options)?;
        responses.into_iter().next().ok_or_else(|| {
            DriverError::InvalidOptions {
                message: "configuration produced no response".into(),
            }
            .into()
        })
    }

    fn abort_config(&mut self) -> Result<()> {
        let commands = self.platform.abort_config_commands.clone();
        if commands.is_empty() {
            return Ok(());
        }
        warn!("configuration failed, running {} abort input(s)", commands.len());
        let options = InputOptions {
            handling: self.input_handling,
            ..Default::default()
        };
        for command in &commands {
            let output = self.channel.send_input(command, None, &options)?;
            self.track_prompt(&output.prompt);
        }
        Ok(())
    }

    /// Send an input, answer the prompt it raises, read to the mode prompt.
    ///
    /// Options are checked before anything is written.
    pub fn send_prompted_input(
        &mut self,
        prompted: &PromptedInput,
        options: &SendOptions,
    ) -> Result<Response> {
        let prompt = prompted.compile_prompt()?;
        self.ensure_open()?;
        self.scoped_timeout(options.timeout, |d| {
            if let Some(mode) = &options.requested_mode {
                d.acquire_privilege(mode)?;
            }
            let input_options = d.input_options(options);
            let mut op = Operation::new(OperationKind::SendPromptedInput);
            let output = d.channel.send_prompted_input(
                &prompted.input,
                &prompt,
                &prompted.response,
                prompted.hidden_response,
                None,
                &input_options,
            )?;
            d.track_prompt(&output.prompt);
            let failure = d.failure_in(&output, options);
            d.record(&mut op, &prompted.input, &output, failure);
            op.finish();
            Ok(op.to_response(&d.context))
        })
    }

    /// Run a chain of prompted exchanges; one response per event.
    pub fn send_interactive(
        &mut self,
        events: &[InteractiveEvent],
        options: &SendOptions,
    ) -> Result<MultiResponse> {
        self.ensure_open()?;
        self.scoped_timeout(options.timeout, |d| {
            if let Some(mode) = &options.requested_mode {
                d.acquire_privilege(mode)?;
            }
            let input_options = d.input_options(options);
            let outputs = d.channel.send_inputs_interact(events, &input_options)?;

            let mut op = Operation::new(OperationKind::SendInteractive);
            for (event, output) in events.iter().zip(&outputs) {
                d.track_prompt(&output.prompt);
                let failure = d.failure_in(output, options);
                let input = if event.hidden { HIDDEN_INPUT } else { event.input.as_str() };
                d.record(&mut op, input, output, failure);
            }
            op.finish();
            Ok(op.to_responses(&d.context))
        })
    }

    /// Read with callbacks until one completes the exchange.
    pub fn read_with_callbacks(
        &mut self,
        initial_input: Option<&str>,
        callbacks: &mut [ReadCallback],
        timeout: Option<Duration>,
    ) -> Result<Response> {
        self.ensure_open()?;
        self.scoped_timeout(timeout, |d| {
            let mut op = Operation::new(OperationKind::ReadWithCallbacks);
            let output = d.channel.read_with_callbacks(initial_input, callbacks)?;
            d.record(&mut op, initial_input.unwrap_or_default(), &output, None);
            op.finish();
            Ok(op.to_response(&d.context))
        })
    }
}

impl Drop for GenericDriver {
    fn drop(&mut self) {
        if self.opened {
            if let Err(e) = self.close() {
                warn!("close on drop failed: {}", e);
            }
        }
    }
}

impl Driver for GenericDriver {
    fn open(&mut self) -> Result<()> {
        GenericDriver::open(self)
    }

    fn close(&mut self) -> Result<()> {
        GenericDriver::close(self)
    }

    fn send_command(&mut self, command: &str) -> Result<Response> {
        GenericDriver::send_command(self, command)
    }

    fn send_commands(&mut self, commands: &[&str]) -> Result<MultiResponse> {
        self.send_inputs(commands, &SendOptions::default().stop_on_failed(false))
    }

    fn send_interactive(&mut self, events: &[InteractiveEvent]) -> Result<MultiResponse> {
        GenericDriver::send_interactive(self, events, &SendOptions::default())
    }

    fn send_config(&mut self, commands: &[&str]) -> Result<MultiResponse> {
        self.send_configs(commands, &SendOptions::default())
    }

    fn acquire_privilege(&mut self, privilege: &str) -> Result<()> {
        GenericDriver::acquire_privilege(self, privilege)
    }

    fn is_open(&self) -> bool {
        GenericDriver::is_open(self)
    }

    fn is_alive(&self) -> bool {
        GenericDriver::is_alive(self)
    }

    fn current_privilege(&self) -> Option<&str> {
        GenericDriver::current_privilege(self)
    }
}

impl std::fmt::Debug for GenericDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericDriver")
            .field("host", &self.context.host)
            .field("port", &self.context.port)
            .field("platform", &self.platform.name)
            .field("current", &self.privilege_manager.current_name())
            .field("opened", &self.opened)
            .finish()
    }
}
