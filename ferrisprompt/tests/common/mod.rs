//! Scripted transport and a small simulated device for driving the engine
//! without a network.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ferrisprompt::channel::ChannelConfig;
use ferrisprompt::error::TransportError;
use ferrisprompt::transport::Transport;
use ferrisprompt::{GenericDriver, PlatformDefinition, PrivilegeLevel};

type Responder = Box<dyn FnMut(&str) -> Vec<u8> + Send>;

/// Every write the engine made, in order.
#[derive(Debug, Clone, Default)]
pub struct WriteLog(Arc<Mutex<Vec<String>>>);

impl WriteLog {
    pub fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    /// Number of writes equal to `input` followed by a newline.
    pub fn count(&self, input: &str) -> usize {
        let line = format!("{}\n", input);
        self.0.lock().unwrap().iter().filter(|w| **w == line).count()
    }

    fn push(&self, data: String) {
        self.0.lock().unwrap().push(data);
    }
}

/// Transport that answers each write with whatever the responder returns.
pub struct ScriptedTransport {
    responder: Responder,
    pending: Vec<u8>,
    writes: WriteLog,
    open: bool,
}

impl ScriptedTransport {
    /// `responder` gets each write with the trailing newline removed.
    pub fn new(responder: impl FnMut(&str) -> Vec<u8> + Send + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            pending: Vec::new(),
            writes: WriteLog::default(),
            open: false,
        }
    }

    pub fn writes(&self) -> WriteLog {
        self.writes.clone()
    }
}

impl Transport for ScriptedTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::NotOpened);
        }
        let text = String::from_utf8_lossy(data).into_owned();
        self.writes.push(text.clone());
        let line = text.strip_suffix('\n').unwrap_or(&text);
        let reply = (self.responder)(line);
        self.pending.extend_from_slice(&reply);
        Ok(())
    }

    fn read(&mut self, wait: Duration) -> Result<Vec<u8>, TransportError> {
        if !self.open {
            return Err(TransportError::NotOpened);
        }
        if self.pending.is_empty() {
            std::thread::sleep(wait.min(Duration::from_millis(2)));
            return Ok(Vec::new());
        }
        Ok(std::mem::take(&mut self.pending))
    }

    fn is_alive(&self) -> bool {
        self.open
    }

    fn host(&self) -> &str {
        "mock-device"
    }

    fn port(&self) -> u16 {
        22
    }
}

/// A device with a prompt, mode transitions and canned command output.
#[derive(Debug, Clone)]
pub struct Device {
    pub prompt: String,
    /// (prompt, input) -> next prompt
    pub transitions: HashMap<(String, String), String>,
    /// input -> output lines
    pub outputs: HashMap<String, String>,
}

impl Device {
    pub fn new(prompt: &str) -> Self {
        Self {
            prompt: prompt.to_string(),
            transitions: HashMap::new(),
            outputs: HashMap::new(),
        }
    }

    pub fn transition(mut self, from: &str, input: &str, to: &str) -> Self {
        self.transitions
            .insert((from.to_string(), input.to_string()), to.to_string());
        self
    }

    pub fn output(mut self, input: &str, output: &str) -> Self {
        self.outputs.insert(input.to_string(), output.to_string());
        self
    }

    /// Echo the line, apply any transition, print output, then the prompt.
    pub fn respond(&mut self, line: &str) -> Vec<u8> {
        let mut out = format!("{}\n", line);
        let key = (self.prompt.clone(), line.to_string());
        if let Some(next) = self.transitions.get(&key) {
            self.prompt = next.clone();
        } else if let Some(output) = self.outputs.get(line) {
            out.push_str(output);
            out.push('\n');
        }
        out.push_str(&self.prompt);
        out.into_bytes()
    }

    pub fn into_transport(mut self) -> ScriptedTransport {
        ScriptedTransport::new(move |line| self.respond(line))
    }
}

/// exec `>` -> privileged_exec `#` -> configuration `(config)#` -> configuration_exclusive `(config-excl)#`
pub fn chain_platform() -> PlatformDefinition {
    let exec = PrivilegeLevel::new("exec", r"(?m)^[\w.\-]+>\s*$").unwrap();
    let privileged = PrivilegeLevel::new("privileged_exec", r"(?m)^[\w.\-]+#\s*$")
        .unwrap()
        .with_parent("exec")
        .with_escalate("enable")
        .with_deescalate("disable");
    let configuration = PrivilegeLevel::new("configuration", r"(?m)^[\w.\-]+\(config\)#\s*$")
        .unwrap()
        .with_parent("privileged_exec")
        .with_escalate("configure terminal")
        .with_deescalate("end");
    let exclusive =
        PrivilegeLevel::new("configuration_exclusive", r"(?m)^[\w.\-]+\(config-excl\)#\s*$")
            .unwrap()
            .with_parent("configuration")
            .with_escalate("configure exclusive")
            .with_deescalate("exit");

    PlatformDefinition::new("mock_chain")
        .with_privilege(exec)
        .with_privilege(privileged)
        .with_privilege(configuration)
        .with_privilege(exclusive)
        .with_default_privilege("privileged_exec")
        .with_default_config_privilege("configuration")
        .with_failure_pattern("% Invalid input")
        .with_abort_config_command("abort")
}

/// Device that follows every transition of [`chain_platform`].
pub fn chain_device(start: &str) -> Device {
    Device::new(start)
        .transition("router>", "enable", "router#")
        .transition("router#", "disable", "router>")
        .transition("router#", "configure terminal", "router(config)#")
        .transition("router(config)#", "end", "router#")
        .transition("router(config)#", "abort", "router#")
        .transition("router(config)#", "configure exclusive", "router(config-excl)#")
        .transition("router(config-excl)#", "exit", "router(config)#")
        .transition("router(config-excl)#", "end", "router#")
}

pub fn driver_for(transport: ScriptedTransport, platform: PlatformDefinition) -> GenericDriver {
    let config = ChannelConfig {
        timeout: Duration::from_secs(2),
        read_poll_interval: Duration::from_millis(5),
        ..Default::default()
    };
    GenericDriver::new(Box::new(transport), platform, config).unwrap()
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
