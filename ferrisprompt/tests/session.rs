mod common;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use common::{Device, ScriptedTransport, chain_device, chain_platform, driver_for, init_logging};
use ferrisprompt::channel::Direction;
use ferrisprompt::error::{ChannelError, DriverError, Error};
use ferrisprompt::platform::SessionHook;
use ferrisprompt::{
    CallbackAction, Driver, GenericDriver, InteractiveBuilder, PlatformDefinition, PrivilegeLevel,
    PromptedInput, ReadCallback, SendOptions, SessionRecorder,
};

fn single_mode_platform() -> PlatformDefinition {
    PlatformDefinition::new("mock_single")
        .with_privilege(PrivilegeLevel::new("privileged_exec", r"(?m)^[\w.\-]+#\s*$").unwrap())
        .with_default_privilege("privileged_exec")
        .with_failure_pattern("% Invalid input")
}

#[test]
fn test_simple_command_strips_echo_and_prompt() {
    init_logging();
    let transport = Device::new("device#")
        .output("show version", "Version 1.0")
        .into_transport();
    let mut driver = driver_for(transport, single_mode_platform());
    driver.open().unwrap();

    let response = driver
        .send_input("show version", &SendOptions::default())
        .unwrap();
    assert_eq!(response.result, "Version 1.0");
    assert_eq!(response.prompt, "device#");
    assert_eq!(response.input, "show version");
    assert_eq!(response.host, "mock-device");
    assert!(response.is_success());
    assert!(response.raw_text().contains("show version"));
}

#[test]
fn test_retain_input_and_prompt() {
    let transport = Device::new("device#")
        .output("show clock", "12:00:00")
        .into_transport();
    let mut driver = driver_for(transport, single_mode_platform());
    driver.open().unwrap();

    let options = SendOptions::new()
        .retain_input(true)
        .retain_trailing_prompt(true);
    let response = driver.send_input("show clock", &options).unwrap();
    assert_eq!(response.result, "show clock\n12:00:00\ndevice#");
}

#[test]
fn test_timeout_without_prompt() {
    let transport = ScriptedTransport::new(|line| match line {
        "x" => b"x\nstill working".to_vec(),
        other => format!("{}\ndevice#", other).into_bytes(),
    });
    let mut driver = driver_for(transport, single_mode_platform());
    driver.open().unwrap();

    let started = Instant::now();
    let err = driver
        .send_input("x", &SendOptions::new().timeout(Duration::from_millis(1)))
        .unwrap_err();
    assert!(err.is_timeout(), "unexpected error: {}", err);
    assert!(matches!(
        err,
        Error::Channel(ChannelError::OperationTimeout(_))
    ));
    assert!(started.elapsed() < Duration::from_millis(500));

    // The override was scoped to that call
    assert_eq!(driver.timeout(), Duration::from_secs(2));
}

#[test]
fn test_paging_sends_one_continuation() {
    let transport = ScriptedTransport::new(|line| match line {
        "show long" => b"show long\nline1\n--More--".to_vec(),
        " " => b"line2\ndevice#".to_vec(),
        other => format!("{}\ndevice#", other).into_bytes(),
    });
    let writes = transport.writes();
    let platform = single_mode_platform().with_paging_indicator("--More--");
    let mut driver = driver_for(transport, platform);
    driver.open().unwrap();

    let response = driver
        .send_input("show long", &SendOptions::default())
        .unwrap();
    assert_eq!(response.result, "line1\nline2");
    assert_eq!(writes.all().iter().filter(|w| *w == " ").count(), 1);
}

#[test]
fn test_failure_indicator_is_soft() {
    let transport = Device::new("device#")
        .output("show bogus", "% Invalid input detected at '^' marker.")
        .into_transport();
    let mut driver = driver_for(transport, single_mode_platform());
    driver.open().unwrap();

    let response = driver
        .send_input("show bogus", &SendOptions::default())
        .unwrap();
    assert!(response.failed());
    assert_eq!(response.failure_message.as_deref(), Some("% Invalid input"));

    let custom = SendOptions::new().failed_when_contains(vec!["marker".into()]);
    let response = driver.send_input("show bogus", &custom).unwrap();
    assert_eq!(response.failure_message.as_deref(), Some("marker"));
}

#[test]
fn test_batch_order_and_extend() {
    let transport = Device::new("device#")
        .output("a", "alpha")
        .output("b", "bravo")
        .output("c", "charlie")
        .output("d", "delta")
        .into_transport();
    let mut driver = driver_for(transport, single_mode_platform());
    driver.open().unwrap();

    let mut results = driver
        .send_inputs(&["a", "b", "c"], &SendOptions::default())
        .unwrap();
    let texts: Vec<&str> = results.iter().map(|r| r.result.as_str()).collect();
    assert_eq!(texts, vec!["alpha", "bravo", "charlie"]);

    let more = driver.send_inputs(&["d"], &SendOptions::default()).unwrap();
    results.extend(more);
    assert_eq!(results.len(), 4);
    assert_eq!(results[3].input, "d");
    assert_eq!(results.result(), "alpha\nbravo\ncharlie\ndelta");
}

#[test]
fn test_batch_stop_on_failed() {
    let transport = Device::new("device#")
        .output("bad", "% Invalid input")
        .into_transport();
    let writes = transport.writes();
    let mut driver = driver_for(transport, single_mode_platform());
    driver.open().unwrap();

    let results = driver
        .send_inputs(&["ok", "bad", "never"], &SendOptions::default())
        .unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.failed());
    assert_eq!(writes.count("never"), 0);

    let results = driver
        .send_inputs(&["ok", "bad", "after"], &SendOptions::new().stop_on_failed(false))
        .unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(writes.count("after"), 1);
}

#[test]
fn test_open_detects_mode_and_rejects_reopen() {
    let transport = chain_device("router>").into_transport();
    let mut driver = driver_for(transport, chain_platform());
    assert!(driver.send_command("show version").is_err());

    driver.open().unwrap();
    assert!(driver.is_open());
    assert_eq!(driver.current_privilege(), Some("exec"));
    assert!(matches!(
        driver.open(),
        Err(Error::Driver(DriverError::AlreadyOpened))
    ));

    driver.close().unwrap();
    driver.close().unwrap();
    assert!(!driver.is_open());
    assert_eq!(driver.current_privilege(), None);
}

#[test]
fn test_escalates_three_times_and_back() {
    init_logging();
    let transport = chain_device("router>").into_transport();
    let writes = transport.writes();
    let mut driver = driver_for(transport, chain_platform());
    driver.open().unwrap();

    driver.acquire_privilege("configuration_exclusive").unwrap();
    assert_eq!(driver.current_privilege(), Some("configuration_exclusive"));
    let escalations = ["enable", "configure terminal", "configure exclusive"]
        .iter()
        .map(|c| writes.count(c))
        .sum::<usize>();
    let deescalations = ["disable", "end", "exit"]
        .iter()
        .map(|c| writes.count(c))
        .sum::<usize>();
    assert_eq!(escalations, 3);
    assert_eq!(deescalations, 0);

    driver.acquire_privilege("exec").unwrap();
    assert_eq!(driver.current_privilege(), Some("exec"));
    assert_eq!(writes.count("exit"), 1);
    assert_eq!(writes.count("end"), 1);
    assert_eq!(writes.count("disable"), 1);
}

#[test]
fn test_acquire_same_mode_writes_nothing() {
    let transport = chain_device("router>").into_transport();
    let writes = transport.writes();
    let mut driver = driver_for(transport, chain_platform());
    driver.open().unwrap();

    for mode in ["exec", "privileged_exec", "configuration", "configuration_exclusive"] {
        driver.acquire_privilege(mode).unwrap();
        let before = writes.len();
        driver.acquire_privilege(mode).unwrap();
        assert_eq!(writes.len(), before, "second acquire of {} wrote", mode);
    }
}

#[test]
fn test_sibling_modes_deescalate_then_escalate() {
    let private = PrivilegeLevel::new("configuration_private", r"(?m)^[\w.\-]+\(config-priv\)#\s*$")
        .unwrap()
        .with_parent("configuration")
        .with_escalate("configure private")
        .with_deescalate("exit");
    let platform = chain_platform().with_privilege(private);
    let transport = chain_device("router(config-excl)#")
        .transition("router(config)#", "configure private", "router(config-priv)#")
        .into_transport();
    let writes = transport.writes();
    let mut driver = driver_for(transport, platform);
    driver.open().unwrap();

    driver.acquire_privilege("configuration_private").unwrap();
    assert_eq!(writes.count("exit"), 1);
    assert_eq!(writes.count("configure private"), 1);
    assert_eq!(writes.count("end"), 0);
}

#[test]
fn test_unknown_mode() {
    let transport = chain_device("router>").into_transport();
    let writes = transport.writes();
    let mut driver = driver_for(transport, chain_platform());
    driver.open().unwrap();
    let before = writes.len();

    let err = driver.acquire_privilege("shell").unwrap_err();
    assert!(matches!(err, Error::Driver(DriverError::UnknownMode { .. })));
    assert_eq!(writes.len(), before);
}

#[test]
fn test_unmatched_prompt_exhausts_hop_budget() {
    let exec = PrivilegeLevel::new("exec", r"(?m)^\S+>\s*$").unwrap();
    let privileged = PrivilegeLevel::new("privileged_exec", r"(?m)^\S+#\s*$")
        .unwrap()
        .with_parent("exec")
        .with_escalate("enable")
        .with_not_contains("weird");
    let platform = PlatformDefinition::new("mock_weird")
        .with_privilege(exec)
        .with_privilege(privileged)
        .with_default_privilege("exec");
    let transport = Device::new("weird#").into_transport();
    let mut driver = driver_for(transport, platform);
    driver.open().unwrap();
    assert_eq!(driver.current_privilege(), None);

    let started = Instant::now();
    let err = driver.acquire_privilege("privileged_exec").unwrap_err();
    assert!(matches!(
        err,
        Error::Driver(DriverError::CouldNotAcquirePrivilegeLevel { attempts: 4, .. })
    ));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_hop_that_never_lands_is_bounded() {
    // The device ignores "enable"
    let transport = Device::new("router>").into_transport();
    let writes = transport.writes();
    let mut driver = driver_for(transport, chain_platform());
    driver.open().unwrap();

    let err = driver.acquire_privilege("privileged_exec").unwrap_err();
    assert!(matches!(
        err,
        Error::Driver(DriverError::CouldNotAcquirePrivilegeLevel { attempts: 8, .. })
    ));
    assert_eq!(writes.count("enable"), 8);
}

#[test]
fn test_escalation_answers_password_prompt() {
    let root = PrivilegeLevel::new("root", r"(?m)^\S+#\s*$")
        .unwrap()
        .with_parent("user")
        .with_escalate("sudo -i")
        .with_deescalate("exit")
        .with_auth(r"[Pp]assword[^:\n]*:\s*$")
        .unwrap();
    let platform = PlatformDefinition::new("mock_linux")
        .with_privilege(PrivilegeLevel::new("user", r"(?m)^\S+\$\s*$").unwrap())
        .with_privilege(root)
        .with_default_privilege("user");

    let mut prompt = "admin@host:~$".to_string();
    let transport = ScriptedTransport::new(move |line| match line {
        "sudo -i" => b"sudo -i\n[sudo] password for admin: ".to_vec(),
        "s3cret" => {
            prompt = "root@host:~#".to_string();
            format!("\n{}", prompt).into_bytes()
        }
        other => format!("{}\n{}", other, prompt).into_bytes(),
    });
    let writes = transport.writes();

    let recorded = Arc::new(Mutex::new(Vec::<u8>::new()));
    let sink = Arc::clone(&recorded);
    let mut driver = driver_for(transport, platform);
    driver.set_secondary_secret(Some("s3cret".to_string().into()));
    driver.set_recorder(Some(SessionRecorder::callback(move |direction, data| {
        if direction == Direction::Input {
            sink.lock().unwrap().extend_from_slice(data);
        }
    })));
    driver.open().unwrap();

    driver.acquire_privilege("root").unwrap();
    assert_eq!(driver.current_privilege(), Some("root"));
    assert_eq!(writes.count("s3cret"), 1);

    let recorded = String::from_utf8(recorded.lock().unwrap().clone()).unwrap();
    assert!(recorded.contains("sudo -i"));
    assert!(recorded.contains("<hidden>\n"));
    assert!(!recorded.contains("s3cret"));
}

#[test]
fn test_send_configs_returns_to_default_mode() {
    let transport = chain_device("router#").into_transport();
    let writes = transport.writes();
    let mut driver = driver_for(transport, chain_platform());
    driver.open().unwrap();

    let results = driver
        .send_configs(
            &["interface Ethernet1", "description uplink"],
            &SendOptions::default(),
        )
        .unwrap();
    assert_eq!(results.len(), 2);
    assert!(!results.failed());
    assert_eq!(writes.count("configure terminal"), 1);
    assert_eq!(writes.count("end"), 1);
    assert_eq!(driver.current_privilege(), Some("privileged_exec"));
}

#[test]
fn test_send_configs_aborts_on_failure() {
    let transport = chain_device("router#")
        .output("bad command", "% Invalid input detected")
        .into_transport();
    let writes = transport.writes();
    let mut driver = driver_for(transport, chain_platform());
    driver.open().unwrap();

    let results = driver
        .send_configs(&["hostname r1", "bad command", "never sent"], &SendOptions::default())
        .unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[1].failed());
    assert_eq!(writes.count("never sent"), 0);
    assert_eq!(writes.count("abort"), 1);
    // abort already left configuration mode
    assert_eq!(writes.count("end"), 0);
    assert_eq!(driver.current_privilege(), Some("privileged_exec"));
}

#[test]
fn test_prompted_input() {
    let transport = ScriptedTransport::new(|line| match line {
        "copy running-config startup-config" => {
            b"copy running-config startup-config\nDestination filename [startup-config]? ".to_vec()
        }
        other => format!("{}\n[OK]\ndevice#", other).into_bytes(),
    });
    let mut driver = driver_for(transport, single_mode_platform());
    driver.open().unwrap();

    let prompted = PromptedInput::new("copy running-config startup-config", "")
        .prompt("Destination filename [startup-config]?");
    let response = driver
        .send_prompted_input(&prompted, &SendOptions::default())
        .unwrap();
    assert!(response.result.contains("Destination filename"));
    assert!(response.result.contains("[OK]"));
    assert_eq!(response.prompt, "device#");
}

#[test]
fn test_prompted_input_rejects_bad_options_before_writing() {
    let transport = Device::new("device#").into_transport();
    let writes = transport.writes();
    let mut driver = driver_for(transport, single_mode_platform());
    driver.open().unwrap();
    let before = writes.len();

    let neither = PromptedInput::new("reload", "y");
    let err = driver
        .send_prompted_input(&neither, &SendOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::Driver(DriverError::InvalidOptions { .. })));

    let both = PromptedInput::new("reload", "y")
        .prompt("[confirm]")
        .prompt_pattern(r"\[confirm\]");
    assert!(driver
        .send_prompted_input(&both, &SendOptions::default())
        .is_err());
    assert_eq!(writes.len(), before);
}

#[test]
fn test_send_interactive_hides_secret_input() {
    let transport = ScriptedTransport::new(|line| match line {
        "enable" => b"enable\nPassword: ".to_vec(),
        "hunter2" => b"\nrouter#".to_vec(),
        other => format!("{}\nrouter>", other).into_bytes(),
    });
    let mut driver = driver_for(transport, chain_platform());
    driver.open().unwrap();

    let events = InteractiveBuilder::new()
        .send("enable")
        .expect(r"Password:\s*$")
        .unwrap()
        .send_hidden("hunter2")
        .expect(r"#\s*$")
        .unwrap()
        .build();
    let results = driver
        .send_interactive(&events, &SendOptions::default())
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].input, "enable");
    assert_eq!(results[1].input, "<hidden>");
    assert_eq!(driver.current_privilege(), Some("privileged_exec"));
}

#[test]
fn test_read_with_callbacks() {
    let transport = ScriptedTransport::new(|line| match line {
        "reload" => b"reload\nProceed with reload? [confirm]".to_vec(),
        "y" => b"y\nrebooting...\nrouter#".to_vec(),
        other => format!("{}\nrouter#", other).into_bytes(),
    });
    let writes = transport.writes();
    let mut driver = driver_for(transport, chain_platform());
    driver.open().unwrap();

    let mut callbacks = vec![
        ReadCallback::on_contains("confirm", "[confirm]", CallbackAction::SendInput("y".into()))
            .once(),
        ReadCallback::on_contains("done", "rebooting", CallbackAction::None).completes(),
    ];
    let response = driver
        .read_with_callbacks(Some("reload"), &mut callbacks, None)
        .unwrap();
    assert_eq!(writes.count("y"), 1);
    assert!(response.result.contains("rebooting"));
}

#[test]
fn test_callback_fires_once_per_match() {
    let transport = ScriptedTransport::new(|line| match line {
        "tail log" => b"tail log\nPress y to continue".to_vec(),
        "y" => b"y\nline a".to_vec(),
        "more" => b"more\nline b\nEND".to_vec(),
        other => format!("{}\nrouter#", other).into_bytes(),
    });
    let writes = transport.writes();
    let mut driver = driver_for(transport, chain_platform());
    driver.open().unwrap();

    // Neither callback is `once`; the consumed output must not re-trigger them
    let mut callbacks = vec![
        ReadCallback::on_contains("cont", "Press y", CallbackAction::SendInput("y".into())),
        ReadCallback::on_contains("more", "line a", CallbackAction::SendInput("more".into())),
        ReadCallback::on_contains("end", "END", CallbackAction::None).completes(),
    ];
    let response = driver
        .read_with_callbacks(Some("tail log"), &mut callbacks, None)
        .unwrap();
    assert_eq!(writes.count("y"), 1);
    assert_eq!(writes.count("more"), 1);
    assert!(response.result.contains("line a"));
    assert!(response.result.contains("line b"));
}

#[test]
fn test_on_open_commands_run() {
    let platform = single_mode_platform().with_on_open_command("terminal length 0");
    let transport = Device::new("device#").into_transport();
    let writes = transport.writes();
    let mut driver = driver_for(transport, platform);
    driver.open().unwrap();
    assert_eq!(writes.count("terminal length 0"), 1);
}

#[test]
fn test_driver_trait_object() {
    let transport = chain_device("router>")
        .output("bogus", "% Invalid input detected")
        .output("show run", "hostname router")
        .into_transport();
    let writes = transport.writes();
    let mut generic = driver_for(transport, chain_platform());
    let driver: &mut dyn Driver = &mut generic;

    driver.open().unwrap();
    assert!(driver.is_open());
    driver.acquire_privilege("configuration").unwrap();
    assert_eq!(driver.current_privilege(), Some("configuration"));

    // send_commands keeps going past a failed input
    let responses = driver.send_commands(&["bogus", "show run"]).unwrap();
    assert_eq!(responses.len(), 2);
    assert!(responses[0].failed());
    assert_eq!(responses[1].result, "hostname router");
    assert_eq!(writes.count("enable"), 1);
    assert_eq!(writes.count("configure terminal"), 1);

    driver.close().unwrap();
    assert!(!driver.is_open());
}

#[test]
fn test_custom_open_and_close_hooks() {
    let platform = chain_platform()
        .with_on_open(SessionHook::Custom(Arc::new(|d: &mut GenericDriver| {
            d.acquire_privilege("privileged_exec")
        })))
        .with_on_close_command("write memory")
        .with_on_close(SessionHook::Custom(Arc::new(
            |_: &mut GenericDriver| -> ferrisprompt::Result<()> {
                Err(Error::Driver(DriverError::NotOpened))
            },
        )));
    let transport = chain_device("router>").into_transport();
    let writes = transport.writes();
    let mut driver = driver_for(transport, platform);

    driver.open().unwrap();
    assert_eq!(driver.current_privilege(), Some("privileged_exec"));
    assert_eq!(writes.count("enable"), 1);

    // A failing close hook is logged, not returned
    driver.close().unwrap();
    assert_eq!(writes.count("write memory"), 1);
    assert!(!driver.is_open());
}
