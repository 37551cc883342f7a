mod common;

use std::time::Duration;

use common::{Device, driver_for};
use ferrisprompt::platform::vendors::arista::{self, AristaConfigSession};

fn eos_device() -> Device {
    Device::new("switch#")
        .transition("switch#", "configure session demo", "switch(config-s-demo)#")
        .transition("switch(config-s-demo)#", "abort", "switch#")
        .transition("switch(config-s-demo)#", "commit", "switch#")
        .transition("switch#", "configure terminal", "switch(config)#")
        .output("show session-config diffs", "+hostname lab-sw1")
}

#[test]
fn test_session_abort_restores_privilege() {
    let transport = eos_device().into_transport();
    let writes = transport.writes();
    let mut driver = driver_for(transport, arista::platform().unwrap());
    driver.open().unwrap();
    assert_eq!(writes.count("terminal length 0"), 1);
    assert_eq!(driver.current_privilege(), Some("privilege_exec"));

    let mut session = AristaConfigSession::new(&mut driver, "demo").unwrap();
    assert_eq!(session.session_name(), "demo");
    session.send_command("hostname lab-sw1").unwrap();
    assert_eq!(session.diff().unwrap(), "+hostname lab-sw1");
    session.abort().unwrap();

    assert_eq!(writes.count("configure session demo"), 1);
    assert_eq!(writes.count("abort"), 1);
    assert_eq!(driver.current_privilege(), Some("privilege_exec"));
    assert!(!driver.has_privilege_level("config_session_demo"));
}

#[test]
fn test_session_prompt_is_not_plain_configuration() {
    let transport = eos_device().into_transport();
    let mut driver = driver_for(transport, arista::platform().unwrap());
    driver.open().unwrap();

    let session = AristaConfigSession::new(&mut driver, "demo").unwrap();
    session.detach().unwrap();
    assert_eq!(driver.current_privilege(), Some("config_session_demo"));
    assert!(driver.has_privilege_level("config_session_demo"));
}

#[test]
fn test_session_commit_confirmed_then_commit() {
    let transport = eos_device().into_transport();
    let writes = transport.writes();
    let mut driver = driver_for(transport, arista::platform().unwrap());
    driver.open().unwrap();

    let mut session = AristaConfigSession::new(&mut driver, "demo").unwrap();
    assert!(session.commit_confirmed(Duration::from_secs(30)).is_err());
    session.commit_confirmed(Duration::from_secs(600)).unwrap();
    session.commit().unwrap();

    assert_eq!(writes.count("commit timer 00:10:00"), 1);
    assert_eq!(writes.count("commit"), 1);
    assert_eq!(driver.current_privilege(), Some("privilege_exec"));
}
