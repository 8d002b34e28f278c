// Unit tests for launcher helpers: announcement parsing, command line, state machine

use crate::launcher::{LauncherState, build_launch_command, get_announcement_regex};
use crate::secret_key_announcement;

use common::SecretKey;

use std::ffi::OsStr;
use std::path::Path;

/// **VALUE**: Verifies that the launcher's regex parses the exact line the server prints.
///
/// **WHY THIS MATTERS**: The announcement is the only channel that carries the key from the
/// child to the launcher. If formatter and parser drift apart, every external launch times out
/// even though the server started fine.
///
/// **BUG THIS CATCHES**: Would catch editing `secret_key_announcement` without updating the
/// pattern, or capture groups being renamed.
#[test]
fn given_server_announcement_when_regex_applied_then_extracts_port_and_key() {
    // GIVEN: The line a server on port 4447 prints
    let key = SecretKey::generate();
    let line = secret_key_announcement("127.0.0.1", 4447, &key);

    // WHEN: Applying the regex
    let caps = get_announcement_regex().captures(&line);

    // THEN: Port and key are captured verbatim
    let caps = caps.expect("announcement should match");
    assert_eq!(caps.name("port").unwrap().as_str(), "4447");
    assert_eq!(caps.name("key").unwrap().as_str(), key.as_str());
}

/// **VALUE**: Verifies that ordinary log output is not mistaken for an announcement.
///
/// **BUG THIS CATCHES**: Would catch a pattern so loose that a log line mentioning a port is
/// parsed as a key, making the launcher authenticate with garbage.
#[test]
fn given_unrelated_output_when_regex_applied_then_does_not_match() {
    // GIVEN: Lines a server might print before listening
    let re = get_announcement_regex();
    let lines = [
        "Starting ASP server",
        "ASP server listening on 127.0.0.1:4447",
        "secret-key: abc",
        "listening on 127.0.0.1:port secret-key: abcdefabcdefabcdef",
    ];

    // WHEN/THEN: None of them match
    for line in lines {
        assert!(re.captures(line).is_none(), "Should not match: {line}");
    }
}

/// **VALUE**: Verifies the child command line.
///
/// **BUG THIS CATCHES**: Would catch extra arguments being placed before `--port`, or the port
/// being dropped entirely, which makes the child bind its default port instead.
#[test]
fn given_port_and_args_when_build_launch_command_called_then_passes_port_first() {
    // GIVEN: A binary path, a port and extra args
    let args = vec!["--verbose".to_string()];

    // WHEN: Building the command
    let cmd = build_launch_command(Path::new("/usr/local/bin/asp-server"), 4480, &args);

    // THEN: Binary, port flag and extra args are in order
    let std_cmd = cmd.as_std();
    assert_eq!(std_cmd.get_program(), "/usr/local/bin/asp-server");
    let collected: Vec<&OsStr> = std_cmd.get_args().collect();
    assert_eq!(collected, vec!["--port", "4480", "--verbose"]);
}

/// **VALUE**: Verifies which states allow a new launch.
///
/// **WHY THIS MATTERS**: Relaunching after a failure must work, but launching twice on a live
/// launcher must be refused rather than leaking the first server.
///
/// **BUG THIS CATCHES**: Would catch `Starting` being treated as launchable, which lets two
/// concurrent launches race for the same port.
#[test]
fn given_each_state_when_can_launch_checked_then_only_idle_states_allow_launch() {
    assert!(LauncherState::NotStarted.can_launch());
    assert!(LauncherState::Stopped.can_launch());
    assert!(!LauncherState::Starting.can_launch());
    assert!(!LauncherState::Listening.can_launch());
    assert_eq!(LauncherState::default(), LauncherState::NotStarted);
    assert_eq!(LauncherState::Listening.to_string(), "listening");
}
