// Unit tests for command-line parsing

use crate::cli::Cli;

use asp_core::DEFAULT_PORT;

use std::path::PathBuf;

use clap::{CommandFactory, Parser};

/// **VALUE**: Verifies that the clap definition is internally consistent.
///
/// **BUG THIS CATCHES**: Would catch duplicate short flags (e.g. two `-c` options), which clap
/// only reports at runtime when the binary starts.
#[test]
fn given_cli_definition_when_debug_asserted_then_is_valid() {
    Cli::command().debug_assert();
}

/// **VALUE**: Verifies the defaults used when the launcher passes only `--port`.
///
/// **WHY THIS MATTERS**: The external launcher starts the binary as `asp-server --port <n>`.
/// Any other option must have a sensible default or the child exits before announcing.
///
/// **BUG THIS CATCHES**: Would catch making `--config` or `--log-dir` required.
#[test]
fn given_only_port_when_parsed_then_other_options_default() {
    // GIVEN/WHEN: Parsing the launcher's command line
    let cli = Cli::try_parse_from(["asp-server", "--port", "4490"]).unwrap();

    // THEN: Port set, everything else defaulted
    assert_eq!(cli.port, 4490);
    assert!(cli.config.is_none());
    assert!(cli.log_dir.is_none());
    assert!(!cli.verbose);
}

/// **VALUE**: Verifies the default port and the remaining flags.
#[test]
fn given_all_flags_when_parsed_then_fields_populated() {
    let default = Cli::try_parse_from(["asp-server"]).unwrap();
    assert_eq!(default.port, DEFAULT_PORT);

    let cli = Cli::try_parse_from([
        "asp-server",
        "-p",
        "4491",
        "--config",
        "/etc/asp",
        "--log-dir",
        "/var/log/asp",
        "-v",
    ])
    .unwrap();
    assert_eq!(cli.port, 4491);
    assert_eq!(cli.config, Some(PathBuf::from("/etc/asp")));
    assert_eq!(cli.log_dir, Some(PathBuf::from("/var/log/asp")));
    assert!(cli.verbose);
}

/// **VALUE**: Verifies that an out-of-range port is rejected at parse time.
///
/// **BUG THIS CATCHES**: Would catch widening the port type and truncating later.
#[test]
fn given_port_out_of_range_when_parsed_then_error() {
    assert!(Cli::try_parse_from(["asp-server", "--port", "70000"]).is_err());
}
