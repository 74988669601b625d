// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{Cli, Command};
use clap::Parser;

#[test]
fn submit_subcommand_captures_config_path() {
    let cli = Cli::parse_from(["svpr-cli", "submit", "job.json"]);
    match cli.command {
        Command::Submit { config } => assert_eq!(config, std::path::PathBuf::from("job.json")),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn socket_flag_overrides_detected_default() {
    let cli = Cli::parse_from(["svpr-cli", "--socket", "/tmp/x/sock", "list"]);
    assert_eq!(cli.socket, Some(std::path::PathBuf::from("/tmp/x/sock")));
}
