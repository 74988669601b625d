// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::CliArgs;
use clap::Parser;

#[test]
fn trailing_command_is_captured_as_firstborn() {
    let args = CliArgs::parse_from(["svprd", "--", "/bin/echo", "hi"]);
    assert_eq!(args.command, vec!["/bin/echo", "hi"]);
    assert!(!args.daemonize);
}

#[test]
fn first_process_flags_parse_independently_of_daemonize() {
    let args = CliArgs::parse_from(["svprd", "-d", "-s", "-v", "-x"]);
    assert!(args.daemonize);
    assert!(args.single_user);
    assert!(args.verbose_boot);
    assert!(args.safe_boot);
    assert!(args.command.is_empty());
}

#[test]
fn setup_logging_creates_log_file_under_given_dir() {
    let dir = tempfile::tempdir().unwrap();
    let _guard = super::setup_logging(dir.path()).unwrap();
    drop(_guard);
    assert!(dir.path().join("svprd.log").exists());
}
