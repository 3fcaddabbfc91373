//! Argument parsing, exit codes and early failures of the built binary.

#![allow(clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;

const METAL_VARS: [&str; 17] = [
    "METAL_SSH_USER",
    "METAL_SSH_PASSWORD",
    "METAL_SSH_HOST",
    "METAL_SSH_PRIVATE_KEY",
    "METAL_SSH_PRIVATE_KEY_PASSPHRASE",
    "METAL_OS_ISO_URL",
    "METAL_SSH_WORK_DIR",
    "METAL_QEMU_DRIVES",
    "METAL_QEMU_CPU",
    "METAL_QEMU_MEMORY",
    "METAL_PACKAGES_INSTALL_COMMAND",
    "METAL_SSH_TUNNEL_LOCAL_ENDPOINT",
    "METAL_SSH_TUNNEL_REMOTE_ENDPOINT",
    "METAL_SSH_TUNNEL_MODE",
    "METAL_USE_UEFI",
    "METAL_CONNECT_TIMEOUT",
    "METAL_COMMAND_TIMEOUT",
];

fn installer() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("metal-os-install"));
    cmd.env("NO_COLOR", "1");
    for var in METAL_VARS {
        cmd.env_remove(var);
    }
    cmd
}

/// Binary with every required flag set; the caller adds credentials.
fn with_required() -> Command {
    let mut cmd = installer();
    cmd.args([
        "--ssh-host",
        "127.0.0.1:1",
        "--os-iso-url",
        "https://releases.example.com/installer.iso",
        "--qemu-drives",
        "/dev/sda",
        "--ssh-tunnel-local-endpoint",
        "127.0.0.1:0",
        "--connect-timeout",
        "5",
    ]);
    cmd
}

// --- Help and version ---

#[test]
fn test_no_args_prints_usage_and_exits_2() {
    installer()
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--ssh-host"))
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_help_lists_flags() {
    installer()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("--qemu-drives"))
        .stdout(predicate::str::contains("--ssh-tunnel-mode"))
        .stdout(predicate::str::contains("METAL_SSH_HOST"));
}

#[test]
fn test_short_version_flag() {
    installer()
        .arg("-v")
        .assert()
        .success()
        .stdout(predicate::str::contains("metal-os-install 0.1.0"));
}

#[test]
fn test_long_version_flag() {
    installer()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("metal-os-install"));
}

// --- Validation happens before any network access ---

#[test]
fn test_missing_drives_is_usage_error() {
    installer()
        .args(["--ssh-host", "10.0.0.5", "--os-iso-url", "http://mirror/os.iso"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--qemu-drives"));
}

#[test]
fn test_missing_credentials_exit_2() {
    with_required()
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no SSH credentials provided"));
}

#[test]
fn test_no_color_env_values_are_accepted() {
    for value in ["1", "true", "yes"] {
        with_required()
            .env("NO_COLOR", value)
            .assert()
            .code(2)
            .stderr(predicate::str::contains("no SSH credentials provided"))
            .stderr(predicate::str::contains("invalid value").not());
    }
}

#[test]
fn test_bare_use_uefi_flag_is_accepted() {
    with_required()
        .arg("--use-uefi")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no SSH credentials provided"));
}

#[test]
fn test_invalid_memory_exit_2() {
    with_required()
        .args(["--ssh-password", "x", "--qemu-memory", "sixteen"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid --qemu-memory 'sixteen'"));
}

#[test]
fn test_invalid_use_uefi_value_is_rejected_by_parser() {
    with_required()
        .args(["--ssh-password", "x", "--use-uefi", "yes-please"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--use-uefi"));
}

#[test]
fn test_environment_supplies_flags() {
    installer()
        .env("METAL_SSH_HOST", "10.0.0.5")
        .env("METAL_OS_ISO_URL", "http://mirror/os.iso")
        .env("METAL_QEMU_DRIVES", "/dev/sda")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no SSH credentials provided"));
}

#[test]
fn test_unreadable_private_key_aborts_before_connecting() {
    with_required()
        .args(["--ssh-private-key", "/nonexistent/metal-os-install/id_ed25519"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unable to load private key"));
}

#[test]
fn test_password_alongside_private_key_is_reported_as_ignored() {
    with_required()
        .args([
            "--ssh-password",
            "hunter2",
            "--ssh-private-key",
            "/nonexistent/metal-os-install/id_ed25519",
        ])
        .assert()
        .code(1)
        .stdout(predicate::str::contains(
            "⚠ --ssh-password is ignored because --ssh-private-key is set",
        ))
        .stderr(predicate::str::contains("unable to load private key"));
}

#[test]
fn test_quiet_hides_the_ignored_password_warning() {
    with_required()
        .args([
            "--quiet",
            "--ssh-password",
            "hunter2",
            "--ssh-private-key",
            "/nonexistent/metal-os-install/id_ed25519",
        ])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("--ssh-password").not());
}

// --- Connect state ---

#[test]
fn test_refused_connection_aborts_with_exit_1() {
    with_required()
        .args(["--ssh-password", "x"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unable to connect to 127.0.0.1:1"));
}

#[test]
fn test_quiet_suppresses_summary() {
    with_required()
        .args(["--ssh-password", "x", "--quiet"])
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty());
}
