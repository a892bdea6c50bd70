//! Workspace integration tests.
//!
//! Covers payload staging, cleanup and owner-only permissions.

mod common;

use std::collections::HashSet;

use exifgate::workspace::{AclAccess, Workspace, WORKSPACE_PREFIX};

#[test]
fn test_workspace_lives_under_temp_dir() {
    let workspace = Workspace::create().unwrap();
    let name = workspace.path().file_name().unwrap().to_string_lossy().to_string();

    assert!(name.starts_with(WORKSPACE_PREFIX));
    assert!(workspace.path().is_dir());
    assert_eq!(common::entries(workspace.path()), 0);
    workspace.destroy();
}

#[test]
fn test_stage_is_byte_exact() {
    let workspace = Workspace::create().unwrap();

    let mut raw = b"HTTP/1.1 200 OK\r\nContent-Type: image/png\r\n\r\n".to_vec();
    let offset = raw.len();
    let body: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    raw.extend_from_slice(&body);

    let staged = workspace.stage(&raw, offset).unwrap();
    assert_eq!(std::fs::read(staged.path()).unwrap(), body);
    staged.unstage();
    workspace.destroy();
}

#[test]
fn test_stage_whole_payload_and_empty_body() {
    let workspace = Workspace::create().unwrap();

    let staged = workspace.stage(b"\x00\xffGIF89a", 0).unwrap();
    assert_eq!(std::fs::read(staged.path()).unwrap(), b"\x00\xffGIF89a");

    let empty = workspace.stage(b"headers only", 12).unwrap();
    assert_eq!(std::fs::metadata(empty.path()).unwrap().len(), 0);
    workspace.destroy();
}

#[test]
fn test_unstage_removes_file() {
    let workspace = Workspace::create().unwrap();
    let staged = workspace.stage(b"payload", 0).unwrap();
    let path = staged.path().to_path_buf();

    assert!(path.exists());
    staged.unstage();
    assert!(!path.exists());
    assert_eq!(common::entries(workspace.path()), 0);
}

#[test]
fn test_concurrent_stages_get_distinct_files() {
    let workspace = Workspace::create().unwrap();

    let staged: Vec<_> = (0..32)
        .map(|i| workspace.stage(format!("body-{}", i).as_bytes(), 0).unwrap())
        .collect();

    let paths: HashSet<_> = staged.iter().map(|s| s.path().to_path_buf()).collect();
    assert_eq!(paths.len(), 32);
    for (i, s) in staged.iter().enumerate() {
        assert_eq!(std::fs::read_to_string(s.path()).unwrap(), format!("body-{}", i));
    }

    drop(staged);
    assert_eq!(common::entries(workspace.path()), 0);
    workspace.destroy();
}

#[test]
fn test_destroy_removes_leftovers() {
    let workspace = Workspace::create().unwrap();
    let dir = workspace.path().to_path_buf();

    let staged = workspace.stage(b"left behind", 0).unwrap();
    let path = staged.path().to_path_buf();
    std::mem::forget(staged);

    assert!(path.exists());
    workspace.destroy();
    assert!(!dir.exists());
}

#[cfg(unix)]
#[test]
fn test_posix_modes_are_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let workspace = Workspace::create().unwrap();
    assert_eq!(workspace.policy().name(), "posix");

    let mode = |p: &std::path::Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;

    assert_eq!(mode(workspace.path()), 0o700);

    let staged = workspace.stage(b"secret", 0).unwrap();
    assert_eq!(mode(staged.path()), 0o600);

    let exe = workspace.write_executable("exiftool", ".exe", b"#!/bin/sh\n").unwrap();
    assert_eq!(mode(&exe), 0o700);

    workspace.remove_artifact(&exe);
    staged.unstage();
    workspace.destroy();
}

#[test]
fn test_acl_policy_principal() {
    let policy = AclAccess::new("WORKGROUP\\alice");
    assert_eq!(policy.principal(), "WORKGROUP\\alice");
}
