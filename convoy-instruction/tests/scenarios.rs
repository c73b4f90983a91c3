//! End-to-end scenarios against `FakeStoreBackend`, covering a full install,
//! an incremental update chained after it, and the documented failure and
//! validation boundaries.

use std::collections::BTreeSet;

use tempfile::tempdir;

use convoy_core::{ActivationMode, GitRevision, PathInfo, StorePath};
use convoy_instruction::{
    assert_instruction_dir_valid, build_instruction, execute_instruction, BuildRequest, Command,
    ExecuteRequest, Instruction, InstructionError, InstructionKind,
};
use convoy_test_support::{FakeStoreBackend, ToplevelFixture};

fn rev(digit: char) -> GitRevision {
    GitRevision::new(digit.to_string().repeat(40)).unwrap()
}

fn path_info(path: &str, hash: &str, refs: &[&str]) -> PathInfo {
    PathInfo::new(
        StorePath::new(path),
        hash.to_string(),
        1024,
        refs.iter().map(|r| StorePath::new(*r)).collect::<BTreeSet<_>>(),
    )
}

/// A backend with two fixtures: `r0` (the full closure reachable by an
/// initial install) and `r1`, which adds exactly one package on top of it.
fn two_revision_backend() -> FakeStoreBackend {
    let base = path_info("/store/dep-base", "sha256:base", &[]);
    let r0_root = path_info("/store/r0-toplevel", "sha256:r0", &["/store/dep-base"]);
    let new_pkg = path_info("/store/new-pkg", "sha256:new", &[]);
    let r1_root = path_info(
        "/store/r1-toplevel",
        "sha256:r1",
        &["/store/dep-base", "/store/new-pkg"],
    );

    FakeStoreBackend::new(
        vec!["testvm".to_string()],
        vec![
            ToplevelFixture::new(
                "testvm",
                rev('1'),
                StorePath::new("/store/r0-toplevel"),
                vec![base.clone(), r0_root],
            ),
            ToplevelFixture::new(
                "testvm",
                rev('2'),
                StorePath::new("/store/r1-toplevel"),
                vec![base, new_pkg, r1_root],
            ),
        ],
        rev('2'),
    )
}

/// S1 — full install: single revision, no past revs, immediate switch.
#[tokio::test]
async fn full_install_activates_the_single_revision() {
    let backend = two_revision_backend();
    let instruction_dir = tempdir().unwrap();
    let instruction_file = instruction_dir.path().join("instruction.tar.xz");

    build_instruction(
        &backend,
        &BuildRequest {
            flake_uri: "github:acme/flake",
            hostname: "testvm",
            past_revs: &[],
            new_rev: &rev('1'),
            partial_narinfos: false,
            mode: ActivationMode::Immediate,
        },
        &instruction_file,
    )
    .await
    .unwrap();

    let target_store = tempdir().unwrap();
    let client_state = tempdir().unwrap();
    execute_instruction(
        &backend,
        &ExecuteRequest {
            instruction_file: &instruction_file,
            target_store_root: target_store.path(),
            client_state_dir: client_state.path(),
            workdir_base: None,
        },
    )
    .await
    .unwrap();

    let activations = backend.activations();
    assert_eq!(activations.len(), 1);
    assert_eq!(activations[0].0.as_str(), "/store/r0-toplevel");
    assert_eq!(activations[0].1, ActivationMode::Immediate);

    // The full closure's info files land in the client-state cache because
    // this instruction shipped `partialNarinfos = false`.
    let cached = std::fs::read_dir(client_state.path())
        .unwrap()
        .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".narinfo"))
        .count();
    assert_eq!(cached, 2);
}

/// S2 — incremental update, chained after S1 so the target's client-state
/// cache already holds R0's info files.
#[tokio::test]
async fn incremental_update_ships_only_the_added_package() {
    let backend = two_revision_backend();
    let target_store = tempdir().unwrap();
    let client_state = tempdir().unwrap();

    let s1_dir = tempdir().unwrap();
    let s1_file = s1_dir.path().join("instruction.tar.xz");
    build_instruction(
        &backend,
        &BuildRequest {
            flake_uri: "github:acme/flake",
            hostname: "testvm",
            past_revs: &[],
            new_rev: &rev('1'),
            partial_narinfos: false,
            mode: ActivationMode::Immediate,
        },
        &s1_file,
    )
    .await
    .unwrap();
    execute_instruction(
        &backend,
        &ExecuteRequest {
            instruction_file: &s1_file,
            target_store_root: target_store.path(),
            client_state_dir: client_state.path(),
            workdir_base: None,
        },
    )
    .await
    .unwrap();

    let s2_dir = tempdir().unwrap();
    let s2_file = s2_dir.path().join("instruction.tar.xz");
    build_instruction(
        &backend,
        &BuildRequest {
            flake_uri: "github:acme/flake",
            hostname: "testvm",
            past_revs: &[rev('1')],
            new_rev: &rev('2'),
            partial_narinfos: true,
            mode: ActivationMode::Immediate,
        },
        &s2_file,
    )
    .await
    .unwrap();

    // Inspect the built archive directly: it must ship only the new
    // package's data, not the unchanged base dependency.
    let inspect_dir = tempdir().unwrap();
    convoy_instruction::decompress_file_to_dir(&s2_file, inspect_dir.path()).unwrap();
    let archive_dir = inspect_dir.path().join("archive");
    assert!(archive_dir.join("new-pkg").exists());
    assert!(!archive_dir.join("dep-base").exists());

    execute_instruction(
        &backend,
        &ExecuteRequest {
            instruction_file: &s2_file,
            target_store_root: target_store.path(),
            client_state_dir: client_state.path(),
            workdir_base: None,
        },
    )
    .await
    .unwrap();

    let activations = backend.activations();
    assert_eq!(activations.len(), 2);
    assert_eq!(activations[1].0.as_str(), "/store/r1-toplevel");
}

/// S3 — next-reboot switch creates a generation without touching the
/// currently-running one; the fake backend records the requested mode so
/// the distinction is observable.
#[tokio::test]
async fn next_reboot_switch_records_the_requested_mode() {
    let backend = two_revision_backend();
    let instruction_dir = tempdir().unwrap();
    let instruction_file = instruction_dir.path().join("instruction.tar.xz");

    build_instruction(
        &backend,
        &BuildRequest {
            flake_uri: "github:acme/flake",
            hostname: "testvm",
            past_revs: &[],
            new_rev: &rev('1'),
            partial_narinfos: false,
            mode: ActivationMode::NextReboot,
        },
        &instruction_file,
    )
    .await
    .unwrap();

    let target_store = tempdir().unwrap();
    let client_state = tempdir().unwrap();
    execute_instruction(
        &backend,
        &ExecuteRequest {
            instruction_file: &instruction_file,
            target_store_root: target_store.path(),
            client_state_dir: client_state.path(),
            workdir_base: None,
        },
    )
    .await
    .unwrap();

    assert_eq!(backend.activations()[0].1, ActivationMode::NextReboot);
}

/// S4 — an unknown hostname aborts the build before any store build occurs.
#[tokio::test]
async fn unknown_hostname_is_rejected_before_any_build() {
    let backend = two_revision_backend();
    let instruction_dir = tempdir().unwrap();
    let instruction_file = instruction_dir.path().join("instruction.tar.xz");

    let err = build_instruction(
        &backend,
        &BuildRequest {
            flake_uri: "github:acme/flake",
            hostname: "ghost",
            past_revs: &[],
            new_rev: &rev('1'),
            partial_narinfos: false,
            mode: ActivationMode::Immediate,
        },
        &instruction_file,
    )
    .await
    .unwrap_err();

    match err {
        InstructionError::StoreBackend(message) => {
            assert!(message.contains("ghost"), "unexpected message: {message}");
        }
        other => panic!("expected StoreBackend, got {other:?}"),
    }
}

/// S5 — executing an incremental instruction against a target that never
/// received R0's metadata fails with `MissingDependencyMetadata` and leaves
/// no generation activated.
#[tokio::test]
async fn missing_dependency_metadata_aborts_before_activation() {
    let backend = two_revision_backend();

    let s2_dir = tempdir().unwrap();
    let s2_file = s2_dir.path().join("instruction.tar.xz");
    build_instruction(
        &backend,
        &BuildRequest {
            flake_uri: "github:acme/flake",
            hostname: "testvm",
            past_revs: &[rev('1')],
            new_rev: &rev('2'),
            partial_narinfos: true,
            mode: ActivationMode::Immediate,
        },
        &s2_file,
    )
    .await
    .unwrap();

    let target_store = tempdir().unwrap();
    let client_state = tempdir().unwrap();
    let err = execute_instruction(
        &backend,
        &ExecuteRequest {
            instruction_file: &s2_file,
            target_store_root: target_store.path(),
            client_state_dir: client_state.path(),
            workdir_base: None,
        },
    )
    .await
    .unwrap_err();

    assert!(matches!(err, InstructionError::MissingDependencyMetadata { .. }));
    assert!(backend.activations().is_empty());
}

/// S6 — validation rejects an instruction where `Switch` is not last.
#[test]
fn validation_rejects_switch_before_load() {
    use convoy_core::StoreRoot;

    let item = StoreRoot::new(StorePath::new("/store/r0-toplevel"), rev('1'));
    let instruction = Instruction {
        kind: InstructionKind::Switch,
        commands: vec![
            Command::Switch {
                item: item.clone(),
                mode: ActivationMode::Immediate,
            },
            Command::Load {
                archive_path: "archive".to_string(),
                item,
                delta_dependencies: vec![],
                partial_narinfos: false,
            },
        ],
    };

    let dir = tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("archive")).unwrap();
    std::fs::write(
        dir.path().join("instruction.json"),
        serde_json::to_vec(&instruction).unwrap(),
    )
    .unwrap();

    let err = assert_instruction_dir_valid(dir.path()).unwrap_err();
    match err {
        InstructionError::InvalidInstruction { reason } => {
            assert!(reason.contains("last"), "unexpected reason: {reason}");
        }
        other => panic!("expected InvalidInstruction, got {other:?}"),
    }
}

/// An unrecognized command `kind` is rejected as `UnknownCommandKind`
/// rather than falling through to a generic JSON parse error.
#[test]
fn validation_rejects_an_unknown_command_kind() {
    let dir = tempdir().unwrap();
    std::fs::write(
        dir.path().join("instruction.json"),
        serde_json::to_vec(&serde_json::json!({
            "kind": "switch",
            "commands": [
                { "kind": "reboot", "item": { "nixPath": "/store/r0-toplevel", "gitRevision": "1".repeat(40) } }
            ]
        }))
        .unwrap(),
    )
    .unwrap();

    let err = assert_instruction_dir_valid(dir.path()).unwrap_err();
    match err {
        InstructionError::UnknownCommandKind { kind } => assert_eq!(kind, "reboot"),
        other => panic!("expected UnknownCommandKind, got {other:?}"),
    }
}

/// A `Load.archivePath` that isn't a single path segment is rejected before
/// it could ever be joined onto the decompressed workdir.
#[test]
fn validation_rejects_an_archive_path_that_escapes_the_workdir() {
    use convoy_core::StoreRoot;

    let item = StoreRoot::new(StorePath::new("/store/r0-toplevel"), rev('1'));
    let instruction = Instruction {
        kind: InstructionKind::Switch,
        commands: vec![Command::Load {
            archive_path: "../escape".to_string(),
            item,
            delta_dependencies: vec![],
            partial_narinfos: false,
        }],
    };

    let dir = tempdir().unwrap();
    std::fs::write(
        dir.path().join("instruction.json"),
        serde_json::to_vec(&instruction).unwrap(),
    )
    .unwrap();

    let err = assert_instruction_dir_valid(dir.path()).unwrap_err();
    match err {
        InstructionError::InvalidInstruction { reason } => {
            assert!(reason.contains("single path segment"), "unexpected reason: {reason}");
        }
        other => panic!("expected InvalidInstruction, got {other:?}"),
    }
}

/// Two `Load`s sharing the same `archivePath` are rejected, since they
/// would collide when joined to the same decompressed instruction dir.
#[test]
fn validation_rejects_duplicate_archive_paths() {
    use convoy_core::StoreRoot;

    let r0 = StoreRoot::new(StorePath::new("/store/r0-toplevel"), rev('1'));
    let r1 = StoreRoot::new(StorePath::new("/store/r1-toplevel"), rev('2'));
    let instruction = Instruction {
        kind: InstructionKind::Switch,
        commands: vec![
            Command::Load {
                archive_path: "archive".to_string(),
                item: r0,
                delta_dependencies: vec![],
                partial_narinfos: false,
            },
            Command::Load {
                archive_path: "archive".to_string(),
                item: r1,
                delta_dependencies: vec![],
                partial_narinfos: false,
            },
        ],
    };

    let dir = tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("archive")).unwrap();
    std::fs::write(
        dir.path().join("instruction.json"),
        serde_json::to_vec(&instruction).unwrap(),
    )
    .unwrap();

    let err = assert_instruction_dir_valid(dir.path()).unwrap_err();
    match err {
        InstructionError::InvalidInstruction { reason } => {
            assert!(reason.contains("more than one load"), "unexpected reason: {reason}");
        }
        other => panic!("expected InvalidInstruction, got {other:?}"),
    }
}

/// Boundary: empty `pastRevs` produces `deltaDependencies == []` and
/// `added == allResultingItems`.
#[tokio::test]
async fn empty_past_revs_means_everything_is_added() {
    let backend = two_revision_backend();
    let instruction_dir = tempdir().unwrap();
    let instruction_file = instruction_dir.path().join("instruction.tar.xz");
    build_instruction(
        &backend,
        &BuildRequest {
            flake_uri: "github:acme/flake",
            hostname: "testvm",
            past_revs: &[],
            new_rev: &rev('1'),
            partial_narinfos: false,
            mode: ActivationMode::Immediate,
        },
        &instruction_file,
    )
    .await
    .unwrap();

    let inspect_dir = tempdir().unwrap();
    convoy_instruction::decompress_file_to_dir(&instruction_file, inspect_dir.path()).unwrap();
    let instruction = assert_instruction_dir_valid(inspect_dir.path()).unwrap();
    match &instruction.commands[0] {
        Command::Load {
            delta_dependencies, ..
        } => assert!(delta_dependencies.is_empty()),
        other => panic!("expected Load as the first command, got {other:?}"),
    }
}
