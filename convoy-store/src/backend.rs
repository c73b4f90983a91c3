use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use convoy_core::{ActivationMode, BuildOutput, GitRevision, PathInfo, StoreBackend, StorePath};

use crate::error::{Result, StoreError};
use crate::process::{run, run_in, run_json};

/// The default `nix` binary invoked for every operation; override via
/// [`ProcessStoreBackend::with_binary`] in tests or for an alternate
/// store-tool build.
const DEFAULT_NIX_BINARY: &str = "nix";

#[derive(Debug, Deserialize)]
struct FlakeInfo {
    revision: String,
}

#[derive(Debug, Deserialize)]
struct FlakeShow {
    #[serde(rename = "nixosConfigurations", default)]
    nixos_configurations: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct BuildOutputs {
    out: String,
}

#[derive(Debug, Deserialize)]
struct BuildResultEntry {
    #[serde(rename = "drvPath")]
    drv_path: String,
    outputs: BuildOutputs,
}

/// The store I/O adapter: invokes the external store toolchain via
/// subprocess. The only place in this workspace that shells out.
pub struct ProcessStoreBackend {
    nix_binary: String,
}

impl Default for ProcessStoreBackend {
    fn default() -> Self {
        Self {
            nix_binary: DEFAULT_NIX_BINARY.to_string(),
        }
    }
}

impl ProcessStoreBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the `nix` binary invoked, e.g. to point at a wrapper or a
    /// pinned build during integration tests.
    pub fn with_binary(nix_binary: impl Into<String>) -> Self {
        Self {
            nix_binary: nix_binary.into(),
        }
    }

    fn flake_uri_with_query(flake_uri: &str, query: &str) -> String {
        if flake_uri.contains('?') {
            format!("{flake_uri}&{query}")
        } else {
            format!("{flake_uri}?{query}")
        }
    }

    async fn available_hostnames(&self, flake_uri: &str, revision: &GitRevision) -> Result<Vec<String>> {
        let uri = Self::flake_uri_with_query(flake_uri, &format!("rev={revision}"));
        let show: FlakeShow = run_json(
            "flake_show",
            &self.nix_binary,
            &["flake", "show", "--json", &uri],
        )
        .await?;
        Ok(show.nixos_configurations.into_keys().collect())
    }
}

#[async_trait]
impl StoreBackend for ProcessStoreBackend {
    type Error = StoreError;

    async fn resolve_revision(
        &self,
        flake_uri: &str,
        reference: Option<&str>,
    ) -> Result<GitRevision> {
        let uri = match reference {
            Some(reference) => Self::flake_uri_with_query(flake_uri, &format!("ref={reference}")),
            None => flake_uri.to_string(),
        };
        let info: FlakeInfo = run_json(
            "flake_info",
            &self.nix_binary,
            &["flake", "info", "--json", &uri],
        )
        .await?;
        GitRevision::new(info.revision)
            .map_err(|err| StoreError::ExternalOutputMalformed {
                op: "flake_info",
                raw: err.to_string(),
            })
    }

    async fn build_toplevel(
        &self,
        flake_uri: &str,
        revision: &GitRevision,
        hostname: &str,
        store_dir: &Path,
    ) -> Result<BuildOutput> {
        let available = self.available_hostnames(flake_uri, revision).await?;
        if !available.iter().any(|h| h == hostname) {
            return Err(StoreError::UnknownHostname {
                requested: hostname.to_string(),
                available,
            });
        }

        let uri = Self::flake_uri_with_query(flake_uri, &format!("rev={revision}"));
        let attr = format!(
            "{uri}#nixosConfigurations.{hostname}.config.system.build.toplevel"
        );
        let store_dir_str = store_dir.display().to_string();
        let entries: Vec<BuildResultEntry> = run_json(
            "build",
            &self.nix_binary,
            &[
                "build",
                "--json",
                "--no-link",
                "--store",
                &store_dir_str,
                &attr,
            ],
        )
        .await?;

        let entry = entries.into_iter().next().ok_or(StoreError::ExternalOutputMalformed {
            op: "build",
            raw: "expected exactly one build result".to_string(),
        })?;

        Ok(BuildOutput {
            derivation: StorePath::new(entry.drv_path),
            output: StorePath::new(entry.outputs.out),
            revision: revision.clone(),
        })
    }

    async fn query_path_info(
        &self,
        store_dir: &Path,
        roots: &[StorePath],
    ) -> Result<Vec<PathInfo>> {
        let store_dir_str = store_dir.display().to_string();
        let mut args: Vec<&str> = vec!["path-info", "--json", "--recursive", &store_dir_str];
        let root_strs: Vec<String> = roots.iter().map(|r| r.to_string()).collect();
        args.extend(root_strs.iter().map(String::as_str));
        run_json("path_info", &self.nix_binary, &args).await
    }

    async fn export_to_archive(
        &self,
        store_dir: &Path,
        archive_dir: &Path,
        root: &StorePath,
    ) -> Result<()> {
        let store_dir_str = store_dir.display().to_string();
        let to = format!("file://{}", archive_dir.display());
        let root_str = root.to_string();
        run(
            "export_to_archive",
            &self.nix_binary,
            &["copy", "--store", &store_dir_str, "--to", &to, &root_str],
        )
        .await?;
        Ok(())
    }

    async fn import_from_archive(
        &self,
        archive_dir: &Path,
        root: &StorePath,
        target_store_dir: &Path,
    ) -> Result<()> {
        let from = format!("file://{}", archive_dir.display());
        let target_store_dir_str = target_store_dir.display().to_string();
        let root_str = root.to_string();
        run(
            "import_from_archive",
            &self.nix_binary,
            &["copy", "--from", &from, "--to", &target_store_dir_str, &root_str],
        )
        .await
        .map_err(|err| StoreError::ImportFailed {
            path: root.to_string(),
            reason: err.to_string(),
        })?;
        Ok(())
    }

    async fn activate_generation(
        &self,
        target_store_root: &Path,
        path: &StorePath,
        mode: ActivationMode,
    ) -> Result<()> {
        let script = format!("{path}/bin/switch-to-configuration");
        let verb = match mode {
            ActivationMode::Immediate => "switch",
            ActivationMode::NextReboot => "boot",
        };
        let output = run_in(&script, &[verb], target_store_root)
            .await
            .map_err(|source| StoreError::ActivationFailed {
                path: path.to_string(),
                reason: source.to_string(),
            })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(StoreError::ActivationFailed {
                path: path.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use tempfile::tempdir;

    use super::*;

    /// Writes a shell script standing in for `nix` that dispatches on its
    /// first two arguments, so tests exercise real subprocess spawning and
    /// JSON parsing without depending on a real store toolchain.
    fn fake_nix(dir: &Path, script: &str) -> String {
        let path = dir.join("fake-nix");
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[tokio::test]
    async fn resolve_revision_parses_flake_info() {
        let dir = tempdir().unwrap();
        let script = fake_nix(
            dir.path(),
            r#"echo '{"revision":"1111111111111111111111111111111111111111"}'"#,
        );
        let backend = ProcessStoreBackend::with_binary(script);
        let rev = backend.resolve_revision("github:acme/flake", None).await.unwrap();
        assert_eq!(rev.as_str(), "1111111111111111111111111111111111111111");
    }

    #[tokio::test]
    async fn build_toplevel_rejects_unknown_hostname() {
        let dir = tempdir().unwrap();
        let script = fake_nix(
            dir.path(),
            r#"
            case "$1 $2" in
              "flake show") echo '{"nixosConfigurations":{"testvm":{}}}' ;;
              *) echo "unexpected args: $@" >&2; exit 1 ;;
            esac
            "#,
        );
        let backend = ProcessStoreBackend::with_binary(script);
        let rev = GitRevision::new("1".repeat(40)).unwrap();
        let err = backend
            .build_toplevel("github:acme/flake", &rev, "ghost", dir.path())
            .await
            .unwrap_err();
        match err {
            StoreError::UnknownHostname { requested, available } => {
                assert_eq!(requested, "ghost");
                assert_eq!(available, vec!["testvm".to_string()]);
            }
            other => panic!("expected UnknownHostname, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn build_toplevel_succeeds_for_known_hostname() {
        let dir = tempdir().unwrap();
        let script = fake_nix(
            dir.path(),
            r#"
            case "$1 $2" in
              "flake show") echo '{"nixosConfigurations":{"testvm":{}}}' ;;
              *)
                case "$1" in
                  build) echo '[{"drvPath":"/nix/store/x.drv","outputs":{"out":"/nix/store/y-toplevel"}}]' ;;
                  *) echo "unexpected args: $@" >&2; exit 1 ;;
                esac
                ;;
            esac
            "#,
        );
        let backend = ProcessStoreBackend::with_binary(script);
        let rev = GitRevision::new("2".repeat(40)).unwrap();
        let built = backend
            .build_toplevel("github:acme/flake", &rev, "testvm", dir.path())
            .await
            .unwrap();
        assert_eq!(built.output.as_str(), "/nix/store/y-toplevel");
    }

    #[tokio::test]
    async fn external_tool_failure_captures_stderr() {
        let dir = tempdir().unwrap();
        let script = fake_nix(dir.path(), "echo 'boom' >&2; exit 7");
        let backend = ProcessStoreBackend::with_binary(script);
        let err = backend.resolve_revision("github:acme/flake", None).await.unwrap_err();
        match err {
            StoreError::ExternalToolFailure { stderr, .. } => assert!(stderr.contains("boom")),
            other => panic!("expected ExternalToolFailure, got {other:?}"),
        }
    }
}
