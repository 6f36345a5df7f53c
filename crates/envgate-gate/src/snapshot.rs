// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Secrets snapshot: read-only `.locked` copies of the secrets file and its
// siblings, with restore instructions, committed as a directory plus a
// tar.gz. The gate runs before any secrets file is read.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use envgate_core::config::GatePaths;
use envgate_core::error::{GateError, Result};
use envgate_security::ApprovalStore;
use tracing::{info, instrument, warn};

use crate::gate::{Gate, GateRequest};
use crate::staging::{StagedDir, timestamped_name};

pub const SNAPSHOT_README: &str = "README_SECRETS_SNAPSHOT.md";
pub const LOCKED_SUFFIX: &str = ".locked";

#[derive(Debug, Clone)]
pub struct SnapshotOptions {
    pub root: PathBuf,
    pub secrets_file: PathBuf,
    /// Additional files, relative to `root`.
    pub extra: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub name: String,
}

impl SnapshotOptions {
    pub fn from_paths(paths: &GatePaths, output_dir: impl Into<PathBuf>, extra: Vec<PathBuf>) -> Self {
        Self {
            root: paths.root.clone(),
            secrets_file: paths.secrets_file.clone(),
            extra,
            output_dir: output_dir.into(),
            name: timestamped_name("secrets_snapshot"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotReport {
    pub approval_id: String,
    pub directory: PathBuf,
    pub archive: PathBuf,
    /// Names of the `.locked` copies.
    pub files: Vec<String>,
}

#[instrument(skip_all, fields(name = %options.name))]
pub fn snapshot<S: ApprovalStore + ?Sized>(
    gate: &Gate<'_, S>,
    request: &GateRequest,
    options: &SnapshotOptions,
) -> Result<SnapshotReport> {
    let auth = gate.authorize("snapshot", request.preferred_mode(), request)?;

    let sources = snapshot_sources(options)?;
    if sources.is_empty() {
        return Err(GateError::Consumer(format!(
            "no secrets files found next to {}",
            options.secrets_file.display()
        )));
    }

    let staged = StagedDir::create(&options.output_dir, &options.name)?;
    let mut files = Vec::with_capacity(sources.len());
    for src in &sources {
        let Some(name) = src.file_name() else {
            continue;
        };
        let locked = format!("{}{LOCKED_SUFFIX}", name.to_string_lossy());
        let dest = staged.copy_in(src, Path::new(&locked))?;
        let mut perms = fs::metadata(&dest)?.permissions();
        perms.set_readonly(true);
        fs::set_permissions(&dest, perms)?;
        files.push(locked);
    }
    let canonical = options
        .secrets_file
        .strip_prefix(&options.root)
        .unwrap_or(&options.secrets_file);
    staged.write(
        Path::new(SNAPSHOT_README),
        readme(&canonical.display().to_string(), &auth.approval_id),
    )?;
    let committed = staged.commit()?;

    info!(
        files = files.len(),
        approval_id = %auth.approval_id,
        archive = %committed.archive.display(),
        "secrets snapshot written"
    );
    Ok(SnapshotReport {
        approval_id: auth.approval_id,
        directory: committed.directory,
        archive: committed.archive,
        files,
    })
}

/// The secrets file, its `<stem>_*.<ext>` siblings, then the extras.
/// Symlinks are skipped.
fn snapshot_sources(options: &SnapshotOptions) -> Result<Vec<PathBuf>> {
    let mut sources = Vec::new();
    let (Some(dir), Some(stem)) = (
        options.secrets_file.parent(),
        options.secrets_file.file_stem().map(|s| s.to_string_lossy().into_owned()),
    ) else {
        return Ok(sources);
    };
    let ext = options
        .secrets_file
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let sibling_prefix = format!("{stem}_");

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(sources),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_primary = name == format!("{stem}{ext}");
        let is_sibling = name.starts_with(&sibling_prefix) && name.ends_with(&ext);
        if is_primary || is_sibling {
            sources.push(entry.path());
        }
    }
    sources.sort();

    for rel in &options.extra {
        let path = options.root.join(rel);
        match fs::symlink_metadata(&path) {
            Ok(meta) if meta.file_type().is_file() => {
                if !sources.contains(&path) {
                    sources.push(path);
                }
            }
            Ok(_) => warn!(path = %path.display(), "snapshot extra is not a regular file, skipped"),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %path.display(), "snapshot extra missing, skipped")
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(sources)
}

fn readme(canonical: &str, approval_id: &str) -> String {
    format!(
        "# Secrets Snapshot (READ-ONLY)\n\
         \n\
         Snapshot of the secrets files taken under approval `{approval_id}`.\n\
         \n\
         The file used at runtime is `{canonical}`, not the `{LOCKED_SUFFIX}` copies here.\n\
         Do not edit the `{LOCKED_SUFFIX}` files.\n\
         \n\
         ## Restore\n\
         \n\
         1. Issue an approval: `envgate approve --message \"Restoring secrets snapshot\"`.\n\
         2. Unlock the current file: `envgate unlock <approval-id>`.\n\
         3. Copy the matching `{LOCKED_SUFFIX}` file over `{canonical}`.\n\
         4. Lock it again: `envgate lock`.\n\
         \n\
         These are exact copies of secret material. Protect this directory and\n\
         its archive physically.\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use envgate_core::types::Pin;
    use envgate_security::{ApprovalIssuer, CredentialStore, MemoryStore};

    fn layout(root: &Path) -> SnapshotOptions {
        fs::create_dir_all(root.join("ops")).unwrap();
        fs::write(root.join("ops/secrets.env"), "TOKEN=a\n").unwrap();
        fs::write(root.join("ops/secrets_backtest.env"), "TOKEN=b\n").unwrap();
        fs::write(root.join("ops/unrelated.env"), "X=1\n").unwrap();
        SnapshotOptions {
            root: root.to_path_buf(),
            secrets_file: root.join("ops/secrets.env"),
            extra: vec![],
            output_dir: root.join("build"),
            name: "secrets_snapshot-test".into(),
        }
    }

    #[test]
    fn refused_before_anything_is_copied() {
        let dir = tempfile::tempdir().unwrap();
        let options = layout(dir.path());
        let store = MemoryStore::new();

        let err = snapshot(&Gate::new(&store), &GateRequest::default(), &options).unwrap_err();
        assert!(matches!(err, GateError::MissingApproval));
        assert!(!options.output_dir.exists());
    }

    #[test]
    fn approved_snapshot_copies_locked_files() {
        let dir = tempfile::tempdir().unwrap();
        let options = layout(dir.path());
        let store = MemoryStore::new();
        CredentialStore::new(&store)
            .set_credential(&Pin::new("1234"), false)
            .unwrap();
        let id = ApprovalIssuer::new(&store)
            .issue(&Pin::new("1234"), "snapshot before rotation")
            .unwrap()
            .payload
            .id
            .to_string();

        let request = GateRequest::approval(&id).with_pin(Pin::new("1234"));
        let report = snapshot(&Gate::new(&store), &request, &options).unwrap();

        assert_eq!(report.approval_id, id);
        assert_eq!(
            report.files,
            vec!["secrets.env.locked", "secrets_backtest.env.locked"]
        );
        let locked = report.directory.join("secrets.env.locked");
        assert_eq!(fs::read_to_string(&locked).unwrap(), "TOKEN=a\n");
        assert!(fs::metadata(&locked).unwrap().permissions().readonly());
        assert!(!report.directory.join("unrelated.env.locked").exists());
        let readme = fs::read_to_string(report.directory.join(SNAPSHOT_README)).unwrap();
        assert!(readme.contains(&id));
        assert!(report.archive.is_file());
    }

    #[test]
    fn nothing_to_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        CredentialStore::new(&store)
            .set_credential(&Pin::new("1234"), false)
            .unwrap();
        let id = ApprovalIssuer::new(&store)
            .issue(&Pin::new("1234"), "empty")
            .unwrap()
            .payload
            .id
            .to_string();
        let options = SnapshotOptions {
            root: dir.path().to_path_buf(),
            secrets_file: dir.path().join("ops/secrets.env"),
            extra: vec![],
            output_dir: dir.path().join("build"),
            name: "s".into(),
        };

        let err = snapshot(&Gate::new(&store), &GateRequest::approval(id), &options).unwrap_err();
        assert!(matches!(err, GateError::Consumer(_)));
        assert!(!options.output_dir.exists());
    }
}
