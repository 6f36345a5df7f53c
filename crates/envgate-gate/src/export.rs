// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Release export. Copies the configured include list into a staged bundle,
// describes it in a SHA-256 manifest and a build report, and archives it as
// `<bundle>.tar.gz`. The secrets file is added only under a granted approval.
//
// With `include_secrets` set, the gate runs before any file is read and
// before the output directory exists. Include entries are resolved to
// canonical paths and symlinks are never followed, so the secrets file cannot
// reach an unapproved bundle through `..` segments or a linked directory.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use envgate_core::config::GatePaths;
use envgate_core::error::Result;
use envgate_security::{ApprovalStore, hash_file};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::gate::{Gate, GateRequest};
use crate::staging::{StagedDir, timestamped_name};

pub const MANIFEST_FILE: &str = "release_manifest.json";
pub const REPORT_FILE: &str = "build_report.json";

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub root: PathBuf,
    /// Files or directories, relative to `root`.
    pub include: Vec<PathBuf>,
    pub secrets_file: PathBuf,
    pub output_dir: PathBuf,
    pub include_secrets: bool,
    /// Name of the bundle directory and archive stem inside `output_dir`.
    pub bundle_name: String,
}

impl ExportOptions {
    pub fn from_paths(paths: &GatePaths, output_dir: impl Into<PathBuf>, include_secrets: bool) -> Self {
        Self {
            root: paths.root.clone(),
            include: paths.export_include.clone(),
            secrets_file: paths.secrets_file.clone(),
            output_dir: output_dir.into(),
            include_secrets,
            bundle_name: timestamped_name("release"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    pub sha256: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateName {
    pub name: String,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportReport {
    pub generated_at: String,
    pub included: Vec<String>,
    pub duplicates: Vec<DuplicateName>,
    pub secrets_included: bool,
    pub approval_id: Option<String>,
    pub bundle: PathBuf,
    pub archive: PathBuf,
}

/// Archive and backup leftovers never ship.
fn is_excluded(name: &str) -> bool {
    name.ends_with(".bak")
        || name.ends_with(".zip")
        || name.ends_with(".tar.gz")
        || name.ends_with(".tar.bz2")
        || name.contains("old")
        || name.contains("backup")
}

/// Identity of the secrets file: canonical path plus, on unix, device and
/// inode so hard links match too.
struct SecretsIdentity {
    canonical: PathBuf,
    #[cfg(unix)]
    inode: (u64, u64),
}

impl SecretsIdentity {
    fn resolve(path: &Path) -> Result<Option<Self>> {
        let canonical = match fs::canonicalize(path) {
            Ok(canonical) => canonical,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        #[cfg(unix)]
        let inode = {
            use std::os::unix::fs::MetadataExt;
            let meta = fs::metadata(&canonical)?;
            (meta.dev(), meta.ino())
        };
        Ok(Some(Self {
            canonical,
            #[cfg(unix)]
            inode,
        }))
    }

    fn matches(&self, path: &Path) -> Result<bool> {
        if path == self.canonical {
            return Ok(true);
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            let meta = fs::metadata(path)?;
            if (meta.dev(), meta.ino()) == self.inode {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[instrument(skip_all, fields(include_secrets = options.include_secrets))]
pub fn export<S: ApprovalStore + ?Sized>(
    gate: &Gate<'_, S>,
    request: &GateRequest,
    options: &ExportOptions,
) -> Result<ExportReport> {
    let authorization = if options.include_secrets {
        Some(gate.authorize("export", request.preferred_mode(), request)?)
    } else {
        None
    };

    let root = fs::canonicalize(&options.root)?;
    let secrets = SecretsIdentity::resolve(&options.secrets_file)?;
    // Earlier bundles may hold approved copies of the secrets file.
    let output_dir = fs::canonicalize(&options.output_dir).ok();

    let mut found = Vec::new();
    for rel in &options.include {
        collect_include(&root, rel, output_dir.as_deref(), &mut found)?;
    }
    let mut files = BTreeSet::new();
    for path in found {
        let excluded = path
            .file_name()
            .is_none_or(|name| is_excluded(&name.to_string_lossy()));
        let is_secrets = match &secrets {
            Some(secrets) => secrets.matches(&path)?,
            None => false,
        };
        if !excluded && !is_secrets {
            files.insert(path);
        }
    }

    let mut secrets_included = false;
    if authorization.is_some() {
        match &secrets {
            Some(secrets) => {
                files.insert(secrets.canonical.clone());
                secrets_included = true;
            }
            None => {
                warn!(path = %options.secrets_file.display(), "secrets file missing, not exported");
            }
        }
    }

    let staged = StagedDir::create(&options.output_dir, &options.bundle_name)?;
    let mut manifest = Vec::with_capacity(files.len());
    let mut by_name: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for path in &files {
        let rel = bundle_path(&root, path);
        let staged_copy = staged.copy_in(path, &rel)?;
        let (sha256, size) = hash_file(&staged_copy)?;
        let display = display_path(&rel);
        if let Some(name) = rel.file_name() {
            by_name
                .entry(name.to_string_lossy().into_owned())
                .or_default()
                .push(display.clone());
        }
        manifest.push(ManifestEntry {
            path: display,
            sha256,
            size,
        });
    }

    let mut report = ExportReport {
        generated_at: Utc::now().to_rfc3339(),
        included: manifest.iter().map(|e| e.path.clone()).collect(),
        duplicates: by_name
            .into_iter()
            .filter(|(_, paths)| paths.len() > 1)
            .map(|(name, paths)| DuplicateName { name, paths })
            .collect(),
        secrets_included,
        approval_id: authorization.map(|a| a.approval_id),
        bundle: options.output_dir.join(&options.bundle_name),
        archive: options
            .output_dir
            .join(format!("{}.tar.gz", options.bundle_name)),
    };

    let manifest_json = serde_json::to_string_pretty(&manifest)?;
    let report_json = serde_json::to_string_pretty(&report)?;
    staged.write(Path::new(MANIFEST_FILE), &manifest_json)?;
    staged.write(Path::new(REPORT_FILE), &report_json)?;
    let committed = staged.commit()?;
    report.bundle = committed.directory;
    report.archive = committed.archive;

    // Copies beside the archive for quick inspection.
    fs::write(options.output_dir.join(MANIFEST_FILE), manifest_json)?;
    fs::write(options.output_dir.join(REPORT_FILE), report_json)?;

    info!(
        files = manifest.len(),
        secrets_included,
        archive = %report.archive.display(),
        "export written"
    );
    Ok(report)
}

/// Resolve one include entry under `root`. Missing entries, symlinks,
/// anything resolving outside `root` and the output directory are skipped.
fn collect_include(
    root: &Path,
    rel: &Path,
    skip: Option<&Path>,
    out: &mut Vec<PathBuf>,
) -> Result<()> {
    let path = root.join(rel);
    let meta = match fs::symlink_metadata(&path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "include entry missing, skipped");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    if meta.file_type().is_symlink() {
        warn!(path = %path.display(), "symlinked include entry skipped");
        return Ok(());
    }
    let canonical = fs::canonicalize(&path)?;
    if !canonical.starts_with(root) {
        warn!(path = %path.display(), "include entry outside the root skipped");
        return Ok(());
    }
    if meta.is_dir() {
        collect_dir(&canonical, skip, out)
    } else {
        if meta.is_file() {
            out.push(canonical);
        }
        Ok(())
    }
}

fn collect_dir(dir: &Path, skip: Option<&Path>, out: &mut Vec<PathBuf>) -> Result<()> {
    if skip == Some(dir) {
        debug!(path = %dir.display(), "output directory skipped");
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_dir(&entry.path(), skip, out)?;
        } else if file_type.is_file() {
            out.push(entry.path());
        }
    }
    Ok(())
}

/// Location inside the bundle: relative to the root, or the bare file name
/// for a secrets file configured outside it.
fn bundle_path(root: &Path, path: &Path) -> PathBuf {
    match path.strip_prefix(root) {
        Ok(rel) => rel.to_path_buf(),
        Err(_) => path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| path.to_path_buf()),
    }
}

fn display_path(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
