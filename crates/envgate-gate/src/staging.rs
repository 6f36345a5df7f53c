// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Staged output directories.
//
// Consumers build their artifact inside `<output>/.<name>.partial` and only
// `commit` moves it to `<output>/<name>` next to `<output>/<name>.tar.gz`.
// A staging directory that is dropped without a commit is removed, so a
// failed run leaves no partial artifact behind.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::Utc;
use envgate_core::error::{GateError, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::{debug, warn};

/// `<prefix>-<UTC timestamp with milliseconds>`.
pub fn timestamped_name(prefix: &str) -> String {
    format!("{prefix}-{}", Utc::now().format("%Y%m%dT%H%M%S%.3fZ"))
}

/// Where a committed artifact ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    pub directory: PathBuf,
    pub archive: PathBuf,
}

#[derive(Debug)]
pub struct StagedDir {
    name: String,
    output_dir: PathBuf,
    partial: PathBuf,
    committed: bool,
}

impl StagedDir {
    /// Create the staging directory. Fails when `<output>/<name>` or its
    /// archive already exists.
    pub fn create(output_dir: &Path, name: &str) -> Result<Self> {
        let directory = output_dir.join(name);
        let archive = output_dir.join(format!("{name}.tar.gz"));
        for existing in [&directory, &archive] {
            if existing.exists() {
                return Err(GateError::Consumer(format!(
                    "{} already exists",
                    existing.display()
                )));
            }
        }

        fs::create_dir_all(output_dir)?;
        let partial = output_dir.join(format!(".{name}.partial"));
        if partial.exists() {
            warn!(path = %partial.display(), "removing leftover staging directory");
            fs::remove_dir_all(&partial)?;
        }
        fs::create_dir(&partial)?;
        debug!(path = %partial.display(), "staging directory created");

        Ok(Self {
            name: name.to_owned(),
            output_dir: output_dir.to_path_buf(),
            partial,
            committed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.partial
    }

    /// Copy `src` to `rel` inside the staging directory.
    pub fn copy_in(&self, src: &Path, rel: &Path) -> Result<PathBuf> {
        let dest = self.partial.join(rel);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, &dest)?;
        Ok(dest)
    }

    pub fn write(&self, rel: &Path, contents: impl AsRef<[u8]>) -> Result<PathBuf> {
        let dest = self.partial.join(rel);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&dest, contents)?;
        Ok(dest)
    }

    /// Archive the staged tree and move both into place.
    pub fn commit(mut self) -> Result<Committed> {
        let directory = self.output_dir.join(&self.name);
        let archive = self.output_dir.join(format!("{}.tar.gz", self.name));
        let partial_archive = self.output_dir.join(format!(".{}.tar.gz.partial", self.name));

        if let Err(e) = write_archive(&self.partial, &self.name, &partial_archive) {
            let _ = fs::remove_file(&partial_archive);
            return Err(e);
        }
        fs::rename(&partial_archive, &archive)?;
        if let Err(e) = fs::rename(&self.partial, &directory) {
            let _ = fs::remove_file(&archive);
            return Err(e.into());
        }
        self.committed = true;
        debug!(path = %directory.display(), "staging committed");
        Ok(Committed { directory, archive })
    }
}

impl Drop for StagedDir {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = fs::remove_dir_all(&self.partial) {
                warn!(path = %self.partial.display(), error = %e, "failed to remove staging directory");
            }
        }
    }
}

fn write_archive(src_dir: &Path, arc_name: &str, dest: &Path) -> Result<()> {
    let file = File::create(dest)?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);
    builder.append_dir_all(arc_name, src_dir)?;
    let file = builder.into_inner()?.finish()?;
    file.sync_all()?;
    Ok(())
}
