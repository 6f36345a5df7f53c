// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Approval store — the only place that touches persistent state.
//
// Layout of the filesystem implementation:
//   <secure_dir>/pin.hash              salt || derived key (binary)
//   <secure_dir>/approvals/<id>.approval  pretty JSON {payload, sig}
//   <secure_dir>/.write.lock           advisory flock for issuance
//   <ledger_file>                      append-only, one line per approval
//
// Business logic (credential, issuer, verifier, ledger) only sees the
// `ApprovalStore` trait so tests can swap in `MemoryStore`.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use envgate_core::config::{GateConfig, GatePaths};
use envgate_core::error::{GateError, Result};
use envgate_core::types::ApprovalId;
use tracing::{debug, instrument};

use crate::flock;

/// File extension of persisted approval records.
pub const RECORD_EXTENSION: &str = "approval";

/// A persisted approval record as found on disk, before any parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    /// File name, e.g. `<id>.approval`.
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Held for the duration of a record-write + ledger-append. Dropping it
/// releases the lock.
#[derive(Debug)]
pub struct WriteLock {
    _file: Option<File>,
}

impl WriteLock {
    /// A lock that guards nothing; for stores that serialise internally.
    pub fn noop() -> Self {
        Self { _file: None }
    }
}

/// Persistent state behind the gate.
pub trait ApprovalStore {
    /// Raw credential bytes, or `None` when no PIN has been set.
    fn load_credential(&self) -> Result<Option<Vec<u8>>>;

    /// Replace the credential atomically.
    fn save_credential(&self, bytes: &[u8]) -> Result<()>;

    /// Raw record bytes for `id`, or `None` when no record exists.
    fn load_record(&self, id: &ApprovalId) -> Result<Option<Vec<u8>>>;

    /// Persist a new record. Fails with `IdCollision` when a record with the
    /// same id already exists; never overwrites.
    fn create_record(&self, id: &ApprovalId, bytes: &[u8]) -> Result<()>;

    /// Every stored record, sorted by name.
    fn list_records(&self) -> Result<Vec<StoredRecord>>;

    /// Full ledger text, or `None` when the ledger does not exist yet.
    fn read_ledger(&self) -> Result<Option<String>>;

    /// Replace the ledger text. Callers hold the write lock.
    fn write_ledger(&self, content: &str) -> Result<()>;

    /// Exclusive lock serialising issuance across processes.
    fn write_lock(&self) -> Result<WriteLock>;
}

// ---------------------------------------------------------------------------
// Filesystem store
// ---------------------------------------------------------------------------

/// Filesystem-backed store.
#[derive(Debug, Clone)]
pub struct FsStore {
    secure_dir: PathBuf,
    credential_file: PathBuf,
    approvals_dir: PathBuf,
    lock_file: PathBuf,
    ledger_file: PathBuf,
}

impl FsStore {
    pub fn new(paths: &GatePaths) -> Self {
        Self {
            secure_dir: paths.secure_dir.clone(),
            credential_file: paths.credential_file.clone(),
            approvals_dir: paths.approvals_dir.clone(),
            lock_file: paths.lock_file.clone(),
            ledger_file: paths.ledger_file.clone(),
        }
    }

    /// Store rooted at `root` with the default layout.
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self::new(&GateConfig::default().resolve(root.as_ref()))
    }

    pub fn ledger_path(&self) -> &Path {
        &self.ledger_file
    }

    pub fn record_path(&self, id: &ApprovalId) -> PathBuf {
        self.approvals_dir.join(format!("{id}.{RECORD_EXTENSION}"))
    }

    fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.secure_dir)?;
        fs::create_dir_all(&self.approvals_dir)?;
        Ok(())
    }
}

impl ApprovalStore for FsStore {
    fn load_credential(&self) -> Result<Option<Vec<u8>>> {
        read_optional(&self.credential_file)
    }

    #[instrument(skip_all, fields(path = %self.credential_file.display()))]
    fn save_credential(&self, bytes: &[u8]) -> Result<()> {
        self.ensure_dirs()?;
        atomic_write(&self.credential_file, bytes, true)?;
        debug!("credential written");
        Ok(())
    }

    fn load_record(&self, id: &ApprovalId) -> Result<Option<Vec<u8>>> {
        read_optional(&self.record_path(id))
    }

    #[instrument(skip(self, bytes), fields(%id))]
    fn create_record(&self, id: &ApprovalId, bytes: &[u8]) -> Result<()> {
        self.ensure_dirs()?;
        let path = self.record_path(id);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(GateError::IdCollision(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(bytes)?;
        file.sync_all()?;
        debug!("approval record written");
        Ok(())
    }

    fn list_records(&self) -> Result<Vec<StoredRecord>> {
        let dir = match fs::read_dir(&self.approvals_dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for entry in dir {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            records.push(StoredRecord {
                name: name.to_owned(),
                bytes: fs::read(&path)?,
            });
        }
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    fn read_ledger(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.ledger_file) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip_all, fields(path = %self.ledger_file.display()))]
    fn write_ledger(&self, content: &str) -> Result<()> {
        if let Some(parent) = self.ledger_file.parent() {
            fs::create_dir_all(parent)?;
        }
        atomic_write(&self.ledger_file, content.as_bytes(), false)?;
        debug!(len = content.len(), "ledger written");
        Ok(())
    }

    fn write_lock(&self) -> Result<WriteLock> {
        self.ensure_dirs()?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_file)?;
        flock::acquire_exclusive_blocking(&file)?;
        Ok(WriteLock { _file: Some(file) })
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write via a sibling temp file and rename, so readers see either the old
/// or the new content. `restricted` makes the file owner-only on unix;
/// otherwise an existing file keeps its permissions. A symlinked target is
/// written through, leaving the link in place.
fn atomic_write(path: &Path, data: &[u8], restricted: bool) -> Result<()> {
    let path = resolve_link(path)?;
    let existing = match fs::metadata(&path) {
        Ok(meta) => Some(meta.permissions()),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };

    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    // A leftover from an interrupted write may carry looser permissions.
    match fs::remove_file(&tmp) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        if restricted {
            options.mode(0o600);
        }
    }

    let mut file = options.open(&tmp)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);
    if let (false, Some(perms)) = (restricted, existing) {
        fs::set_permissions(&tmp, perms)?;
    }
    fs::rename(&tmp, &path)?;
    Ok(())
}

const MAX_LINK_DEPTH: usize = 8;

/// Follow `path` while it is a symlink. Relative targets resolve against the
/// link's directory; a dangling link yields its target.
fn resolve_link(path: &Path) -> Result<PathBuf> {
    let mut current = path.to_path_buf();
    for _ in 0..MAX_LINK_DEPTH {
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                let target = fs::read_link(&current)?;
                current = match current.parent() {
                    Some(parent) => parent.join(target),
                    None => target,
                };
            }
            Ok(_) => return Ok(current),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(current),
            Err(e) => return Err(e.into()),
        }
    }
    Err(GateError::Io(std::io::Error::other(format!(
        "too many levels of symbolic links: {}",
        path.display()
    ))))
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryState {
    credential: Option<Vec<u8>>,
    records: BTreeMap<String, Vec<u8>>,
    ledger: Option<String>,
}

/// In-memory store for tests and benchmarks.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a record in place, bypassing create-new semantics.
    pub fn replace_record(&self, id: &ApprovalId, bytes: &[u8]) {
        self.state()
            .records
            .insert(record_name(id), bytes.to_vec());
    }

    /// Drop a record, leaving the ledger untouched.
    pub fn remove_record(&self, id: &ApprovalId) {
        self.state().records.remove(&record_name(id));
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().expect("memory store lock poisoned")
    }
}

fn record_name(id: &ApprovalId) -> String {
    format!("{id}.{RECORD_EXTENSION}")
}

impl ApprovalStore for MemoryStore {
    fn load_credential(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.state().credential.clone())
    }

    fn save_credential(&self, bytes: &[u8]) -> Result<()> {
        self.state().credential = Some(bytes.to_vec());
        Ok(())
    }

    fn load_record(&self, id: &ApprovalId) -> Result<Option<Vec<u8>>> {
        Ok(self.state().records.get(&record_name(id)).cloned())
    }

    fn create_record(&self, id: &ApprovalId, bytes: &[u8]) -> Result<()> {
        let mut state = self.state();
        let name = record_name(id);
        if state.records.contains_key(&name) {
            return Err(GateError::IdCollision(id.to_string()));
        }
        state.records.insert(name, bytes.to_vec());
        Ok(())
    }

    fn list_records(&self) -> Result<Vec<StoredRecord>> {
        Ok(self
            .state()
            .records
            .iter()
            .map(|(name, bytes)| StoredRecord {
                name: name.clone(),
                bytes: bytes.clone(),
            })
            .collect())
    }

    fn read_ledger(&self) -> Result<Option<String>> {
        Ok(self.state().ledger.clone())
    }

    fn write_ledger(&self, content: &str) -> Result<()> {
        self.state().ledger = Some(content.to_owned());
        Ok(())
    }

    fn write_lock(&self) -> Result<WriteLock> {
        Ok(WriteLock::noop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_missing_state_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::with_root(dir.path());

        assert!(store.load_credential().unwrap().is_none());
        assert!(store.load_record(&ApprovalId::new()).unwrap().is_none());
        assert!(store.read_ledger().unwrap().is_none());
        assert!(store.list_records().unwrap().is_empty());
    }

    #[test]
    fn fs_create_record_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::with_root(dir.path());
        let id = ApprovalId::new();

        store.create_record(&id, b"first").unwrap();
        let err = store.create_record(&id, b"second").unwrap_err();
        assert!(matches!(err, GateError::IdCollision(_)));
        assert_eq!(store.load_record(&id).unwrap().unwrap(), b"first");
    }

    #[test]
    fn fs_list_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::with_root(dir.path());
        let a = ApprovalId::new();
        store.create_record(&a, b"{}").unwrap();
        fs::write(dir.path().join(".secure/approvals/notes.txt"), "x").unwrap();

        let records = store.list_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, format!("{a}.approval"));
    }

    #[test]
    fn fs_ledger_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::with_root(dir.path());

        store.write_ledger("one\n").unwrap();
        store.write_ledger("one\ntwo\n").unwrap();
        assert_eq!(store.read_ledger().unwrap().unwrap(), "one\ntwo\n");
        assert!(!dir.path().join("HISTORICAL_CHANGE_LOG.md.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn fs_credential_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::with_root(dir.path());
        store.save_credential(&[7u8; 48]).unwrap();

        let mode = fs::metadata(dir.path().join(".secure/pin.hash"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn memory_create_record_never_overwrites() {
        let store = MemoryStore::new();
        let id = ApprovalId::new();
        store.create_record(&id, b"a").unwrap();
        assert!(matches!(
            store.create_record(&id, b"b"),
            Err(GateError::IdCollision(_))
        ));
        assert_eq!(store.load_record(&id).unwrap().unwrap(), b"a");
    }

    #[cfg(unix)]
    #[test]
    fn ledger_rewrite_keeps_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::with_root(dir.path());
        store.write_ledger("# Ledger\n").unwrap();
        fs::set_permissions(store.ledger_path(), fs::Permissions::from_mode(0o640)).unwrap();

        store.write_ledger("# Ledger\n- entry\n").unwrap();
        let mode = fs::metadata(store.ledger_path()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_ledger_is_written_through() {
        let dir = tempfile::tempdir().unwrap();
        let shared = dir.path().join("shared");
        fs::create_dir_all(&shared).unwrap();
        let target = shared.join("CHANGELOG.md");
        fs::write(&target, "# Shared\n").unwrap();

        let store = FsStore::with_root(dir.path());
        std::os::unix::fs::symlink("shared/CHANGELOG.md", store.ledger_path()).unwrap();
        store.write_ledger("# Shared\n- entry\n").unwrap();

        let meta = fs::symlink_metadata(store.ledger_path()).unwrap();
        assert!(meta.file_type().is_symlink());
        assert_eq!(fs::read_to_string(&target).unwrap(), "# Shared\n- entry\n");
    }
}
