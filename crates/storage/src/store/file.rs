//! File-backed version store
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/
//!   <database>/
//!     VERSION        committed record (see `format::version_record`)
//!     VERSION.tmp    only present while a commit is in flight (or after a crash)
//!     VERSION.lock   cross-process writer lock
//!     ...            feature artifacts written by collaborators
//! ```
//!
//! Commits use write-fsync-rename-fsync(dir), so after a crash the VERSION
//! file holds either the old or the new record in full.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strata_core::{DatabaseName, VersionError, VersionResult, VersionTag};
use tracing::{debug, info, warn};

use super::{validate_step, CasOutcome, DatabaseVersionStore};
use crate::format::VersionRecord;
use crate::testing::{CrashInjector, CrashPoint};

/// Name of the committed record inside a database directory
pub const VERSION_FILE_NAME: &str = "VERSION";

const LOCK_FILE_NAME: &str = "VERSION.lock";

/// Version store keeping one VERSION record per database directory
pub struct FileVersionStore {
    root: PathBuf,
    /// Last committed record this instance read or wrote
    committed: DashMap<DatabaseName, VersionRecord>,
    /// Serializes commits within this process
    write_locks: DashMap<DatabaseName, Arc<Mutex<()>>>,
    crash: CrashInjector,
}

impl FileVersionStore {
    /// Open (or create) a store rooted at `root`
    pub fn open(root: impl AsRef<Path>) -> VersionResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(FileVersionStore {
            root,
            committed: DashMap::new(),
            write_locks: DashMap::new(),
            crash: CrashInjector::new(),
        })
    }

    /// Attach a crash injector (tests only)
    pub fn with_crash_injector(mut self, injector: CrashInjector) -> Self {
        self.crash = injector;
        self
    }

    /// Store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a database's metadata and artifacts
    pub fn database_dir(&self, db: &DatabaseName) -> PathBuf {
        self.root.join(db.as_str())
    }

    fn version_path(&self, db: &DatabaseName) -> PathBuf {
        self.database_dir(db).join(VERSION_FILE_NAME)
    }

    /// Delete a database together with its version entry
    pub fn drop_database(&self, db: &DatabaseName) -> VersionResult<()> {
        let lock = self.write_lock(db);
        let _guard = lock.lock();

        let dir = self.database_dir(db);
        if !dir.exists() {
            return Err(VersionError::DatabaseNotFound(db.to_string()));
        }
        fs::remove_dir_all(&dir)?;
        self.committed.remove(db);
        info!(target: "strata::compat", database = %db, "Database dropped");
        Ok(())
    }

    fn write_lock(&self, db: &DatabaseName) -> Arc<Mutex<()>> {
        self.write_locks
            .entry(db.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Take the cross-process writer lock, or `None` if another process holds it
    fn try_lock_file(&self, db: &DatabaseName) -> VersionResult<Option<File>> {
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(self.database_dir(db).join(LOCK_FILE_NAME))?;
        match fs2::FileExt::try_lock_exclusive(&lock_file) {
            Ok(()) => Ok(Some(lock_file)),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn load(&self, db: &DatabaseName) -> VersionResult<VersionRecord> {
        let bytes = match fs::read(self.version_path(db)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(VersionError::DatabaseNotFound(db.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(VersionRecord::from_bytes(&bytes)?)
    }

    /// Reload from disk while holding both writer locks
    ///
    /// A leftover temp record can only come from a commit that crashed before
    /// its rename, so it is discarded.
    fn load_locked(&self, db: &DatabaseName) -> VersionResult<VersionRecord> {
        let temp_path = self.version_path(db).with_extension("tmp");
        if temp_path.exists() {
            warn!(target: "strata::compat", database = %db, "Discarding uncommitted VERSION.tmp");
            fs::remove_file(&temp_path)?;
        }
        let record = self.load(db)?;
        self.committed.insert(db.clone(), record);
        Ok(record)
    }

    /// Read the committed record from disk
    ///
    /// Other instances and processes commit to the same root, so the file is
    /// authoritative on every read; the cache only tracks what we last saw.
    fn refresh(&self, db: &DatabaseName) -> VersionResult<VersionRecord> {
        let record = match self.load(db) {
            Ok(record) => record,
            Err(e) => {
                self.committed.remove(db);
                return Err(e);
            }
        };
        if let Some(previous) = self.committed.insert(db.clone(), record) {
            if previous.generation != record.generation {
                debug!(
                    target: "strata::compat",
                    database = %db,
                    from = %previous.tag,
                    to = %record.tag,
                    "VERSION committed by another writer"
                );
            }
        }
        Ok(record)
    }

    /// Persist a record atomically (write-fsync-rename)
    fn persist(&self, db: &DatabaseName, record: &VersionRecord) -> VersionResult<()> {
        let path = self.version_path(db);
        let temp_path = path.with_extension("tmp");
        let bytes = record.to_bytes()?;

        self.crash.check(CrashPoint::BeforeTempWrite)?;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);

        self.crash.check(CrashPoint::BeforeRename)?;

        fs::rename(&temp_path, &path)?;

        self.crash.check(CrashPoint::AfterRename)?;

        if let Some(parent) = path.parent() {
            File::open(parent)?.sync_all()?;
        }
        Ok(())
    }
}

impl DatabaseVersionStore for FileVersionStore {
    fn create(&self, db: &DatabaseName, initial: VersionTag) -> VersionResult<VersionTag> {
        let lock = self.write_lock(db);
        let _guard = lock.lock();

        fs::create_dir_all(self.database_dir(db))?;
        let _file_lock = self.try_lock_file(db)?.ok_or_else(|| {
            debug!(target: "strata::compat", database = %db, "VERSION lock held during create");
            VersionError::ContentionExhausted {
                database: db.to_string(),
                attempts: 1,
            }
        })?;

        if self.version_path(db).exists() {
            return Err(VersionError::AlreadyExists(db.to_string()));
        }

        let record = VersionRecord::initial(initial);
        if let Err(e) = self.persist(db, &record) {
            self.committed.remove(db);
            return Err(e);
        }
        self.committed.insert(db.clone(), record);

        debug!(target: "strata::compat", database = %db, tag = %initial, "Version entry created");
        Ok(initial)
    }

    fn read(&self, db: &DatabaseName) -> VersionResult<VersionTag> {
        Ok(self.refresh(db)?.tag)
    }

    fn compare_and_upgrade(
        &self,
        db: &DatabaseName,
        expected: &VersionTag,
        target: &VersionTag,
    ) -> VersionResult<CasOutcome> {
        let lock = self.write_lock(db);
        let _guard = lock.lock();

        if !self.database_dir(db).exists() {
            return Err(VersionError::DatabaseNotFound(db.to_string()));
        }

        let _file_lock = match self.try_lock_file(db)? {
            Some(file) => file,
            None => {
                // Another process is committing; report what is on disk now
                let current = self.load(db)?.tag;
                debug!(target: "strata::compat", database = %db, "VERSION lock held by another process");
                return Ok(CasOutcome::Stale { current });
            }
        };

        // Disk is authoritative: another process may have committed since our last read
        let committed = self.load_locked(db)?;
        if committed.tag != *expected {
            return Ok(CasOutcome::Stale {
                current: committed.tag,
            });
        }

        validate_step(expected, target)?;

        if target == expected {
            return Ok(CasOutcome::Committed {
                tag: committed.tag,
                generation: committed.generation,
            });
        }

        let next = committed.successor(*target);
        if let Err(e) = self.persist(db, &next) {
            // The rename may have landed; the next read goes back to disk
            self.committed.remove(db);
            return Err(e);
        }
        self.committed.insert(db.clone(), next);

        info!(
            target: "strata::compat",
            database = %db,
            from = %committed.tag,
            to = %next.tag,
            generation = next.generation,
            "VERSION record committed"
        );

        Ok(CasOutcome::Committed {
            tag: next.tag,
            generation: next.generation,
        })
    }

    fn generation(&self, db: &DatabaseName) -> VersionResult<u64> {
        Ok(self.refresh(db)?.generation)
    }

    fn exists(&self, db: &DatabaseName) -> VersionResult<bool> {
        Ok(self.version_path(db).exists())
    }

    fn list(&self) -> VersionResult<Vec<DatabaseName>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let Ok(db) = DatabaseName::new(name) else {
                continue;
            };
            if self.version_path(&db).exists() {
                names.push(db);
            }
        }
        names.sort();
        Ok(names)
    }
}
