//! JSON directory storage backend
//!
//! Each project is stored as `<project_id>.json`. Writes go to a temporary
//! file in the same directory which is then renamed over the target, so a
//! reader never observes a partially written project. Writers serialize on
//! an advisory lock file.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error};
use uuid::Uuid;

use crate::models::Project;

use super::traits::{BackendType, ProjectBackend};

const LOCK_FILE_NAME: &str = ".reqforge.lock";
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Stores one JSON document per project in a directory
pub struct JsonDirBackend {
    dir: PathBuf,
    lock_file_path: PathBuf,
}

impl JsonDirBackend {
    /// Creates the backend, creating `dir` if needed
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create storage directory: {:?}", dir))?;
        let lock_file_path = dir.join(LOCK_FILE_NAME);
        Ok(Self {
            dir,
            lock_file_path,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn project_path(&self, project_id: &Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", project_id))
    }

    /// Acquire an exclusive lock for writing
    /// The returned handle must be held for the duration of the write
    fn acquire_write_lock(&self) -> Result<File> {
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.lock_file_path)
            .with_context(|| format!("Failed to create lock file: {:?}", self.lock_file_path))?;

        wait_for_lock(&lock_file, &self.dir, <File as FileExt>::try_lock_exclusive)?;
        Ok(lock_file)
    }

    /// Acquire a shared lock for reading, if a writer ever created the lock file
    fn acquire_read_lock(&self) -> Result<Option<File>> {
        if !self.lock_file_path.exists() {
            return Ok(None);
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .open(&self.lock_file_path)
            .with_context(|| format!("Failed to open lock file: {:?}", self.lock_file_path))?;

        wait_for_lock(&lock_file, &self.dir, <File as FileExt>::try_lock_shared)?;
        Ok(Some(lock_file))
    }

    fn read_project(path: &Path) -> Result<Project> {
        let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse project file {:?}", path))
    }
}

/// Retry `try_lock` until it succeeds or the lock timeout elapses
fn wait_for_lock(
    lock_file: &File,
    dir: &Path,
    try_lock: fn(&File) -> std::io::Result<()>,
) -> Result<()> {
    let start = Instant::now();
    loop {
        match try_lock(lock_file) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if start.elapsed() > LOCK_TIMEOUT {
                    anyhow::bail!(
                        "Timeout waiting for storage lock - another process may be writing: {:?}",
                        dir
                    );
                }
                std::thread::sleep(LOCK_RETRY_INTERVAL);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to acquire lock in {:?}", dir));
            }
        }
    }
}

impl ProjectBackend for JsonDirBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Json
    }

    fn location(&self) -> String {
        self.dir.display().to_string()
    }

    fn save(&self, project: &Project) -> Result<()> {
        let _lock = self.acquire_write_lock()?;

        let target = self.project_path(&project.id());
        let tmp = self.dir.join(format!(".{}.json.tmp", project.id()));
        {
            let file = File::create(&tmp)
                .with_context(|| format!("Failed to create temporary file {:?}", tmp))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, project)
                .context("Failed to serialize project")?;
            writer.flush()?;
            writer
                .get_ref()
                .sync_all()
                .with_context(|| format!("Failed to sync {:?}", tmp))?;
        }
        fs::rename(&tmp, &target)
            .with_context(|| format!("Failed to move {:?} into place", tmp))?;

        debug!(project_id = %project.id(), path = ?target, "Saved project");
        // Lock released when _lock is dropped
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<Project>> {
        let _lock = self.acquire_read_lock()?;

        let mut projects = Vec::new();
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read storage directory {:?}", self.dir))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_project(&path) {
                Ok(project) => projects.push(project),
                Err(e) => error!(path = ?path, "Skipping unreadable project file: {:#}", e),
            }
        }
        debug!(count = projects.len(), dir = ?self.dir, "Loaded projects");
        Ok(projects)
    }

    fn delete(&self, project_id: &Uuid) -> Result<()> {
        let _lock = self.acquire_write_lock()?;
        let path = self.project_path(project_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {:?}", path)),
        }
    }
}
