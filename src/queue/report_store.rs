use crate::errors::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Where submitted report blobs wait until their task runs.
pub trait ReportStore: Send + Sync {
    fn store(&self, task_uuid: &str, report: &[u8]) -> Result<()>;

    fn load(&self, task_uuid: &str) -> Result<Option<Vec<u8>>>;

    /// Deleting an unknown report is not an error.
    fn delete(&self, task_uuid: &str) -> Result<()>;
}

/// One file per task in a directory.
#[derive(Debug, Clone)]
pub struct FsReportStore {
    dir: PathBuf,
}

impl FsReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, task_uuid: &str) -> PathBuf {
        self.dir.join(format!("{}.json", task_uuid))
    }
}

impl ReportStore for FsReportStore {
    fn store(&self, task_uuid: &str, report: &[u8]) -> Result<()> {
        fs::write(self.path(task_uuid), report)?;
        Ok(())
    }

    fn load(&self, task_uuid: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path(task_uuid)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, task_uuid: &str) -> Result<()> {
        match fs::remove_file(self.path(task_uuid)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryReportStore {
    reports: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, task_uuid: &str) -> bool {
        self.reports.lock().contains_key(task_uuid)
    }

    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }
}

impl ReportStore for MemoryReportStore {
    fn store(&self, task_uuid: &str, report: &[u8]) -> Result<()> {
        self.reports
            .lock()
            .insert(task_uuid.to_string(), report.to_vec());
        Ok(())
    }

    fn load(&self, task_uuid: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.reports.lock().get(task_uuid).cloned())
    }

    fn delete(&self, task_uuid: &str) -> Result<()> {
        self.reports.lock().remove(task_uuid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fs_store_lifecycle() {
        let dir = TempDir::new().unwrap();
        let store = FsReportStore::new(dir.path().join("reports")).unwrap();
        store.store("t1", b"{}").unwrap();
        assert_eq!(store.load("t1").unwrap(), Some(b"{}".to_vec()));
        store.delete("t1").unwrap();
        assert_eq!(store.load("t1").unwrap(), None);
        store.delete("t1").unwrap();
    }

    #[test]
    fn test_memory_store_lifecycle() {
        let store = MemoryReportStore::new();
        store.store("t1", b"report").unwrap();
        assert!(store.contains("t1"));
        store.delete("t1").unwrap();
        assert!(store.is_empty());
    }
}
