use crate::errors::{CeError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const REPORT_FILE_NAME: &str = "report.json";

/// Working directory of one task, holding its report.
///
/// The directory is removed when the container is dropped, whatever the
/// outcome of the task, unwinding included.
#[derive(Debug)]
pub struct TaskContainer {
    dir: PathBuf,
}

impl TaskContainer {
    /// Create `<work_root>/<task uuid>` and write the report into it.
    pub fn create(work_root: &Path, task_uuid: &str, report: &[u8]) -> Result<Self> {
        let dir = work_root.join(task_uuid);
        if dir.exists() {
            return Err(CeError::state(format!(
                "Working directory of task {} already exists",
                task_uuid
            )));
        }
        fs::create_dir_all(&dir)?;
        let container = Self { dir };
        fs::write(container.report_path(), report)?;
        debug!(dir = %container.dir.display(), "Task container created");
        Ok(container)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn report_path(&self) -> PathBuf {
        self.dir.join(REPORT_FILE_NAME)
    }

    pub fn report_bytes(&self) -> Result<Vec<u8>> {
        Ok(fs::read(self.report_path())?)
    }
}

impl Drop for TaskContainer {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            warn!(dir = %self.dir.display(), error = %e, "Failed to delete task directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic;
    use tempfile::TempDir;

    #[test]
    fn test_directory_removed_on_drop() {
        let root = TempDir::new().unwrap();
        let container = TaskContainer::create(root.path(), "t1", b"{}").unwrap();
        let dir = container.dir().to_path_buf();
        assert_eq!(container.report_bytes().unwrap(), b"{}".to_vec());
        drop(container);
        assert!(!dir.exists());
    }

    #[test]
    fn test_directory_removed_on_panic() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("t2");
        let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            let _container = TaskContainer::create(root.path(), "t2", b"{}").unwrap();
            panic!("processing blew up");
        }));
        assert!(result.is_err());
        assert!(!dir.exists());
    }

    #[test]
    fn test_existing_directory_is_rejected() {
        let root = TempDir::new().unwrap();
        let _first = TaskContainer::create(root.path(), "t3", b"{}").unwrap();
        assert!(TaskContainer::create(root.path(), "t3", b"{}").is_err());
    }
}
