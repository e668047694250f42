use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Path has no parent directory: {0}")]
    NoParent(PathBuf),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Overwrite `path` with `content` as a single atomic step.
///
/// The new content goes to a tempfile in the same directory, is fsynced and then
/// renamed over the target, so readers see either the old file or the new one.
/// The original permissions are carried over and the mtime is bumped so file
/// watchers and incremental builds notice the change.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), WriteError> {
    let parent = path
        .parent()
        .ok_or_else(|| WriteError::NoParent(path.to_path_buf()))?;

    let permissions = fs::metadata(path).ok().map(|meta| meta.permissions());

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;

    if let Some(permissions) = permissions {
        temp.as_file().set_permissions(permissions)?;
    }

    temp.persist(path).map_err(|e| e.error)?;

    let now = filetime::FileTime::now();
    filetime::set_file_mtime(path, now)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_write_replaces_content() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("Page.tsx");
        fs::write(&file_path, b"original content").unwrap();

        atomic_write(&file_path, b"modified content").unwrap();

        let new_content = fs::read_to_string(&file_path).unwrap();
        assert_eq!(new_content, "modified content");
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("Page.tsx");
        fs::write(&file_path, b"a").unwrap();

        atomic_write(&file_path, b"b").unwrap();

        let entries: Vec<_> = fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    #[cfg(unix)]
    fn test_atomic_write_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("script.sh");
        fs::write(&file_path, b"echo a").unwrap();
        fs::set_permissions(&file_path, fs::Permissions::from_mode(0o755)).unwrap();

        atomic_write(&file_path, b"echo b").unwrap();

        let mode = fs::metadata(&file_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
