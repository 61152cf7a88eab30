//! Working-tree file I/O and index maintenance.

use std::path::Path;

use git2::Repository;

use crate::error::SyncError;

/// Write a document blob into the working tree, creating parent
/// directories as needed.
pub fn write_working_file(
    working_dir: &Path,
    name: &str,
    content: &[u8],
) -> Result<(), SyncError> {
    let path = working_dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| SyncError::CannotCreateDirectory {
            path: parent.display().to_string(),
            message: err.to_string(),
        })?;
    }
    std::fs::write(&path, content).map_err(|err| SyncError::CannotCreateDirectory {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;
    Ok(())
}

/// Delete a document file and any directories it leaves empty.
pub fn remove_working_file(working_dir: &Path, name: &str) -> Result<(), SyncError> {
    let path = working_dir.join(name);
    if path.exists() {
        std::fs::remove_file(&path).map_err(|err| SyncError::CannotDeleteData {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
    }
    // Prune empty parents up to the working dir; failures here are not
    // data loss.
    let mut parent = path.parent();
    while let Some(dir) = parent {
        if dir == working_dir || std::fs::remove_dir(dir).is_err() {
            break;
        }
        parent = dir.parent();
    }
    Ok(())
}

/// Stage a working-tree file.
pub fn add_to_index(repo: &Repository, name: &str) -> Result<(), SyncError> {
    let mut index = repo.index()?;
    index.add_path(Path::new(name))?;
    index.write()?;
    Ok(())
}

/// Remove a file from the index.
pub fn remove_from_index(repo: &Repository, name: &str) -> Result<(), SyncError> {
    let mut index = repo.index()?;
    index.remove_path(Path::new(name))?;
    index.write()?;
    Ok(())
}
