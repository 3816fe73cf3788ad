use crate::capability::PathReference;
use crate::errors::{AppError, AppResult};

/// Removes the file, symlink or directory tree at `path`, including the entry
/// itself. A directory is walked through its own handle; symlinks are
/// removed, never followed.
pub fn recursive_delete(path: PathReference<'_>) -> AppResult<()> {
    if path.is_directory_itself() {
        return Err(AppError::InvalidTarget {
            path: ".".into(),
            reason: "a directory capability cannot delete itself",
        });
    }
    let shown = path.relative.display();
    let meta = path
        .dir
        .symlink_metadata(path.relative)
        .map_err(|e| AppError::io(format!("failed to stat {shown}"), e))?;
    if meta.is_dir() {
        path.dir
            .remove_dir_all(path.relative)
            .map_err(|e| AppError::io(format!("failed to delete {shown}"), e))
    } else {
        path.dir
            .remove_file(path.relative)
            .map_err(|e| AppError::io(format!("failed to delete {shown}"), e))
    }
}
