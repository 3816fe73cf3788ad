use crate::capability::PathReference;
use crate::errors::{AppError, AppResult};
use cap_std::fs::Dir;
use std::io;
use std::path::Path;

/// Copies the tree at `source` to `destination`.
///
/// Every step goes through the handle of the directory being walked, so a
/// symlink swapped in after the walk started cannot redirect it outside the
/// source capability. Existing destination directories are merged into;
/// the first failure aborts the copy and leaves what was already copied.
pub fn recursive_copy(source: PathReference<'_>, destination: PathReference<'_>) -> AppResult<()> {
    if source.is_directory_itself() {
        let from = source.open_dir().map_err(|e| AppError::capability(source.relative, e))?;
        let to = open_or_create_dir(destination)?;
        return copy_dir_contents(&from, &to, source.relative);
    }
    copy_entry(source.dir, source.relative, destination.dir, destination.relative, source.relative)
}

// `shown` is the source path from the start of the copy, for messages only
fn copy_entry(from_dir: &Dir, from: &Path, to_dir: &Dir, to: &Path, shown: &Path) -> AppResult<()> {
    let meta = from_dir
        .symlink_metadata(from)
        .map_err(|e| AppError::io(format!("failed to stat {}", shown.display()), e))?;
    let file_type = meta.file_type();
    if file_type.is_dir() {
        let from_sub = from_dir.open_dir(from).map_err(|e| AppError::capability(shown, e))?;
        let to_sub = open_or_create_dir(PathReference::new(to_dir, to))?;
        copy_dir_contents(&from_sub, &to_sub, shown)
    } else if file_type.is_symlink() {
        let target = from_dir
            .read_link(from)
            .map_err(|e| AppError::io(format!("failed to read link {}", shown.display()), e))?;
        to_dir
            .symlink(&target, to)
            .map_err(|e| AppError::io(format!("failed to create link for {}", shown.display()), e))
    } else if file_type.is_file() {
        from_dir
            .copy(from, to_dir, to)
            .map(|_| ())
            .map_err(|e| AppError::io(format!("failed to copy {}", shown.display()), e))
    } else {
        Err(AppError::InvalidTarget {
            path: shown.display().to_string(),
            reason: "unsupported file type",
        })
    }
}

fn copy_dir_contents(from: &Dir, to: &Dir, shown: &Path) -> AppResult<()> {
    let entries = from
        .entries()
        .map_err(|e| AppError::io(format!("failed to list {}", shown.display()), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| AppError::io(format!("failed to list {}", shown.display()), e))?;
        let name = entry.file_name();
        let name = Path::new(&name);
        copy_entry(from, name, to, name, &shown.join(name))?;
    }
    Ok(())
}

fn open_or_create_dir(path: PathReference<'_>) -> AppResult<Dir> {
    if !path.is_directory_itself() {
        match path.dir.create_dir(path.relative) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(AppError::capability(path.relative, e)),
        }
    }
    path.open_dir().map_err(|e| AppError::capability(path.relative, e))
}
