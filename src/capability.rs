//! Directory capabilities: open handles that every relative path resolves through.
//!
//! Nothing in this crate turns a path string into a side effect except by
//! handing a [`PathReference`] (a borrowed handle plus a relative path) to one
//! of the primitives in [`crate::ops`]. Once a directory is opened it is never
//! looked up by name again.

use crate::errors::{AppError, AppResult};
use cap_std::{ambient_authority, fs::Dir};
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// An owned directory handle plus the text it was opened under.
///
/// The display string is for diagnostics and `tostring`; it is never used to
/// find the directory again.
#[derive(Debug)]
pub struct DirectoryCapability {
    dir: Dir,
    display: String,
}

impl DirectoryCapability {
    pub fn new(dir: Dir, display: impl Into<String>) -> Self {
        Self { dir, display: display.into() }
    }

    pub fn dir(&self) -> &Dir {
        &self.dir
    }

    pub fn display(&self) -> &str {
        &self.display
    }
}

/// A borrowed (directory handle, relative path) pair.
///
/// An empty relative path names the directory the handle refers to.
#[derive(Debug, Clone, Copy)]
pub struct PathReference<'a> {
    pub dir: &'a Dir,
    pub relative: &'a Path,
}

impl<'a> PathReference<'a> {
    pub fn new(dir: &'a Dir, relative: &'a Path) -> Self {
        Self { dir, relative }
    }

    pub fn is_directory_itself(&self) -> bool {
        self.relative.as_os_str().is_empty()
    }

    /// Opens the referenced directory as a new handle.
    pub fn open_dir(&self) -> io::Result<Dir> {
        if self.is_directory_itself() {
            self.dir.try_clone()
        } else {
            self.dir.open_dir(self.relative)
        }
    }
}

/// Opens the directory named by `path` as a new capability.
pub fn open_root(path: PathReference<'_>, display: impl Into<String>) -> AppResult<DirectoryCapability> {
    let shown = display.into();
    let dir = path.open_dir().map_err(|e| AppError::capability(Path::new(&shown), e))?;
    debug!(path = %shown, "opened directory capability");
    Ok(DirectoryCapability::new(dir, shown))
}

/// Opens `path` with ordinary OS lookup, symlinks and `..` included.
pub fn open_ambient_root(path: &Path, display: impl Into<String>) -> AppResult<DirectoryCapability> {
    let shown = display.into();
    let dir = open_ambient(path)?;
    debug!(path = %shown, "opened ambient directory");
    Ok(DirectoryCapability::new(dir, shown))
}

/// Creates every missing directory along `path` and returns a capability for
/// the last one. An existing directory is not an error.
///
/// Existing components all precede missing ones, so a non-directory in the
/// way fails with [`AppError::PathConflict`] before anything was created.
pub fn make_nested_directory(path: PathReference<'_>, display: impl Into<String>) -> AppResult<DirectoryCapability> {
    let display = display.into();
    let mut prefix = PathBuf::new();
    let mut missing = false;
    for component in path.relative.components() {
        if matches!(component, Component::CurDir) {
            continue;
        }
        prefix.push(component);
        if missing {
            if matches!(component, Component::Normal(_)) {
                create_dir(path.dir, &prefix)?;
            }
            continue;
        }
        match path.dir.metadata(&prefix) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(AppError::PathConflict(prefix.display().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                missing = true;
                create_dir(path.dir, &prefix)?;
            }
            Err(e) => return Err(AppError::capability(&prefix, e)),
        }
    }
    open_root(PathReference::new(path.dir, &prefix), display)
}

fn create_dir(dir: &Dir, path: &Path) -> AppResult<()> {
    match dir.create_dir(path) {
        Ok(()) => {
            debug!(path = %path.display(), "created directory");
            Ok(())
        }
        // lost a race against another creator; fine as long as it is a directory
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => match dir.metadata(path) {
            Ok(meta) if meta.is_dir() => Ok(()),
            _ => Err(AppError::PathConflict(path.display().to_string())),
        },
        Err(e) => Err(AppError::capability(path, e)),
    }
}

/// Like [`make_nested_directory`] for a path outside any capability.
///
/// The longest existing prefix is looked up by the OS and opened ambiently;
/// only the missing components are created beneath that handle.
pub fn make_ambient_directory(path: &Path, display: impl Into<String>) -> AppResult<DirectoryCapability> {
    let mut existing = PathBuf::new();
    let mut components = path.components();
    let mut rest = PathBuf::new();
    for component in components.by_ref() {
        let candidate = existing.join(component);
        match std::fs::metadata(&candidate) {
            Ok(meta) if meta.is_dir() => existing = candidate,
            Ok(_) => return Err(AppError::PathConflict(candidate.display().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                rest.push(component);
                break;
            }
            Err(e) => return Err(AppError::capability(&candidate, e)),
        }
    }
    rest.extend(components);
    if existing.as_os_str().is_empty() {
        existing.push(".");
    }
    let dir = open_ambient(&existing)?;
    make_nested_directory(PathReference::new(&dir, &rest), display)
}

/// Splits a literal path into the directory holding its last component and
/// that component. A path that does not end in a name is the directory itself.
pub fn split_ambient(path: &Path) -> (PathBuf, PathBuf) {
    match (path.components().next_back(), path.parent()) {
        (Some(Component::Normal(name)), Some(parent)) if !parent.as_os_str().is_empty() => {
            (parent.to_path_buf(), PathBuf::from(name))
        }
        (Some(Component::Normal(name)), _) => (PathBuf::from("."), PathBuf::from(name)),
        _ => (path.to_path_buf(), PathBuf::new()),
    }
}

pub fn open_ambient(path: &Path) -> AppResult<Dir> {
    Dir::open_ambient_dir(path, ambient_authority()).map_err(|e| AppError::capability(path, e))
}
