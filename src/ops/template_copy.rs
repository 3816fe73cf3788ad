use crate::capability::PathReference;
use crate::errors::{AppError, AppResult};
use crate::template::{self, Evaluate};
use cap_std::fs::{Dir, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Renders the template at `source` into the file at `destination`.
///
/// The source is read whole through its capability and refused when it is
/// larger than `max_bytes`. The output is streamed into a hidden temporary
/// file next to the destination, which is renamed over the destination only
/// after the whole template rendered and was flushed.
pub fn copy_template<E>(
    source: PathReference<'_>,
    destination: PathReference<'_>,
    max_bytes: u64,
    evaluator: &mut E,
) -> AppResult<()>
where
    E: Evaluate + ?Sized,
{
    let contents = read_limited(source, max_bytes)?;
    let mut staged = StagedFile::create(destination)?;
    template::render(&contents, evaluator, |span| staged.write(span))?;
    staged.commit()
}

fn read_limited(source: PathReference<'_>, max_bytes: u64) -> AppResult<Vec<u8>> {
    let shown = source.relative.display();
    let file = source
        .dir
        .open(source.relative)
        .map_err(|e| AppError::io(format!("failed to open {shown}"), e))?;
    let size = file
        .metadata()
        .map_err(|e| AppError::io(format!("failed to stat {shown}"), e))?
        .len();
    if size > max_bytes {
        return Err(too_large(source.relative, size, max_bytes));
    }

    // the file may grow between stat and read
    let mut contents = Vec::with_capacity(size as usize);
    file.take(max_bytes + 1)
        .read_to_end(&mut contents)
        .map_err(|e| AppError::io(format!("failed to read {shown}"), e))?;
    if contents.len() as u64 > max_bytes {
        return Err(too_large(source.relative, contents.len() as u64, max_bytes));
    }
    Ok(contents)
}

fn too_large(path: &Path, size: u64, limit: u64) -> AppError {
    AppError::ResourceLimit { path: path.display().to_string(), size, limit }
}

/// A destination file that becomes visible only on [`StagedFile::commit`].
///
/// Dropping it uncommitted removes the temporary file.
pub struct StagedFile<'a> {
    dir: &'a Dir,
    temp: PathBuf,
    target: &'a Path,
    writer: Option<BufWriter<File>>,
}

impl<'a> StagedFile<'a> {
    pub fn create(destination: PathReference<'a>) -> AppResult<Self> {
        let target = destination.relative;
        let name = match target.file_name() {
            Some(name) if !destination.is_directory_itself() => name,
            _ => {
                return Err(AppError::InvalidTarget {
                    path: target.display().to_string(),
                    reason: "template destination must name a file",
                })
            }
        };
        let temp_name = format!(".{}.{}.tmp", name.to_string_lossy(), uuid::Uuid::new_v4().simple());
        let temp = match target.parent() {
            Some(parent) => parent.join(temp_name),
            None => PathBuf::from(temp_name),
        };
        let file = destination
            .dir
            .open_with(&temp, OpenOptions::new().write(true).create_new(true))
            .map_err(|e| AppError::io(format!("failed to create {}", temp.display()), e))?;
        debug!(temp = %temp.display(), target = %target.display(), "staging template output");
        Ok(Self { dir: destination.dir, temp, target, writer: Some(BufWriter::new(file)) })
    }

    pub fn write(&mut self, bytes: &[u8]) -> AppResult<()> {
        let writer = self.writer.as_mut().ok_or_else(|| closed(self.target))?;
        writer
            .write_all(bytes)
            .map_err(|e| AppError::io(format!("failed to write {}", self.temp.display()), e))
    }

    /// Flushes, syncs and renames the temporary file onto the target.
    pub fn commit(mut self) -> AppResult<()> {
        let writer = self.writer.take().ok_or_else(|| closed(self.target))?;
        let file = writer
            .into_inner()
            .map_err(|e| AppError::io(format!("failed to write {}", self.temp.display()), e.into_error()))?;
        file.sync_all()
            .map_err(|e| AppError::io(format!("failed to sync {}", self.temp.display()), e))?;
        drop(file);
        self.dir
            .rename(&self.temp, self.dir, self.target)
            .map_err(|e| AppError::io(format!("failed to commit {}", self.target.display()), e))?;
        // renamed; nothing left for Drop to clean up
        self.temp = PathBuf::new();
        Ok(())
    }
}

impl Drop for StagedFile<'_> {
    fn drop(&mut self) {
        self.writer.take();
        if self.temp.as_os_str().is_empty() {
            return;
        }
        if let Err(e) = self.dir.remove_file(&self.temp) {
            warn!(temp = %self.temp.display(), error = %e, "failed to remove staged file");
        }
    }
}

fn closed(target: &Path) -> AppError {
    AppError::InvalidTarget { path: target.display().to_string(), reason: "staged file already closed" }
}
