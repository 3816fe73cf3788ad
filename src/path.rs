//! Deferred path composition on top of directory capabilities.
//!
//! A [`PathValue`] is plain data: the id of the capability it is ultimately
//! relative to, that root's display label, and the segments appended so far.
//! Building one never touches the filesystem. Only [`CapabilityArena::resolve`]
//! turns it into a [`ResolvedPath`], and only for as long as one primitive runs.

use crate::capability::{open_ambient, split_ambient, DirectoryCapability, PathReference};
use crate::errors::{AppError, AppResult};
use cap_std::fs::Dir;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::path::PathBuf;
use std::rc::Rc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CapabilityId(u64);

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Slot {
    capability: Rc<DirectoryCapability>,
    leases: usize,
}

/// Owner of every capability opened during one run.
///
/// Slots are reference counted through [`Lease`]s; the handle is closed when
/// the last lease goes away. Ids are never reused, so a stale id simply fails
/// the liveness check.
#[derive(Default)]
pub struct CapabilityArena {
    slots: RefCell<HashMap<CapabilityId, Slot>>,
    next_id: Cell<u64>,
}

impl CapabilityArena {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Takes ownership of `capability` and returns a root value for it along
    /// with the first lease.
    pub fn adopt(self: &Rc<Self>, capability: DirectoryCapability) -> (PathValue, Lease) {
        let id = CapabilityId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        let root = PathValue::root(id, capability.display());
        debug!(id = id.0, path = %capability.display(), "adopted capability");
        self.slots.borrow_mut().insert(id, Slot { capability: Rc::new(capability), leases: 1 });
        (root, Lease { arena: Rc::clone(self), id })
    }

    #[cfg(test)]
    pub fn is_live(&self, id: CapabilityId) -> bool {
        self.slots.borrow().contains_key(&id)
    }

    /// Number of open capabilities.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn get(&self, id: CapabilityId) -> AppResult<Rc<DirectoryCapability>> {
        self.slots
            .borrow()
            .get(&id)
            .map(|slot| Rc::clone(&slot.capability))
            .ok_or(AppError::CapabilityReleased(id.0))
    }

    /// Turns a target into a handle plus relative path.
    ///
    /// The returned value holds the capability only by reference, so the
    /// arena can be modified while it is alive.
    pub fn resolve(&self, target: &PathTarget) -> AppResult<ResolvedPath> {
        match target {
            PathTarget::Literal(path) => {
                let (parent, name) = split_ambient(path);
                let dir = open_ambient(&parent)?;
                Ok(ResolvedPath { anchor: Anchor::Ambient(dir), relative: name })
            }
            PathTarget::Value(value) => Ok(ResolvedPath {
                anchor: Anchor::Held(self.get(value.root)?),
                relative: value.relative_path(),
            }),
        }
    }

    fn retain(&self, id: CapabilityId) {
        if let Some(slot) = self.slots.borrow_mut().get_mut(&id) {
            slot.leases += 1;
        }
    }

    fn release(&self, id: CapabilityId) {
        let released = {
            let mut slots = self.slots.borrow_mut();
            let Some(slot) = slots.get_mut(&id) else { return };
            if slot.leases > 1 {
                slot.leases -= 1;
                None
            } else {
                slots.remove(&id)
            }
        };
        // dropped outside the borrow; closes the handle unless a resolution
        // still holds it
        if let Some(slot) = released {
            debug!(id = id.0, path = %slot.capability.display(), "released capability");
        }
    }
}

/// Keeps one capability slot alive.
pub struct Lease {
    arena: Rc<CapabilityArena>,
    id: CapabilityId,
}

impl Clone for Lease {
    fn clone(&self) -> Self {
        self.arena.retain(self.id);
        Self { arena: Rc::clone(&self.arena), id: self.id }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.arena.release(self.id);
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Lease").field(&self.id).finish()
    }
}

/// A root (no segments) or a path relative to one.
#[derive(Debug, Clone)]
pub struct PathValue {
    root: CapabilityId,
    label: Rc<str>,
    segments: Vec<String>,
}

impl PathValue {
    pub fn root(id: CapabilityId, label: &str) -> Self {
        Self { root: id, label: Rc::from(label), segments: Vec::new() }
    }

    #[cfg(test)]
    pub fn root_id(&self) -> CapabilityId {
        self.root
    }

    #[cfg(test)]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    #[cfg(test)]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// A new value one segment deeper.
    #[must_use]
    pub fn join(&self, segment: impl Into<String>) -> Self {
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.extend_from_slice(&self.segments);
        segments.push(segment.into());
        Self { root: self.root, label: Rc::clone(&self.label), segments }
    }

    /// Appends `suffix` to the spelling of the last segment, staying in the
    /// same directory. Roots have no segment to change and return `None`.
    #[must_use]
    pub fn with_suffix(&self, suffix: &str) -> Option<Self> {
        let (last, parents) = self.segments.split_last()?;
        let mut segments = parents.to_vec();
        segments.push(format!("{last}{suffix}"));
        Some(Self { root: self.root, label: Rc::clone(&self.label), segments })
    }

    /// Every segment joined with `/`, relative to the root capability.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(self.segments.join("/"))
    }

    pub fn display(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PathValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)?;
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

/// What a primitive was asked to operate on.
#[derive(Debug, Clone)]
pub enum PathTarget {
    /// Looked up by the OS against the process's working directory, outside
    /// any sandbox. Only the last component is resolved through a handle.
    Literal(PathBuf),
    Value(PathValue),
}

impl PathTarget {
    pub fn display(&self) -> String {
        match self {
            PathTarget::Literal(path) => path.to_string_lossy().into_owned(),
            PathTarget::Value(value) => value.display(),
        }
    }
}

enum Anchor {
    Held(Rc<DirectoryCapability>),
    Ambient(Dir),
}

impl Deref for Anchor {
    type Target = Dir;

    fn deref(&self) -> &Dir {
        match self {
            Anchor::Held(capability) => capability.dir(),
            Anchor::Ambient(dir) => dir,
        }
    }
}

/// The owner of a resolution; lend it out with [`ResolvedPath::reference`].
pub struct ResolvedPath {
    anchor: Anchor,
    relative: PathBuf,
}

impl ResolvedPath {
    pub fn reference(&self) -> PathReference<'_> {
        PathReference::new(&self.anchor, &self.relative)
    }
}
