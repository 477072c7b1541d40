//! Sandboxed path resolution.
//!
//! Guest paths are always relative to a directory descriptor.  A path is
//! first normalized lexically against the directory it names; the result
//! must stay inside the root of the preopen that directory was reached
//! through.  The longest existing prefix of the result is then canonicalized
//! and checked again, so a symbolic link cannot carry a lookup out of the
//! sandbox either.
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

use crate::{
    fd_table::FileDescriptorTable,
    types::{ErrNo, Fd, FileSystemResult, LookupFlags},
};
use log::trace;
use std::{
    ffi::OsString,
    fs,
    path::{Component, Path, PathBuf},
};

/// The outcome of a successful resolution.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedPath {
    /// The canonical root of the sandbox the path was resolved in.
    pub root: PathBuf,
    /// The host path, inside `root`.
    pub host_path: PathBuf,
}

/// Resolves `relative_path` against the directory descriptor `dir_fd`.
/// Links in the leading components are always followed; a link in the final
/// component only with `LookupFlags::SYMLINK_FOLLOW`.
///
/// Fails with `ErrNo::BadF` if `dir_fd` is not open, `ErrNo::NotDir` if it is
/// not a directory, `ErrNo::NoEnt` for an empty path, `ErrNo::Loop` if the
/// final component is a link that may not be followed and `ErrNo::Acces` if
/// the path is absolute or would leave the sandbox.
pub fn resolve(
    table: &FileDescriptorTable,
    dir_fd: Fd,
    relative_path: &str,
    lookup_flags: LookupFlags,
) -> FileSystemResult<ResolvedPath> {
    let directory = table.lookup(dir_fd)?.directory()?;
    if relative_path.is_empty() {
        return Err(ErrNo::NoEnt);
    }
    let base = directory
        .path
        .strip_prefix(&directory.root)
        .map_err(|_| ErrNo::Acces)?;
    let inside = normalize(base, Path::new(relative_path))?;
    let candidate = directory.root.join(inside);
    if !lookup_flags.contains(LookupFlags::SYMLINK_FOLLOW)
        && fs::symlink_metadata(&candidate).map_or(false, |m| m.file_type().is_symlink())
    {
        return Err(ErrNo::Loop);
    }
    let host_path = confine(&directory.root, &candidate)?;
    trace!("resolved {:?} at fd {} to {:?}", relative_path, dir_fd, host_path);
    Ok(ResolvedPath {
        root: directory.root.clone(),
        host_path,
    })
}

/// Lexically applies `path` to `base`, both relative to the sandbox root.
/// `..` may climb back up to the root but never above it.
pub fn normalize(base: &Path, path: &Path) -> FileSystemResult<PathBuf> {
    let mut stack: Vec<OsString> = base
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_os_string()),
            _otherwise => None,
        })
        .collect();
    for component in path.components() {
        match component {
            Component::Normal(part) => stack.push(part.to_os_string()),
            Component::CurDir => {}
            Component::ParentDir => {
                stack.pop().ok_or(ErrNo::Acces)?;
            }
            Component::RootDir | Component::Prefix(_) => return Err(ErrNo::Acces),
        }
    }
    Ok(stack.iter().collect())
}

/// Canonicalizes the longest existing prefix of `candidate` and rejoins the
/// remainder, failing with `ErrNo::Acces` if the result is outside `root`.
fn confine(root: &Path, candidate: &Path) -> FileSystemResult<PathBuf> {
    let mut existing = candidate;
    let mut remainder = Vec::new();
    while fs::symlink_metadata(existing).is_err() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                remainder.push(name.to_os_string());
                existing = parent;
            }
            _otherwise => return Err(ErrNo::Acces),
        }
    }
    // A dangling link canonicalizes to an error; it is refused rather than
    // followed.
    let mut resolved = fs::canonicalize(existing).map_err(|_| ErrNo::Acces)?;
    if !resolved.starts_with(root) {
        return Err(ErrNo::Acces);
    }
    for name in remainder.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}
