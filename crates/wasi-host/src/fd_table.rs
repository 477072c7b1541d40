//! The file descriptor table.
//!
//! Maps the small integers the guest uses to name open resources onto the
//! host handles behind them.  Descriptors 0, 1 and 2 are the standard
//! streams, installed from the configuration when the table is created;
//! preopened directories follow at 3, 4, ... in configuration order; every
//! descriptor handed out afterwards is numbered above them.  A descriptor
//! number is never reused once closed.
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
    config::{Preopen, StdioRedirect, WasiConfiguration},
    types::{ErrNo, Fd, FdFlags, FdStat, FileSystemResult, FileType, Rights},
};
use anyhow::{anyhow, Result};
use log::{debug, info};
use std::{
    collections::HashMap,
    fs::{self, File},
    io::{self, Read, Seek, SeekFrom, Write},
    path::PathBuf,
};

////////////////////////////////////////////////////////////////////////////////
// Constants.
////////////////////////////////////////////////////////////////////////////////

/// The standard input descriptor.
pub const STDIN_FD: Fd = Fd(0);
/// The standard output descriptor.
pub const STDOUT_FD: Fd = Fd(1);
/// The standard error descriptor.
pub const STDERR_FD: Fd = Fd(2);
/// The descriptor of the first preopened directory.
pub const FIRST_PREOPEN_FD: Fd = Fd(3);

////////////////////////////////////////////////////////////////////////////////
// Resources.
////////////////////////////////////////////////////////////////////////////////

/// A directory reachable by the guest.  `root` is the canonical host path of
/// the preopen it was reached through and bounds every path resolved from it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DirectoryHandle {
    pub root: PathBuf,
    pub path: PathBuf,
    /// The guest-visible name, for preopens only.
    pub guest_path: Option<String>,
}

/// The host object behind a descriptor.
#[derive(Debug)]
pub enum Resource {
    HostStdin,
    HostStdout,
    HostStderr,
    /// Nothing: reads see end-of-stream, writes are swallowed.
    Null,
    File(File),
    Directory(DirectoryHandle),
}

impl Resource {
    /// Reads into `buf`.  Regular files are read until `buf` is full or the
    /// end of the file is reached; streams return whatever one read yields.
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Resource::File(file) => {
                let mut filled = 0;
                while filled < buf.len() {
                    match file.read(&mut buf[filled..]) {
                        Ok(0) => break,
                        Ok(n) => filled += n,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => return Err(e),
                    }
                }
                Ok(filled)
            }
            Resource::HostStdin => io::stdin().read(buf),
            Resource::Null => Ok(0),
            Resource::HostStdout | Resource::HostStderr | Resource::Directory(_) => {
                Err(io::Error::new(io::ErrorKind::Other, "resource is not readable"))
            }
        }
    }

    /// Writes all of `data`, returning its length.
    pub fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        match self {
            Resource::File(file) => file.write_all(data)?,
            Resource::HostStdout => {
                let mut stdout = io::stdout();
                stdout.write_all(data)?;
                stdout.flush()?;
            }
            Resource::HostStderr => io::stderr().write_all(data)?,
            Resource::Null => {}
            Resource::HostStdin | Resource::Directory(_) => {
                return Err(io::Error::new(io::ErrorKind::Other, "resource is not writable"))
            }
        }
        Ok(data.len())
    }

    /// Repositions a regular file.  Streams cannot seek.
    pub fn seek(&mut self, position: SeekFrom) -> FileSystemResult<u64> {
        match self {
            Resource::File(file) => Ok(file.seek(position)?),
            _otherwise => Err(ErrNo::SPipe),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// File-table entries.
////////////////////////////////////////////////////////////////////////////////

/// What kind of object a descriptor names.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DescriptorKind {
    Stdin,
    Stdout,
    Stderr,
    RegularFile,
    PreopenedDirectory,
    /// A directory opened with `path_open` beneath a preopen.
    Directory,
}

impl DescriptorKind {
    #[inline]
    pub fn is_directory(self) -> bool {
        matches!(self, DescriptorKind::PreopenedDirectory | DescriptorKind::Directory)
    }

    pub fn file_type(self) -> FileType {
        match self {
            DescriptorKind::Stdin | DescriptorKind::Stdout | DescriptorKind::Stderr => {
                FileType::CharacterDevice
            }
            DescriptorKind::RegularFile => FileType::RegularFile,
            DescriptorKind::PreopenedDirectory | DescriptorKind::Directory => FileType::Directory,
        }
    }
}

/// An open descriptor.
#[derive(Debug)]
pub struct FileDescriptorEntry {
    pub fd: Fd,
    pub kind: DescriptorKind,
    pub rights_base: Rights,
    pub rights_inheriting: Rights,
    pub flags: FdFlags,
    pub resource: Resource,
}

impl FileDescriptorEntry {
    /// Fails with `ErrNo::Acces` unless the descriptor holds all of `rights`.
    #[inline]
    pub fn require(&self, rights: Rights) -> FileSystemResult<()> {
        if self.rights_base.contains(rights) {
            Ok(())
        } else {
            Err(ErrNo::Acces)
        }
    }

    /// The directory behind this descriptor, or `ErrNo::NotDir`.
    pub fn directory(&self) -> FileSystemResult<&DirectoryHandle> {
        match &self.resource {
            Resource::Directory(handle) if self.kind.is_directory() => Ok(handle),
            _otherwise => Err(ErrNo::NotDir),
        }
    }

    pub fn fd_stat(&self) -> FdStat {
        FdStat {
            file_type: self.kind.file_type(),
            flags: self.flags,
            rights_base: self.rights_base,
            rights_inheriting: self.rights_inheriting,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// The table.
////////////////////////////////////////////////////////////////////////////////

/// The descriptor table of one guest instance.  Owns every handle in it:
/// handles are released when their descriptor is closed or when the table is
/// dropped, whichever happens first.
#[derive(Debug)]
pub struct FileDescriptorTable {
    entries: HashMap<Fd, FileDescriptorEntry>,
    /// The number the next allocation receives.
    next_fd: u32,
    /// The highest preopen descriptor, if any directory was preopened.
    highest_preopen: Option<Fd>,
}

impl FileDescriptorTable {
    /// Creates the table for `config`: opens or creates the standard streams'
    /// files and installs the preopened directories.  Fails if a stdio file
    /// cannot be opened or a preopen is not an existing directory.
    pub fn new(config: &WasiConfiguration) -> Result<Self> {
        let mut table = Self {
            entries: HashMap::new(),
            next_fd: FIRST_PREOPEN_FD.0,
            highest_preopen: None,
        };

        table.install_stdio(STDIN_FD, DescriptorKind::Stdin, &config.stdin)?;
        table.install_stdio(STDOUT_FD, DescriptorKind::Stdout, &config.stdout)?;
        table.install_stdio(STDERR_FD, DescriptorKind::Stderr, &config.stderr)?;

        for preopen in &config.preopens {
            table.install_preopen(preopen)?;
        }
        Ok(table)
    }

    fn install_stdio(&mut self, fd: Fd, kind: DescriptorKind, redirect: &StdioRedirect) -> Result<()> {
        let is_input = kind == DescriptorKind::Stdin;
        let resource = match redirect {
            StdioRedirect::Inherit => match kind {
                DescriptorKind::Stdin => Resource::HostStdin,
                DescriptorKind::Stdout => Resource::HostStdout,
                _otherwise => Resource::HostStderr,
            },
            StdioRedirect::Path(path) if is_input => Resource::File(
                File::open(path)
                    .map_err(|e| anyhow!("Failed to open stdin file {:?}: {}", path, e))?,
            ),
            StdioRedirect::Path(path) => Resource::File(
                File::create(path)
                    .map_err(|e| anyhow!("Failed to create {:?} file {:?}: {}", kind, path, e))?,
            ),
            StdioRedirect::Disabled => Resource::Null,
        };
        let rights = if is_input {
            Rights::FD_READ | Rights::POLL_FD_READWRITE
        } else {
            Rights::FD_WRITE | Rights::POLL_FD_READWRITE
        };
        debug!("{:?} installed at fd {} from {:?}", kind, fd, redirect);
        self.entries.insert(
            fd,
            FileDescriptorEntry {
                fd,
                kind,
                rights_base: rights,
                rights_inheriting: Rights::empty(),
                flags: FdFlags::empty(),
                resource,
            },
        );
        Ok(())
    }

    fn install_preopen(&mut self, preopen: &Preopen) -> Result<()> {
        let root = fs::canonicalize(&preopen.host_path).map_err(|e| {
            anyhow!("Failed to preopen directory {:?}: {}", preopen.host_path, e)
        })?;
        if !root.is_dir() {
            return Err(anyhow!(
                "Failed to preopen {:?}: not a directory",
                preopen.host_path
            ));
        }
        let handle = DirectoryHandle {
            root: root.clone(),
            path: root,
            guest_path: Some(preopen.guest_path.clone()),
        };
        let fd = self
            .allocate(
                DescriptorKind::PreopenedDirectory,
                Resource::Directory(handle),
                preopen.rights_base,
                preopen.rights_inheriting,
                FdFlags::empty(),
            )
            .map_err(|e| anyhow!("Failed to allocate a preopen descriptor: {}", e))?;
        self.highest_preopen = Some(fd);
        info!(
            "pre-opened directory {:?} as {:?} at fd {}",
            preopen.host_path, preopen.guest_path, fd
        );
        Ok(())
    }

    /// Installs `resource` at the next unused descriptor number and returns
    /// that number.
    pub fn allocate(
        &mut self,
        kind: DescriptorKind,
        resource: Resource,
        rights_base: Rights,
        rights_inheriting: Rights,
        flags: FdFlags,
    ) -> FileSystemResult<Fd> {
        let fd = Fd(self.next_fd);
        self.next_fd = self.next_fd.checked_add(1).ok_or(ErrNo::NoMem)?;
        debug!("allocated fd {} for {:?}", fd, kind);
        self.entries.insert(
            fd,
            FileDescriptorEntry {
                fd,
                kind,
                rights_base,
                rights_inheriting,
                flags,
                resource,
            },
        );
        Ok(fd)
    }

    /// Looks up an open descriptor.  Returns `ErrNo::BadF` if `fd` was never
    /// opened or has been closed.
    #[inline]
    pub fn lookup(&self, fd: Fd) -> FileSystemResult<&FileDescriptorEntry> {
        self.entries.get(&fd).ok_or(ErrNo::BadF)
    }

    #[inline]
    pub fn lookup_mut(&mut self, fd: Fd) -> FileSystemResult<&mut FileDescriptorEntry> {
        self.entries.get_mut(&fd).ok_or(ErrNo::BadF)
    }

    /// Closes `fd`, releasing its handle.  Returns `ErrNo::BadF` if `fd` is
    /// not currently open.
    pub fn close(&mut self, fd: Fd) -> FileSystemResult<()> {
        let entry = self.entries.remove(&fd).ok_or(ErrNo::BadF)?;
        debug!("closed fd {} ({:?})", fd, entry.kind);
        Ok(())
    }

    /// The highest descriptor given to a preopened directory.
    #[inline]
    pub fn highest_preopen(&self) -> Option<Fd> {
        self.highest_preopen
    }

    /// The number of open descriptors.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Drop for FileDescriptorTable {
    fn drop(&mut self) {
        debug!("releasing {} open descriptors", self.entries.len());
    }
}
