//! WASI preview1 ABI types.
//!
//! Status codes, descriptor numbers, flag sets and the handful of structures
//! that cross the guest/host boundary, together with their little-endian
//! in-memory layouts.
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

use bitflags::bitflags;
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use err_derive::Error;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt, io, io::Cursor};

////////////////////////////////////////////////////////////////////////////////
// Error numbers.
////////////////////////////////////////////////////////////////////////////////

/// The WASI error codes returned to the guest as a call's status.  Only the
/// codes this layer can actually produce are listed; the discriminants are the
/// preview1 values.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Error, FromPrimitive, ToPrimitive, Serialize, Deserialize,
)]
#[repr(u16)]
pub enum ErrNo {
    #[error(display = "Success")]
    Success = 0,
    #[error(display = "Permission denied")]
    Acces = 2,
    #[error(display = "Bad file descriptor")]
    BadF = 8,
    #[error(display = "File exists")]
    Exist = 20,
    #[error(display = "Bad address")]
    Fault = 21,
    #[error(display = "Illegal byte sequence")]
    IlSeq = 25,
    #[error(display = "Invalid argument")]
    Inval = 28,
    #[error(display = "I/O error")]
    Io = 29,
    #[error(display = "Is a directory")]
    IsDir = 31,
    #[error(display = "Too many levels of symbolic links")]
    Loop = 32,
    #[error(display = "Filename too long")]
    NameTooLong = 37,
    #[error(display = "No such file or directory")]
    NoEnt = 44,
    #[error(display = "Not enough space")]
    NoMem = 48,
    #[error(display = "Not a directory")]
    NotDir = 54,
    #[error(display = "Not supported")]
    NotSup = 58,
    #[error(display = "Value too large to be stored in data type")]
    Overflow = 61,
    #[error(display = "Invalid seek")]
    SPipe = 70,
}

/// Syscalls either return a result of type `T` or a defined error code.  The
/// return code `ErrNo::Success` is implicit if `Ok(result)` is ever returned;
/// the result `Err(ErrNo::Success)` should never be returned.
pub type FileSystemResult<T> = Result<T, ErrNo>;

impl From<ErrNo> for u16 {
    #[inline]
    fn from(errno: ErrNo) -> u16 {
        errno as u16
    }
}

impl TryFrom<u16> for ErrNo {
    type Error = ();
    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        ErrNo::from_u16(raw).ok_or(())
    }
}

/// Host I/O failures surface to the guest as the closest WASI code.
impl From<io::Error> for ErrNo {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => ErrNo::NoEnt,
            io::ErrorKind::PermissionDenied => ErrNo::Acces,
            io::ErrorKind::AlreadyExists => ErrNo::Exist,
            io::ErrorKind::InvalidInput => ErrNo::Inval,
            io::ErrorKind::UnexpectedEof => ErrNo::Fault,
            io::ErrorKind::Unsupported => ErrNo::NotSup,
            _otherwise => match error.raw_os_error() {
                // EISDIR, ENOTDIR and ELOOP carry no stable `ErrorKind` on older toolchains.
                Some(21) => ErrNo::IsDir,
                Some(20) => ErrNo::NotDir,
                Some(40) => ErrNo::Loop,
                _ => ErrNo::Io,
            },
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// File descriptors.
////////////////////////////////////////////////////////////////////////////////

/// A guest-visible file descriptor number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fd(pub u32);

impl From<u32> for Fd {
    #[inline]
    fn from(fd: u32) -> Self {
        Fd(fd)
    }
}

impl From<Fd> for u32 {
    #[inline]
    fn from(fd: Fd) -> u32 {
        fd.0
    }
}

impl fmt::Display for Fd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Flag sets.
////////////////////////////////////////////////////////////////////////////////

bitflags! {
    /// Capabilities attached to a file descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Rights: u64 {
        const FD_DATASYNC = 1 << 0;
        const FD_READ = 1 << 1;
        const FD_SEEK = 1 << 2;
        const FD_FDSTAT_SET_FLAGS = 1 << 3;
        const FD_SYNC = 1 << 4;
        const FD_TELL = 1 << 5;
        const FD_WRITE = 1 << 6;
        const FD_ADVISE = 1 << 7;
        const FD_ALLOCATE = 1 << 8;
        const PATH_CREATE_DIRECTORY = 1 << 9;
        const PATH_CREATE_FILE = 1 << 10;
        const PATH_LINK_SOURCE = 1 << 11;
        const PATH_LINK_TARGET = 1 << 12;
        const PATH_OPEN = 1 << 13;
        const FD_READDIR = 1 << 14;
        const PATH_READLINK = 1 << 15;
        const PATH_RENAME_SOURCE = 1 << 16;
        const PATH_RENAME_TARGET = 1 << 17;
        const PATH_FILESTAT_GET = 1 << 18;
        const PATH_FILESTAT_SET_SIZE = 1 << 19;
        const PATH_FILESTAT_SET_TIMES = 1 << 20;
        const FD_FILESTAT_GET = 1 << 21;
        const FD_FILESTAT_SET_SIZE = 1 << 22;
        const FD_FILESTAT_SET_TIMES = 1 << 23;
        const PATH_SYMLINK = 1 << 24;
        const PATH_REMOVE_DIRECTORY = 1 << 25;
        const PATH_UNLINK_FILE = 1 << 26;
        const POLL_FD_READWRITE = 1 << 27;
        const SOCK_SHUTDOWN = 1 << 28;
        const SOCK_ACCEPT = 1 << 29;
    }
}

impl Rights {
    /// Rights for reading a regular file.
    pub const FILE_READ: Rights = Rights::from_bits_truncate(
        Rights::FD_READ.bits()
            | Rights::FD_SEEK.bits()
            | Rights::FD_TELL.bits()
            | Rights::FD_ADVISE.bits()
            | Rights::FD_FILESTAT_GET.bits()
            | Rights::POLL_FD_READWRITE.bits(),
    );
    /// Rights for writing a regular file.
    pub const FILE_WRITE: Rights = Rights::from_bits_truncate(
        Rights::FD_WRITE.bits()
            | Rights::FD_DATASYNC.bits()
            | Rights::FD_SYNC.bits()
            | Rights::FD_ALLOCATE.bits()
            | Rights::FD_FDSTAT_SET_FLAGS.bits()
            | Rights::FD_FILESTAT_SET_SIZE.bits()
            | Rights::FD_FILESTAT_SET_TIMES.bits(),
    );
    /// Rights for looking things up in a directory without modifying it.
    pub const DIRECTORY_READ: Rights = Rights::from_bits_truncate(
        Rights::PATH_OPEN.bits()
            | Rights::FD_READDIR.bits()
            | Rights::PATH_READLINK.bits()
            | Rights::PATH_FILESTAT_GET.bits()
            | Rights::FD_FILESTAT_GET.bits(),
    );
    /// Rights for creating and removing entries in a directory.
    pub const DIRECTORY_WRITE: Rights = Rights::from_bits_truncate(
        Rights::PATH_CREATE_DIRECTORY.bits()
            | Rights::PATH_CREATE_FILE.bits()
            | Rights::PATH_LINK_SOURCE.bits()
            | Rights::PATH_LINK_TARGET.bits()
            | Rights::PATH_RENAME_SOURCE.bits()
            | Rights::PATH_RENAME_TARGET.bits()
            | Rights::PATH_FILESTAT_SET_SIZE.bits()
            | Rights::PATH_FILESTAT_SET_TIMES.bits()
            | Rights::PATH_SYMLINK.bits()
            | Rights::PATH_REMOVE_DIRECTORY.bits()
            | Rights::PATH_UNLINK_FILE.bits(),
    );
    /// The default rights of a preopened directory: full read and write.
    pub const READ_WRITE: Rights = Rights::from_bits_truncate(
        Rights::FILE_READ.bits()
            | Rights::FILE_WRITE.bits()
            | Rights::DIRECTORY_READ.bits()
            | Rights::DIRECTORY_WRITE.bits(),
    );
    /// Read-only rights for a preopened directory.
    pub const READ_ONLY: Rights =
        Rights::from_bits_truncate(Rights::FILE_READ.bits() | Rights::DIRECTORY_READ.bits());
}

bitflags! {
    /// Open flags used by `path_open`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u16 {
        const CREAT = 1 << 0;
        const DIRECTORY = 1 << 1;
        const EXCL = 1 << 2;
        const TRUNC = 1 << 3;
    }
}

bitflags! {
    /// File descriptor flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FdFlags: u16 {
        const APPEND = 1 << 0;
        const DSYNC = 1 << 1;
        const NONBLOCK = 1 << 2;
        const RSYNC = 1 << 3;
        const SYNC = 1 << 4;
    }
}

bitflags! {
    /// Flags determining how a path is resolved.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LookupFlags: u32 {
        const SYMLINK_FOLLOW = 1 << 0;
    }
}

impl TryFrom<u64> for Rights {
    type Error = ();
    fn try_from(raw: u64) -> Result<Self, Self::Error> {
        Rights::from_bits(raw).ok_or(())
    }
}

impl TryFrom<u16> for OpenFlags {
    type Error = ();
    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        OpenFlags::from_bits(raw).ok_or(())
    }
}

impl TryFrom<u16> for FdFlags {
    type Error = ();
    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        FdFlags::from_bits(raw).ok_or(())
    }
}

impl TryFrom<u32> for LookupFlags {
    type Error = ();
    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        LookupFlags::from_bits(raw).ok_or(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Enumerations.
////////////////////////////////////////////////////////////////////////////////

/// The type of the object a descriptor refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum FileType {
    Unknown = 0,
    BlockDevice = 1,
    CharacterDevice = 2,
    Directory = 3,
    RegularFile = 4,
    SocketDgram = 5,
    SocketStream = 6,
    SymbolicLink = 7,
}

/// The reference point of `fd_seek`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum Whence {
    Set = 0,
    Cur = 1,
    End = 2,
}

impl TryFrom<u8> for Whence {
    type Error = ();
    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Whence::from_u8(raw).ok_or(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Structures and their layouts.
////////////////////////////////////////////////////////////////////////////////

/// Decode a `T` from its guest memory representation.
pub trait Unpack: Sized {
    /// Size in bytes of the encoded form.
    const SIZE: usize;
    fn unpack(bytes: &[u8]) -> Result<Self, ErrNo>;
}

/// Encode a `T` into its guest memory representation.
pub trait Pack {
    fn pack(&self) -> Vec<u8>;
}

/// A buffer in guest memory: base address and length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoVec {
    pub buf: u32,
    pub len: u32,
}

impl Unpack for IoVec {
    const SIZE: usize = 8;

    fn unpack(bytes: &[u8]) -> Result<Self, ErrNo> {
        if bytes.len() != Self::SIZE {
            return Err(ErrNo::Inval);
        }
        let mut rdr = Cursor::new(bytes);
        let buf = rdr.read_u32::<LittleEndian>().map_err(|_| ErrNo::Fault)?;
        let len = rdr.read_u32::<LittleEndian>().map_err(|_| ErrNo::Fault)?;
        Ok(IoVec { buf, len })
    }
}

/// Information about a preopened directory, as returned by `fd_prestat_get`.
/// Only the directory variant (tag 0) exists in preview1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prestat {
    pub name_len: u32,
}

impl Pack for Prestat {
    /// `u8` tag, three bytes of padding, `u32` name length.
    fn pack(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; 8];
        LittleEndian::write_u32(&mut bytes[4..8], self.name_len);
        bytes
    }
}

/// File descriptor attributes, as returned by `fd_fdstat_get`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdStat {
    pub file_type: FileType,
    pub flags: FdFlags,
    pub rights_base: Rights,
    pub rights_inheriting: Rights,
}

impl Pack for FdStat {
    /// `u8` file type at 0, `u16` flags at 2, rights at 8 and 16.
    fn pack(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; 24];
        bytes[0] = self.file_type as u8;
        LittleEndian::write_u16(&mut bytes[2..4], self.flags.bits());
        LittleEndian::write_u64(&mut bytes[8..16], self.rights_base.bits());
        LittleEndian::write_u64(&mut bytes[16..24], self.rights_inheriting.bits());
        bytes
    }
}
