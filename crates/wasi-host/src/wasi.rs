//! The WASI system-call handlers.
//!
//! `WasiHost` holds the runtime state of one guest instance: its descriptor
//! table, argument and environment lists and exit status.  Each handler
//! receives the guest's linear memory alongside its raw arguments, reads every
//! input it needs, validates every output range, performs the operation and
//! only then writes its results.  A failing call leaves guest memory
//! untouched.
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
    config::WasiConfiguration,
    fd_table::{DescriptorKind, DirectoryHandle, FileDescriptorTable, Resource},
    memory::MemoryHandler,
    path,
    strace::Strace,
    types::{
        ErrNo, Fd, FdFlags, FileSystemResult, IoVec, LookupFlags, OpenFlags, Pack, Prestat,
        Rights, Whence,
    },
};
use anyhow::Result;
use log::{debug, info};
use std::{
    convert::TryFrom,
    fs::{self, OpenOptions},
    io::SeekFrom,
    mem::size_of,
};

/// The runtime state of one guest instance.
#[derive(Debug)]
pub struct WasiHost {
    table: FileDescriptorTable,
    /// The environment variables passed to this program, in order.
    environment_variables: Vec<(String, String)>,
    /// The program arguments, the program name first.
    program_arguments: Vec<String>,
    enable_strace: bool,
    /// The exit code, if program calls proc_exit.
    exit_code: Option<u32>,
}

impl WasiHost {
    ////////////////////////////////////////////////////////////////////////////
    // Creating and querying runtime states.
    ////////////////////////////////////////////////////////////////////////////

    /// Instantiates the host state described by `config`.  Fails if the
    /// standard streams or the preopened directories cannot be opened.
    pub fn new(config: WasiConfiguration) -> Result<Self> {
        let table = FileDescriptorTable::new(&config)?;
        info!(
            "instantiated WASI host: {} args, {} env vars, {} descriptors",
            config.program_arguments.len(),
            config.environment_variables.len(),
            table.len()
        );
        Ok(Self {
            table,
            environment_variables: config.environment_variables,
            program_arguments: config.program_arguments,
            enable_strace: config.enable_strace,
            exit_code: None,
        })
    }

    /// Return the exit code from `proc_exit` call.
    #[inline]
    pub fn exit_code(&self) -> Option<u32> {
        self.exit_code
    }

    #[inline]
    pub fn fd_table(&self) -> &FileDescriptorTable {
        &self.table
    }

    #[inline]
    pub fn program_arguments(&self) -> &[String] {
        &self.program_arguments
    }

    #[inline]
    pub fn environment_variables(&self) -> &[(String, String)] {
        &self.environment_variables
    }

    ////////////////////////////////////////////////////////////////////////////
    // Arguments and environment.
    ////////////////////////////////////////////////////////////////////////////

    fn encoded_args(&self) -> Vec<Vec<u8>> {
        self.program_arguments
            .iter()
            .map(|arg| format!("{}\0", arg).into_bytes())
            .collect()
    }

    fn encoded_environ(&self) -> Vec<Vec<u8>> {
        self.environment_variables
            .iter()
            .map(|(key, value)| format!("{}={}\0", key, value).into_bytes())
            .collect()
    }

    /// Writes the number of entries of `content` to `count_address` and their
    /// total length to `size_address`.
    fn write_sizes<T: MemoryHandler>(
        memory_ref: &mut T,
        content: &[Vec<u8>],
        count_address: u32,
        size_address: u32,
    ) -> FileSystemResult<()> {
        let count = u32::try_from(content.len()).map_err(|_| ErrNo::Overflow)?;
        let size: usize = content.iter().map(Vec::len).sum();
        let size = u32::try_from(size).map_err(|_| ErrNo::Overflow)?;
        memory_ref.check_range(count_address, size_of::<u32>() as u32)?;
        memory_ref.check_range(size_address, size_of::<u32>() as u32)?;
        memory_ref.write_u32(count_address, count)?;
        memory_ref.write_u32(size_address, size)
    }

    /// The implementation of the WASI `args_get` function.
    pub fn args_get<T: MemoryHandler>(
        &self,
        memory_ref: &mut T,
        address_for_string_ptrs: u32,
        buf_address: u32,
    ) -> FileSystemResult<()> {
        let mut strace = Strace::func(self.enable_strace, "args_get");
        strace.arg_hex(address_for_string_ptrs);
        strace.arg_hex(buf_address);
        let buffer = self.encoded_args();
        strace.result(memory_ref.write_string_list(&buffer, buf_address, address_for_string_ptrs))
    }

    /// The implementation of the WASI `args_sizes_get` function.
    pub fn args_sizes_get<T: MemoryHandler>(
        &self,
        memory_ref: &mut T,
        address_for_counts: u32,
        address_for_buffer_size: u32,
    ) -> FileSystemResult<()> {
        let mut strace = Strace::func(self.enable_strace, "args_sizes_get");
        let buffer = self.encoded_args();
        let result =
            Self::write_sizes(memory_ref, &buffer, address_for_counts, address_for_buffer_size);
        strace.arg_p_u32(result, memory_ref, address_for_counts);
        strace.arg_p_u32(result, memory_ref, address_for_buffer_size);
        strace.result(result)
    }

    /// The implementation of the WASI `environ_get` function.
    pub fn environ_get<T: MemoryHandler>(
        &self,
        memory_ref: &mut T,
        address_for_string_ptrs: u32,
        buf_address: u32,
    ) -> FileSystemResult<()> {
        let mut strace = Strace::func(self.enable_strace, "environ_get");
        strace.arg_hex(address_for_string_ptrs);
        strace.arg_hex(buf_address);
        let buffer = self.encoded_environ();
        strace.result(memory_ref.write_string_list(&buffer, buf_address, address_for_string_ptrs))
    }

    /// The implementation of the WASI `environ_sizes_get` function.
    pub fn environ_sizes_get<T: MemoryHandler>(
        &self,
        memory_ref: &mut T,
        address_for_counts: u32,
        address_for_buffer_size: u32,
    ) -> FileSystemResult<()> {
        let mut strace = Strace::func(self.enable_strace, "environ_sizes_get");
        let buffer = self.encoded_environ();
        let result =
            Self::write_sizes(memory_ref, &buffer, address_for_counts, address_for_buffer_size);
        strace.arg_p_u32(result, memory_ref, address_for_counts);
        strace.arg_p_u32(result, memory_ref, address_for_buffer_size);
        strace.result(result)
    }

    ////////////////////////////////////////////////////////////////////////////
    // Descriptor I/O.
    ////////////////////////////////////////////////////////////////////////////

    /// The implementation of the WASI `fd_read` function.  Fills the iovecs in
    /// order and stops at the first short read; a read at end-of-stream
    /// reports zero bytes.
    pub fn fd_read<T: MemoryHandler>(
        &mut self,
        memory_ref: &mut T,
        fd: u32,
        iovec_base: u32,
        iovec_count: u32,
        address: u32,
    ) -> FileSystemResult<()> {
        let mut strace = Strace::func(self.enable_strace, "fd_read");
        strace.arg_dec(fd);
        let result = self.read_into_iovecs(memory_ref, Fd(fd), iovec_base, iovec_count, address);
        strace.arg_iovec(result, memory_ref, iovec_base, iovec_count);
        strace.arg_dec(iovec_count);
        strace.result(result.map(|_| ()))
    }

    fn read_into_iovecs<T: MemoryHandler>(
        &mut self,
        memory_ref: &mut T,
        fd: Fd,
        iovec_base: u32,
        iovec_count: u32,
        address: u32,
    ) -> FileSystemResult<u32> {
        let iovecs = memory_ref.unpack_array::<IoVec>(iovec_base, iovec_count)?;
        let mut capacity: u64 = 0;
        for iovec in &iovecs {
            memory_ref.check_range(iovec.buf, iovec.len)?;
            capacity += u64::from(iovec.len);
        }
        if capacity > u64::from(u32::MAX) {
            return Err(ErrNo::Inval);
        }
        memory_ref.check_range(address, size_of::<u32>() as u32)?;

        let entry = self.table.lookup_mut(fd)?;
        if entry.kind.is_directory() {
            return Err(ErrNo::BadF);
        }
        entry.require(Rights::FD_READ)?;

        let mut chunks = Vec::with_capacity(iovecs.len());
        for iovec in &iovecs {
            let mut bytes = vec![0u8; iovec.len as usize];
            let read = entry.resource.read(&mut bytes)?;
            bytes.truncate(read);
            let short = read < iovec.len as usize;
            chunks.push((iovec.buf, bytes));
            if short {
                break;
            }
        }

        let mut total = 0u32;
        for (buf, bytes) in chunks {
            memory_ref.write_buffer(buf, &bytes)?;
            total += bytes.len() as u32;
        }
        memory_ref.write_u32(address, total)?;
        Ok(total)
    }

    /// The implementation of the WASI `fd_write` function.  Writes every byte
    /// of every iovec, in order.
    pub fn fd_write<T: MemoryHandler>(
        &mut self,
        memory_ref: &mut T,
        fd: u32,
        iovec_base: u32,
        iovec_count: u32,
        address: u32,
    ) -> FileSystemResult<()> {
        let mut strace = Strace::func(self.enable_strace, "fd_write");
        strace.arg_dec(fd);
        let result = self.write_from_iovecs(memory_ref, Fd(fd), iovec_base, iovec_count, address);
        strace.arg_iovec(result, memory_ref, iovec_base, iovec_count);
        strace.arg_p_u32(result.map(|_| ()), memory_ref, address);
        strace.result(result.map(|_| ()))
    }

    fn write_from_iovecs<T: MemoryHandler>(
        &mut self,
        memory_ref: &mut T,
        fd: Fd,
        iovec_base: u32,
        iovec_count: u32,
        address: u32,
    ) -> FileSystemResult<u32> {
        let iovecs = memory_ref.unpack_array::<IoVec>(iovec_base, iovec_count)?;
        let bufs = iovecs
            .iter()
            .map(|iovec| memory_ref.read_buffer(iovec.buf, iovec.len))
            .collect::<FileSystemResult<Vec<_>>>()?;
        let total: usize = bufs.iter().map(Vec::len).sum();
        let total = u32::try_from(total).map_err(|_| ErrNo::Inval)?;
        memory_ref.check_range(address, size_of::<u32>() as u32)?;

        let entry = self.table.lookup_mut(fd)?;
        if entry.kind.is_directory() {
            return Err(ErrNo::BadF);
        }
        entry.require(Rights::FD_WRITE)?;
        for buf in &bufs {
            entry.resource.write(buf)?;
        }
        memory_ref.write_u32(address, total)?;
        Ok(total)
    }

    /// The implementation of the WASI `fd_close` function.
    pub fn fd_close(&mut self, fd: u32) -> FileSystemResult<()> {
        let mut strace = Strace::func(self.enable_strace, "fd_close");
        strace.arg_dec(fd);
        strace.result(self.table.close(Fd(fd)))
    }

    /// The implementation of the WASI `fd_seek` function.  Only regular files
    /// can be repositioned; the standard streams fail with `ErrNo::SPipe`.
    pub fn fd_seek<T: MemoryHandler>(
        &mut self,
        memory_ref: &mut T,
        fd: u32,
        offset: u64,
        whence: u32,
        address: u32,
    ) -> FileSystemResult<()> {
        let mut strace = Strace::func(self.enable_strace, "fd_seek");
        strace.arg_dec(fd);
        strace.arg_dec(offset as i64);
        strace.arg_dec(whence);
        let result = Self::decode_wasi_arg::<u8, _>(whence)
            .and_then(Self::decode_wasi_arg::<Whence, _>)
            .and_then(|whence| -> FileSystemResult<()> {
                let delta = offset as i64;
                let position = match whence {
                    Whence::Set => SeekFrom::Start(u64::try_from(delta).map_err(|_| ErrNo::Inval)?),
                    Whence::Cur => SeekFrom::Current(delta),
                    Whence::End => SeekFrom::End(delta),
                };
                self.seek(memory_ref, Fd(fd), position, Rights::FD_SEEK, address)
            });
        strace.arg_p_u64(result, memory_ref, address);
        strace.result(result)
    }

    /// The implementation of the WASI `fd_tell` function.
    pub fn fd_tell<T: MemoryHandler>(
        &mut self,
        memory_ref: &mut T,
        fd: u32,
        address: u32,
    ) -> FileSystemResult<()> {
        let mut strace = Strace::func(self.enable_strace, "fd_tell");
        strace.arg_dec(fd);
        let result = self.seek(memory_ref, Fd(fd), SeekFrom::Current(0), Rights::FD_TELL, address);
        strace.arg_p_u64(result, memory_ref, address);
        strace.result(result)
    }

    fn seek<T: MemoryHandler>(
        &mut self,
        memory_ref: &mut T,
        fd: Fd,
        position: SeekFrom,
        right: Rights,
        address: u32,
    ) -> FileSystemResult<()> {
        memory_ref.check_range(address, size_of::<u64>() as u32)?;
        let entry = self.table.lookup_mut(fd)?;
        match entry.kind {
            DescriptorKind::Stdin | DescriptorKind::Stdout | DescriptorKind::Stderr => {
                return Err(ErrNo::SPipe)
            }
            DescriptorKind::PreopenedDirectory | DescriptorKind::Directory => {
                return Err(ErrNo::BadF)
            }
            DescriptorKind::RegularFile => {}
        }
        entry.require(right)?;
        let offset = entry.resource.seek(position)?;
        memory_ref.write_u64(address, offset)
    }

    /// The implementation of the WASI `fd_fdstat_get` function.
    pub fn fd_fdstat_get<T: MemoryHandler>(
        &self,
        memory_ref: &mut T,
        fd: u32,
        address: u32,
    ) -> FileSystemResult<()> {
        let mut strace = Strace::func(self.enable_strace, "fd_fdstat_get");
        strace.arg_dec(fd);
        let result = self
            .table
            .lookup(Fd(fd))
            .and_then(|entry| memory_ref.write_buffer(address, &entry.fd_stat().pack()));
        strace.arg_fdstat_out(result, memory_ref, address);
        strace.result(result)
    }

    ////////////////////////////////////////////////////////////////////////////
    // Preopens.
    ////////////////////////////////////////////////////////////////////////////

    /// The guest-visible name of a preopened directory.  Any other descriptor
    /// fails with `ErrNo::BadF`.
    fn preopen_name(&self, fd: Fd) -> FileSystemResult<&str> {
        let entry = self.table.lookup(fd)?;
        if entry.kind != DescriptorKind::PreopenedDirectory {
            return Err(ErrNo::BadF);
        }
        entry
            .directory()
            .ok()
            .and_then(|handle| handle.guest_path.as_deref())
            .ok_or(ErrNo::BadF)
    }

    /// The implementation of the WASI `fd_prestat_get` function.
    pub fn fd_prestat_get<T: MemoryHandler>(
        &self,
        memory_ref: &mut T,
        fd: u32,
        address: u32,
    ) -> FileSystemResult<()> {
        let mut strace = Strace::func(self.enable_strace, "fd_prestat_get");
        strace.arg_dec(fd);
        let result = self.preopen_name(Fd(fd)).and_then(|name| {
            let name_len = u32::try_from(name.len()).map_err(|_| ErrNo::Overflow)?;
            memory_ref.write_buffer(address, &Prestat { name_len }.pack())
        });
        strace.arg_prestat_out(result, memory_ref, address);
        strace.result(result)
    }

    /// The implementation of the WASI `fd_prestat_dir_name` function.  Writes
    /// the name without a terminator.
    pub fn fd_prestat_dir_name<T: MemoryHandler>(
        &self,
        memory_ref: &mut T,
        fd: u32,
        address: u32,
        size: u32,
    ) -> FileSystemResult<()> {
        let mut strace = Strace::func(self.enable_strace, "fd_prestat_dir_name");
        strace.arg_dec(fd);
        let result = self.preopen_name(Fd(fd)).and_then(|name| {
            if (size as usize) < name.len() {
                return Err(ErrNo::NameTooLong);
            }
            memory_ref.write_buffer(address, name.as_bytes())
        });
        match result {
            Ok(()) => strace.arg_path(memory_ref, address, size),
            Err(_) => strace.arg_dots(),
        }
        strace.arg_dec(size);
        strace.result(result)
    }

    ////////////////////////////////////////////////////////////////////////////
    // Paths.
    ////////////////////////////////////////////////////////////////////////////

    /// The implementation of the WASI `path_open` function.
    ///
    /// The new descriptor's rights are the requested rights intersected with
    /// the directory's inheriting rights.  The directory must hold
    /// `PATH_OPEN`, and `PATH_CREATE_FILE` when `CREAT` is requested.
    #[allow(clippy::too_many_arguments)]
    pub fn path_open<T: MemoryHandler>(
        &mut self,
        memory_ref: &mut T,
        fd: u32,
        dir_flags: u32,
        path_address: u32,
        path_length: u32,
        oflags: u32,
        fs_rights_base: u64,
        fs_rights_inheriting: u64,
        fd_flags: u32,
        address: u32,
    ) -> FileSystemResult<()> {
        let mut strace = Strace::func(self.enable_strace, "path_open");
        strace.arg_dec(fd);
        strace.arg_hex(dir_flags);
        strace.arg_path(memory_ref, path_address, path_length);
        strace.arg_hex(oflags);
        strace.arg_rights(fs_rights_base);
        strace.arg_rights(fs_rights_inheriting);
        strace.arg_hex(fd_flags);
        let result = (|| -> FileSystemResult<()> {
            let path = memory_ref.read_cstring(path_address, path_length)?;
            let dir_flags: LookupFlags = Self::decode_wasi_arg(dir_flags)?;
            let oflags: OpenFlags = Self::decode_wasi_arg(Self::decode_wasi_arg::<u16, _>(oflags)?)?;
            let fs_rights_base: Rights = Self::decode_wasi_arg(fs_rights_base)?;
            let fs_rights_inheriting: Rights = Self::decode_wasi_arg(fs_rights_inheriting)?;
            let fd_flags: FdFlags = Self::decode_wasi_arg(Self::decode_wasi_arg::<u16, _>(fd_flags)?)?;
            memory_ref.check_range(address, size_of::<u32>() as u32)?;
            let new_fd = self.open(
                Fd(fd),
                dir_flags,
                &path,
                oflags,
                fs_rights_base,
                fs_rights_inheriting,
                fd_flags,
            )?;
            memory_ref.write_u32(address, new_fd.into())
        })();
        strace.arg_p_u32(result, memory_ref, address);
        strace.result(result)
    }

    #[allow(clippy::too_many_arguments)]
    fn open(
        &mut self,
        dir_fd: Fd,
        dir_flags: LookupFlags,
        path: &str,
        oflags: OpenFlags,
        rights_base: Rights,
        rights_inheriting: Rights,
        fd_flags: FdFlags,
    ) -> FileSystemResult<Fd> {
        let directory = self.table.lookup(dir_fd)?;
        directory.directory()?;
        directory.require(Rights::PATH_OPEN)?;
        if oflags.contains(OpenFlags::CREAT) {
            directory.require(Rights::PATH_CREATE_FILE)?;
        }
        // Truncating resizes the file, which the directory must allow.
        if oflags.contains(OpenFlags::TRUNC) {
            directory.require(Rights::PATH_FILESTAT_SET_SIZE)?;
        }
        let rights_base = rights_base & directory.rights_inheriting;
        let rights_inheriting = rights_inheriting & directory.rights_inheriting;
        let resolved = path::resolve(&self.table, dir_fd, path, dir_flags)?;

        let existing_dir = fs::metadata(&resolved.host_path)
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if oflags.contains(OpenFlags::DIRECTORY) || existing_dir {
            if oflags.contains(OpenFlags::CREAT | OpenFlags::EXCL) && existing_dir {
                return Err(ErrNo::Exist);
            }
            if oflags.intersects(OpenFlags::CREAT | OpenFlags::TRUNC) {
                return Err(if existing_dir { ErrNo::IsDir } else { ErrNo::Inval });
            }
            if !fs::metadata(&resolved.host_path)?.is_dir() {
                return Err(ErrNo::NotDir);
            }
            let handle = DirectoryHandle {
                root: resolved.root,
                path: resolved.host_path,
                guest_path: None,
            };
            return self.table.allocate(
                DescriptorKind::Directory,
                Resource::Directory(handle),
                rights_base,
                rights_inheriting,
                fd_flags,
            );
        }

        let append = fd_flags.contains(FdFlags::APPEND);
        let write = rights_base.contains(Rights::FD_WRITE)
            || oflags.intersects(OpenFlags::CREAT | OpenFlags::TRUNC);
        let read = rights_base.contains(Rights::FD_READ) || !(write || append);
        let file = OpenOptions::new()
            .read(read)
            .write(write && !append)
            .append(append)
            .create(oflags.contains(OpenFlags::CREAT))
            .create_new(oflags.contains(OpenFlags::CREAT | OpenFlags::EXCL))
            .truncate(oflags.contains(OpenFlags::TRUNC))
            .open(&resolved.host_path)?;
        debug!("opened {:?} for the guest path {:?}", resolved.host_path, path);
        self.table.allocate(
            DescriptorKind::RegularFile,
            Resource::File(file),
            rights_base,
            rights_inheriting,
            fd_flags,
        )
    }

    ////////////////////////////////////////////////////////////////////////////
    // Process.
    ////////////////////////////////////////////////////////////////////////////

    /// The implementation of the WASI `proc_exit` function.  Records the exit
    /// code; stopping the guest is up to the engine, which reads it back with
    /// `exit_code`.
    pub fn proc_exit(&mut self, exit_code: u32) -> FileSystemResult<()> {
        let mut strace = Strace::func(self.enable_strace, "proc_exit");
        strace.arg_dec(exit_code);
        info!("guest exited with code {}", exit_code);
        self.exit_code = Some(exit_code);
        strace.result(Ok(()))
    }

    /// Converts a raw argument into a WASI type, or `ErrNo::Inval`.
    #[inline]
    pub(crate) fn decode_wasi_arg<T: TryFrom<R>, R>(arg: R) -> FileSystemResult<T> {
        T::try_from(arg).map_err(|_| ErrNo::Inval)
    }
}
