//! Shared helpers for the syscall tests.
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

#![allow(dead_code)]

use wasi_host::{
    types::{LookupFlags, OpenFlags, Rights},
    ErrNo, Fd, HostValue, MemoryHandler, WasiConfiguration, WasiHost,
};

/// The size of the guest memory used by the tests: one WASM page.
pub const MEMORY_SIZE: usize = 64 * 1024;

/// Where paths are placed.
pub const PATH_ADDRESS: u32 = 0x100;
/// Where iovec arrays are placed.
pub const IOVEC_ADDRESS: u32 = 0x200;
/// Where scalar results are written.
pub const RESULT_ADDRESS: u32 = 0x300;
/// A second scalar result.
pub const RESULT_ADDRESS_2: u32 = 0x308;
/// Where pointer arrays are written.
pub const POINTERS_ADDRESS: u32 = 0x400;
/// Where data buffers start.
pub const DATA_ADDRESS: u32 = 0x1000;

pub fn init_logger() {
    let _ = env_logger::Builder::from_default_env()
        .write_style(env_logger::fmt::WriteStyle::Always)
        .is_test(true)
        .try_init();
}

/// A zeroed guest memory.
pub fn memory() -> Vec<u8> {
    vec![0u8; MEMORY_SIZE]
}

pub fn host(config: WasiConfiguration) -> WasiHost {
    init_logger();
    WasiHost::new(config).expect("failed to instantiate the WASI host")
}

/// Calls the WASI function `name` with `i32` arguments only.
pub fn call(host: &mut WasiHost, memory: &mut Vec<u8>, name: &str, args: &[u32]) -> ErrNo {
    let args = args.iter().copied().map(HostValue::I32).collect::<Vec<_>>();
    host.invoke_by_name(memory, name, &args)
        .expect("host call rejected its arguments")
}

/// Lays out `iovecs` as an iovec array at `IOVEC_ADDRESS`.
pub fn put_iovecs(memory: &mut Vec<u8>, iovecs: &[(u32, u32)]) {
    for (i, (buf, len)) in iovecs.iter().enumerate() {
        let entry = IOVEC_ADDRESS + 8 * i as u32;
        memory.write_u32(entry, *buf).unwrap();
        memory.write_u32(entry + 4, *len).unwrap();
    }
}

/// Opens `path` beneath `dir_fd` without following a final symlink,
/// returning the new descriptor.
pub fn path_open(
    host: &mut WasiHost,
    memory: &mut Vec<u8>,
    dir_fd: Fd,
    path: &str,
    oflags: OpenFlags,
    rights: Rights,
) -> Result<Fd, ErrNo> {
    path_open_with_lookup(host, memory, dir_fd, LookupFlags::empty(), path, oflags, rights)
}

pub fn path_open_with_lookup(
    host: &mut WasiHost,
    memory: &mut Vec<u8>,
    dir_fd: Fd,
    lookup_flags: LookupFlags,
    path: &str,
    oflags: OpenFlags,
    rights: Rights,
) -> Result<Fd, ErrNo> {
    memory.write_buffer(PATH_ADDRESS, path.as_bytes()).unwrap();
    let args = [
        HostValue::I32(dir_fd.into()),
        HostValue::I32(lookup_flags.bits()),
        HostValue::I32(PATH_ADDRESS),
        HostValue::I32(path.len() as u32),
        HostValue::I32(u32::from(oflags.bits())),
        HostValue::I64(rights.bits()),
        HostValue::I64(rights.bits()),
        HostValue::I32(0),
        HostValue::I32(RESULT_ADDRESS),
    ];
    match host.invoke_by_name(memory, "path_open", &args).unwrap() {
        ErrNo::Success => Ok(Fd(memory.read_u32(RESULT_ADDRESS).unwrap())),
        errno => Err(errno),
    }
}

/// Writes `data` to `fd` with a single iovec, returning the status and the
/// reported byte count.
pub fn fd_write(host: &mut WasiHost, memory: &mut Vec<u8>, fd: Fd, data: &[u8]) -> (ErrNo, u32) {
    memory.write_buffer(DATA_ADDRESS, data).unwrap();
    put_iovecs(memory, &[(DATA_ADDRESS, data.len() as u32)]);
    let status = call(host, memory, "fd_write", &[fd.into(), IOVEC_ADDRESS, 1, RESULT_ADDRESS]);
    (status, memory.read_u32(RESULT_ADDRESS).unwrap())
}

/// Reads up to `len` bytes from `fd` with a single iovec.
pub fn fd_read(host: &mut WasiHost, memory: &mut Vec<u8>, fd: Fd, len: u32) -> Result<Vec<u8>, ErrNo> {
    put_iovecs(memory, &[(DATA_ADDRESS, len)]);
    match call(host, memory, "fd_read", &[fd.into(), IOVEC_ADDRESS, 1, RESULT_ADDRESS]) {
        ErrNo::Success => {
            let read = memory.read_u32(RESULT_ADDRESS).unwrap();
            Ok(memory.read_buffer(DATA_ADDRESS, read).unwrap())
        }
        errno => Err(errno),
    }
}

/// Reads the NUL-terminated strings whose addresses are stored at `pointers`.
pub fn read_string_list(memory: &Vec<u8>, pointers: u32, count: u32) -> Vec<String> {
    (0..count)
        .map(|i| {
            let address = memory.read_u32(pointers + 4 * i).unwrap();
            memory.read_null_terminated_string(address).unwrap()
        })
        .collect()
}
