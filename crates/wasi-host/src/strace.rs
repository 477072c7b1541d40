//! System-call tracing.
//!
//! When tracing is enabled each handler builds one line describing its call,
//! in the style of `strace`, e.g. `fd_write(1, "hello\n", 6) = Success`, and
//! emits it through the `log` facade at `info` level.  When tracing is
//! disabled every method is a no-op.
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
    memory::MemoryHandler,
    types::{FileSystemResult, IoVec},
};
use log::info;
use std::fmt::{self, Write};

/// How many bytes of a data buffer are shown.
const MAX_BUFFER_CHARS: usize = 32;
/// How many bytes of a path are shown.
const MAX_PATH_CHARS: usize = 1024;

enum TraceState {
    Func,
    Args,
    Result,
}

pub struct Strace {
    enabled: bool,
    state: TraceState,
    line: String,
}

// Convert a vector of bytes into a printable ASCII string.
// The bytes may be readable text but may also be binary data, so they are not
// decoded as UTF-8.
fn strace_string(bytes: &[u8], max: usize) -> String {
    let mut res = String::from("\"");
    let n = usize::min(bytes.len(), max);
    for (i, byte) in bytes[..n].iter().copied().enumerate() {
        match byte {
            b'\\' | b'"' => {
                res.push('\\');
                res.push(byte as char);
            }
            0x20..=0x7e => res.push(byte as char),
            b'\t' => res.push_str("\\t"),
            b'\n' => res.push_str("\\n"),
            // The following character is a digit, so use three octal digits.
            _ if i + 1 < n && bytes[i + 1].is_ascii_digit() => {
                let _ = write!(res, "\\{:03o}", byte);
            }
            _ => {
                let _ = write!(res, "\\{:o}", byte);
            }
        }
    }
    res.push('"');
    if bytes.len() > max {
        res.push_str("...")
    }
    res
}

impl Strace {
    pub fn func(enabled: bool, name: &str) -> Self {
        let line = if enabled {
            format!("{}(", name)
        } else {
            String::new()
        };
        Strace {
            enabled,
            state: TraceState::Func,
            line,
        }
    }

    /// Prepares for the next argument.  Returns `true` if it should be skipped.
    fn arg(&mut self) -> bool {
        if !self.enabled {
            return true;
        }
        match self.state {
            TraceState::Func => self.state = TraceState::Args,
            TraceState::Args => self.line.push_str(", "),
            TraceState::Result => return true,
        }
        false
    }

    fn push<D: fmt::Display>(&mut self, item: D) {
        let _ = write!(self.line, "{}", item);
    }

    pub fn arg_dec<D: fmt::Display>(&mut self, n: D) {
        if self.arg() {
            return;
        }
        self.push(n)
    }

    pub fn arg_hex<H: fmt::LowerHex>(&mut self, n: H) {
        if self.arg() {
            return;
        }
        let _ = write!(self.line, "0x{:x}", n);
    }

    pub fn arg_rights(&mut self, rights: u64) {
        self.arg_hex(rights)
    }

    pub fn arg_path<T: MemoryHandler>(&mut self, mem: &T, adr: u32, len: u32) {
        if self.arg() {
            return;
        }
        match mem.read_buffer(adr, len) {
            Ok(bytes) => self.push(strace_string(&bytes, MAX_PATH_CHARS)),
            Err(_) => self.push("BAD_MEM_REF"),
        }
    }

    /// The data moved by `fd_read` or `fd_write`: the first `len` bytes of the
    /// iovecs, once the call has completed.
    pub fn arg_iovec<T: MemoryHandler>(
        &mut self,
        res: FileSystemResult<u32>,
        mem: &T,
        base: u32,
        count: u32,
    ) {
        if self.arg() {
            return;
        }
        let len = match res {
            Ok(len) => len as usize,
            Err(_) => {
                self.push("_");
                return;
            }
        };
        // Copies everything, but only when tracing.
        match mem.unpack_array::<IoVec>(base, count) {
            Ok(iovecs) => {
                let mut buf: Vec<u8> = Vec::new();
                for iovec in iovecs {
                    if buf.len() >= len {
                        break;
                    }
                    match mem.read_buffer(iovec.buf, iovec.len) {
                        Ok(bytes) => buf.extend(bytes),
                        Err(_) => break,
                    }
                }
                buf.truncate(len);
                self.push(strace_string(&buf, MAX_BUFFER_CHARS))
            }
            Err(_) => self.push("BAD_IOVEC"),
        }
    }

    /// A `u32` output, shown only when the call succeeded.
    pub fn arg_p_u32<T: MemoryHandler>(&mut self, res: FileSystemResult<()>, mem: &T, adr: u32) {
        if self.arg() {
            return;
        }
        if res.is_err() {
            return self.push("_");
        }
        match mem.read_u32(adr) {
            Ok(x) => self.push(x),
            Err(_) => self.push("BAD_MEM_REF"),
        }
    }

    pub fn arg_p_u64<T: MemoryHandler>(&mut self, res: FileSystemResult<()>, mem: &T, adr: u32) {
        if self.arg() {
            return;
        }
        if res.is_err() {
            return self.push("_");
        }
        match mem.read_u64(adr) {
            Ok(x) => self.push(x),
            Err(_) => self.push("BAD_MEM_REF"),
        }
    }

    pub fn arg_prestat_out<T: MemoryHandler>(
        &mut self,
        res: FileSystemResult<()>,
        mem: &T,
        adr: u32,
    ) {
        if self.arg() {
            return;
        }
        if res.is_err() {
            return self.push("_");
        }
        match mem.read_u64(adr) {
            Ok(x) if x & 0xffff_ffff == 0 => {
                let _ = write!(self.line, "{{len={}}}", x >> 32);
            }
            Ok(_) => self.push("BAD_PRESTAT"),
            Err(_) => self.push("BAD_MEM_REF"),
        }
    }

    pub fn arg_fdstat_out<T: MemoryHandler>(
        &mut self,
        res: FileSystemResult<()>,
        mem: &T,
        adr: u32,
    ) {
        if self.arg() {
            return;
        }
        if res.is_err() {
            return self.push("_");
        }
        match mem.read_buffer(adr, 24) {
            Ok(bytes) => {
                let _ = write!(
                    self.line,
                    "{{type={}, rights=0x{:x}}}",
                    bytes[0],
                    u64::from_le_bytes([
                        bytes[8], bytes[9], bytes[10], bytes[11], bytes[12], bytes[13], bytes[14],
                        bytes[15],
                    ])
                );
            }
            Err(_) => self.push("BAD_MEM_REF"),
        }
    }

    pub fn arg_dots(&mut self) {
        if self.arg() {
            return;
        }
        self.push("...")
    }

    /// Completes the line and emits it.  Returns `result` unchanged.
    pub fn result<R>(&mut self, result: FileSystemResult<R>) -> FileSystemResult<R> {
        if !self.enabled {
            return result;
        }
        if let TraceState::Result = self.state {
            return result;
        }
        self.state = TraceState::Result;
        match &result {
            Ok(_) => self.line.push_str(") = Success"),
            Err(x) => {
                let _ = write!(self.line, ") = {:?}", x);
            }
        }
        info!("{}", self.line);
        result
    }

    /// The line built so far.
    #[inline]
    pub fn line(&self) -> &str {
        &self.line
    }
}
