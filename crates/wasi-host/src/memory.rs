//! Access to the guest's linear memory.
//!
//! Every syscall handler reads its arguments from, and writes its results to,
//! the guest's linear memory through the `MemoryHandler` trait.  The engine
//! owns the memory; this layer only borrows it for the duration of a call, and
//! every access is checked against the memory's current size.
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

use crate::types::{ErrNo, FileSystemResult, Unpack};
use byteorder::{ByteOrder, LittleEndian};
use std::{convert::TryFrom, mem::size_of};

/// How many bytes `read_null_terminated_string` inspects per step.
const SCAN_CHUNK_SIZE: u32 = 256;

/// The memory handler for interacting with the wasm memory space.  An
/// execution engine implements `memory_size`, `read_buffer` and
/// `write_buffer`; everything else is derived from those three.
///
/// Accesses whose range `[address, address + length)` does not lie entirely
/// within the memory fail with `ErrNo::Fault`.  Memory never grows as a side
/// effect of an access.
pub trait MemoryHandler {
    /// The current size of the memory in bytes.
    fn memory_size(&self) -> usize;
    /// Write the `buffer` to `address`.
    fn write_buffer(&mut self, address: u32, buffer: &[u8]) -> FileSystemResult<()>;
    /// Read `length` bytes from `address`.
    fn read_buffer(&self, address: u32, length: u32) -> FileSystemResult<Vec<u8>>;

    /// Checks that `[address, address + length)` lies within the memory.
    #[inline]
    fn check_range(&self, address: u32, length: u32) -> FileSystemResult<()> {
        let end = (address as usize)
            .checked_add(length as usize)
            .ok_or(ErrNo::Fault)?;
        if end > self.memory_size() {
            Err(ErrNo::Fault)
        } else {
            Ok(())
        }
    }

    /// Reads a little-endian `u32` from `address`.
    fn read_u32(&self, address: u32) -> FileSystemResult<u32> {
        let bytes = self.read_buffer(address, size_of::<u32>() as u32)?;
        Ok(LittleEndian::read_u32(&bytes))
    }

    /// Reads a little-endian `u64` from `address`.
    fn read_u64(&self, address: u32) -> FileSystemResult<u64> {
        let bytes = self.read_buffer(address, size_of::<u64>() as u32)?;
        Ok(LittleEndian::read_u64(&bytes))
    }

    /// Writes `number` to `address` in little-endian order.
    fn write_u32(&mut self, address: u32, number: u32) -> FileSystemResult<()> {
        self.write_buffer(address, &u32::to_le_bytes(number))
    }

    /// Writes `number` to `address` in little-endian order.
    fn write_u64(&mut self, address: u32, number: u64) -> FileSystemResult<()> {
        self.write_buffer(address, &u64::to_le_bytes(number))
    }

    /// Reads a string of `length` bytes at `address`.  Fails with
    /// `ErrNo::IlSeq` if the bytes are not valid UTF-8.
    fn read_cstring(&self, address: u32, length: u32) -> FileSystemResult<String> {
        let bytes = self.read_buffer(address, length)?;
        String::from_utf8(bytes).map_err(|_e| ErrNo::IlSeq)
    }

    /// Reads the NUL-terminated string starting at `address`, without the
    /// terminator.  Fails with `ErrNo::Fault` if memory ends before a NUL byte
    /// is found.
    fn read_null_terminated_string(&self, address: u32) -> FileSystemResult<String> {
        let size = self.memory_size();
        let mut bytes = Vec::new();
        let mut cursor = address as usize;
        while cursor < size {
            let step = usize::min(SCAN_CHUNK_SIZE as usize, size - cursor) as u32;
            let chunk = self.read_buffer(cursor as u32, step)?;
            if let Some(nul) = chunk.iter().position(|b| *b == 0) {
                bytes.extend_from_slice(&chunk[..nul]);
                return String::from_utf8(bytes).map_err(|_e| ErrNo::IlSeq);
            }
            bytes.extend_from_slice(&chunk);
            cursor += step as usize;
        }
        Err(ErrNo::Fault)
    }

    /// Reads an array of `count` encoded `T` values starting at `ptr`.  Fails
    /// if reading any of them fails, for any reason.
    fn unpack_array<T: Unpack>(&self, ptr: u32, count: u32) -> FileSystemResult<Vec<T>> {
        let total = (T::SIZE as u64) * (count as u64);
        let total = u32::try_from(total).map_err(|_| ErrNo::Fault)?;
        let all_bytes = self.read_buffer(ptr, total)?;
        all_bytes.chunks(T::SIZE).map(T::unpack).collect()
    }

    /// Write the content to the buf_address and the starting address to buf_pointers.
    /// For example:
    /// buf_address:
    /// --------------------------------------------------------------------
    ///  content[0] content[1] ......
    /// --------------------------------------------------------------------
    ///    ^           ^
    ///   0x10        0x64
    /// buf_pointers: [0x10, 0x64, ...]
    ///
    /// Both regions are validated before anything is written, so on failure
    /// the memory is left untouched.
    fn write_string_list(
        &mut self,
        content: &[Vec<u8>],
        buf_address: u32,
        buf_pointers: u32,
    ) -> FileSystemResult<()> {
        let total: usize = content.iter().map(Vec::len).sum();
        let total = u32::try_from(total).map_err(|_| ErrNo::Overflow)?;
        let pointers_len = u32::try_from(content.len() * size_of::<u32>())
            .map_err(|_| ErrNo::Overflow)?;
        self.check_range(buf_address, total)?;
        self.check_range(buf_pointers, pointers_len)?;

        let mut strings = Vec::with_capacity(total as usize);
        let mut pointers = Vec::with_capacity(pointers_len as usize);
        let mut next = buf_address;
        for to_write in content {
            pointers.extend_from_slice(&next.to_le_bytes());
            strings.extend_from_slice(to_write);
            next = next.wrapping_add(to_write.len() as u32);
        }
        debug_assert_eq!(strings.len(), total as usize);

        self.write_buffer(buf_address, &strings)?;
        self.write_buffer(buf_pointers, &pointers)
    }
}

/// A view over a guest memory buffer borrowed from the engine for the
/// duration of one call.
#[derive(Debug)]
pub struct LinearMemoryView<'a> {
    bytes: &'a mut [u8],
}

impl<'a> LinearMemoryView<'a> {
    #[inline]
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes }
    }

    /// The underlying bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        self.bytes
    }
}

/// Computes the in-bounds range for an access, or `ErrNo::Fault`.
#[inline]
fn bounded(size: usize, address: u32, length: usize) -> FileSystemResult<std::ops::Range<usize>> {
    let start = address as usize;
    let end = start.checked_add(length).ok_or(ErrNo::Fault)?;
    if end > size {
        return Err(ErrNo::Fault);
    }
    Ok(start..end)
}

impl MemoryHandler for LinearMemoryView<'_> {
    #[inline]
    fn memory_size(&self) -> usize {
        self.bytes.len()
    }

    fn write_buffer(&mut self, address: u32, buffer: &[u8]) -> FileSystemResult<()> {
        let range = bounded(self.bytes.len(), address, buffer.len())?;
        self.bytes[range].copy_from_slice(buffer);
        Ok(())
    }

    fn read_buffer(&self, address: u32, length: u32) -> FileSystemResult<Vec<u8>> {
        let range = bounded(self.bytes.len(), address, length as usize)?;
        Ok(self.bytes[range].to_vec())
    }
}

/// An owned memory, convenient for engines that copy memory in and out and
/// for tests.
impl MemoryHandler for Vec<u8> {
    #[inline]
    fn memory_size(&self) -> usize {
        self.len()
    }

    fn write_buffer(&mut self, address: u32, buffer: &[u8]) -> FileSystemResult<()> {
        LinearMemoryView::new(self.as_mut_slice()).write_buffer(address, buffer)
    }

    fn read_buffer(&self, address: u32, length: u32) -> FileSystemResult<Vec<u8>> {
        let range = bounded(self.len(), address, length as usize)?;
        Ok(self[range].to_vec())
    }
}
