//! Dispatch from the engine's import calls to the handlers.
//!
//! An engine links each import of the `wasi_snapshot_preview1` module to a
//! `WasiAPIName`, checks the import's signature with `TypeCheck`, and
//! forwards calls through `WasiHost::invoke` with the raw argument values.
//! The name to handler mapping is a static `match`.
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
    error::{FatalEngineError, HostFunctionIndexOrName},
    memory::MemoryHandler,
    types::{ErrNo, FileSystemResult},
    wasi::WasiHost,
};
use log::trace;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use strum_macros::{EnumIter, EnumString, IntoStaticStr};

////////////////////////////////////////////////////////////////////////////////
// Common constants.
////////////////////////////////////////////////////////////////////////////////

/// The name of the containing module for all WASI imports.
pub const WASI_SNAPSHOT_MODULE_NAME: &str = "wasi_snapshot_preview1";

/// List of WASI API.
#[allow(non_camel_case_types)]
#[derive(
    Debug,
    PartialEq,
    Eq,
    Hash,
    Clone,
    Copy,
    FromPrimitive,
    ToPrimitive,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum WasiAPIName {
    ARGS_GET = 1,
    ARGS_SIZES_GET,
    ENVIRON_GET,
    ENVIRON_SIZES_GET,
    FD_CLOSE,
    FD_FDSTAT_GET,
    FD_PRESTAT_GET,
    FD_PRESTAT_DIR_NAME,
    FD_READ,
    FD_SEEK,
    FD_TELL,
    FD_WRITE,
    PATH_OPEN,
    PROC_EXIT,
}

impl WasiAPIName {
    /// The WASI name of the function, as imported by the guest.
    #[inline]
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// The host call with index `index`, as returned by `index`.
    #[inline]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::from_usize(index)
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for WasiAPIName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Values and types.
////////////////////////////////////////////////////////////////////////////////

/// The WASM value types used by WASI preview1 signatures.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ValueType {
    I32,
    I64,
}

/// A raw argument passed by the engine.  Signed WASM values are carried by
/// their bit pattern.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum HostValue {
    I32(u32),
    I64(u64),
}

impl HostValue {
    #[inline]
    pub fn value_type(&self) -> ValueType {
        match self {
            HostValue::I32(_) => ValueType::I32,
            HostValue::I64(_) => ValueType::I64,
        }
    }
}

impl From<u32> for HostValue {
    #[inline]
    fn from(value: u32) -> Self {
        HostValue::I32(value)
    }
}

impl From<u64> for HostValue {
    #[inline]
    fn from(value: u64) -> Self {
        HostValue::I64(value)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Signatures.
////////////////////////////////////////////////////////////////////////////////

pub struct TypeCheck {}

impl TypeCheck {
    /// The representation type of the WASI `ErrNo` type.
    pub const ERRNO: ValueType = ValueType::I32;
    /// The representation type of the WASI `ExitCode` type.
    const EXITCODE: ValueType = ValueType::I32;
    /// The representation type of the WASI `FD` type.
    const FD: ValueType = ValueType::I32;
    /// The representation type of the WASI `FDFlags` type.
    const FDFLAGS: ValueType = ValueType::I32;
    /// The representation type of the WASI `FileDelta` type.
    const FILEDELTA: ValueType = ValueType::I64;
    /// The base pointer representation type of the WASI `IOVecArray` type, which
    /// is passed as a pair of base address and length.
    const IOVEC_ARRAY_BASE: ValueType = ValueType::I32;
    /// The length representation type of the WASI `IOVecArray` type, which is
    /// passed as a pair of base address and length.
    const IOVEC_ARRAY_LENGTH: ValueType = ValueType::I32;
    /// The representation type of the WASI `LookupFlags` type.
    const LOOKUP_FLAGS: ValueType = ValueType::I32;
    /// The representation type of the WASI `OFlags` type.
    const OFLAGS: ValueType = ValueType::I32;
    /// The representation type of the WASI `Rights` type.
    const RIGHTS: ValueType = ValueType::I64;
    /// The representation type of the WASI `Size` type.
    const SIZE: ValueType = ValueType::I32;
    /// The representation type of the WASI `Whence` type.
    const WHENCE: ValueType = ValueType::I32;
    /// The representation type of WASM pointers (assuming `wasm32`).
    const POINTER: ValueType = ValueType::I32;

    /// The parameter types of the host call `index`.
    pub fn get_params(index: WasiAPIName) -> Vec<ValueType> {
        match index {
            WasiAPIName::ARGS_GET => vec![Self::POINTER, Self::POINTER],
            WasiAPIName::ARGS_SIZES_GET => vec![Self::POINTER, Self::POINTER],
            WasiAPIName::ENVIRON_GET => vec![Self::POINTER, Self::POINTER],
            WasiAPIName::ENVIRON_SIZES_GET => vec![Self::POINTER, Self::POINTER],
            WasiAPIName::FD_CLOSE => vec![Self::FD],
            WasiAPIName::FD_FDSTAT_GET => vec![Self::FD, Self::POINTER],
            WasiAPIName::FD_PRESTAT_GET => vec![Self::FD, Self::POINTER],
            WasiAPIName::FD_PRESTAT_DIR_NAME => vec![Self::FD, Self::POINTER, Self::SIZE],
            WasiAPIName::FD_READ => vec![
                Self::FD,
                Self::IOVEC_ARRAY_BASE,
                Self::IOVEC_ARRAY_LENGTH,
                Self::POINTER,
            ],
            WasiAPIName::FD_SEEK => vec![Self::FD, Self::FILEDELTA, Self::WHENCE, Self::POINTER],
            WasiAPIName::FD_TELL => vec![Self::FD, Self::POINTER],
            WasiAPIName::FD_WRITE => vec![
                Self::FD,
                Self::IOVEC_ARRAY_BASE,
                Self::IOVEC_ARRAY_LENGTH,
                Self::POINTER,
            ],
            WasiAPIName::PATH_OPEN => vec![
                Self::FD,
                Self::LOOKUP_FLAGS,
                Self::POINTER,
                Self::SIZE,
                Self::OFLAGS,
                Self::RIGHTS,
                Self::RIGHTS,
                Self::FDFLAGS,
                Self::POINTER,
            ],
            WasiAPIName::PROC_EXIT => vec![Self::EXITCODE],
        }
    }

    /// The result type of the host call `index`.  Apart from proc_exit, which
    /// has no return, the rest return ErrNo.
    pub fn get_result(index: WasiAPIName) -> Option<ValueType> {
        match index {
            WasiAPIName::PROC_EXIT => None,
            _otherwise => Some(Self::ERRNO),
        }
    }

    /// Checks the function signature has the correct type for the host call
    /// coded by `index`.
    pub fn check_signature(index: WasiAPIName, params: &[ValueType], result: Option<ValueType>) -> bool {
        params == Self::get_params(index).as_slice() && result == Self::get_result(index)
    }

    /// Checks the number and the types of `args` against the host call `index`.
    pub fn check_args(args: &[HostValue], index: WasiAPIName) -> Result<(), FatalEngineError> {
        let expected = Self::get_params(index);
        let matches = args.len() == expected.len()
            && args
                .iter()
                .zip(expected.iter())
                .all(|(arg, ty)| arg.value_type() == *ty);
        if matches {
            Ok(())
        } else {
            Err(index.into())
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Dispatch.
////////////////////////////////////////////////////////////////////////////////

/// Reads the `n`th argument, already checked to be an `i32`.
#[inline]
fn nth_u32(args: &[HostValue], n: usize) -> u32 {
    match args.get(n) {
        Some(HostValue::I32(value)) => *value,
        _otherwise => 0,
    }
}

/// Reads the `n`th argument, already checked to be an `i64`.
#[inline]
fn nth_u64(args: &[HostValue], n: usize) -> u64 {
    match args.get(n) {
        Some(HostValue::I64(value)) => *value,
        _otherwise => 0,
    }
}

impl WasiHost {
    /// Invokes the host call `index` with `args`, returning the status to hand
    /// back to the guest.  A malformed argument list is a fatal error rather
    /// than a status.
    pub fn invoke<T: MemoryHandler>(
        &mut self,
        memory_ref: &mut T,
        index: WasiAPIName,
        args: &[HostValue],
    ) -> Result<ErrNo, FatalEngineError> {
        TypeCheck::check_args(args, index)?;
        trace!("invoking {} with {:?}", index, args);
        let a = |n| nth_u32(args, n);
        let result = match index {
            WasiAPIName::ARGS_GET => self.args_get(memory_ref, a(0), a(1)),
            WasiAPIName::ARGS_SIZES_GET => self.args_sizes_get(memory_ref, a(0), a(1)),
            WasiAPIName::ENVIRON_GET => self.environ_get(memory_ref, a(0), a(1)),
            WasiAPIName::ENVIRON_SIZES_GET => self.environ_sizes_get(memory_ref, a(0), a(1)),
            WasiAPIName::FD_CLOSE => self.fd_close(a(0)),
            WasiAPIName::FD_FDSTAT_GET => self.fd_fdstat_get(memory_ref, a(0), a(1)),
            WasiAPIName::FD_PRESTAT_GET => self.fd_prestat_get(memory_ref, a(0), a(1)),
            WasiAPIName::FD_PRESTAT_DIR_NAME => {
                self.fd_prestat_dir_name(memory_ref, a(0), a(1), a(2))
            }
            WasiAPIName::FD_READ => self.fd_read(memory_ref, a(0), a(1), a(2), a(3)),
            WasiAPIName::FD_SEEK => {
                self.fd_seek(memory_ref, a(0), nth_u64(args, 1), a(2), a(3))
            }
            WasiAPIName::FD_TELL => self.fd_tell(memory_ref, a(0), a(1)),
            WasiAPIName::FD_WRITE => self.fd_write(memory_ref, a(0), a(1), a(2), a(3)),
            WasiAPIName::PATH_OPEN => self.path_open(
                memory_ref,
                a(0),
                a(1),
                a(2),
                a(3),
                a(4),
                nth_u64(args, 5),
                nth_u64(args, 6),
                a(7),
                a(8),
            ),
            WasiAPIName::PROC_EXIT => self.proc_exit(a(0)),
        };
        Ok(Self::convert_to_errno(result))
    }

    /// As `invoke`, with the host call named by its WASI function name.
    pub fn invoke_by_name<T: MemoryHandler>(
        &mut self,
        memory_ref: &mut T,
        name: &str,
        args: &[HostValue],
    ) -> Result<ErrNo, FatalEngineError> {
        let index = WasiAPIName::from_str(name).map_err(|_| {
            FatalEngineError::UnknownHostFunction(HostFunctionIndexOrName::Name(name.to_string()))
        })?;
        self.invoke(memory_ref, index, args)
    }

    /// As `invoke`, with the host call given by its numeric index.
    pub fn invoke_index<T: MemoryHandler>(
        &mut self,
        memory_ref: &mut T,
        index: usize,
        args: &[HostValue],
    ) -> Result<ErrNo, FatalEngineError> {
        let wasi_call_index = WasiAPIName::from_index(index).ok_or(
            FatalEngineError::UnknownHostFunction(HostFunctionIndexOrName::Index(index)),
        )?;
        self.invoke(memory_ref, wasi_call_index, args)
    }

    fn convert_to_errno(input: FileSystemResult<()>) -> ErrNo {
        match input {
            Ok(_) => ErrNo::Success,
            Err(e) => e,
        }
    }
}
