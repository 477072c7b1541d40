//! The host side of WASI preview1
//!
//! This crate implements the `wasi_snapshot_preview1` system calls a WASM
//! execution engine exposes to its guest: program arguments and environment,
//! descriptor I/O over the standard streams and over files beneath preopened
//! directories, and `proc_exit`.  The engine owns the guest's linear memory
//! and lends it to every call through the `MemoryHandler` trait; this crate
//! owns the descriptor table and the host handles behind it.
//!
//! A typical embedding builds a `WasiConfiguration`, instantiates a `WasiHost`
//! from it, and routes every import of the `wasi_snapshot_preview1` module to
//! `WasiHost::invoke`.
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

#[macro_use]
extern crate num_derive;

pub mod config;
pub mod error;
pub mod fd_table;
pub mod hcall;
pub mod memory;
pub mod path;
pub mod strace;
pub mod types;
pub mod wasi;

pub use config::{Preopen, StdioRedirect, WasiConfiguration, WasiConfigurationBuilder};
// Expose the error to the external.
pub use error::{FatalEngineError, HostFunctionIndexOrName};
pub use hcall::{HostValue, TypeCheck, ValueType, WasiAPIName, WASI_SNAPSHOT_MODULE_NAME};
pub use memory::{LinearMemoryView, MemoryHandler};
pub use types::{ErrNo, Fd, FileSystemResult};
pub use wasi::WasiHost;
