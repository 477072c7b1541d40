//! Host-side faults.
//!
//! Errors a guest can observe are `ErrNo` values returned as a call's status.
//! The errors here are different: they mean the engine invoked the host layer
//! incorrectly, and the engine should trap rather than hand anything back to
//! the guest.  Instantiation failures are reported separately, as
//! `anyhow::Error`, by `WasiHost::new`.
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

use crate::hcall::WasiAPIName;
use err_derive::Error;
use serde::{Deserialize, Serialize};

/// A fatal, runtime error that terminates the guest's execution.
#[derive(Debug, Error)]
pub enum FatalEngineError {
    /// The engine passed the wrong number or the wrong types of arguments to
    /// a host function.
    #[error(
        display = "FatalEngineError: Bad arguments passed to host function '{:?}'.",
        function_name
    )]
    BadArgumentsToHostFunction {
        /// The name of the host function that was being invoked.
        function_name: WasiAPIName,
    },
    /// The guest tried to import a function this layer does not provide.
    #[error(display = "FatalEngineError: Unknown Host call invoked: '{:?}'.", _0)]
    UnknownHostFunction(HostFunctionIndexOrName),
}

/// Either the index or the name of a host call
#[derive(Debug, Serialize, Deserialize)]
pub enum HostFunctionIndexOrName {
    Index(usize),
    Name(String),
}

impl From<WasiAPIName> for FatalEngineError {
    fn from(error: WasiAPIName) -> Self {
        FatalEngineError::BadArgumentsToHostFunction {
            function_name: error,
        }
    }
}
