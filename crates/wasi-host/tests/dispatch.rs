//! Tests for dispatching host calls by name and by index.
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

mod common;

use common::util::*;
use wasi_host::{
    ErrNo, FatalEngineError, HostFunctionIndexOrName, HostValue, MemoryHandler, TypeCheck,
    ValueType, WasiAPIName, WasiConfiguration, WASI_SNAPSHOT_MODULE_NAME,
};

#[test]
fn module_name() {
    assert_eq!(WASI_SNAPSHOT_MODULE_NAME, "wasi_snapshot_preview1");
}

#[test]
fn unknown_functions_are_fatal() {
    let mut host = host(WasiConfiguration::builder().build());
    let mut memory = memory();
    match host.invoke_by_name(&mut memory, "sock_accept", &[HostValue::I32(0)]) {
        Err(FatalEngineError::UnknownHostFunction(HostFunctionIndexOrName::Name(name))) => {
            assert_eq!(name, "sock_accept")
        }
        otherwise => panic!("unexpected result {:?}", otherwise),
    }
    match host.invoke_index(&mut memory, 1000, &[]) {
        Err(FatalEngineError::UnknownHostFunction(HostFunctionIndexOrName::Index(1000))) => {}
        otherwise => panic!("unexpected result {:?}", otherwise),
    }
}

#[test]
fn malformed_arguments_are_fatal() {
    let mut host = host(WasiConfiguration::builder().build());
    let mut memory = memory();
    let too_few = host.invoke_by_name(&mut memory, "args_get", &[HostValue::I32(0)]);
    assert!(matches!(
        too_few,
        Err(FatalEngineError::BadArgumentsToHostFunction {
            function_name: WasiAPIName::ARGS_GET
        })
    ));
    let wrong_type = host.invoke_by_name(&mut memory, "fd_close", &[HostValue::I64(1)]);
    assert!(matches!(
        wrong_type,
        Err(FatalEngineError::BadArgumentsToHostFunction {
            function_name: WasiAPIName::FD_CLOSE
        })
    ));
    // Nothing was closed.
    assert_eq!(host.fd_table().len(), 3);
}

#[test]
fn dispatch_by_index_matches_dispatch_by_name() {
    let mut host = host(WasiConfiguration::builder().args(vec!["prog", "-v"]).build());
    let mut memory = memory();
    let args = [HostValue::I32(RESULT_ADDRESS), HostValue::I32(RESULT_ADDRESS_2)];
    let index = WasiAPIName::ARGS_SIZES_GET.index();
    assert_eq!(host.invoke_index(&mut memory, index, &args).unwrap(), ErrNo::Success);
    assert_eq!(memory.read_u32(RESULT_ADDRESS), Ok(2));
    assert_eq!(memory.read_u32(RESULT_ADDRESS_2), Ok(8));
}

#[test]
fn signatures_cover_every_function() {
    for name in &[
        "args_get",
        "args_sizes_get",
        "environ_get",
        "environ_sizes_get",
        "fd_close",
        "fd_fdstat_get",
        "fd_prestat_get",
        "fd_prestat_dir_name",
        "fd_read",
        "fd_seek",
        "fd_tell",
        "fd_write",
        "path_open",
        "proc_exit",
    ] {
        let api = name.parse::<WasiAPIName>().unwrap();
        assert_eq!(api.name(), *name);
        let params = TypeCheck::get_params(api);
        assert!(params.iter().all(|p| *p == ValueType::I32 || *p == ValueType::I64));
    }
}

#[test]
fn tracing_does_not_change_results() {
    let mut host = host(
        WasiConfiguration::builder()
            .env("TRACE", "on")
            .strace(true)
            .build(),
    );
    let mut memory = memory();
    assert_eq!(
        call(&mut host, &mut memory, "environ_sizes_get", &[RESULT_ADDRESS, RESULT_ADDRESS_2]),
        ErrNo::Success
    );
    assert_eq!(memory.read_u32(RESULT_ADDRESS_2), Ok(9));
    assert_eq!(call(&mut host, &mut memory, "fd_close", &[42]), ErrNo::BadF);
    let (status, written) = fd_write(&mut host, &mut memory, wasi_host::Fd(1), b"traced\n");
    assert_eq!((status, written), (ErrNo::Success, 7));
}
