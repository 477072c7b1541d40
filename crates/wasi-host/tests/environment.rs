//! Tests for the argument and environment syscalls.
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
use wasi_host::{ErrNo, MemoryHandler, WasiConfiguration};

#[test]
fn environ_sizes_of_three_variables() {
    let mut host = host(
        WasiConfiguration::builder()
            .env("FOO", "BAR")
            .env("WASM", "IS")
            .env("VERY", "COOL")
            .build(),
    );
    let mut memory = memory();
    let status = call(&mut host, &mut memory, "environ_sizes_get", &[RESULT_ADDRESS, RESULT_ADDRESS_2]);
    assert_eq!(status, ErrNo::Success);
    assert_eq!(memory.read_u32(RESULT_ADDRESS), Ok(3));
    assert_eq!(memory.read_u32(RESULT_ADDRESS_2), Ok(26));
}

#[test]
fn environ_get_writes_key_value_strings() {
    let mut host = host(
        WasiConfiguration::builder()
            .env("FOO", "BAR")
            .env("WASM", "IS")
            .env("VERY", "COOL")
            .build(),
    );
    let mut memory = memory();
    let status = call(&mut host, &mut memory, "environ_get", &[POINTERS_ADDRESS, DATA_ADDRESS]);
    assert_eq!(status, ErrNo::Success);
    assert_eq!(
        read_string_list(&memory, POINTERS_ADDRESS, 3),
        vec!["FOO=BAR", "WASM=IS", "VERY=COOL"]
    );
    assert_eq!(memory.read_u32(POINTERS_ADDRESS), Ok(DATA_ADDRESS));
    assert_eq!(
        &memory[DATA_ADDRESS as usize..DATA_ADDRESS as usize + 26],
        &b"FOO=BAR\0WASM=IS\0VERY=COOL\0"[..]
    );
    // Nothing past the reported size is written.
    assert_eq!(memory[DATA_ADDRESS as usize + 26], 0);
}

#[test]
fn environ_sizes_match_the_strings_written() {
    let configurations: Vec<Vec<(&str, &str)>> = vec![
        vec![],
        vec![("A", "")],
        vec![("PATH", "/usr/bin:/bin"), ("HOME", "/home/guest")],
        vec![("K", "v"), ("K", "w"), ("LONG_NAME", "with spaces and = signs")],
    ];
    for pairs in configurations {
        let mut host = host(WasiConfiguration::builder().environment_variables(pairs.clone()).build());
        let mut memory = memory();
        assert_eq!(
            call(&mut host, &mut memory, "environ_sizes_get", &[RESULT_ADDRESS, RESULT_ADDRESS_2]),
            ErrNo::Success
        );
        let count = memory.read_u32(RESULT_ADDRESS).unwrap();
        let size = memory.read_u32(RESULT_ADDRESS_2).unwrap();
        let expected: usize = pairs.iter().map(|(k, v)| k.len() + v.len() + 2).sum();
        assert_eq!(count as usize, pairs.len());
        assert_eq!(size as usize, expected);

        assert_eq!(
            call(&mut host, &mut memory, "environ_get", &[POINTERS_ADDRESS, DATA_ADDRESS]),
            ErrNo::Success
        );
        let strings = read_string_list(&memory, POINTERS_ADDRESS, count);
        let written: usize = strings.iter().map(|s| s.len() + 1).sum();
        assert_eq!(written, size as usize);
        for (string, (key, value)) in strings.iter().zip(pairs.iter()) {
            assert_eq!(string, &format!("{}={}", key, value));
        }
    }
}

#[test]
fn args_sizes_of_four_arguments() {
    let mut host = host(WasiConfiguration::builder().args(vec!["WASM", "IS", "VERY", "COOL"]).build());
    let mut memory = memory();
    let status = call(&mut host, &mut memory, "args_sizes_get", &[RESULT_ADDRESS, RESULT_ADDRESS_2]);
    assert_eq!(status, ErrNo::Success);
    assert_eq!(memory.read_u32(RESULT_ADDRESS), Ok(4));
    assert_eq!(memory.read_u32(RESULT_ADDRESS_2), Ok(18));

    let status = call(&mut host, &mut memory, "args_get", &[POINTERS_ADDRESS, DATA_ADDRESS]);
    assert_eq!(status, ErrNo::Success);
    assert_eq!(
        read_string_list(&memory, POINTERS_ADDRESS, 4),
        vec!["WASM", "IS", "VERY", "COOL"]
    );
    assert_eq!(memory.read_u32(POINTERS_ADDRESS + 4), Ok(DATA_ADDRESS + 5));
}

#[test]
fn empty_lists() {
    let mut host = host(WasiConfiguration::builder().build());
    let mut memory = memory();
    memory.write_u32(RESULT_ADDRESS, 0xdead).unwrap();
    memory.write_u32(RESULT_ADDRESS_2, 0xbeef).unwrap();
    assert_eq!(
        call(&mut host, &mut memory, "args_sizes_get", &[RESULT_ADDRESS, RESULT_ADDRESS_2]),
        ErrNo::Success
    );
    assert_eq!(memory.read_u32(RESULT_ADDRESS), Ok(0));
    assert_eq!(memory.read_u32(RESULT_ADDRESS_2), Ok(0));

    let before = memory.clone();
    assert_eq!(
        call(&mut host, &mut memory, "environ_get", &[POINTERS_ADDRESS, DATA_ADDRESS]),
        ErrNo::Success
    );
    assert_eq!(memory, before);
}

#[test]
fn out_of_bounds_outputs_fault_without_writing() {
    let mut host = host(WasiConfiguration::builder().args(vec!["a", "b"]).build());
    let mut memory = memory();
    memory.write_u32(RESULT_ADDRESS, 0xdead).unwrap();
    let end = MEMORY_SIZE as u32;
    assert_eq!(
        call(&mut host, &mut memory, "args_sizes_get", &[RESULT_ADDRESS, end - 2]),
        ErrNo::Fault
    );
    assert_eq!(memory.read_u32(RESULT_ADDRESS), Ok(0xdead));

    let before = memory.clone();
    assert_eq!(
        call(&mut host, &mut memory, "args_get", &[POINTERS_ADDRESS, end - 3]),
        ErrNo::Fault
    );
    assert_eq!(
        call(&mut host, &mut memory, "args_get", &[end - 4, DATA_ADDRESS]),
        ErrNo::Fault
    );
    assert_eq!(memory, before);
}

#[test]
fn explicit_values_win_over_inheritance() {
    let config = WasiConfiguration::builder()
        .inherit_args()
        .arg("only")
        .inherit_env()
        .env("ONLY", "this")
        .build();
    let mut host = host(config);
    let mut memory = memory();
    call(&mut host, &mut memory, "args_sizes_get", &[RESULT_ADDRESS, RESULT_ADDRESS_2]);
    assert_eq!(memory.read_u32(RESULT_ADDRESS), Ok(1));
    call(&mut host, &mut memory, "environ_sizes_get", &[RESULT_ADDRESS, RESULT_ADDRESS_2]);
    assert_eq!(memory.read_u32(RESULT_ADDRESS), Ok(1));
    assert_eq!(memory.read_u32(RESULT_ADDRESS_2), Ok(10));
}

#[test]
fn environ_sizes_with_aliased_outputs() {
    let mut host = host(WasiConfiguration::builder().env("A", "B").build());
    let mut memory = memory();
    // Both outputs at the same address: the size is written last.
    assert_eq!(
        call(&mut host, &mut memory, "environ_sizes_get", &[RESULT_ADDRESS, RESULT_ADDRESS]),
        ErrNo::Success
    );
    assert_eq!(memory.read_u32(RESULT_ADDRESS), Ok(4));
}
