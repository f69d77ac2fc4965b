#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must produce an error, never a panic.
    let _ = tessera_spirv::parse_bytes(data, "main", &tessera_spirv::Options::default());
});
