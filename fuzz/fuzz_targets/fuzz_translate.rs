#![no_main]

use libfuzzer_sys::fuzz_target;

/// Header with a generous id bound, so the input reaches the translator.
const HEADER: [u32; 5] = [0x0723_0203, 0x0001_0000, 0, 4096, 0];

fuzz_target!(|data: &[u8]| {
    let mut words = HEADER.to_vec();
    words.extend(
        data.chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])),
    );
    let options = tessera_spirv::Options {
        strict_capabilities: false,
        split_critical_edges: true,
    };
    // Whatever translates must also pass verification.
    if let Ok(shader) = tessera_spirv::parse(&words, "main", &options) {
        for (_, function) in shader.module.functions.iter() {
            function.verify().expect("translated IR failed verification");
        }
    }
});
