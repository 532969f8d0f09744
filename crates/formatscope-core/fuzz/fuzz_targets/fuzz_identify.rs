//! Fuzz target for matching arbitrary bytes against the built-in library
//! and running layered detection over them.
//!
//! Properties validated:
//! - No panics in the matcher, resolver, detectors or decoders
//! - Classification is deterministic
//! - Detection never exceeds the recursion bound

#![no_main]

use std::sync::OnceLock;

use formatscope_core::Engine;
use libfuzzer_sys::fuzz_target;

fn engine() -> &'static Engine {
    static ENGINE: OnceLock<Engine> = OnceLock::new();
    ENGINE.get_or_init(|| Engine::with_defaults().expect("built-in library loads"))
}

fuzz_target!(|data: &[u8]| {
    let engine = engine();

    let first = engine.identifier().classify_bytes(data, Some("fuzz.bin"));
    let second = engine.identifier().classify_bytes(data, Some("fuzz.bin"));
    assert_eq!(first, second);

    if let Ok(detection) = engine.detect_bytes(data.to_vec()) {
        assert!(detection.layers.len() <= engine.strategy().max_recursion() + 1);
    }
});
