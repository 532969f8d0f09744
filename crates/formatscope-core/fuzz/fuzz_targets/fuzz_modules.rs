//! Fuzz target for module table parsing.
//!
//! Properties validated:
//! - No panics on malformed module lines or regexes
//! - Errors carry the offending line, never a panic

#![no_main]

use formatscope_core::detection::ModuleRegistry;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let _ = ModuleRegistry::parse(data);
});
