//! Fuzz target for the signature pattern and gap parsers.
//!
//! Properties validated:
//! - No panics on arbitrary pattern text
//! - Parsed patterns never contain an empty fragment
//! - Fragments and gaps stay aligned

#![no_main]

use formatscope_core::signature::{parse_gap, parse_pattern};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    if let Ok(sub) = parse_pattern(data) {
        assert!(!sub.fragments.is_empty());
        assert!(sub.fragments.iter().all(|fragment| !fragment.is_empty()));
        assert_eq!(sub.gaps.len() + 1, sub.fragments.len());
    }

    if let Ok(gap) = parse_gap(data) {
        assert!(gap.max.is_none_or(|max| max >= gap.min));
    }
});
