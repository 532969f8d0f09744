//! Shared engine pieces must be usable across threads.

use formatscope_core::detection::{ModuleDetector, ModuleRegistry, SignatureDetector};

fn assert_sync_send<T: Sync + Send>() {}

#[test]
fn test_engine_is_sync_send() {
    assert_sync_send::<formatscope_core::Engine>();
}

#[test]
fn test_signature_model_is_sync_send() {
    assert_sync_send::<formatscope_core::SignatureModel>();
    assert_sync_send::<formatscope_core::SignatureIdentifier>();
}

#[test]
fn test_detection_strategy_is_sync_send() {
    assert_sync_send::<formatscope_core::DetectionStrategy>();
    assert_sync_send::<formatscope_core::DecoderRegistry>();
    assert_sync_send::<ModuleRegistry>();
    assert_sync_send::<ModuleDetector>();
    assert_sync_send::<SignatureDetector>();
}

#[test]
fn test_scope_config_is_sync_send() {
    assert_sync_send::<formatscope_core::ScopeConfig>();
}

#[test]
fn test_engine_shared_between_threads() {
    use std::sync::Arc;

    let engine = Arc::new(formatscope_core::Engine::with_defaults().unwrap());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                engine
                    .detect_bytes(b"\x1f\x8b\x08\x00".to_vec())
                    .map(|detection| detection.layers[0].clone())
            })
        })
        .collect();
    for handle in handles {
        let first = handle.join().unwrap().unwrap();
        assert_eq!(first.tag.as_str(), "gzip");
    }
}
