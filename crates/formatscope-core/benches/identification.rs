//! Benchmarks for the matcher and the identification hot paths.

use std::hint::black_box;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use formatscope_core::signature::{SignatureFile, SignatureModel};
use formatscope_core::{Engine, SignatureIdentifier};

fn zip_payload(len: usize) -> Vec<u8> {
    let mut content = b"PK\x03\x04\x14\x00\x00\x00\x08\x00".to_vec();
    content.resize(len, b'.');
    content
}

fn bench_model_preparation(c: &mut Criterion) {
    c.bench_function("SignatureModel::builtin", |b| {
        b.iter(|| SignatureModel::builtin())
    });
}

fn bench_classify(c: &mut Criterion) {
    let identifier = SignatureIdentifier::new(Arc::new(SignatureModel::builtin().unwrap()));
    let mut pdf = b"%PDF-1.7\n".to_vec();
    pdf.resize(64 * 1024, b' ');
    pdf.extend_from_slice(b"\n%%EOF\n");

    let inputs = [
        ("zip_4k", zip_payload(4096), "a.zip"),
        ("pdf_64k", pdf, "a.pdf"),
        ("noise_64k", vec![0x5a; 64 * 1024], "a.txt"),
    ];

    let mut group = c.benchmark_group("classify_bytes");
    for (name, content, file_name) in &inputs {
        group.bench_with_input(BenchmarkId::new("builtin", name), content, |b, content| {
            b.iter(|| identifier.classify_bytes(black_box(content), Some(*file_name)))
        });
    }
    group.finish();
}

fn bench_unbounded_gap(c: &mut Criterion) {
    let text = r#"
version = "1"

[[formats]]
id = 1
name = "Scan"
tag = "scan"
signatures = [1]

[[signatures]]
id = 1

[[signatures.sequences]]
anchor = "variable"
pattern = "'BEGIN' * 'MIDDLE' * 'END'"
"#;
    let model = SignatureFile::from_toml_str(text).unwrap().into_model().unwrap();
    let identifier = SignatureIdentifier::new(Arc::new(model));

    let mut group = c.benchmark_group("unbounded_gap");
    for size in [1024usize, 16 * 1024, 256 * 1024] {
        let mut content = vec![b'x'; size];
        content[..5].copy_from_slice(b"BEGIN");
        let mid = size / 2;
        content[mid..mid + 6].copy_from_slice(b"MIDDLE");
        group.bench_with_input(BenchmarkId::new("miss", size), &content, |b, content| {
            b.iter(|| identifier.classify_bytes(black_box(content), None))
        });
    }
    group.finish();
}

fn bench_detect_layers(c: &mut Criterion) {
    let engine = Engine::with_defaults().unwrap();
    let wrapped = STANDARD.encode(zip_payload(16 * 1024)).into_bytes();

    c.bench_function("detect base64 > zip", |b| {
        b.iter(|| engine.detect_bytes(black_box(wrapped.clone())))
    });
}

criterion_group!(
    benches,
    bench_model_preparation,
    bench_classify,
    bench_unbounded_gap,
    bench_detect_layers
);
criterion_main!(benches);
