//! End-to-end scenarios over the public API: signature classification,
//! hit resolution and layered detection through the engine.

#![allow(clippy::useless_vec)]

use std::borrow::Cow;
use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use formatscope_core::detection::{self, Detector, ModuleDetector, ModuleRegistry};
use formatscope_core::signature::{FileFormat, HitResolver, SignatureFile};
use formatscope_core::*;

const ZIP_ONLY: &str = r#"
version = "1"

[[formats]]
id = 1
name = "ZIP archive"
tag = "zip"
extensions = ["zip"]
signatures = [1]

[[formats]]
id = 2
name = "Portable Document Format"
tag = "pdf"
extensions = ["pdf"]

[[signatures]]
id = 1
specific = true

[[signatures.sequences]]
anchor = "bof"
pattern = "50 4B 03 04"
"#;

fn model(text: &str) -> Arc<SignatureModel> {
    Arc::new(SignatureFile::from_toml_str(text).unwrap().into_model().unwrap())
}

fn zip_bytes() -> Vec<u8> {
    let mut content = b"PK\x03\x04\x14\x00\x00\x00\x08\x00".to_vec();
    content.extend_from_slice(b"inner.bin and its compressed body");
    content
}

fn gzip(content: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(content).unwrap();
    encoder.finish().unwrap()
}

#[test]
fn test_bof_hit_with_and_without_matching_extension() {
    let identifier = SignatureIdentifier::new(model(ZIP_ONLY));
    let bytes = b"\x50\x4B\x03\x04";

    for name in [Some("archive.zip"), Some("archive.dat"), None] {
        let mut source = MemorySource::new(&bytes[..]);
        if let Some(name) = name {
            source = source.with_name(name);
        }
        let classification = classify_with_hits(&identifier, &source).unwrap();
        assert_eq!(classification.hits.len(), 1, "name {name:?}");
        let hit = &classification.hits[0];
        assert_eq!(hit.hit_type, HitType::PositiveSpecific);
        assert_eq!(hit.format_id.tag.as_str(), "zip");
        assert_eq!(hit.warning.is_some(), name != Some("archive.zip"));
        assert_eq!(classification.status, IdentificationStatus::Positive);
    }
}

#[test]
fn test_extension_only_format_yields_single_tentative_hit() {
    let identifier = SignatureIdentifier::new(model(ZIP_ONLY));
    let source = MemorySource::new(&b"no magic here"[..]).with_name("report.pdf");
    let classification = classify_with_hits(&identifier, &source).unwrap();
    assert_eq!(classification.hits.len(), 1);
    assert_eq!(classification.hits[0].hit_type, HitType::Tentative);
    assert_eq!(classification.hits[0].format_id.tag.as_str(), "pdf");
    assert_eq!(classification.status, IdentificationStatus::Tentative);
}

#[test]
fn test_unidentified_is_not_an_error() {
    let identifier = SignatureIdentifier::new(model(ZIP_ONLY));
    let source = MemorySource::new(&b"no magic here"[..]).with_name("report");
    let ids = identify(&identifier, &source).unwrap();
    assert!(ids.is_empty());
}

#[test]
fn test_gap_bounds() {
    let text = r#"
version = "1"

[[formats]]
id = 1
name = "Gapped"
tag = "gapped"
signatures = [1]

[[signatures]]
id = 1

[[signatures.sequences]]
anchor = "bof"
pattern = "AA {0-2} BB"
"#;
    let identifier = SignatureIdentifier::new(model(text));
    let cases: [(&[u8], bool); 5] = [
        (b"\xAA\xBB", true),
        (b"\xAA\x00\xBB", true),
        (b"\xAA\x00\x00\xBB", true),
        (b"\xAA\x00\x00\x00\xBB", false),
        (b"\xAA", false),
    ];
    for (content, expected) in cases {
        let classification = identifier.classify_bytes(content, None);
        assert_eq!(classification.is_identified(), expected, "{content:02X?}");
    }
}

#[test]
fn test_priority_pruning_is_order_independent() {
    let model = SignatureModel::builtin().unwrap();
    let zip = model.format(1).unwrap();
    let jar = model.format(2).unwrap();
    let resolver = HitResolver::new(&model);

    let forward = resolver.resolve(
        vec![Hit::positive(zip, true), Hit::positive(jar, true)],
        Some("app.jar"),
    );
    let backward = resolver.resolve(
        vec![Hit::positive(jar, true), Hit::positive(zip, true)],
        Some("app.jar"),
    );
    assert_eq!(forward, backward);
    assert_eq!(forward.len(), 1);
    assert_eq!(forward[0].format_id.tag.as_str(), "jar");
}

#[test]
fn test_builtin_jar_beats_zip() {
    let engine = Engine::with_defaults().unwrap();
    let mut content = b"PK\x03\x04".to_vec();
    content.resize(30, 0);
    content.extend_from_slice(b"META-INF/MANIFEST.MF");
    let source = MemorySource::new(content).with_name("app.jar");
    let classification = engine.classify(&source).unwrap();
    let tags: Vec<_> = classification
        .hits
        .iter()
        .map(|hit| hit.format_id.tag.as_str())
        .collect();
    assert_eq!(tags, vec!["jar"]);
}

#[test]
fn test_identify_is_repeatable() {
    let engine = Engine::with_defaults().unwrap();
    let source = MemorySource::new(&b"%PDF-1.4\n...\n%%EOF"[..]).with_name("a.pdf");
    let first = identify(engine.identifier(), &source).unwrap();
    let second = identify(engine.identifier(), &source).unwrap();
    assert_eq!(first, second);
    assert_eq!(first[0], FormatId::new("pdf", "1.4"));
}

#[test]
fn test_source_read_error_propagates() {
    struct Broken;

    impl ByteSource for Broken {
        fn len(&self) -> u64 {
            16
        }

        fn read_at(&self, _offset: u64, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("device gone"))
        }

        fn file_name(&self) -> Option<&str> {
            None
        }

        fn contents(&self) -> io::Result<Cow<'_, [u8]>> {
            Err(io::Error::other("device gone"))
        }
    }

    let engine = Engine::with_defaults().unwrap();
    let err = engine.classify(&Broken).unwrap_err();
    assert!(matches!(err, CoreError::Stream { .. }));
}

#[test]
fn test_detect_base64_wrapped_zip() {
    let engine = Engine::with_defaults().unwrap();
    let wrapped = STANDARD.encode(zip_bytes());
    let mut detection = engine.detect_bytes(wrapped.into_bytes()).unwrap();
    assert_eq!(
        detection.layers,
        vec![FormatId::tag_only("base64"), FormatId::tag_only("zip")]
    );
    assert_eq!(detection.read_content().unwrap(), zip_bytes());
}

#[test]
fn test_detect_base64_with_line_breaks() {
    let engine = Engine::with_defaults().unwrap();
    let encoded = STANDARD.encode(zip_bytes());
    let (head, tail) = encoded.split_at(20);
    let wrapped = format!("{head}\r\n{tail}\n");
    let detection = engine.detect_bytes(wrapped.into_bytes()).unwrap();
    let tags: Vec<_> = detection.identified().map(|id| id.tag.as_str()).collect();
    assert_eq!(tags, vec!["base64", "zip"]);
}

#[test]
fn test_detect_gzip_base64_zip() {
    let engine = Engine::with_defaults().unwrap();
    let content = gzip(STANDARD.encode(zip_bytes()).as_bytes());
    let mut detection = engine.detect_bytes(content).unwrap();
    let tags: Vec<_> = detection.layers.iter().map(|id| id.tag.as_str()).collect();
    assert_eq!(tags, vec!["gzip", "base64", "zip"]);
    assert_eq!(detection.outermost(), Some(&FormatId::tag_only("gzip")));
    assert_eq!(detection.innermost(), Some(&FormatId::tag_only("zip")));
    assert_eq!(detection.read_content().unwrap(), zip_bytes());
}

#[test]
fn test_detect_unknown_content() {
    let engine = Engine::with_defaults().unwrap();
    let mut detection = engine.detect_bytes(b"\x00\x01 plain".to_vec()).unwrap();
    assert_eq!(detection.layers, vec![FormatId::unknown()]);
    assert_eq!(detection.read_content().unwrap(), b"\x00\x01 plain");
}

#[test]
fn test_disabled_decoder_stops_unwrapping() {
    let config = ScopeConfig::builder().disable_decoder("base64").build().unwrap();
    let engine = Engine::from_config(&config).unwrap();
    let detection = engine
        .detect_bytes(STANDARD.encode(zip_bytes()).into_bytes())
        .unwrap();
    assert_eq!(detection.layers, vec![FormatId::tag_only("base64")]);
}

#[test]
fn test_read_limit_with_file_backed_stream() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("large.gz");
    let mut payload = zip_bytes();
    payload.resize(64 * 1024, b'z');
    std::fs::write(&path, gzip(&payload)).unwrap();

    let config = ScopeConfig::builder().read_limit(Some(4096)).build().unwrap();
    let engine = Engine::from_config(&config).unwrap();
    let detection = engine.detect_path(&path).unwrap();
    let tags: Vec<_> = detection.layers.iter().map(|id| id.tag.as_str()).collect();
    assert_eq!(tags, vec!["gzip", "zip"]);
}

#[test]
fn test_read_limit_with_short_base64_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wrapped.b64");
    let mut payload = zip_bytes();
    payload.resize(4 * 1024, b'z');
    let encoded = STANDARD.encode(&payload);
    let lines: Vec<&[u8]> = encoded.as_bytes().chunks(8).collect();
    std::fs::write(&path, lines.join(&b"\r\n"[..])).unwrap();

    let config = ScopeConfig::builder().read_limit(Some(1024)).build().unwrap();
    let engine = Engine::from_config(&config).unwrap();
    let mut detection = engine.detect_path(&path).unwrap();
    assert_eq!(
        detection.layers,
        vec![FormatId::tag_only("base64"), FormatId::tag_only("zip")]
    );
    assert_eq!(detection.read_content().unwrap(), payload);
}

#[test]
fn test_run_with_explicit_collaborators() {
    let registry =
        ModuleRegistry::parse("base64=class:base64\nzip=string:PK\\x03\\x04\n").unwrap();
    let detectors: Vec<Arc<dyn Detector>> =
        vec![Arc::new(ModuleDetector::new(Arc::new(registry)))];
    let mut decoders = DecoderRegistry::new();
    decoders.register(Arc::new(Base64Decoder));

    let enabled: FormatSet = ["base64", "zip"].into_iter().collect();
    let wrapped = STANDARD.encode(zip_bytes());
    let detection = detection::run(
        &enabled,
        &detectors,
        &decoders,
        Box::new(Cursor::new(wrapped.into_bytes())),
        4,
    )
    .unwrap();
    assert_eq!(
        detection.layers,
        vec![FormatId::tag_only("base64"), FormatId::tag_only("zip")]
    );
}

#[test]
fn test_reset_failure_is_a_stream_error() {
    struct OneShot(Cursor<Vec<u8>>);

    impl Read for OneShot {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.0.read(buf)
        }
    }

    impl ResettableStream for OneShot {
        fn reset_to_beginning(&mut self) -> io::Result<()> {
            Err(io::Error::other("not seekable"))
        }
    }

    let engine = Engine::with_defaults().unwrap();
    let err = engine
        .detect(Box::new(OneShot(Cursor::new(zip_bytes()))))
        .unwrap_err();
    assert!(matches!(err, CoreError::Stream { .. }));
}

#[test]
fn test_custom_library_from_json_and_yaml() {
    let json = r#"{
        "version": "1",
        "formats": [
            {"id": 1, "name": "Widget", "tag": "widget", "extensions": ["wdg"], "signatures": [1]}
        ],
        "signatures": [
            {"id": 1, "sequences": [{"anchor": "eof", "pattern": "'END'"}]}
        ]
    }"#;
    let yaml = "
version: '1'
formats:
  - id: 1
    name: Widget
    tag: widget
    extensions: [wdg]
    signatures: [1]
signatures:
  - id: 1
    sequences:
      - anchor: eof
        pattern: \"'END'\"
";
    for model in [
        SignatureFile::from_json_str(json).unwrap().into_model().unwrap(),
        SignatureFile::from_yaml_str(yaml).unwrap().into_model().unwrap(),
    ] {
        let identifier = SignatureIdentifier::new(Arc::new(model));
        let hit = identifier.classify_bytes(b"body END", Some("x.wdg"));
        assert_eq!(hit.status, IdentificationStatus::Positive);
        let miss = identifier.classify_bytes(b"END body", Some("x.wdg"));
        assert_eq!(miss.status, IdentificationStatus::Unidentified);
    }
}

#[test]
fn test_format_builder_metadata_reaches_hits() {
    let format = FileFormat::new(7, "Sample", "sample")
        .with_version("2")
        .with_mime_type("application/x-sample")
        .with_extensions(["smp"]);
    let hit = Hit::positive(&format, false);
    assert_eq!(hit.format_id, FormatId::new("sample", "2"));
    assert_eq!(hit.mime_type.as_deref(), Some("application/x-sample"));
    assert_eq!(hit.hit_type, HitType::PositiveGeneric);
}
