//! End-to-end scenarios through the plugin registry.

use mockall::mock;
use std::io::Write;
use std::sync::Arc;
use streamcv_core::{Context, Error, Map, Registry, Tuple, Value, Writer};
use streamcv_opencv::plugin::{
    self, CAPTURE_FROM_DEVICE, CAPTURE_FROM_URI, CASCADE_CLASSIFIER, DETECT_MULTI_SCALE, DRAW_RECTS,
    MOUNT_IMAGE, SHARED_IMAGE,
};
use streamcv_opencv::testing::{numbered_frames, solid_frame, ScriptedBackend};
use streamcv_opencv::{CvError, RawData, Rect};
use tempfile::NamedTempFile;

mock! {
    Sink {}
    impl Writer for Sink {
        fn write(&mut self, ctx: &Context, tuple: Tuple) -> streamcv_core::Result<()>;
    }
}

fn registry(backend: ScriptedBackend) -> Registry {
    let mut registry = Registry::new();
    plugin::register(&mut registry, Arc::new(backend)).unwrap();
    registry
}

fn params(entries: &[(&str, Value)]) -> Map {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn temp_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn file_param(file: &NamedTempFile) -> Map {
    params(&[("file", Value::from(file.path().to_string_lossy().to_string()))])
}

#[test]
fn test_uri_source_ends_cleanly_after_three_frames() {
    let registry = registry(ScriptedBackend::new().with_uri("three.avi", numbered_frames(3, 4, 4)));
    let ctx = Context::new();
    let source = registry
        .create_source(
            &ctx,
            CAPTURE_FROM_URI,
            &params(&[
                ("uri", Value::from("three.avi")),
                ("next_frame_error", Value::Bool(false)),
            ]),
        )
        .unwrap();

    let mut seen = Vec::new();
    let mut sink = |_: &Context, t: Tuple| -> streamcv_core::Result<()> {
        seen.push(RawData::from_map(&t.data)?);
        Ok(())
    };
    source.generate_stream(&ctx, &mut sink).unwrap();

    assert_eq!(seen.len(), 3);
    for (i, raw) in seen.iter().enumerate() {
        assert_eq!(raw.data[0], i as u8);
        assert_eq!((raw.width, raw.height), (4, 4));
    }
}

#[test]
fn test_uri_source_fails_on_fourth_read_by_default() {
    let registry = registry(ScriptedBackend::new().with_uri("three.avi", numbered_frames(3, 4, 4)));
    let ctx = Context::new();
    let source = registry
        .create_source(&ctx, CAPTURE_FROM_URI, &params(&[("uri", Value::from("three.avi"))]))
        .unwrap();

    let mut sink = MockSink::new();
    sink.expect_write().times(3).returning(|_, _| Ok(()));
    let err = source.generate_stream(&ctx, &mut sink).unwrap_err();
    assert!(matches!(CvError::from(err), CvError::ReadFailure { frames: 3, .. }));
}

#[test]
fn test_source_construction_errors() {
    let registry = registry(ScriptedBackend::new());
    let ctx = Context::new();

    let err = registry.create_source(&ctx, CAPTURE_FROM_URI, &Map::new()).err().unwrap();
    assert!(matches!(CvError::from(err), CvError::MissingField(f) if f == "uri"));

    let err = registry.create_source(&ctx, CAPTURE_FROM_DEVICE, &Map::new()).err().unwrap();
    assert!(matches!(CvError::from(err), CvError::MissingField(f) if f == "device_id"));

    // rejected before any capture is opened
    let err = registry
        .create_source(
            &ctx,
            CAPTURE_FROM_URI,
            &params(&[("uri", Value::from("never-opened.avi")), ("format", Value::from("jpeg"))]),
        )
        .err()
        .unwrap();
    assert!(matches!(CvError::from(err), CvError::UnsupportedFormat(_)));
}

#[test]
fn test_invalid_device_fails_on_first_read() {
    let backend = ScriptedBackend::new();
    let stats = backend.stats();
    let registry = registry(backend);
    let ctx = Context::new();
    let source = registry
        .create_source(&ctx, CAPTURE_FROM_DEVICE, &params(&[("device_id", Value::Int(99))]))
        .unwrap();
    assert_eq!(stats.opened(), 0);

    let mut sink = MockSink::new();
    sink.expect_write().never();
    let err = CvError::from(source.generate_stream(&ctx, &mut sink).unwrap_err());
    assert!(matches!(err, CvError::ResourceOpen(_) | CvError::ReadFailure { .. }));
}

#[test]
fn test_zero_stage_cascade_detects_nothing() {
    let registry = registry(ScriptedBackend::new().with_detections(vec![Rect::new(0, 0, 2, 2)]));
    let ctx = Context::new();
    let cascade = temp_file("<opencv_storage><cascade><stageNum>0</stageNum></cascade></opencv_storage>");
    let state = registry
        .create_state(&ctx, CASCADE_CLASSIFIER, &file_param(&cascade))
        .unwrap();
    ctx.shared_states().add("empty", state).unwrap();

    let img = solid_frame(8, 8, [1, 2, 3]).into_map();
    let rects = registry
        .call_udf(&ctx, DETECT_MULTI_SCALE, &[Value::from("empty"), Value::Map(img)])
        .unwrap();
    assert_eq!(rects, Value::Array(Vec::new()));
}

#[test]
fn test_detect_draw_mount_chain() {
    let face = Rect::new(2, 2, 3, 3);
    let backend = ScriptedBackend::new()
        .with_detections(vec![face])
        .with_overlay([10, 20, 30, 255]);
    let stats = backend.stats();
    let registry = registry(backend);
    let ctx = Context::new();

    let cascade = temp_file("<stageNum>12</stageNum>");
    let logo = temp_file("png");
    let classifier = registry
        .create_state(&ctx, CASCADE_CLASSIFIER, &file_param(&cascade))
        .unwrap();
    ctx.shared_states().add("face", classifier).unwrap();
    let overlay = registry.create_state(&ctx, SHARED_IMAGE, &file_param(&logo)).unwrap();
    ctx.shared_states().add("logo", overlay).unwrap();

    let img = solid_frame(8, 8, [0, 0, 0]).into_map();
    let original = img.clone();
    let rects = registry
        .call_udf(&ctx, DETECT_MULTI_SCALE, &[Value::from("face"), Value::Map(img.clone())])
        .unwrap();
    assert_eq!(rects, Value::Array(vec![face.to_value()]));

    let drawn = registry
        .call_udf(&ctx, DRAW_RECTS, &[Value::Map(img.clone()), rects.clone()])
        .unwrap();
    let mounted = registry
        .call_udf(&ctx, MOUNT_IMAGE, &[Value::from("logo"), drawn, rects])
        .unwrap();
    let mounted = RawData::from_map(mounted.as_map().unwrap()).unwrap();

    // centre of the detection carries the overlay colour
    let centre = ((3 * 8 + 3) * 3) as usize;
    assert_eq!(&mounted.data[centre..centre + 3], &[10, 20, 30]);
    assert_eq!(&mounted.data[0..3], &[0, 0, 0]);
    assert_eq!(img, original);

    ctx.shared_states().terminate_all(&ctx).unwrap();
    assert_eq!(stats.classifiers_released(), 1);
}

#[test]
fn test_empty_rects_return_input_unchanged() {
    let registry = registry(ScriptedBackend::new());
    let ctx = Context::new();
    let img = solid_frame(3, 2, [4, 5, 6]).into_map();

    let drawn = registry
        .call_udf(&ctx, DRAW_RECTS, &[Value::Map(img.clone()), Value::Array(Vec::new())])
        .unwrap();
    assert_eq!(drawn, Value::Map(img.clone()));

    // no shared image is registered, the lookup is skipped
    let mounted = registry
        .call_udf(
            &ctx,
            MOUNT_IMAGE,
            &[Value::from("absent"), Value::Map(img.clone()), Value::Array(Vec::new())],
        )
        .unwrap();
    assert_eq!(mounted, Value::Map(img));
}

#[test]
fn test_state_kind_mismatch() {
    let backend = ScriptedBackend::new().with_overlay([0, 0, 0, 0]);
    let registry = registry(backend);
    let ctx = Context::new();
    let logo = temp_file("png");
    let overlay = registry.create_state(&ctx, SHARED_IMAGE, &file_param(&logo)).unwrap();
    ctx.shared_states().add("logo", overlay).unwrap();

    let img = solid_frame(2, 2, [0, 0, 0]).into_map();
    let err = registry
        .call_udf(&ctx, DETECT_MULTI_SCALE, &[Value::from("logo"), Value::Map(img)])
        .unwrap_err();
    match CvError::from(err) {
        CvError::StateLookup(msg) => assert!(msg.contains("cascade_classifier.state")),
        other => panic!("Expected StateLookup, got {:?}", other),
    }
}

#[test]
fn test_unloadable_state_files() {
    let registry = registry(ScriptedBackend::new());
    let ctx = Context::new();
    let missing = params(&[("file", Value::from("/definitely/not/here.xml"))]);

    let err = registry.create_state(&ctx, CASCADE_CLASSIFIER, &missing).err().unwrap();
    assert!(matches!(CvError::from(err), CvError::ResourceOpen(_)));
    let err = registry.create_state(&ctx, SHARED_IMAGE, &missing).err().unwrap();
    assert!(matches!(CvError::from(err), CvError::ResourceOpen(_)));
    let err = registry.create_state(&ctx, SHARED_IMAGE, &Map::new()).err().unwrap();
    assert!(matches!(CvError::from(err), CvError::MissingField(_)));
}

#[test]
fn test_closed_sink_is_not_an_error() {
    let registry = registry(ScriptedBackend::new().with_device(0, numbered_frames(10, 2, 2)));
    let ctx = Context::new();
    let source = registry
        .create_source(&ctx, CAPTURE_FROM_DEVICE, &params(&[("device_id", Value::Int(0))]))
        .unwrap();

    let mut sink = MockSink::new();
    let mut calls = 0;
    sink.expect_write().times(2).returning(move |_, _| {
        calls += 1;
        if calls == 2 {
            Err(Error::SinkClosed)
        } else {
            Ok(())
        }
    });
    source.generate_stream(&ctx, &mut sink).unwrap();
}
