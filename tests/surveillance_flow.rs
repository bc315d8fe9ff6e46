use std::sync::Arc;
use std::time::Duration;

use surveillance_camera::ingest::ScriptedDevice;
use surveillance_camera::record::{frames_for, StubVideoBackend};
use surveillance_camera::{Camera, Frame, FrameSource, SurveillanceEvent, SurveillanceOptions};

fn stub_camera(device: &str) -> Camera {
    let source = FrameSource::open(device).expect("open stub device");
    Camera::with_parts(source, Arc::new(StubVideoBackend::new())).expect("build camera")
}

fn settle() {
    std::thread::sleep(Duration::from_millis(700));
}

#[test]
fn motion_yields_detected_photos_then_video() {
    let camera = stub_camera("stub://motion");
    camera.start().expect("start camera");
    settle();
    assert!(camera.fps() > 0.0);

    let mut stream = camera
        .surveillance_start(SurveillanceOptions {
            timestamp: true,
            video_seconds: 1.0,
            picture_seconds: 0.5,
            draw_contours: true,
        })
        .expect("surveillance starts");
    assert!(camera.is_surveillance_active());

    assert!(matches!(
        stream.next_event(),
        Some(SurveillanceEvent::Detected)
    ));

    let mut photos = Vec::new();
    let video = loop {
        match stream.next_event().expect("stream keeps running") {
            SurveillanceEvent::Photo { id, total, .. } => photos.push((id, total)),
            SurveillanceEvent::Video(video) => break video,
            SurveillanceEvent::Detected => panic!("second detection before the video"),
        }
    };
    assert_eq!(photos.first(), Some(&(1, 2)));
    assert!(photos.iter().all(|&(_, total)| total == 2));

    let stored = StubVideoBackend::frame_count(video.path()).expect("read stub video");
    assert_eq!(stored, video.frame_count());
    let name = video
        .path()
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    assert!(name.ends_with("_on_motion.mp4"), "{}", name);

    assert!(camera.surveillance_stop());
    assert!(stream.next_event().is_none());
    assert!(!camera.is_surveillance_active());
    camera.stop().expect("stop camera");
}

#[test]
fn second_start_is_declined_while_active() {
    let camera = stub_camera("stub://static");
    camera.start().expect("start camera");

    let first = camera.surveillance_start(SurveillanceOptions::default());
    assert!(first.is_some());
    assert!(camera
        .surveillance_start(SurveillanceOptions::default())
        .is_none());
    assert!(camera.is_surveillance_active());

    drop(first);
    assert!(!camera.is_surveillance_active());
    assert!(camera
        .surveillance_start(SurveillanceOptions::default())
        .is_some());
    camera.stop().expect("stop camera");
}

#[test]
fn on_demand_video_covers_the_requested_duration() {
    let shades = [20u8, 90, 160, 230];
    let frames = shades
        .iter()
        .map(|&shade| Frame::filled(64, 48, [shade, shade, shade]))
        .collect();
    let source = FrameSource::with_device(Box::new(ScriptedDevice::cycling(frames, 25)))
        .expect("open scripted device");
    let camera = Camera::with_parts(source, Arc::new(StubVideoBackend::new())).expect("build camera");
    camera.start().expect("start camera");
    settle();

    // 0.33 s never lands on a whole number of frames at a real rate.
    let video = camera.get_video(false, 0.33).expect("record video");
    assert!(video.fps() > 0.0);
    assert_eq!(video.frame_count(), frames_for(video.fps(), 0.33));
    assert!(video.frame_count() as f64 >= video.fps() * 0.33);
    let stored = StubVideoBackend::frame_count(video.path()).expect("read stub video");
    assert_eq!(stored, video.frame_count());

    let dir = tempfile::tempdir().expect("tempdir");
    let kept = video.persist(&dir.path().join("clip.mp4")).expect("persist");
    assert!(kept.exists());

    let photo = camera.get_photo(true).expect("photo");
    assert_eq!(&photo.bytes()[..2], &[0xFF, 0xD8]);
    camera.stop().expect("stop camera");
    camera.stop().expect("second stop is a no-op");
}

#[test]
fn frame_ids_never_go_backwards() {
    let source = FrameSource::open("stub://motion?fps=60").expect("open stub device");
    source.start().expect("start");
    let mut last = 0;
    let mut advanced = 0;
    for _ in 0..40 {
        let (id, frame) = source.read(false);
        assert!(id >= last);
        if id > last {
            advanced += 1;
        }
        assert_eq!(frame.size(), source.frame_size());
        last = id;
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(advanced > 0);
    source.stop().expect("stop");
}
