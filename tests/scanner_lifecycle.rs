use std::sync::mpsc;
use std::time::{Duration, Instant};

use product_scanner::capture::{CameraProbe, CaptureConstraints, SyntheticCamera};
use product_scanner::detect::{BackendProbe, BoundingBox, Detection, DetectorAdapter, ScriptedBackend};
use product_scanner::error::{CaptureError, CaptureRejection, ScannerError};
use product_scanner::overlay::DrawCommand;
use product_scanner::scanner::{
    status, Scanner, ScannerHandle, ScannerRunner, ScannerSettings, ScannerState, TickOutcome,
};

fn settings() -> ScannerSettings {
    ScannerSettings {
        constraints: CaptureConstraints {
            width: 160,
            height: 120,
            target_fps: 60,
        },
        ..ScannerSettings::default()
    }
}

fn build(backend: ScriptedBackend, camera: SyntheticCamera) -> (Scanner, BackendProbe, CameraProbe) {
    let backend_probe = backend.probe();
    let camera_probe = camera.probe();
    let scanner = Scanner::new(
        DetectorAdapter::new(Box::new(backend)),
        Box::new(camera),
        settings(),
    );
    (scanner, backend_probe, camera_probe)
}

fn camera() -> SyntheticCamera {
    SyntheticCamera::new("stub://lifecycle").with_warmup(0)
}

/// Start the scanner and run one detection cycle.
fn scanning_with(detections: Vec<Detection>) -> (Scanner, BackendProbe, CameraProbe) {
    let (mut scanner, backend, camera) = build(ScriptedBackend::repeating(detections), camera());
    scanner.start().expect("start");
    assert_eq!(scanner.state(), &ScannerState::InitializingCamera);
    assert_eq!(scanner.tick(), TickOutcome::CameraReady);
    assert_eq!(scanner.state(), &ScannerState::Scanning);
    scanner.tick();
    (scanner, backend, camera)
}

fn bottle(confidence: f32) -> Detection {
    Detection::new("bottle", confidence, BoundingBox::new(10.0, 10.0, 50.0, 80.0))
}

#[test]
fn confident_detection_is_captured() {
    let (mut scanner, _backend, camera) = scanning_with(vec![bottle(0.82)]);
    assert_eq!(scanner.status(), "Detected bottle (82%)");

    let capture = scanner.request_capture().expect("capture accepted");
    assert_eq!(capture.primary_label, "bottle");
    assert_eq!(capture.confidence, 0.82);
    assert_eq!(capture.primary_box, BoundingBox::new(10.0, 10.0, 50.0, 80.0));
    assert_eq!(capture.snapshot.width, 160);
    assert_eq!(capture.all_detections.len(), 1);

    assert_eq!(scanner.state(), &ScannerState::Stopped);
    assert_eq!(scanner.status(), "Captured bottle (82%)");
    assert_eq!(camera.releases(), 1);
    assert!(scanner.current_detections().is_empty());
}

#[test]
fn empty_scene_rejects_capture_and_keeps_scanning() {
    let (mut scanner, _backend, camera) = scanning_with(vec![]);

    let err = scanner.request_capture().unwrap_err();
    assert_eq!(err, CaptureError::Rejected(CaptureRejection::NoDetections));
    assert!(err.is_recoverable());
    assert_eq!(scanner.state(), &ScannerState::Scanning);
    assert_eq!(scanner.status(), status::NO_DETECTIONS);
    assert_eq!(camera.releases(), 0);

    assert_eq!(scanner.tick(), TickOutcome::Detected(0));
    assert_eq!(scanner.stats().rejected_captures, 1);
}

#[test]
fn weak_detection_rejects_with_low_confidence() {
    let (mut scanner, _backend, _camera) = scanning_with(vec![Detection::new(
        "box",
        0.35,
        BoundingBox::new(0.0, 0.0, 20.0, 20.0),
    )]);

    let err = scanner.request_capture().unwrap_err();
    assert_eq!(
        err,
        CaptureError::Rejected(CaptureRejection::LowConfidence {
            confidence: 0.35,
            threshold: 0.5
        })
    );
    assert_eq!(scanner.state(), &ScannerState::Scanning);
    assert_eq!(scanner.status(), status::LOW_CONFIDENCE);
}

#[test]
fn model_load_failure_is_terminal() {
    let (mut scanner, backend, camera) = build(
        ScriptedBackend::repeating(vec![bottle(0.9)]).failing_load("labels missing"),
        camera(),
    );

    let err = scanner.start().unwrap_err();
    assert!(matches!(err, ScannerError::Initialization(_)));
    assert!(matches!(scanner.state(), ScannerState::Error(reason) if reason.contains("labels missing")));
    assert!(scanner.status().starts_with("Error: "));

    for _ in 0..5 {
        assert_eq!(scanner.tick(), TickOutcome::Halted);
    }
    assert_eq!(backend.detect_calls(), 0);
    assert_eq!(camera.acquisitions(), 0);
    assert!(matches!(
        scanner.request_capture(),
        Err(CaptureError::NotScanning(ScannerState::Error(_)))
    ));
}

#[test]
fn capture_threshold_is_inclusive() {
    let (mut scanner, _, _) = scanning_with(vec![bottle(0.5)]);
    let capture = scanner.request_capture().unwrap();
    assert_eq!(capture.confidence, 0.5);
    assert!(capture.all_detections.is_empty());

    let (mut scanner, _, _) = scanning_with(vec![bottle(0.4999)]);
    assert!(matches!(
        scanner.request_capture(),
        Err(CaptureError::Rejected(CaptureRejection::LowConfidence { .. }))
    ));
}

#[test]
fn capture_keeps_only_strong_supporting_detections() {
    let (mut scanner, _, _) = scanning_with(vec![
        Detection::new("cup", 0.41, BoundingBox::new(100.0, 60.0, 30.0, 30.0)),
        bottle(0.82),
        Detection::new("cap", 0.66, BoundingBox::new(20.0, 5.0, 20.0, 10.0)),
    ]);
    assert_eq!(scanner.current_detections().len(), 3);

    let capture = scanner.request_capture().unwrap();
    let labels: Vec<_> = capture
        .all_detections
        .iter()
        .map(|d| d.label.as_str())
        .collect();
    assert_eq!(labels, vec!["bottle", "cap"]);
}

#[test]
fn stop_is_idempotent_and_releases_once() {
    let (mut scanner, _backend, camera) = scanning_with(vec![bottle(0.9)]);

    scanner.stop();
    scanner.stop();
    assert_eq!(scanner.state(), &ScannerState::Stopped);
    assert_eq!(scanner.status(), status::STOPPED);
    assert_eq!(camera.acquisitions(), 1);
    assert_eq!(camera.releases(), 1);
    assert_eq!(scanner.camera_stats().releases, 1);
    assert!(scanner.overlay_commands().is_empty());
    assert_eq!(scanner.tick(), TickOutcome::Halted);
}

#[test]
fn denied_camera_moves_to_error() {
    let (mut scanner, backend, camera) = build(
        ScriptedBackend::empty(),
        SyntheticCamera::new("stub://denied"),
    );

    let err = scanner.start().unwrap_err();
    assert!(matches!(err, ScannerError::CameraAccess(_)));
    assert!(matches!(scanner.state(), ScannerState::Error(reason) if reason.contains("permission denied")));
    assert_eq!(backend.loads(), 1);
    assert_eq!(camera.releases(), 0);

    scanner.stop();
    assert!(matches!(scanner.state(), ScannerState::Error(_)));
}

#[test]
fn transient_detection_failure_keeps_scanning() {
    let backend = ScriptedBackend::repeating(vec![bottle(0.9)]).then_fail("inference glitch");
    let (mut scanner, backend_probe, _) = build(backend, camera());
    scanner.start().unwrap();
    assert_eq!(scanner.tick(), TickOutcome::CameraReady);

    assert_eq!(scanner.tick(), TickOutcome::Retry);
    assert_eq!(scanner.state(), &ScannerState::Scanning);
    assert_eq!(scanner.status(), status::DETECTION_RETRY);
    assert!(scanner.current_detections().is_empty());
    assert_eq!(scanner.stats().detection_errors, 1);

    assert_eq!(scanner.tick(), TickOutcome::Detected(1));
    assert_eq!(scanner.current_detections().best().unwrap().label, "bottle");
    assert_eq!(backend_probe.detect_calls(), 2);
}

#[test]
fn overlay_matches_current_detections() {
    let (scanner, _, _) = scanning_with(vec![
        bottle(0.82),
        Detection::new("cup", 0.41, BoundingBox::new(100.0, 60.0, 30.0, 30.0)),
    ]);

    let commands = scanner.overlay_commands();
    assert!(matches!(
        commands[0],
        DrawCommand::Clear {
            width: 160,
            height: 120
        }
    ));
    let texts: Vec<_> = commands
        .iter()
        .filter_map(|c| match c {
            DrawCommand::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(texts, vec!["bottle 82%", "cup 41%"]);
}

#[test]
fn warmup_frames_delay_scanning() {
    let (mut scanner, _, _) = build(
        ScriptedBackend::empty(),
        SyntheticCamera::new("stub://slow").with_warmup(2),
    );
    scanner.start().unwrap();
    assert_eq!(scanner.tick(), TickOutcome::WaitingForCamera);
    assert_eq!(scanner.tick(), TickOutcome::WaitingForCamera);
    assert_eq!(scanner.tick(), TickOutcome::CameraReady);
    assert_eq!(scanner.status(), status::SCANNING);
}

#[test]
fn stop_during_camera_warmup_releases_once() {
    let (mut scanner, backend, camera) = build(
        ScriptedBackend::repeating(vec![bottle(0.9)]),
        SyntheticCamera::new("stub://warming").with_warmup(5),
    );
    scanner.start().unwrap();
    assert_eq!(scanner.tick(), TickOutcome::WaitingForCamera);
    assert_eq!(scanner.state(), &ScannerState::InitializingCamera);

    scanner.stop();
    scanner.stop();
    assert_eq!(scanner.state(), &ScannerState::Stopped);
    assert_eq!(camera.acquisitions(), 1);
    assert_eq!(camera.releases(), 1);
    assert_eq!(scanner.camera_stats().releases, 1);
    assert_eq!(scanner.tick(), TickOutcome::Halted);
    assert_eq!(backend.detect_calls(), 0);
}

fn wait_for_state(handle: &ScannerHandle, want: &ScannerState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while &handle.state() != want {
        assert!(Instant::now() < deadline, "timed out waiting for {}", want);
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn runner_delivers_accepted_capture_once() {
    let backend = ScriptedBackend::repeating(vec![bottle(0.82)])
        .then(vec![])
        .then(vec![]);
    let (scanner, _, camera) = build(backend, camera());
    let (tx, rx) = mpsc::channel();
    let handle = ScannerRunner::spawn(scanner, move |capture| {
        tx.send(capture).unwrap();
    })
    .unwrap();

    wait_for_state(&handle, &ScannerState::Scanning);
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match handle.request_capture() {
            Ok(()) => break,
            Err(err) => {
                assert!(err.is_recoverable(), "unexpected {err}");
                assert!(Instant::now() < deadline, "capture never accepted");
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    }

    let capture = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(capture.primary_label, "bottle");

    let board = handle.wait();
    assert_eq!(board.state, ScannerState::Stopped);
    assert_eq!(board.status, "Captured bottle (82%)");
    assert_eq!(camera.releases(), 1);
    assert!(rx.try_recv().is_err());
}

#[test]
fn runner_stop_releases_camera() {
    let (scanner, _, camera) = build(ScriptedBackend::empty(), camera());
    let mut handle = ScannerRunner::spawn(scanner, |_| panic!("nothing to capture")).unwrap();

    wait_for_state(&handle, &ScannerState::Scanning);
    assert_eq!(handle.status(), status::SCANNING);

    handle.stop();
    handle.stop();
    assert!(!handle.is_running());
    assert_eq!(handle.state(), ScannerState::Stopped);
    assert_eq!(camera.releases(), 1);
    assert_eq!(handle.request_capture(), Err(CaptureError::RunnerGone));
}

#[test]
fn runner_reports_start_failure() {
    let (scanner, backend, _) = build(
        ScriptedBackend::empty(),
        SyntheticCamera::new("stub://denied"),
    );
    let handle = ScannerRunner::spawn(scanner, |_| {}).unwrap();
    let board = handle.wait();
    assert!(matches!(board.state, ScannerState::Error(_)));
    assert_eq!(backend.detect_calls(), 0);
}
